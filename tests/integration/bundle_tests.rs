use crate::common::Fixture;
use kiln::core::models::{BuildMode, PipelineKind};

#[tokio::test]
async fn test_production_bundle_is_minified_without_map() {
    let production = Fixture::new();
    production
        .orchestrator(BuildMode::Production)
        .run(PipelineKind::FullBuild)
        .await
        .unwrap();

    let development = Fixture::new();
    development
        .orchestrator(BuildMode::Development)
        .run(PipelineKind::FullBuild)
        .await
        .unwrap();

    let prod_bundle = production.read("build/scripts/game.js");
    let dev_bundle = development.read("build/scripts/game.js");

    assert!(prod_bundle.len() < dev_bundle.len());
    assert!(!production.exists("build/scripts/game.js.map"));
    assert!(!prod_bundle.contains("sourceMappingURL"));

    assert!(development.exists("build/scripts/game.js.map"));
    assert!(dev_bundle.lines().count() > 1);
}

#[tokio::test]
async fn test_development_map_covers_sources() {
    let fixture = Fixture::new();
    fixture
        .orchestrator(BuildMode::Development)
        .run(PipelineKind::FullBuild)
        .await
        .unwrap();

    let map = sourcemap::SourceMap::from_slice(fixture.read("build/scripts/game.js.map").as_bytes()).unwrap();
    let sources: Vec<&str> = map.sources().collect();

    assert!(sources.iter().any(|s| s.ends_with("index.js")));
    assert!(sources.iter().any(|s| s.ends_with("player.js")));
    assert!(map.get_token_count() > 0);
}

#[tokio::test]
async fn test_single_source_map_reference() {
    let fixture = Fixture::new();
    fixture.write(
        "src/player.js",
        "export const name = 'hero';\n//# sourceMappingURL=player.js.map\n",
    );
    fixture.write(
        "src/index.js",
        "import { name } from './player.js';\nconsole.log(name);\n",
    );

    fixture
        .orchestrator(BuildMode::Development)
        .run(PipelineKind::FullBuild)
        .await
        .unwrap();

    let bundle = fixture.read("build/scripts/game.js");
    assert_eq!(bundle.matches("sourceMappingURL").count(), 1);
    assert!(bundle.trim_end().ends_with("//# sourceMappingURL=game.js.map"));
}

#[tokio::test]
async fn test_bare_specifier_resolves_from_source_dir() {
    let fixture = Fixture::new();
    fixture.write("src/scenes/boot.js", "export default function boot() { return 'booted'; }\n");
    fixture.write(
        "src/index.js",
        "import boot from 'scenes/boot.js';\nconsole.log(boot());\n",
    );

    let report = fixture
        .orchestrator(BuildMode::Development)
        .run(PipelineKind::FullBuild)
        .await
        .unwrap();

    assert_eq!(report.soft_failures(), 0);
    assert!(fixture.read("build/scripts/game.js").contains("booted"));
}
