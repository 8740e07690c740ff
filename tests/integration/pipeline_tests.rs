use crate::common::{CountingReload, Fixture, ENTRY_SOURCE};
use kiln::core::models::{BuildMode, PipelineKind, StepStatus};
use kiln::core::session::{DevSession, Rebuild};
use kiln::core::steps::{BUNDLE, CLEAN, COPY_STATIC, COPY_VENDOR, RELOAD};
use kiln::infrastructure::WatchTrigger;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_full_build_replaces_stale_artifacts() {
    let fixture = Fixture::new();
    fixture.write("build/leftover.txt", "stale");
    fixture.write("build/scripts/old.js", "stale");

    let report = fixture
        .orchestrator(BuildMode::Development)
        .run(PipelineKind::FullBuild)
        .await
        .unwrap();

    assert_eq!(report.soft_failures(), 0);
    assert!(!fixture.exists("build/leftover.txt"));
    assert!(!fixture.exists("build/scripts/old.js"));
    assert!(fixture.exists("build/index.html"));
    assert!(fixture.exists("build/assets/sprites/hero.png"));
    assert!(fixture.exists("build/scripts/game.js"));
}

#[tokio::test]
async fn test_full_build_runs_steps_in_order() {
    let fixture = Fixture::new();

    let report = fixture
        .orchestrator(BuildMode::Development)
        .run(PipelineKind::FullBuild)
        .await
        .unwrap();

    assert_eq!(report.step_names(), vec![CLEAN, COPY_STATIC, COPY_VENDOR, BUNDLE]);
    for pair in report.steps.windows(2) {
        assert!(pair[0].finished_at <= pair[1].started_at);
    }
}

#[tokio::test]
async fn test_vendor_files_per_mode() {
    let production = Fixture::new();
    production
        .orchestrator(BuildMode::Production)
        .run(PipelineKind::StaticAssembly)
        .await
        .unwrap();
    assert_eq!(production.scripts(), vec!["phaser.min.js"]);

    let development = Fixture::new();
    development
        .orchestrator(BuildMode::Development)
        .run(PipelineKind::StaticAssembly)
        .await
        .unwrap();
    assert_eq!(
        development.scripts(),
        vec!["phaser.js", "phaser.map", "phaser.min.js"]
    );
}

#[tokio::test]
async fn test_missing_vendor_file_is_fatal() {
    let fixture = Fixture::new();
    std::fs::remove_file(fixture.path("node_modules/phaser/build/phaser.min.js")).unwrap();

    let result = fixture
        .orchestrator(BuildMode::Production)
        .run(PipelineKind::FullBuild)
        .await;

    assert!(result.is_err());
    assert!(!fixture.exists("build/scripts/game.js"));
}

#[tokio::test]
async fn test_bundle_failure_is_soft_and_recovers() {
    let fixture = Fixture::new();
    fixture.write("src/index.js", "import { Player } from './player.js';\nconst = ;\n");

    let reload = Arc::new(CountingReload::default());
    let orchestrator = fixture
        .orchestrator(BuildMode::Development)
        .with_reloader(reload.clone());

    let broken = orchestrator.run(PipelineKind::WatchOnSource).await.unwrap();
    assert_eq!(broken.soft_failures(), 1);
    assert!(broken.step(BUNDLE).unwrap().is_soft_failure());
    assert_eq!(broken.step(RELOAD).unwrap().status, StepStatus::Completed);
    assert!(!fixture.exists("build/scripts/game.js"));

    fixture.write("src/index.js", ENTRY_SOURCE);

    let fixed = orchestrator.run(PipelineKind::WatchOnSource).await.unwrap();
    assert_eq!(fixed.soft_failures(), 0);
    assert!(fixture.read("build/scripts/game.js").contains("health points"));
    assert_eq!(reload.count(), 2);
}

#[tokio::test]
async fn test_unresolved_import_names_the_specifier() {
    let fixture = Fixture::new();
    fixture.write("src/index.js", "import { Enemy } from './enemy.js';\nnew Enemy();\n");

    let report = fixture
        .orchestrator(BuildMode::Development)
        .run(PipelineKind::FullBuild)
        .await
        .unwrap();

    match &report.step(BUNDLE).unwrap().status {
        StepStatus::SoftFailed(message) => assert!(message.contains("./enemy.js")),
        status => panic!("expected soft failure, got {:?}", status),
    }
}

#[tokio::test]
async fn test_watch_on_static_retains_artifacts() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator(BuildMode::Development);
    orchestrator.run(PipelineKind::FullBuild).await.unwrap();

    let bundle = fixture.read("build/scripts/game.js");
    fixture.write("static/assets/level.json", "{\"tiles\":[]}");
    fixture.write("static/index.html", "<html><body>v2</body></html>");

    let report = orchestrator.run(PipelineKind::WatchOnStatic).await.unwrap();

    assert_eq!(report.step_names(), vec![CLEAN, COPY_STATIC, COPY_VENDOR, RELOAD]);
    assert_eq!(fixture.read("build/scripts/game.js"), bundle);
    assert!(fixture.exists("build/assets/level.json"));
    assert!(fixture.read("build/index.html").contains("v2"));
}

#[tokio::test]
async fn test_static_removal_drops_asset_and_keeps_bundle() {
    let fixture = Fixture::new();
    let orchestrator = Arc::new(fixture.orchestrator(BuildMode::Development));
    orchestrator.run(PipelineKind::FullBuild).await.unwrap();

    std::fs::remove_file(fixture.path("static/assets/sprites/hero.png")).unwrap();

    let session = DevSession::new(orchestrator.clone(), Duration::from_millis(10));
    let rebuild = Rebuild::from_triggers(&[WatchTrigger::Static { removed: true }]).unwrap();
    let report = session.rebuild(rebuild).await.unwrap();

    assert_eq!(report.pipeline, PipelineKind::WatchOnSource.name());
    assert!(!fixture.exists("build/assets/sprites/hero.png"));
    assert!(fixture.exists("build/index.html"));
    assert!(fixture.exists("build/scripts/game.js"));
}

#[tokio::test]
async fn test_concurrent_runs_do_not_overlap() {
    let fixture = Fixture::new();
    let orchestrator = Arc::new(fixture.orchestrator(BuildMode::Development));

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(PipelineKind::FullBuild).await })
    };
    let second = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(PipelineKind::WatchOnStatic).await })
    };

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();

    let a_start = a.steps.first().unwrap().started_at;
    let a_end = a.steps.last().unwrap().finished_at;
    let b_start = b.steps.first().unwrap().started_at;
    let b_end = b.steps.last().unwrap().finished_at;

    assert!(a_end <= b_start || b_end <= a_start);
}

#[tokio::test]
async fn test_clean_removes_every_file() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator(BuildMode::Production);
    orchestrator.run(PipelineKind::FullBuild).await.unwrap();

    let removed = orchestrator.clean().await.unwrap();

    assert!(removed >= 4);
    assert!(!fixture.exists("build/index.html"));
    assert!(!fixture.exists("build/scripts/game.js"));
}
