use async_trait::async_trait;
use kiln::core::{interfaces::*, models::*, services::BuildOrchestrator};
use kiln::infrastructure::{OxcBundler, TokioFileSystemService};
use kiln::utils::Result;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const ENTRY_SOURCE: &str = r#"import { Player } from './player.js';

const player = new Player('hero');
console.log(player.describe());
"#;

pub const PLAYER_SOURCE: &str = r#"export class Player {
  constructor(name) {
    this.name = name;
    this.health = 100;
  }

  describe() {
    return `${this.name} has ${this.health} health points`;
  }
}
"#;

/// A throwaway game project: sources, static assets and a fake engine build.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Self { dir };

        fixture.write("src/index.js", ENTRY_SOURCE);
        fixture.write("src/player.js", PLAYER_SOURCE);
        fixture.write("static/index.html", "<html><body><script src=\"scripts/game.js\"></script></body></html>");
        fixture.write("static/assets/sprites/hero.png", "not really a png");
        fixture.write("node_modules/phaser/build/phaser.min.js", "var Phaser={};");
        fixture.write("node_modules/phaser/build/phaser.js", "var Phaser = {};\n");
        fixture.write("node_modules/phaser/build/phaser.map", "{\"version\":3}");

        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> std::path::PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(self.root())
    }

    pub fn orchestrator(&self, mode: BuildMode) -> BuildOrchestrator {
        let layout = self.layout();
        let bundler = OxcBundler::new(&layout.root, &layout.target)
            .unwrap()
            .with_search_path(&layout.source_dir);

        BuildOrchestrator::new(layout, mode, Arc::new(TokioFileSystemService), Arc::new(bundler))
    }

    pub fn scripts(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.path("build/scripts"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

#[derive(Default)]
pub struct CountingReload {
    count: AtomicUsize,
}

impl CountingReload {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReloadSignal for CountingReload {
    async fn reload(&self) -> Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
