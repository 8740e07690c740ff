use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const BUILD_DIR: &str = "build";
pub const SCRIPTS_DIR: &str = "scripts";
pub const SOURCE_DIR: &str = "src";
pub const STATIC_DIR: &str = "static";
pub const ENTRY_FILE: &str = "index.js";
pub const OUTPUT_FILE: &str = "game.js";
pub const SOURCE_MAP_SUFFIX: &str = ".map";
pub const VENDOR_DIR: &str = "node_modules/phaser/build";
pub const VENDOR_MINIFIED: &str = "phaser.min.js";
pub const VENDOR_FULL: &str = "phaser.js";
pub const VENDOR_SOURCE_MAP: &str = "phaser.map";
pub const DEFAULT_TARGET: &str = "es2015";

/// Selected once per process, before any pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

impl BuildMode {
    pub fn from_production_flag(production: bool) -> Self {
        if production {
            BuildMode::Production
        } else {
            BuildMode::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, BuildMode::Production)
    }

    /// Development builds ship an external source map next to the bundle
    pub fn emits_source_map(&self) -> bool {
        !self.is_production()
    }

    pub fn minifies(&self) -> bool {
        self.is_production()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Development => "development",
            BuildMode::Production => "production",
        }
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prebuilt engine files copied into the scripts directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorFiles {
    pub minified: String,
    pub full: String,
    pub source_map: String,
}

impl Default for VendorFiles {
    fn default() -> Self {
        Self {
            minified: VENDOR_MINIFIED.to_string(),
            full: VENDOR_FULL.to_string(),
            source_map: VENDOR_SOURCE_MAP.to_string(),
        }
    }
}

impl VendorFiles {
    /// Production ships only the minified library.
    pub fn for_mode(&self, mode: BuildMode) -> Vec<&str> {
        let mut files = vec![self.minified.as_str()];
        if !mode.is_production() {
            files.push(self.source_map.as_str());
            files.push(self.full.as_str());
        }
        files
    }
}

/// Every path the pipeline reads from or writes to, resolved against the project root.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub build_dir: PathBuf,
    pub static_dir: PathBuf,
    pub source_dir: PathBuf,
    pub entry_file: PathBuf,
    pub vendor_dir: PathBuf,
    pub vendor_files: VendorFiles,
    pub output_file: String,
    pub target: String,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let source_dir = root.join(SOURCE_DIR);

        Self {
            build_dir: root.join(BUILD_DIR),
            static_dir: root.join(STATIC_DIR),
            entry_file: source_dir.join(ENTRY_FILE),
            source_dir,
            vendor_dir: root.join(VENDOR_DIR),
            vendor_files: VendorFiles::default(),
            output_file: OUTPUT_FILE.to_string(),
            target: DEFAULT_TARGET.to_string(),
            root,
        }
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.build_dir.join(SCRIPTS_DIR)
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.scripts_dir().join(&self.output_file)
    }

    pub fn source_map_file_name(&self) -> String {
        format!("{}{}", self.output_file, SOURCE_MAP_SUFFIX)
    }

    pub fn source_map_path(&self) -> PathBuf {
        self.scripts_dir().join(self.source_map_file_name())
    }

    pub fn vendor_sources(&self, mode: BuildMode) -> Vec<PathBuf> {
        self.vendor_files
            .for_mode(mode)
            .into_iter()
            .map(|name| self.vendor_dir.join(name))
            .collect()
    }

    /// Path shown in logs and source maps
    pub fn display_path<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

/// Bundle output with optional source map
#[derive(Debug, Clone)]
pub struct BundleOutput {
    pub code: String,
    pub source_map: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: PathBuf,
    pub size: usize,
}

/// What the orchestrator does when a step returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Abort the run and return the error
    Fatal,
    /// Log the error and carry on with the next step
    LogAndContinue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    SoftFailed(String),
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub name: String,
    pub status: StepStatus,
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl StepReport {
    pub fn duration(&self) -> Duration {
        self.finished_at.duration_since(self.started_at)
    }

    pub fn is_soft_failure(&self) -> bool {
        matches!(self.status, StepStatus::SoftFailed(_))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub pipeline: String,
    pub steps: Vec<StepReport>,
    pub duration: Duration,
}

impl PipelineReport {
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn soft_failures(&self) -> usize {
        self.steps.iter().filter(|s| s.is_soft_failure()).count()
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// The named pipelines exposed as tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    StaticAssembly,
    FullBuild,
    WatchOnSource,
    WatchOnStatic,
}

impl PipelineKind {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineKind::StaticAssembly => "static-assembly",
            PipelineKind::FullBuild => "full-build",
            PipelineKind::WatchOnSource => "watch-on-source",
            PipelineKind::WatchOnStatic => "watch-on-static",
        }
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
