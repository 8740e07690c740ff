// Watch mode for kiln
// Two recursive subscriptions: JavaScript sources and static assets.

use crate::utils::{KilnError, Logger, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Configuration for watch mode
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub source_dir: PathBuf,
    pub static_dir: PathBuf,
    /// Extensions under `source_dir` that trigger a rebuild
    pub source_extensions: Vec<String>,
}

impl WatchConfig {
    pub fn new(source_dir: PathBuf, static_dir: PathBuf) -> Self {
        Self {
            source_dir,
            static_dir,
            source_extensions: vec!["js".to_string(), "mjs".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchTrigger {
    Source,
    /// `removed` is set when a static file disappeared
    Static { removed: bool },
}

/// Keeps the notify subscriptions alive; dropping it stops watching.
pub struct ProjectWatcher {
    _watcher: RecommendedWatcher,
}

impl ProjectWatcher {
    pub fn start(config: WatchConfig) -> Result<(Self, UnboundedReceiver<WatchTrigger>)> {
        let (tx, rx) = unbounded_channel();
        let classifier = TriggerClassifier::new(&config);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => forward(&classifier, &event, &tx),
                Err(e) => Logger::warn(&format!("Watch error: {}", e)),
            },
            notify::Config::default(),
        )
        .map_err(|e| KilnError::Watch(format!("Failed to create watcher: {}", e)))?;

        for path in [&config.source_dir, &config.static_dir] {
            if path.exists() {
                watcher.watch(path, RecursiveMode::Recursive).map_err(|e| {
                    KilnError::Watch(format!("Failed to watch {}: {}", path.display(), e))
                })?;
                Logger::info(&format!("👀 Watching {}", path.display()));
            } else {
                Logger::warn(&format!("Not watching missing directory {}", path.display()));
            }
        }

        Ok((
            Self { _watcher: watcher },
            rx,
        ))
    }
}

fn forward(classifier: &TriggerClassifier, event: &Event, tx: &UnboundedSender<WatchTrigger>) {
    for trigger in classifier.classify(event) {
        // The session may have ended; nothing left to notify.
        let _ = tx.send(trigger);
    }
}

/// Maps raw file system events onto pipeline triggers.
#[derive(Debug, Clone)]
pub struct TriggerClassifier {
    source_dir: PathBuf,
    static_dir: PathBuf,
    source_extensions: Vec<String>,
}

impl TriggerClassifier {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            source_dir: canonical(&config.source_dir),
            static_dir: canonical(&config.static_dir),
            source_extensions: config.source_extensions.clone(),
        }
    }

    pub fn classify(&self, event: &Event) -> Vec<WatchTrigger> {
        let removed = match event.kind {
            // Ignore metadata-only changes
            EventKind::Access(_) | EventKind::Other | EventKind::Any => return Vec::new(),
            EventKind::Remove(_) => true,
            _ => false,
        };

        let mut triggers = Vec::new();
        for path in &event.paths {
            if is_temporary(path) {
                continue;
            }

            let trigger = if path.starts_with(&self.source_dir) {
                self.is_source_file(path).then_some(WatchTrigger::Source)
            } else if path.starts_with(&self.static_dir) {
                Some(WatchTrigger::Static { removed })
            } else {
                None
            };

            if let Some(trigger) = trigger {
                if !triggers.contains(&trigger) {
                    triggers.push(trigger);
                }
            }
        }

        triggers
    }

    fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| self.source_extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

/// Editor swap and backup files
fn is_temporary(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    path_str.ends_with('~') || path_str.ends_with(".swp") || path_str.ends_with(".tmp")
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
