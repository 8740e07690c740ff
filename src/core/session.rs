use crate::core::models::PipelineReport;
use crate::core::services::BuildOrchestrator;
use crate::infrastructure::watch::WatchTrigger;
use crate::utils::{Logger, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Pipelines a debounced batch of triggers resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebuild {
    /// Full build then reload; also refreshes static assets
    Source,
    /// Static assembly over the existing artifacts, then reload
    Static,
}

impl Rebuild {
    pub fn from_triggers(triggers: &[WatchTrigger]) -> Option<Self> {
        if triggers.is_empty() {
            return None;
        }
        // A removed asset only leaves the artifact store through a clean, and a
        // clean also drops the bundle, so removals take the full rebuild.
        let needs_full = triggers.iter().any(|t| {
            matches!(t, WatchTrigger::Source | WatchTrigger::Static { removed: true })
        });

        if needs_full {
            Some(Rebuild::Source)
        } else {
            Some(Rebuild::Static)
        }
    }
}

/// Long-running watch loop: turns file triggers into pipeline runs.
pub struct DevSession {
    orchestrator: Arc<BuildOrchestrator>,
    debounce: Duration,
}

impl DevSession {
    pub fn new(orchestrator: Arc<BuildOrchestrator>, debounce: Duration) -> Self {
        Self {
            orchestrator,
            debounce,
        }
    }

    /// Runs until the trigger channel closes. Pipeline failures are logged, never returned.
    pub async fn run(&self, mut triggers: UnboundedReceiver<WatchTrigger>) {
        while let Some(first) = triggers.recv().await {
            let batch = self.collect_batch(first, &mut triggers).await;

            if let Some(rebuild) = Rebuild::from_triggers(&batch) {
                if let Err(e) = self.rebuild(rebuild).await {
                    Logger::error(&format!("Rebuild failed: {}", e));
                }
            }
        }

        Logger::debug("Watch channel closed");
    }

    pub async fn rebuild(&self, rebuild: Rebuild) -> Result<PipelineReport> {
        Logger::info(&format!("🔄 Change detected, running {:?}", rebuild));

        let pipeline = match rebuild {
            Rebuild::Source => self.orchestrator.watch_on_source(),
            Rebuild::Static => self.orchestrator.watch_on_static(),
        };
        self.orchestrator.run_pipeline(pipeline).await
    }

    /// Gather every trigger that arrives until the channel is quiet for the debounce window.
    async fn collect_batch(
        &self,
        first: WatchTrigger,
        triggers: &mut UnboundedReceiver<WatchTrigger>,
    ) -> Vec<WatchTrigger> {
        let mut batch = vec![first];

        loop {
            match tokio::time::timeout(self.debounce, triggers.recv()).await {
                Ok(Some(trigger)) => {
                    if !batch.contains(&trigger) {
                        batch.push(trigger);
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }

        batch
    }
}
