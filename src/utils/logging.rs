use crate::core::models::BuildMode;
use colored::*;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the global subscriber. `RUST_LOG` wins over the default filter.
    pub fn init(verbose: bool) {
        let default_filter = if verbose { "kiln=debug" } else { "kiln=info" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        // A second init (tests, embedding) keeps the first subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn build_mode(mode: BuildMode) {
        match mode {
            BuildMode::Production => info!("{}", "Running production build...".green()),
            BuildMode::Development => info!("{}", "Running development build...".yellow()),
        }
    }

    pub fn build_error(msg: &str) {
        error!("{}", format!("[Build Error] {}", msg).red());
    }

    pub fn pipeline_started(name: &str, steps: &[&str]) {
        info!("▶ {} ({})", name.bold(), steps.join(" → "));
    }

    pub fn pipeline_complete(name: &str, elapsed: Duration, soft_failures: usize) {
        if soft_failures == 0 {
            info!("✅ {} finished in {:.2?}", name, elapsed);
        } else {
            warn!(
                "⚠️  {} finished in {:.2?} with {} soft failure(s)",
                name, elapsed, soft_failures
            );
        }
    }

    pub fn step_started(name: &str) {
        debug!("  • {}", name);
    }

    pub fn step_finished(name: &str, elapsed: Duration) {
        debug!("  ✓ {} ({:.2?})", name, elapsed);
    }

    pub fn output_file(name: &str, size: usize) {
        let size_kb = size as f64 / 1024.0;
        let size_str = if size_kb < 1.0 {
            format!("{} B", size)
        } else {
            format!("{:.2} kB", size_kb)
        };
        info!("  {} {}", name.bright_cyan(), format!("({})", size_str).bright_black());
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
