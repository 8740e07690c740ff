use crate::core::{interfaces::PipelineStep, models::*};
use crate::utils::{KilnError, Logger, Result};
use std::sync::Arc;
use std::time::Instant;

/// Ordered list of steps. Each step is awaited to completion before the next one starts.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn then(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Append all steps of `other`, keeping this pipeline's name.
    pub fn chain(mut self, other: Pipeline) -> Self {
        self.steps.extend(other.steps);
        self
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn run(&self) -> Result<PipelineReport> {
        let start = Instant::now();
        Logger::pipeline_started(&self.name, &self.step_names());

        let mut reports = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            Logger::step_started(step.name());
            let started_at = Instant::now();

            let status = match step.run().await {
                Ok(()) => StepStatus::Completed,
                Err(e) => match step.policy() {
                    StepPolicy::Fatal => {
                        return Err(KilnError::Step {
                            step: step.name().to_string(),
                            source: Box::new(e),
                        });
                    }
                    StepPolicy::LogAndContinue => {
                        Logger::build_error(&e.format_detailed());
                        StepStatus::SoftFailed(e.to_string())
                    }
                },
            };

            let report = StepReport {
                name: step.name().to_string(),
                status,
                started_at,
                finished_at: Instant::now(),
            };
            Logger::step_finished(&report.name, report.duration());
            reports.push(report);
        }

        let report = PipelineReport {
            pipeline: self.name.clone(),
            steps: reports,
            duration: start.elapsed(),
        };
        Logger::pipeline_complete(&self.name, report.duration, report.soft_failures());

        Ok(report)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingStep {
        name: String,
        policy: StepPolicy,
        fail: bool,
        delay: Duration,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingStep {
        fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                policy: StepPolicy::Fatal,
                fail: false,
                delay: Duration::from_millis(5),
                log: log.clone(),
            }
        }

        fn failing(mut self, policy: StepPolicy) -> Self {
            self.fail = true;
            self.policy = policy;
            self
        }
    }

    #[async_trait]
    impl PipelineStep for RecordingStep {
        fn name(&self) -> &str {
            &self.name
        }

        fn policy(&self) -> StepPolicy {
            self.policy
        }

        async fn run(&self) -> Result<()> {
            self.log.lock().unwrap().push(format!("start:{}", self.name));
            tokio::time::sleep(self.delay).await;
            self.log.lock().unwrap().push(format!("end:{}", self.name));

            if self.fail {
                Err(KilnError::build(format!("{} exploded", self.name)))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_steps_run_strictly_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("ordered")
            .then(Arc::new(RecordingStep::new("a", &log)))
            .then(Arc::new(RecordingStep::new("b", &log)))
            .then(Arc::new(RecordingStep::new("c", &log)));

        let report = pipeline.run().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:a", "end:a", "start:b", "end:b", "start:c", "end:c"]
        );
        assert_eq!(report.step_names(), vec!["a", "b", "c"]);
        for pair in report.steps.windows(2) {
            assert!(pair[0].finished_at <= pair[1].started_at);
        }
    }

    #[tokio::test]
    async fn test_fatal_step_aborts_remaining_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("fatal")
            .then(Arc::new(RecordingStep::new("a", &log).failing(StepPolicy::Fatal)))
            .then(Arc::new(RecordingStep::new("b", &log)));

        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, KilnError::Step { ref step, .. } if step == "a"));
        assert!(!log.lock().unwrap().iter().any(|e| e.ends_with(":b")));
    }

    #[tokio::test]
    async fn test_soft_failure_continues_and_reports() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("soft")
            .then(Arc::new(RecordingStep::new("a", &log).failing(StepPolicy::LogAndContinue)))
            .then(Arc::new(RecordingStep::new("b", &log)));

        let report = pipeline.run().await.unwrap();

        assert_eq!(report.soft_failures(), 1);
        assert!(report.step("a").unwrap().is_soft_failure());
        assert_eq!(report.step("b").unwrap().status, StepStatus::Completed);
    }

    #[test]
    fn test_chain_keeps_order_and_name() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Pipeline::new("first").then(Arc::new(RecordingStep::new("a", &log)));
        let second = Pipeline::new("second").then(Arc::new(RecordingStep::new("b", &log)));

        let chained = first.chain(second);
        assert_eq!(chained.name(), "first");
        assert_eq!(chained.step_names(), vec!["a", "b"]);
        assert_eq!(chained.renamed("both").name(), "both");
    }
}
