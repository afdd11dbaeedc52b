use ci_deploy_core::job::JobOutcome;
use ci_deploy_core::log;
use serde_json::json;

/// Result reporting back to the pipeline that invoked a stage.
pub trait JobReporter {
    /// Marks the job successful. With a continuation token the pipeline
    /// re-invokes the stage instead of moving on.
    fn put_job_success(&self, job_id: &str, continuation_token: Option<&str>)
        -> Result<(), String>;

    fn put_job_failure(&self, job_id: &str, message: &str) -> Result<(), String>;
}

pub fn report_outcome(
    reporter: &impl JobReporter,
    component: &str,
    job_id: &str,
    outcome: &JobOutcome,
) -> Result<(), String> {
    let details = json!({
        "job_id": job_id,
        "outcome": outcome.kind(),
        "message": outcome.message(),
    });
    match outcome {
        JobOutcome::Succeeded { .. } => {
            log::info(component, "putting_job_success", details);
            reporter.put_job_success(job_id, None)
        }
        JobOutcome::Continue {
            continuation_token, ..
        } => {
            log::info(component, "putting_job_continuation", details);
            reporter.put_job_success(job_id, Some(continuation_token))
        }
        JobOutcome::Failed { message } => {
            log::error(component, "putting_job_failure", details);
            reporter.put_job_failure(job_id, message)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::JobReporter;

    #[derive(Default)]
    pub struct RecordingReporter {
        reports: Mutex<Vec<String>>,
    }

    impl RecordingReporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reports(&self) -> Vec<String> {
            self.reports.lock().expect("poisoned mutex").clone()
        }
    }

    impl JobReporter for RecordingReporter {
        fn put_job_success(
            &self,
            job_id: &str,
            continuation_token: Option<&str>,
        ) -> Result<(), String> {
            let report = match continuation_token {
                Some(token) => format!("continue:{job_id}:{token}"),
                None => format!("success:{job_id}"),
            };
            self.reports.lock().expect("poisoned mutex").push(report);
            Ok(())
        }

        fn put_job_failure(&self, job_id: &str, message: &str) -> Result<(), String> {
            self.reports
                .lock()
                .expect("poisoned mutex")
                .push(format!("failure:{job_id}:{message}"));
            Ok(())
        }
    }
}
