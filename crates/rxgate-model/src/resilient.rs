use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use rxgate_core::domain::{FeedbackRecord, PatientInput, Prescription};
use rxgate_core::errors::ModelError;
use rxgate_core::provider::PredictionProvider;

/// Wraps a provider with a per-call deadline so a stalled inference can
/// never hang a session.
///
/// - An elapsed `generate` degrades to the sentinel prescription.
/// - An elapsed `update_with_feedback` is reported as `ModelError::Timeout`.
pub struct ResilientProvider<P> {
    inner: P,
    deadline: Duration,
    consecutive_failures: AtomicU32,
}

impl<P: PredictionProvider> ResilientProvider<P> {
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

    pub fn new(inner: P, deadline: Duration) -> Self {
        Self {
            inner,
            deadline,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn with_defaults(inner: P) -> Self {
        Self::new(inner, Self::DEFAULT_DEADLINE)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl<P: PredictionProvider> PredictionProvider for ResilientProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn current_version(&self) -> String {
        self.inner.current_version()
    }

    async fn generate(&self, input: &PatientInput) -> Prescription {
        match tokio::time::timeout(self.deadline, self.inner.generate(input)).await {
            Ok(rx) => {
                self.record_success();
                rx
            }
            Err(_) => {
                let failures = self.record_failure();
                warn!(
                    provider = self.inner.name(),
                    deadline_secs = self.deadline.as_secs(),
                    failures,
                    "generation deadline elapsed, degrading"
                );
                Prescription::generation_failed(self.inner.current_version())
            }
        }
    }

    async fn update_with_feedback(&self, records: &[FeedbackRecord]) -> Result<String, ModelError> {
        match tokio::time::timeout(self.deadline, self.inner.update_with_feedback(records)).await {
            Ok(result) => {
                if result.is_ok() {
                    self.record_success();
                } else {
                    self.record_failure();
                }
                result
            }
            Err(_) => {
                self.record_failure();
                Err(ModelError::Timeout(self.deadline))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test double that sleeps before answering.
    struct SlowProvider {
        delay: Duration,
    }

    #[async_trait]
    impl PredictionProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        fn current_version(&self) -> String {
            "1.0.0".to_string()
        }

        async fn generate(&self, _input: &PatientInput) -> Prescription {
            tokio::time::sleep(self.delay).await;
            Prescription::new(vec!["Ibuprofen".into()], 0.8, self.current_version())
        }

        async fn update_with_feedback(
            &self,
            _records: &[FeedbackRecord],
        ) -> Result<String, ModelError> {
            tokio::time::sleep(self.delay).await;
            Ok("1.0.1".to_string())
        }
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let provider = ResilientProvider::new(
            SlowProvider { delay: Duration::from_millis(5) },
            Duration::from_secs(1),
        );
        let input = PatientInput::new("headache", 45, "female", "");
        let rx = provider.generate(&input).await;
        assert_eq!(rx.medications, vec!["Ibuprofen".to_string()]);
        assert_eq!(provider.consecutive_failures(), 0);

        let v = provider.update_with_feedback(&[]).await.unwrap();
        assert_eq!(v, "1.0.1");
    }

    #[tokio::test]
    async fn slow_generate_degrades_to_sentinel() {
        let provider = ResilientProvider::new(
            SlowProvider { delay: Duration::from_secs(60) },
            Duration::from_millis(20),
        );
        let input = PatientInput::new("headache", 45, "female", "");
        let rx = provider.generate(&input).await;
        assert_eq!(rx.confidence, 0.0);
        assert!(!rx.medications.is_empty());
        assert_eq!(provider.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn slow_update_times_out() {
        let provider = ResilientProvider::new(
            SlowProvider { delay: Duration::from_secs(60) },
            Duration::from_millis(20),
        );
        let result = provider.update_with_feedback(&[]).await;
        assert!(matches!(result, Err(ModelError::Timeout(_))));
    }

    #[tokio::test]
    async fn success_resets_failure_counter() {
        let provider = ResilientProvider::new(
            SlowProvider { delay: Duration::from_millis(5) },
            Duration::from_millis(1),
        );
        let input = PatientInput::new("headache", 45, "female", "");

        // Deadline shorter than the delay: failure
        let _ = provider.generate(&input).await;
        assert_eq!(provider.consecutive_failures(), 1);

        // Widen the window by rebuilding with a generous deadline
        let provider = ResilientProvider::new(
            SlowProvider { delay: Duration::from_millis(1) },
            Duration::from_secs(1),
        );
        let _ = provider.generate(&input).await;
        assert_eq!(provider.consecutive_failures(), 0);
    }
}
