//! One-time engine capability enablement (the VRM add-on).
//!
//! The enable step is attempted at most once per process. Its outcome is
//! recorded but never fails a request.

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::engine::EngineRunner;

/// Outcome of the enable attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum CapabilityStatus {
    /// Not attempted yet.
    Pending,
    /// Turned off in configuration.
    Disabled,
    /// The enable script succeeded.
    Enabled,
    /// The attempt failed; conversions still proceed.
    Failed(String),
}

/// Process-scoped enable-once state.
#[derive(Debug, Default)]
pub struct EngineCapability {
    enabled_in_config: bool,
    outcome: OnceCell<CapabilityStatus>,
}

impl EngineCapability {
    /// Create the state. When `enabled_in_config` is false the enable
    /// script never runs.
    pub fn new(enabled_in_config: bool) -> Self {
        Self {
            enabled_in_config,
            outcome: OnceCell::new(),
        }
    }

    /// Current status without triggering an attempt.
    pub fn status(&self) -> CapabilityStatus {
        match self.outcome.get() {
            Some(status) => status.clone(),
            None if !self.enabled_in_config => CapabilityStatus::Disabled,
            None => CapabilityStatus::Pending,
        }
    }

    /// Run the enable step if it has not been attempted. Concurrent callers
    /// wait for the single attempt and share its outcome.
    pub async fn ensure(&self, runner: &dyn EngineRunner) -> CapabilityStatus {
        if !self.enabled_in_config {
            return CapabilityStatus::Disabled;
        }

        self.outcome
            .get_or_init(|| async {
                match runner.enable_capability().await {
                    Ok(result) if result.succeeded => {
                        info!(elapsed_ms = result.duration_ms, "VRM add-on enabled");
                        CapabilityStatus::Enabled
                    }
                    Ok(result) => {
                        let reason = result
                            .failure_reason
                            .unwrap_or_else(|| "enable script failed".to_string());
                        warn!(reason = %reason, "VRM add-on enable failed, continuing");
                        CapabilityStatus::Failed(reason)
                    }
                    Err(e) => {
                        warn!(error = %e, "VRM add-on enable could not run, continuing");
                        CapabilityStatus::Failed(e.to_string())
                    }
                }
            })
            .await
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use crate::models::{ConversionJob, EngineExit, EngineResult};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRunner {
        calls: AtomicUsize,
        succeed: bool,
    }

    #[async_trait]
    impl EngineRunner for CountingRunner {
        async fn run(&self, _job: &ConversionJob) -> Result<EngineResult, ConversionError> {
            unreachable!("conversion is not exercised here")
        }

        async fn enable_capability(&self) -> Result<EngineResult, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let code = if self.succeed { 0 } else { 1 };
            Ok(EngineResult {
                succeeded: self.succeed,
                exit: EngineExit::Code(code),
                stdout: String::new(),
                stderr: String::new(),
                failure_reason: (!self.succeed).then(|| "engine exited with code 1".to_string()),
                duration_ms: 20,
            })
        }
    }

    #[tokio::test]
    async fn test_attempted_once_under_concurrency() {
        let runner = Arc::new(CountingRunner {
            calls: AtomicUsize::new(0),
            succeed: true,
        });
        let capability = Arc::new(EngineCapability::new(true));
        assert_eq!(capability.status(), CapabilityStatus::Pending);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let runner = Arc::clone(&runner);
            let capability = Arc::clone(&capability);
            handles.push(tokio::spawn(async move {
                capability.ensure(runner.as_ref()).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.expect("join"), CapabilityStatus::Enabled);
        }

        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(capability.status(), CapabilityStatus::Enabled);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_not_retried() {
        let runner = CountingRunner {
            calls: AtomicUsize::new(0),
            succeed: false,
        };
        let capability = EngineCapability::new(true);

        let first = capability.ensure(&runner).await;
        let second = capability.ensure(&runner).await;
        assert!(matches!(first, CapabilityStatus::Failed(_)));
        assert_eq!(first, second);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_never_runs() {
        let runner = CountingRunner {
            calls: AtomicUsize::new(0),
            succeed: true,
        };
        let capability = EngineCapability::new(false);
        assert_eq!(capability.ensure(&runner).await, CapabilityStatus::Disabled);
        assert_eq!(capability.status(), CapabilityStatus::Disabled);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }
}
