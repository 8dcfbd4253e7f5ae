//! Fault injection for the mock frame source.
//!
//! Enables configurable failures of individual source operations
//! (`acquire`, `register`, `start`, `fetch`, `release`, `abort`) for resilience
//! testing. Failures surface as [`SourceError`]s with the matching kind.

use super::rng::MockRng;
use capture_core::error::{SourceError, SourceErrorKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Fault injection configuration for the mock source
#[derive(Clone, Debug)]
pub struct FaultConfig {
    /// Per-operation failure rate (0.0 to 1.0), `"*"` applies to all
    failure_rates: Arc<HashMap<&'static str, f64>>,
    /// Specific failure scenarios
    scenarios: Arc<Vec<FaultScenario>>,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// State tracking for scenarios
    state: Arc<Mutex<FaultState>>,
}

/// A deterministic failure pattern.
#[derive(Debug, Clone)]
pub enum FaultScenario {
    /// Every call after the first `count` fails.
    FailAfterN {
        /// Operation name.
        operation: &'static str,
        /// Calls that succeed first.
        count: u32,
    },
    /// Only the `n`-th call (1-based) fails.
    FailNth {
        /// Operation name.
        operation: &'static str,
        /// Failing call number.
        n: u32,
    },
    /// The link drops on the first call; everything fails afterwards.
    CommunicationLoss,
    /// The device latches a hardware fault on the first call.
    HardwareFault {
        /// Fault code reported in the message.
        code: u32,
    },
}

#[derive(Default, Debug)]
struct FaultState {
    /// Calls seen per operation
    operation_counts: HashMap<&'static str, u32>,
    /// Whether communication is lost
    communication_lost: bool,
    /// Hardware fault code (0 = no fault)
    hardware_fault_code: u32,
}

impl FaultConfig {
    /// No faults (default)
    pub fn none() -> Self {
        Self::scenarios(Vec::new())
    }

    /// Uniform random failures on every operation, reproducible with `seed`
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::with_rates_seeded(rates, seed)
    }

    /// Custom failure rates per operation
    pub fn with_rates_seeded(rates: HashMap<&'static str, f64>, seed: Option<u64>) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(Vec::new()),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(FaultState::default())),
        }
    }

    /// A single scenario
    pub fn scenario(scenario: FaultScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios, checked in order
    pub fn scenarios(scenarios: Vec<FaultScenario>) -> Self {
        Self {
            failure_rates: Arc::new(HashMap::new()),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(None)),
            state: Arc::new(Mutex::new(FaultState::default())),
        }
    }

    /// Check whether `operation` should fail now.
    pub fn check_operation(&self, source_type: &str, operation: &'static str) -> Result<(), SourceError> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(SourceError::new(
                source_type,
                SourceErrorKind::Communication,
                "Communication lost",
            ));
        }
        if state.hardware_fault_code != 0 {
            return Err(SourceError::new(
                source_type,
                SourceErrorKind::Hardware,
                format!("Hardware fault: {}", state.hardware_fault_code),
            ));
        }

        let call = {
            let count = state.operation_counts.entry(operation).or_insert(0);
            *count += 1;
            *count
        };

        for scenario in self.scenarios.iter() {
            match scenario {
                FaultScenario::FailAfterN { operation: op, count } if *op == operation => {
                    if call > *count {
                        return Err(SourceError::new(
                            source_type,
                            SourceErrorKind::Hardware,
                            format!("Injected '{}' failure after {} calls", operation, count),
                        ));
                    }
                }
                FaultScenario::FailNth { operation: op, n } if *op == operation => {
                    if call == *n {
                        return Err(SourceError::new(
                            source_type,
                            SourceErrorKind::Hardware,
                            format!("Injected '{}' failure on call {}", operation, n),
                        ));
                    }
                }
                FaultScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(SourceError::new(
                        source_type,
                        SourceErrorKind::Communication,
                        "Communication lost",
                    ));
                }
                FaultScenario::HardwareFault { code } => {
                    state.hardware_fault_code = *code;
                    return Err(SourceError::new(
                        source_type,
                        SourceErrorKind::Hardware,
                        format!("Hardware fault: {}", code),
                    ));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);

        if self.rng.should_fail(rate) {
            return Err(SourceError::new(
                source_type,
                SourceErrorKind::Hardware,
                format!("Random failure on operation '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Reset counters and latched faults
    pub fn reset(&self) {
        *self.state.lock() = FaultState::default();
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_faults() {
        let config = FaultConfig::none();
        for _ in 0..100 {
            assert!(config.check_operation("mock", "fetch").is_ok());
        }
    }

    #[test]
    fn test_random_failures() {
        let config = FaultConfig::random_failures_seeded(0.5, Some(42));
        let failures = (0..1000)
            .filter(|_| config.check_operation("mock", "fetch").is_err())
            .count();
        assert!(failures > 400 && failures < 600, "Got {} failures", failures);
    }

    #[test]
    fn test_fail_after_n() {
        let config = FaultConfig::scenario(FaultScenario::FailAfterN {
            operation: "release",
            count: 3,
        });
        for i in 0..3 {
            assert!(config.check_operation("mock", "release").is_ok(), "call {}", i + 1);
        }
        assert!(config.check_operation("mock", "release").is_err());
        assert!(config.check_operation("mock", "fetch").is_ok(), "other operations unaffected");
    }

    #[test]
    fn test_fail_nth_only_once() {
        let config = FaultConfig::scenario(FaultScenario::FailNth {
            operation: "fetch",
            n: 2,
        });
        assert!(config.check_operation("mock", "fetch").is_ok());
        let err = config.check_operation("mock", "fetch").unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Hardware);
        assert!(config.check_operation("mock", "fetch").is_ok());
    }

    #[test]
    fn test_communication_loss_latches() {
        let config = FaultConfig::scenario(FaultScenario::CommunicationLoss);
        let err = config.check_operation("mock", "start").unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Communication);
        assert!(config.check_operation("mock", "abort").is_err());
    }

    #[test]
    fn test_hardware_fault_code_in_message() {
        let config = FaultConfig::scenario(FaultScenario::HardwareFault { code: 0x42 });
        let err = config.check_operation("mock", "fetch").unwrap_err();
        assert!(err.message.contains("66"));
    }

    #[test]
    fn test_reset() {
        let config = FaultConfig::scenario(FaultScenario::FailAfterN {
            operation: "fetch",
            count: 1,
        });
        assert!(config.check_operation("mock", "fetch").is_ok());
        assert!(config.check_operation("mock", "fetch").is_err());
        config.reset();
        assert!(config.check_operation("mock", "fetch").is_ok());
    }
}
