//! Actuators invoked per inference result by the Output Dispatcher.
//! Registered actuators (volume, cursor, ...) execute after every
//! inference result; an actuator exception is isolated to that actuator
//! and logged, never interrupting the pipeline. This deployment ships no
//! OS-level cursor/volume driver; `LoggingActuator` stands in for one and
//! `NullActuator` silences output entirely.

use crate::model::InferenceResult;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("actuator '{0}' failed: {1}")]
    Failed(String, String),
}

/// An actuator executes a side effect per inference result (move a
/// cursor, set a system volume, ...). Failures are isolated per-actuator
/// by the dispatcher and never interrupt or serialize the pipeline.
pub trait Actuator: Send + Sync {
    fn name(&self) -> &str;
    fn act(&self, result: &InferenceResult) -> Result<(), ActuatorError>;
}

/// Logs every inference result it receives at debug level. Used as the
/// default actuator for projects with no hardware binding.
pub struct LoggingActuator {
    name: String,
}

impl LoggingActuator {
    pub fn new(name: impl Into<String>) -> Self {
        LoggingActuator { name: name.into() }
    }
}

impl Actuator for LoggingActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn act(&self, result: &InferenceResult) -> Result<(), ActuatorError> {
        debug!(actuator = %self.name, gesture = ?result.gesture, "actuator invoked");
        Ok(())
    }
}

/// Discards every inference result. Used in tests and headless deployments.
pub struct NullActuator;

impl Actuator for NullActuator {
    fn name(&self) -> &str {
        "null"
    }

    fn act(&self, _result: &InferenceResult) -> Result<(), ActuatorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InferenceResult;

    #[test]
    fn logging_actuator_never_fails() {
        let actuator = LoggingActuator::new("cursor");
        assert!(actuator.act(&InferenceResult::none()).is_ok());
        assert_eq!(actuator.name(), "cursor");
    }

    #[test]
    fn null_actuator_discards_everything() {
        let actuator = NullActuator;
        assert!(actuator.act(&InferenceResult::none()).is_ok());
    }
}
