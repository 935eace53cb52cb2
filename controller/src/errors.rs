use thiserror::Error;

/// Typed errors the core surfaces: the Metric Translator and HPA Synthesizer
/// return `InvalidMetricConfig` upward and stop at the offending Stack; the
/// reconcile loop classifies client-layer failures as `TransientApiError` and
/// requeues; normalization failures are `InvariantViolation` and abort the
/// whole reconcile without partial writes.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid metric config: {0}")]
    InvalidMetricConfig(String),

    #[error("transient api error: {0}")]
    TransientApiError(#[from] anyhow::Error),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("prescaling timed out: {0}")]
    PrescalingTimeout(String),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
