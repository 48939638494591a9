use thiserror::Error;

/// Errors raised by the numeric core when a caller breaks a precondition.
///
/// Short or noisy input never lands here; those paths degrade to documented
/// defaults instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HrvError {
    #[error("baseline not established; call update_baseline first")]
    BaselineNotEstablished,
    #[error("cannot create a baseline from empty history")]
    EmptyHistory,
    #[error("invalid fatigue range `{0}`")]
    InvalidFatigueRange(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, HrvError>;
