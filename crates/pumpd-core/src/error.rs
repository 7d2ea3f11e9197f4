use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // -----------------------------------------------------------------------
    // Validation — bad input, no state change
    // -----------------------------------------------------------------------
    #[error("duration must be greater than 0 seconds")]
    NonPositiveDuration,

    #[error("please specify a positive number of minutes")]
    NonPositiveMinutes,

    #[error("cannot add more than {0} minutes at once")]
    ExtensionTooLarge(u64),

    #[error("cannot set time higher than {0} minutes")]
    SessionTooLarge(u64),

    #[error("note cannot exceed {0} characters")]
    NoteTooLong(usize),

    #[error("latch reason cannot exceed {0} characters")]
    ReasonTooLong(usize),

    #[error("incorrect secret")]
    WrongSecret,

    #[error("pump level must be between 0.0 and 1.0")]
    LevelOutOfRange,

    // -----------------------------------------------------------------------
    // Policy — the request is well-formed but not allowed right now
    // -----------------------------------------------------------------------
    #[error("pump is latched and cannot be turned on{}", .reason.as_deref().map(|r| format!(" (reason: {r})")).unwrap_or_default())]
    Latched { reason: Option<String> },

    #[error("no session time remaining")]
    NoSessionTime,

    #[error("no banked time available")]
    NoBankedTime,

    #[error("only the registered wearer can do that")]
    NotWearer,

    #[error("a {0} run is already active; stop it first")]
    RunActive(String),

    // -----------------------------------------------------------------------
    // Device — the actuator service could not be used
    // -----------------------------------------------------------------------
    #[error("actuator service is unreachable")]
    ServiceDown,

    #[error("request to actuator service timed out")]
    DeviceTimeout,

    #[error("failed to reach actuator service: {0}")]
    DeviceConnect(String),

    #[error("actuator service rejected the request: {0}")]
    DeviceRejected(String),

    #[error("actuator service error: {0}")]
    DeviceStatus(String),

    #[error("could not parse actuator response: {0:?}")]
    DeviceResponse(String),

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Coarse classification of an error, for adapters that map rejections to
/// transport-level codes without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    PolicyDenied,
    DeviceUnavailable,
    Persistence,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NonPositiveDuration
            | CoreError::NonPositiveMinutes
            | CoreError::ExtensionTooLarge(_)
            | CoreError::SessionTooLarge(_)
            | CoreError::NoteTooLong(_)
            | CoreError::ReasonTooLong(_)
            | CoreError::WrongSecret
            | CoreError::LevelOutOfRange
            | CoreError::DeviceRejected(_) => ErrorKind::Validation,

            CoreError::Latched { .. }
            | CoreError::NoSessionTime
            | CoreError::NoBankedTime
            | CoreError::NotWearer
            | CoreError::RunActive(_) => ErrorKind::PolicyDenied,

            CoreError::ServiceDown
            | CoreError::DeviceTimeout
            | CoreError::DeviceConnect(_)
            | CoreError::DeviceStatus(_)
            | CoreError::DeviceResponse(_) => ErrorKind::DeviceUnavailable,

            CoreError::Io(_) | CoreError::Json(_) | CoreError::Yaml(_) => ErrorKind::Persistence,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latched_message_includes_reason() {
        let err = CoreError::Latched {
            reason: Some("bad behavior".into()),
        };
        assert_eq!(
            err.to_string(),
            "pump is latched and cannot be turned on (reason: bad behavior)"
        );
    }

    #[test]
    fn latched_message_without_reason() {
        let err = CoreError::Latched { reason: None };
        assert_eq!(err.to_string(), "pump is latched and cannot be turned on");
    }

    #[test]
    fn kinds_partition_the_taxonomy() {
        assert_eq!(CoreError::WrongSecret.kind(), ErrorKind::Validation);
        assert_eq!(
            CoreError::Latched { reason: None }.kind(),
            ErrorKind::PolicyDenied
        );
        assert_eq!(CoreError::DeviceTimeout.kind(), ErrorKind::DeviceUnavailable);
        assert_eq!(
            CoreError::Io(std::io::Error::other("disk full")).kind(),
            ErrorKind::Persistence
        );
    }
}
