use crate::ids::DeviceId;

/// Error taxonomy for the session hub.
///
/// Every variant is terminal for the operation that produced it: a duplicate
/// register is not retried, a missing device is not waited for. The caller
/// decides whether absence was expected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("device {0} is already registered")]
    AlreadyRegistered(DeviceId),
    #[error("device {0} not found")]
    NotFound(DeviceId),
    #[error("message was delivered to none of the {attempted} connected devices")]
    AllFailed { attempted: usize },
    #[error("{0:?} is not a valid device id")]
    InvalidDeviceId(String),
}

/// Outcome of a send call that did not fail.
///
/// `Cancelled` means the caller's own timeout fired before the target pump
/// took the message. Best-effort semantics treat that as a non-error: the
/// caller gave up, the hub did nothing wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Cancelled,
}

impl HubError {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered(_) => "already_registered",
            Self::NotFound(_) => "not_found",
            Self::AllFailed { .. } => "all_failed",
            Self::InvalidDeviceId(_) => "invalid_device_id",
        }
    }
}
