use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recovery::ErrorCategory;

/// A fault raised by one task attempt. Non-zero exit codes are not faults;
/// they travel as plain integers through `Task::run`.
#[derive(Error, Debug)]
pub enum TaskFault {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("exit requested with code {0}")]
    ExitRequested(i32),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl TaskFault {
    /// Short stable name used as the error kind in records and on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "Io",
            Self::Timeout(_) => "Timeout",
            Self::Network(_) => "Network",
            Self::InvalidInput(_) => "InvalidInput",
            Self::MissingDependency(_) => "MissingDependency",
            Self::ResourceExhausted(_) => "ResourceExhausted",
            Self::OutOfMemory => "OutOfMemory",
            Self::Interrupted(_) => "Interrupted",
            Self::ExitRequested(_) => "ExitRequested",
            Self::Panicked(_) => "Panicked",
            Self::Other(_) => "Other",
        }
    }

    /// Category inferred from the nature of the fault.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ErrorCategory::Permission
                }
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::NotConnected
                | std::io::ErrorKind::AddrInUse
                | std::io::ErrorKind::AddrNotAvailable
                | std::io::ErrorKind::BrokenPipe => ErrorCategory::Network,
                std::io::ErrorKind::TimedOut => ErrorCategory::Timeout,
                std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                    ErrorCategory::Validation
                }
                std::io::ErrorKind::OutOfMemory => ErrorCategory::Resource,
                _ => ErrorCategory::Unknown,
            },
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Network(_) => ErrorCategory::Network,
            Self::InvalidInput(_) => ErrorCategory::Validation,
            Self::MissingDependency(_) => ErrorCategory::Dependency,
            Self::ResourceExhausted(_) | Self::OutOfMemory => ErrorCategory::Resource,
            Self::Interrupted(_) | Self::ExitRequested(_) => ErrorCategory::System,
            Self::Panicked(_) | Self::Other(_) => ErrorCategory::Unknown,
        }
    }

    /// Unconditional abort signals are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::OutOfMemory | Self::Interrupted(_) | Self::ExitRequested(_) => false,
            Self::Io(e) => e.kind() != std::io::ErrorKind::OutOfMemory,
            _ => true,
        }
    }

    pub fn to_wire(&self) -> WireFault {
        let timeout_ms = match self {
            Self::Timeout(d) => Some(d.as_millis() as u64),
            _ => None,
        };
        let code = match self {
            Self::ExitRequested(code) => Some(*code),
            _ => None,
        };
        WireFault {
            kind: self.kind().to_string(),
            message: self.to_string(),
            timeout_ms,
            code,
        }
    }

    pub fn from_wire(wire: WireFault) -> Self {
        match wire.kind.as_str() {
            "Io" => Self::Io(std::io::Error::other(wire.message)),
            "Timeout" => Self::Timeout(Duration::from_millis(wire.timeout_ms.unwrap_or(0))),
            "Network" => Self::Network(wire.message),
            "InvalidInput" => Self::InvalidInput(wire.message),
            "MissingDependency" => Self::MissingDependency(wire.message),
            "ResourceExhausted" => Self::ResourceExhausted(wire.message),
            "OutOfMemory" => Self::OutOfMemory,
            "Interrupted" => Self::Interrupted(wire.message),
            "ExitRequested" => Self::ExitRequested(wire.code.unwrap_or(1)),
            "Panicked" => Self::Panicked(wire.message),
            _ => Self::Other(wire.message),
        }
    }

    /// Convert a panic payload caught at an unwind boundary.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

/// Serializable form of a fault, exchanged with isolated worker processes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireFault {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn io_faults_are_classified_by_kind() {
        assert_eq!(
            TaskFault::Io(Error::new(ErrorKind::PermissionDenied, "x")).category(),
            ErrorCategory::Permission
        );
        assert_eq!(
            TaskFault::Io(Error::new(ErrorKind::NotFound, "x")).category(),
            ErrorCategory::Permission
        );
        assert_eq!(
            TaskFault::Io(Error::new(ErrorKind::ConnectionRefused, "x")).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            TaskFault::Io(Error::new(ErrorKind::InvalidData, "x")).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            TaskFault::Io(Error::new(ErrorKind::Other, "x")).category(),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn abort_signals_are_not_recoverable() {
        assert!(!TaskFault::OutOfMemory.is_recoverable());
        assert!(!TaskFault::Interrupted("SIGINT".into()).is_recoverable());
        assert!(!TaskFault::ExitRequested(3).is_recoverable());
        assert!(TaskFault::Panicked("boom".into()).is_recoverable());
        assert!(TaskFault::Timeout(Duration::from_secs(1)).is_recoverable());
    }

    #[test]
    fn wire_form_keeps_classification() {
        let fault = TaskFault::Timeout(Duration::from_millis(1500));
        let back = TaskFault::from_wire(fault.to_wire());
        assert_eq!(back.kind(), "Timeout");
        assert_eq!(back.category(), ErrorCategory::Timeout);

        let exit = TaskFault::from_wire(TaskFault::ExitRequested(9).to_wire());
        assert!(matches!(exit, TaskFault::ExitRequested(9)));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let fault = TaskFault::from_panic(Box::new("bad index"));
        assert_eq!(fault.to_string(), "task panicked: bad index");
        let fault = TaskFault::from_panic(Box::new(String::from("owned")));
        assert_eq!(fault.kind(), "Panicked");
    }
}
