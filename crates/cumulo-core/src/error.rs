// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the control plane.
//!
//! Provides a unified error type that maps to RPC error responses, plus the
//! accumulated project-error log that surfaces declaration conflicts to the
//! developer without tearing anything down.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use cumulo_protocol::messages::RpcError;
use tracing::warn;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during registration, routing, and queue
/// processing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// The first message on a worker stream was not a registration request.
    ProtocolViolation {
        /// What the stream actually carried.
        reason: String,
    },

    /// Two workers from different services registered the same API route.
    RouteConflict {
        /// The API the route belongs to.
        api: String,
        /// The conflicting path.
        path: String,
        /// The overlapping methods.
        methods: Vec<String>,
        /// Service that already owns the route.
        existing_service: String,
        /// Service whose registration was rejected.
        service: String,
    },

    /// Two different services registered the same schedule name.
    ScheduleConflict {
        /// The schedule name.
        schedule: String,
        /// Service that already owns the schedule.
        existing_service: String,
        /// Service whose registration was rejected.
        service: String,
    },

    /// A schedule cadence could not be compiled.
    InvalidCadence {
        /// The schedule name.
        schedule: String,
        /// The cadence as registered.
        cadence: String,
        /// Why it failed to compile.
        reason: String,
    },

    /// Dequeue depth outside the allowed 1..=10 range.
    InvalidDepth {
        /// The requested depth.
        depth: u32,
    },

    /// No queued message carries the supplied lease id.
    LeaseNotFound {
        /// The queue name.
        queue: String,
        /// The unknown lease id.
        lease_id: String,
    },

    /// The lease expired before Complete; the message is already eligible
    /// for redelivery.
    LeaseExpired {
        /// The queue name.
        queue: String,
        /// The expired lease id.
        lease_id: String,
    },

    /// A statically mapped port could not be bound.
    PortInUse {
        /// The resource the port was mapped for.
        name: String,
        /// The mapped port.
        port: u16,
    },

    /// An ephemeral listener could not be started.
    ListenerBindFailed {
        /// The resource the listener was for.
        name: String,
        /// Bind failure detail.
        reason: String,
    },

    /// Dispatching a trigger to a worker failed.
    DispatchFailed {
        /// The resource being dispatched to.
        target: String,
        /// Failure detail.
        reason: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },
}

impl CoreError {
    /// Convert this error to an RpcError for protocol responses.
    pub fn to_rpc_error(&self) -> RpcError {
        RpcError {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ProtocolViolation { .. } => "PROTOCOL_VIOLATION",
            Self::RouteConflict { .. } => "ROUTE_CONFLICT",
            Self::ScheduleConflict { .. } => "SCHEDULE_CONFLICT",
            Self::InvalidCadence { .. } => "INVALID_CADENCE",
            Self::InvalidDepth { .. } => "INVALID_DEPTH",
            Self::LeaseNotFound { .. } => "LEASE_NOT_FOUND",
            Self::LeaseExpired { .. } => "LEASE_EXPIRED",
            Self::PortInUse { .. } => "PORT_IN_USE",
            Self::ListenerBindFailed { .. } => "LISTENER_BIND_FAILED",
            Self::DispatchFailed { .. } => "DISPATCH_FAILED",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolViolation { reason } => {
                write!(f, "first request must be a registration request: {}", reason)
            }
            Self::RouteConflict {
                api,
                path,
                methods,
                existing_service,
                service,
            } => {
                write!(
                    f,
                    "API '{}' already has a route for {} '{}' (registered by '{}', rejected for '{}')",
                    api,
                    methods.join("|"),
                    path,
                    existing_service,
                    service
                )
            }
            Self::ScheduleConflict {
                schedule,
                existing_service,
                service,
            } => {
                write!(
                    f,
                    "schedule '{}' is already registered by service '{}'; rejected for '{}'",
                    schedule, existing_service, service
                )
            }
            Self::InvalidCadence {
                schedule,
                cadence,
                reason,
            } => {
                write!(
                    f,
                    "schedule '{}' has invalid cadence '{}': {}",
                    schedule, cadence, reason
                )
            }
            Self::InvalidDepth { depth } => {
                write!(f, "dequeue depth must be between 1 and 10, got {}", depth)
            }
            Self::LeaseNotFound { queue, lease_id } => {
                write!(f, "lease '{}' not found in queue '{}'", lease_id, queue)
            }
            Self::LeaseExpired { queue, lease_id } => {
                write!(
                    f,
                    "lease '{}' in queue '{}' expired; the message is eligible for redelivery",
                    lease_id, queue
                )
            }
            Self::PortInUse { name, port } => {
                write!(f, "mapped port {} for '{}' is already in use", port, name)
            }
            Self::ListenerBindFailed { name, reason } => {
                write!(f, "failed to bind a listener for '{}': {}", name, reason)
            }
            Self::DispatchFailed { target, reason } => {
                write!(f, "dispatch to '{}' failed: {}", target, reason)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for CoreError {}

/// A timestamped entry in the project-error log.
#[derive(Debug, Clone)]
pub struct ProjectError {
    /// When the error was recorded.
    pub occurred_at: DateTime<Utc>,
    /// The error itself.
    pub error: CoreError,
}

/// Accumulated developer-facing errors.
///
/// Declaration conflicts and per-resource startup failures land here instead
/// of tearing down the offending stream or the process; the log is listed on
/// demand and each entry is logged at warn when recorded.
#[derive(Debug, Default)]
pub struct ProjectErrors {
    entries: Mutex<Vec<ProjectError>>,
}

impl ProjectErrors {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error.
    pub fn record(&self, error: CoreError) {
        warn!(code = error.error_code(), "project error: {}", error);
        let mut entries = self.entries.lock().expect("project error lock poisoned");
        entries.push(ProjectError {
            occurred_at: Utc::now(),
            error,
        });
    }

    /// List all recorded errors (defensive copy).
    pub fn list(&self) -> Vec<ProjectError> {
        self.entries
            .lock()
            .expect("project error lock poisoned")
            .clone()
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("project error lock poisoned")
            .len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let cases: Vec<(CoreError, &str)> = vec![
            (
                CoreError::ProtocolViolation {
                    reason: "got a queue op".to_string(),
                },
                "PROTOCOL_VIOLATION",
            ),
            (
                CoreError::RouteConflict {
                    api: "public".to_string(),
                    path: "/users".to_string(),
                    methods: vec!["GET".to_string()],
                    existing_service: "a".to_string(),
                    service: "b".to_string(),
                },
                "ROUTE_CONFLICT",
            ),
            (
                CoreError::ScheduleConflict {
                    schedule: "daily".to_string(),
                    existing_service: "a".to_string(),
                    service: "b".to_string(),
                },
                "SCHEDULE_CONFLICT",
            ),
            (CoreError::InvalidDepth { depth: 0 }, "INVALID_DEPTH"),
            (
                CoreError::LeaseNotFound {
                    queue: "q".to_string(),
                    lease_id: "x".to_string(),
                },
                "LEASE_NOT_FOUND",
            ),
            (
                CoreError::LeaseExpired {
                    queue: "q".to_string(),
                    lease_id: "x".to_string(),
                },
                "LEASE_EXPIRED",
            ),
        ];

        for (error, expected_code) in cases {
            let rpc_error = error.to_rpc_error();
            assert_eq!(rpc_error.code, expected_code);
            assert!(!rpc_error.message.is_empty());
        }
    }

    #[test]
    fn test_route_conflict_display() {
        let err = CoreError::RouteConflict {
            api: "public".to_string(),
            path: "/users".to_string(),
            methods: vec!["GET".to_string(), "POST".to_string()],
            existing_service: "orders".to_string(),
            service: "billing".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("public"));
        assert!(text.contains("GET|POST"));
        assert!(text.contains("orders"));
        assert!(text.contains("billing"));
    }

    #[test]
    fn test_project_errors_accumulate() {
        let errors = ProjectErrors::new();
        assert!(errors.is_empty());

        errors.record(CoreError::InvalidDepth { depth: 11 });
        errors.record(CoreError::InvalidDepth { depth: 0 });

        let listed = errors.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].error.error_code(), "INVALID_DEPTH");
    }
}
