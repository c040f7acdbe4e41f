//! Kind-tagged errors shared across the core.
//!
//! Callers recover by kind, not by string matching: the orchestrator converts
//! tool failures into structured tool-results, the runner decides retryability,
//! and the CLI prints the message and exits non-zero.

use std::fmt;

/// Failure classification used across the store, runner, supervisor, registry
/// and orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ContainerLimitReached,
    ContainerNotFound,
    ContainerCreationFailed,
    ContainerExecutionFailed,
    ContainerDestructionFailed,
    PromptTooLarge,
    ModelUpstreamTransient,
    ModelUpstreamFatal,
    ToolUnknown,
    ToolArgumentInvalid,
    SessionNotFound,
    SessionStateInvalid,
    TaskNotFound,
    PlanParseFailed,
    Internal,
}

/// An error with a classification, a human-readable message, and optionally
/// the originating cause.
#[derive(Debug)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// The container supervisor's typed error. Restricted to the `Container*`
/// kinds; everything the supervisor returns is one of these.
#[derive(Debug)]
pub struct ContainerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ContainerError {
    pub fn limit_reached(group_id: &str, limit: usize) -> Self {
        Self {
            kind: ErrorKind::ContainerLimitReached,
            message: format!(
                "Container limit reached for group '{}': {} containers already running",
                group_id, limit
            ),
        }
    }

    pub fn not_found(container_id: &str) -> Self {
        Self {
            kind: ErrorKind::ContainerNotFound,
            message: format!("Container not found: {}", container_id),
        }
    }

    pub fn creation_failed(detail: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::ContainerCreationFailed,
            message: format!("Container creation failed: {}", detail),
        }
    }

    pub fn execution_failed(detail: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::ContainerExecutionFailed,
            message: format!("Script execution failed: {}", detail),
        }
    }

    pub fn destruction_failed(detail: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::ContainerDestructionFailed,
            message: format!("Container destruction failed: {}", detail),
        }
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ContainerError {}

impl From<ContainerError> for CoreError {
    fn from(e: ContainerError) -> Self {
        CoreError::new(e.kind, e.message)
    }
}

/// Look through an `anyhow::Error` chain for a [`CoreError`] and report its
/// kind. Used by tests and by callers that branch on classification.
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|e| e.downcast_ref::<CoreError>().map(|c| c.kind))
        .or_else(|| {
            err.chain()
                .find_map(|e| e.downcast_ref::<ContainerError>().map(|c| c.kind))
        })
}
