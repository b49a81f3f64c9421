use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Conditions callers branch on, independent of which layer raised them.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    #[error("pillar is required for pillar scope")]
    PillarRequired,
    #[error("question ID is required for question scope")]
    QuestionIdRequired,
    #[error("invalid workload ID")]
    InvalidWorkloadId,
    #[error("invalid directory location")]
    InvalidDirectoryLocation,
    #[error("session not found")]
    SessionNotFound,
    #[error("workload not found")]
    WorkloadNotFound,
    #[error("evaluator not initialized")]
    EvaluatorNotInitialized,
    #[error("no files provided")]
    NoFilesProvided,
    #[error("maximum number of files exceeded")]
    MaxFilesExceeded,
    #[error("invalid plan file")]
    InvalidPlanFile,
    #[error("bedrock invocation failed")]
    BedrockInvocationFailed,
    #[error("maximum retries exceeded")]
    MaxRetriesExceeded,
    #[error("session already completed")]
    SessionAlreadyCompleted,
    #[error("invalid session status")]
    InvalidSessionStatus,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Sentinel(#[from] Sentinel),

    #[error("directory access error for {}: {source}", .path.display())]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("file access error during {operation} of {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("terraform syntax error in {file} at line {line}: {summary}: {detail}")]
    TerraformSyntax {
        file: String,
        line: usize,
        summary: String,
        detail: String,
    },

    #[error("IaC parsing error in {file} ({context}): {source}")]
    IacParsing {
        file: String,
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("validation error for field '{field}' (value: '{value}'): {message}")]
    Validation {
        field: String,
        value: String,
        message: String,
    },

    #[error("bedrock API error during {operation} [{error_code}]: {message}")]
    BedrockApi {
        operation: String,
        error_code: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("WAFR API error during {operation} [{error_code}]: {message}")]
    WafrApi {
        operation: String,
        error_code: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, value: impl ToString, message: impl Into<String>) -> Self {
        Error::Validation { field: field.into(), value: value.to_string(), message: message.into() }
    }

    pub fn bedrock(operation: impl Into<String>, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::BedrockApi {
            operation: operation.into(),
            error_code: error_code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn wafr(operation: impl Into<String>, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::WafrApi {
            operation: operation.into(),
            error_code: error_code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn directory(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Error::DirectoryAccess { path: path.into(), source: source.into() }
    }

    pub fn file(path: impl Into<PathBuf>, operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::FileAccess { path: path.into(), operation: operation.into(), source: source.into() }
    }

    pub fn parsing(file: impl Into<String>, context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::IacParsing { file: file.into(), context: context.into(), source: source.into() }
    }

    /// Wraps `self` with a context message, keeping the chain intact.
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context { context: context.into(), source: Box::new(self) }
    }

    /// Looks for `sentinel` anywhere in the wrapped chain.
    pub fn is(&self, sentinel: Sentinel) -> bool {
        match self {
            Error::Sentinel(found) => *found == sentinel,
            Error::RetriesExhausted { source, .. } => {
                sentinel == Sentinel::MaxRetriesExceeded || source.is(sentinel)
            }
            Error::Context { source, .. } => source.is(sentinel),
            Error::DirectoryAccess { source, .. }
            | Error::FileAccess { source, .. }
            | Error::IacParsing { source, .. } => chain_is(source.as_ref(), sentinel),
            Error::BedrockApi { source: Some(source), .. } | Error::WafrApi { source: Some(source), .. } => {
                chain_is(source.as_ref(), sentinel)
            }
            _ => false,
        }
    }

    /// Service error code of the innermost API error, if any.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Error::BedrockApi { error_code, .. } | Error::WafrApi { error_code, .. } => Some(error_code),
            Error::Context { source, .. } | Error::RetriesExhausted { source, .. } => source.error_code(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Context { source, .. } | Error::RetriesExhausted { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

fn chain_is(err: &(dyn StdError + 'static), sentinel: Sentinel) -> bool {
    if let Some(err) = err.downcast_ref::<Error>() {
        return err.is(sentinel);
    }
    if err.downcast_ref::<Sentinel>() == Some(&sentinel) {
        return true;
    }
    err.source().map_or(false, |next| chain_is(next, sentinel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_survives_wrapping() {
        let err = Error::directory("/tmp/missing", Error::from(Sentinel::NoFilesProvided))
            .context("IaC analysis failed");
        assert!(err.is(Sentinel::NoFilesProvided));
        assert!(!err.is(Sentinel::MaxFilesExceeded));
    }

    #[test]
    fn retries_exhausted_reports_max_retries() {
        let inner = Error::wafr("ListAnswers", "ThrottlingException", "slow down");
        let err = Error::RetriesExhausted { operation: "ListAnswers".into(), attempts: 4, source: Box::new(inner) };
        assert!(err.is(Sentinel::MaxRetriesExceeded));
        assert_eq!(err.error_code(), Some("ThrottlingException"));
    }

    #[test]
    fn structured_kind_reachable_through_context() {
        let err = Error::bedrock("InvokeModel", "AccessDeniedException", "nope").context("evaluating question");
        match &err {
            Error::Context { source, .. } => assert!(matches!(**source, Error::BedrockApi { .. })),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.error_code(), Some("AccessDeniedException"));
    }
}
