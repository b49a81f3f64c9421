use aws_sdk_bedrockruntime::error::{ProvideErrorMetadata, SdkError};
use std::error::Error as StdError;
use waffle_core::retry::SERVICE_UNAVAILABLE;

/// Service code for an SDK failure. Transport problems without a service
/// code map to `fallback_timeout` or `ServiceUnavailableException` so the
/// retry policy treats them as transient.
pub(crate) fn error_code<E, R>(err: &SdkError<E, R>, fallback_timeout: &str) -> String
where
    E: ProvideErrorMetadata,
{
    if let Some(code) = err.code() {
        return code.to_string();
    }
    match err {
        SdkError::TimeoutError(_) => fallback_timeout.to_string(),
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => SERVICE_UNAVAILABLE.to_string(),
        _ => "Unknown".to_string(),
    }
}

pub(crate) fn error_message<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + StdError + 'static,
    R: std::fmt::Debug,
{
    match err.message() {
        Some(m) => m.to_string(),
        None => {
            let mut out = err.to_string();
            let mut source = err.source();
            while let Some(s) = source {
                out.push_str(": ");
                out.push_str(&s.to_string());
                source = s.source();
            }
            out
        }
    }
}
