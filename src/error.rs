use crate::application::pipeline::PipelineStep;
use crate::domain::failure::Failure;
use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by a [`WalletClient`](crate::domain::ports::WalletClient).
///
/// These are raw transport outcomes; the pipeline never matches on them
/// directly but hands them to [`Failure::classify`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        /// `error.code` from the response body, when the server sent one.
        code: Option<String>,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            code: None,
            message: message.into(),
        }
    }

    pub fn status_with_code(
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Status {
            status,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConsentError {
    #[error("consent aborted: {0}")]
    Aborted(String),
    #[error("consent channel closed before a decision was made")]
    Closed,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug, Diagnostic)]
pub enum TransferError {
    #[error("Invalid amount: {0}")]
    #[diagnostic(code(grantflow::invalid_amount))]
    InvalidAmount(String),
    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(grantflow::config))]
    Config(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Transfer failed at {step}: {failure}")]
    #[diagnostic(code(grantflow::run_failed))]
    RunFailed {
        step: PipelineStep,
        failure: Failure,
        #[help]
        guidance: Option<String>,
    },
}

pub type Result<T> = std::result::Result<T, TransferError>;
