/*!
 * Error types for the cueforge application.
 *
 * Library components return the typed errors defined here (built with
 * `thiserror`); the controller and CLI glue work with `anyhow::Result` and
 * convert back into `AppError` at the edge so every failure maps onto a
 * distinguishable exit code.
 */

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Timecode component that failed a range check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimecodeComponent {
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
}

impl fmt::Display for TimecodeComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hours => "hours",
            Self::Minutes => "minutes",
            Self::Seconds => "seconds",
            Self::Milliseconds => "milliseconds",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised while converting a textual timecode
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimecodeError {
    /// The string does not have the `HH:MM:SS,mmm` shape
    #[error("malformed timecode '{0}'")]
    Malformed(String),

    /// A component parsed but lies outside its legal range
    #[error("{component} out of range in '{timecode}': {value} (max {max})")]
    OutOfRange {
        timecode: String,
        component: TimecodeComponent,
        value: u32,
        max: u32,
    },
}

/// What was wrong with a single SRT block
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    #[error("invalid index line '{0}'")]
    InvalidIndex(String),

    #[error("missing timecode line")]
    MissingTimecode,

    #[error("malformed timecode line '{line}': {cause}")]
    MalformedTimecode { line: String, cause: TimecodeError },

    #[error("end time {end_ms}ms is not after start time {start_ms}ms")]
    InvalidTimeRange { start_ms: u64, end_ms: u64 },

    #[error("block has no text")]
    EmptyText,
}

/// A malformed block, located precisely enough to find it in the file
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("block {block} (line {line}, byte {byte_offset}): {kind}")]
pub struct ParseError {
    /// 1-based position of the block in the file
    pub block: usize,
    /// 1-based line number of the block's first line
    pub line: usize,
    /// Byte offset of the block's first line in the decoded text
    pub byte_offset: usize,
    pub kind: ParseErrorKind,
}

/// Decoding trouble reported alongside a parse result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingError {
    /// Best guess of the encoding the bytes were meant to be in
    pub encoding: String,
    /// Whether replacement characters were substituted to produce text
    pub lossy_fallback: bool,
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lossy_fallback {
            write!(f, "input is not valid {}; decoded lossily with replacement characters", self.encoding)
        } else {
            write!(f, "input could not be decoded as {}", self.encoding)
        }
    }
}

impl std::error::Error for EncodingError {}

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The model answered, but not in a shape we can map back onto cues
    #[error("Unusable translation response: {0}")]
    InvalidResponse(String),
}

/// Failures of the external media tools
#[derive(Error, Debug)]
pub enum MediaError {
    /// Preflight failed: binary missing or not runnable
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    /// Subprocess exceeded its time budget and was killed
    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// Subprocess ran but reported failure
    #[error("{tool} failed: {message}")]
    Failed { tool: String, message: String },

    #[error("media file not found: {0}")]
    MissingInput(String),

    #[error("no usable subtitle stream in {0}")]
    NoSubtitleStream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Machine-readable outcome of one file (or of a whole run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Success,
    Internal,
    MissingInput,
    ValidationFailed,
    ToolUnavailable,
    CollaboratorFailed,
    Config,
}

impl ExitReason {
    /// Process exit code
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Internal => 1,
            Self::MissingInput => 2,
            Self::ValidationFailed => 3,
            Self::ToolUnavailable => 4,
            Self::CollaboratorFailed => 5,
            Self::Config => 6,
        }
    }

    fn severity(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::ValidationFailed => 1,
            Self::MissingInput => 2,
            Self::CollaboratorFailed => 3,
            Self::ToolUnavailable => 4,
            Self::Config => 5,
            Self::Internal => 6,
        }
    }

    /// The more severe of two outcomes, used to fold a batch into one exit code
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() { other } else { self }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Internal => "internal error",
            Self::MissingInput => "missing input",
            Self::ValidationFailed => "validation failed",
            Self::ToolUnavailable => "tool unavailable",
            Self::CollaboratorFailed => "collaborator failed",
            Self::Config => "configuration error",
        };
        write!(f, "{}", label)
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Input file or directory does not exist
    #[error("Input not found: {0}")]
    MissingInput(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Output was produced but breaks constraints that could not be repaired
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from an external media tool
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    pub fn exit_reason(&self) -> ExitReason {
        match self {
            Self::MissingInput(_) | Self::Media(MediaError::MissingInput(_)) => ExitReason::MissingInput,
            Self::Config(_) => ExitReason::Config,
            Self::Validation(_) => ExitReason::ValidationFailed,
            Self::Media(MediaError::ToolUnavailable { .. }) => ExitReason::ToolUnavailable,
            Self::Media(_) | Self::Provider(_) | Self::Translation(_) => ExitReason::CollaboratorFailed,
            Self::File(_) | Self::Unknown(_) => ExitReason::Internal,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_reason().code()
    }
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        let error = match error.downcast::<AppError>() {
            Ok(app) => return app,
            Err(other) => other,
        };
        let error = match error.downcast::<MediaError>() {
            Ok(media) => return Self::Media(media),
            Err(other) => other,
        };
        match error.downcast::<TranslationError>() {
            Ok(translation) => Self::Translation(translation),
            Err(other) => Self::Unknown(format!("{:#}", other)),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exitReason_worst_shouldPreferMoreSevere() {
        assert_eq!(ExitReason::Success.worst(ExitReason::ValidationFailed), ExitReason::ValidationFailed);
        assert_eq!(ExitReason::ToolUnavailable.worst(ExitReason::MissingInput), ExitReason::ToolUnavailable);
        assert_eq!(ExitReason::Internal.worst(ExitReason::Success), ExitReason::Internal);
    }

    #[test]
    fn test_appError_fromAnyhow_shouldRecoverMediaError() {
        let err = anyhow::Error::new(MediaError::ToolUnavailable {
            tool: "ffmpeg".to_string(),
            reason: "not found".to_string(),
        });
        let app: AppError = err.into();
        assert_eq!(app.exit_code(), 4);
    }

    #[test]
    fn test_appError_fromAnyhowWithContext_shouldKeepMessage() {
        let err = anyhow::anyhow!("boom").context("while doing things");
        let app: AppError = err.into();
        assert_eq!(app.exit_reason(), ExitReason::Internal);
        assert!(app.to_string().contains("boom"));
    }
}
