//! Error types for glow.
//!
//! Construction-time and decoding errors carry a stable [`ErrorCode`] so the
//! surrounding node can report them without matching on message text.
//! Per-message protocol rejections are not errors of this kind; they live in
//! `glow-consensus` and never abort an engine.

use thiserror::Error;

/// Result type for glow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes.
///
/// Codes are structured as:
/// - 1xxx: Validation errors
/// - 3xxx: Conflict errors
/// - 6xxx: Encoding errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Validation errors (1xxx)
    InvalidHash = 1001,
    EmptyValidatorSet = 1002,
    ZeroTotalStake = 1003,
    InvalidConfig = 1004,

    // Conflict errors (3xxx)
    DuplicateValidator = 3001,

    // Encoding errors (6xxx)
    Serialization = 6001,
    Deserialization = 6002,
}

impl ErrorCode {
    /// Get the numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Check if the error was caused by caller-supplied input.
    pub fn is_client_error(self) -> bool {
        (1000..5000).contains(&self.code())
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Errors that can occur while building protocol state or decoding messages.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid hash format or value.
    #[error("[{code}] invalid hash: {message}")]
    InvalidHash {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A stake table was built with no validators.
    #[error("[{code}] validator set is empty")]
    EmptyValidatorSet { code: ErrorCode },

    /// Every validator in the stake table has zero stake.
    #[error("[{code}] total stake is zero")]
    ZeroTotalStake { code: ErrorCode },

    /// The same validator id appears twice in a stake table.
    #[error("[{code}] duplicate validator: {message}")]
    DuplicateValidator { code: ErrorCode, message: String },

    /// Engine or component configuration is inconsistent.
    #[error("[{code}] invalid config: {message}")]
    InvalidConfig { code: ErrorCode, message: String },

    /// Serialization/deserialization failed.
    #[error("[{code}] encoding error: {message}")]
    Encoding {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidHash { code, .. } => *code,
            Error::EmptyValidatorSet { code } => *code,
            Error::ZeroTotalStake { code } => *code,
            Error::DuplicateValidator { code, .. } => *code,
            Error::InvalidConfig { code, .. } => *code,
            Error::Encoding { code, .. } => *code,
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(message: impl Into<String>) -> Self {
        Error::InvalidHash {
            code: ErrorCode::InvalidHash,
            message: message.into(),
            source: None,
        }
    }

    /// Create an EmptyValidatorSet error.
    pub fn empty_validator_set() -> Self {
        Error::EmptyValidatorSet {
            code: ErrorCode::EmptyValidatorSet,
        }
    }

    /// Create a ZeroTotalStake error.
    pub fn zero_total_stake() -> Self {
        Error::ZeroTotalStake {
            code: ErrorCode::ZeroTotalStake,
        }
    }

    /// Create a DuplicateValidator error.
    pub fn duplicate_validator(message: impl Into<String>) -> Self {
        Error::DuplicateValidator {
            code: ErrorCode::DuplicateValidator,
            message: message.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            code: ErrorCode::InvalidConfig,
            message: message.into(),
        }
    }

    /// Create an Encoding error for a failed encode.
    pub fn serialization(message: impl Into<String>) -> Self {
        Error::Encoding {
            code: ErrorCode::Serialization,
            message: message.into(),
            source: None,
        }
    }

    /// Create an Encoding error for a failed decode.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Error::Encoding {
            code: ErrorCode::Deserialization,
            message: message.into(),
            source: None,
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::InvalidHash {
            code: ErrorCode::InvalidHash,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Encoding {
            code: ErrorCode::Deserialization,
            message: err.to_string(),
            source: Some(err as Box<dyn std::error::Error + Send + Sync>),
        }
    }
}
