//! Custom error types for the maintenance engine
//!
//! Expected failure modes (missing service, timeout, one failed index) are
//! absorbed into result values by the engine. These types cover the places
//! where a caller has to branch: configuration, pre-flight validation and the
//! busy guard.

use std::fmt;

/// Main error type for the engine
#[derive(Debug)]
pub enum EngineError {
    /// Configuration-related errors
    Config(ConfigError),

    /// Service control errors
    Service(ServiceError),

    /// Database access errors
    Database(DatabaseError),

    /// Transfer pre-flight and execution errors
    Transfer(TransferError),

    /// Another operation already holds the target
    Busy { target: String, operation: String },

    /// Other errors with context
    Other(String),
}

/// Configuration error variants
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },

    /// Configuration parsing error
    ParseError { reason: String },
}

/// Service control error variants
#[derive(Debug)]
pub enum ServiceError {
    /// The control command could not be executed
    CommandFailed { service: String, reason: String },
}

/// Database error variants
#[derive(Debug)]
pub enum DatabaseError {
    /// Connection failed
    ConnectionFailed { reason: String },

    /// Command exceeded its configured timeout
    Timeout { operation: String },
}

/// Transfer error variants
#[derive(Debug)]
pub enum TransferError {
    /// Path contains characters that are never accepted
    UnsafePath { path: String, character: char },

    /// Path is not below any allow-listed root
    OutsideAllowedRoots { path: String },

    /// Path is relative or contains parent components
    NotAbsolute { path: String },

    /// Source does not exist
    SourceMissing { path: String },

    /// Source has no completed manifest
    ManifestInvalid { path: String, reason: String },

    /// Not enough free space at the destination
    InsufficientSpace { path: String, required: u64, available: u64 },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(e) => write!(f, "Configuration error: {}", e),
            EngineError::Service(e) => write!(f, "Service error: {}", e),
            EngineError::Database(e) => write!(f, "Database error: {}", e),
            EngineError::Transfer(e) => write!(f, "Transfer error: {}", e),
            EngineError::Busy { target, operation } => {
                write!(f, "{} is busy with '{}'", target, operation)
            }
            EngineError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::ParseError { reason } => {
                write!(f, "Failed to parse config: {}", reason)
            }
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::CommandFailed { service, reason } => {
                write!(f, "Control command for '{}' failed: {}", service, reason)
            }
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::ConnectionFailed { reason } => {
                write!(f, "Database connection failed: {}", reason)
            }
            DatabaseError::Timeout { operation } => {
                write!(f, "'{}' exceeded its command timeout", operation)
            }
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::UnsafePath { path, character } => {
                write!(f, "Path '{}' contains forbidden character {:?}", path, character)
            }
            TransferError::OutsideAllowedRoots { path } => {
                write!(f, "Path '{}' is outside the allowed transfer roots", path)
            }
            TransferError::NotAbsolute { path } => {
                write!(f, "Path '{}' must be absolute without '..' components", path)
            }
            TransferError::SourceMissing { path } => {
                write!(f, "Source path '{}' does not exist", path)
            }
            TransferError::ManifestInvalid { path, reason } => {
                write!(f, "Transfer manifest in '{}' is not usable: {}", path, reason)
            }
            TransferError::InsufficientSpace {
                path,
                required,
                available,
            } => {
                write!(
                    f,
                    "Not enough space at '{}': {} bytes required, {} bytes available",
                    path, required, available
                )
            }
        }
    }
}

impl std::error::Error for EngineError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for ServiceError {}
impl std::error::Error for DatabaseError {}
impl std::error::Error for TransferError {}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Other(err.to_string())
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err)
    }
}

impl From<ServiceError> for EngineError {
    fn from(err: ServiceError) -> Self {
        EngineError::Service(err)
    }
}

impl From<DatabaseError> for EngineError {
    fn from(err: DatabaseError) -> Self {
        EngineError::Database(err)
    }
}

impl From<TransferError> for EngineError {
    fn from(err: TransferError) -> Self {
        EngineError::Transfer(err)
    }
}
