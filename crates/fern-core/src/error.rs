//! Error types for `fern-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. Crypto errors never include key material, only key identifiers
//! or operation descriptions.
//!
//! Domain errors ([`Route53Error`], [`SsmError`]) additionally expose a coarse
//! [`ErrorKind`] for callers that only need to branch on the class of failure,
//! and the provider's wire error code for callers that re-encode responses.

use fern_storage::StorageError;

/// Coarse classification shared by every domain error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The zone, record, parameter, or change does not exist.
    NotFound,
    /// A create collided with an existing entity.
    AlreadyExists,
    /// The request was malformed and rejected before any write.
    InvalidInput,
    /// The request conflicts with current state (e.g. a non-empty zone).
    Conflict,
    /// A key was unknown or a ciphertext failed to open.
    CryptoFailure,
    /// The storage engine or codec failed.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::InvalidInput => "invalid input",
            Self::Conflict => "conflict",
            Self::CryptoFailure => "crypto failure",
            Self::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// Errors from encoding or decoding stored records.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A record could not be serialized.
    #[error("failed to encode record: {reason}")]
    Encode { reason: String },

    /// The bytes stored at a key are not a valid record.
    #[error("failed to decode record at '{key}': {reason}")]
    Decode { key: String, reason: String },
}

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// AES-256-GCM decryption failed (wrong key, corrupted ciphertext, or tampered tag).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// Ciphertext is too short to contain a valid nonce + tag.
    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    /// The ciphertext envelope was not valid base64.
    #[error("ciphertext is not valid base64: {reason}")]
    InvalidEncoding { reason: String },

    /// A configured key could not be loaded.
    #[error("invalid key material for key '{key_id}': {reason}")]
    InvalidKeyMaterial { key_id: String, reason: String },

    /// No configured key matches the reference.
    #[error("no key matches '{key_id}'")]
    UnknownKey { key_id: String },
}

/// Errors from the hosted zone engine.
#[derive(Debug, thiserror::Error)]
pub enum Route53Error {
    /// No hosted zone has the given id.
    #[error("no hosted zone found with id '{id}'")]
    NoSuchHostedZone { id: String },

    /// A live zone already uses this name.
    #[error("a hosted zone named '{name}' already exists")]
    HostedZoneAlreadyExists { name: String },

    /// The zone still holds record sets beyond its apex SOA and NS.
    #[error("hosted zone '{id}' contains non-required resource record sets")]
    HostedZoneNotEmpty { id: String },

    /// A change batch was rejected before anything was written.
    #[error("invalid change batch: {reason}")]
    InvalidChangeBatch { reason: String },

    /// A CREATE change targeted a record set that already exists.
    #[error("tried to create resource record set '{name}' type '{rr_type}' but it already exists")]
    RecordSetAlreadyExists { name: String, rr_type: String },

    /// A zone name is not a usable domain name.
    #[error("invalid domain name '{name}': {reason}")]
    InvalidDomainName { name: String, reason: String },

    /// Any other malformed argument.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A stored record could not be encoded or decoded.
    #[error("route53 codec error: {0}")]
    Codec(#[from] CodecError),

    /// The underlying storage backend returned an error.
    #[error("route53 storage error: {0}")]
    Storage(#[from] StorageError),
}

impl Route53Error {
    /// Coarse class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSuchHostedZone { .. } => ErrorKind::NotFound,
            Self::HostedZoneAlreadyExists { .. } | Self::RecordSetAlreadyExists { .. } => {
                ErrorKind::AlreadyExists
            }
            Self::HostedZoneNotEmpty { .. } => ErrorKind::Conflict,
            Self::InvalidChangeBatch { .. }
            | Self::InvalidDomainName { .. }
            | Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Codec(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Wire error code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSuchHostedZone { .. } => "NoSuchHostedZone",
            Self::HostedZoneAlreadyExists { .. } => "HostedZoneAlreadyExists",
            Self::HostedZoneNotEmpty { .. } => "HostedZoneNotEmpty",
            Self::InvalidChangeBatch { .. } | Self::RecordSetAlreadyExists { .. } => {
                "InvalidChangeBatch"
            }
            Self::InvalidDomainName { .. } => "InvalidDomainName",
            Self::InvalidInput { .. } => "InvalidInput",
            Self::Codec(_) | Self::Storage(_) => "InternalError",
        }
    }
}

/// Errors from the parameter store engine.
#[derive(Debug, thiserror::Error)]
pub enum SsmError {
    /// No parameter is stored under the name.
    #[error("parameter '{name}' not found")]
    ParameterNotFound { name: String },

    /// The parameter exists and overwrite was not requested.
    #[error("parameter '{name}' already exists")]
    ParameterAlreadyExists { name: String },

    /// A name, path, or argument failed validation.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// A name nests deeper than the allowed hierarchy.
    #[error("parameter '{name}' exceeds the maximum of {max} hierarchy levels")]
    HierarchyLevelLimitExceeded { name: String, max: usize },

    /// The key reference does not resolve to a configured key.
    #[error("invalid key id '{key_id}'")]
    InvalidKeyId { key_id: String },

    /// A filter used an unsupported key.
    #[error("invalid filter key '{key}'")]
    InvalidFilterKey { key: String },

    /// A filter option is not valid for its key.
    #[error("invalid filter option '{option}' for key '{key}'")]
    InvalidFilterOption { key: String, option: String },

    /// A filter carried no usable values.
    #[error("invalid filter value: {reason}")]
    InvalidFilterValue { reason: String },

    /// The pagination token could not be decoded.
    #[error("the next token is not valid")]
    InvalidNextToken,

    /// Encrypting or decrypting a value failed.
    #[error("ssm crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A stored record could not be encoded or decoded.
    #[error("ssm codec error: {0}")]
    Codec(#[from] CodecError),

    /// The underlying storage backend returned an error.
    #[error("ssm storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SsmError {
    /// Coarse class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ParameterNotFound { .. } => ErrorKind::NotFound,
            Self::ParameterAlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Validation { .. }
            | Self::HierarchyLevelLimitExceeded { .. }
            | Self::InvalidFilterKey { .. }
            | Self::InvalidFilterOption { .. }
            | Self::InvalidFilterValue { .. }
            | Self::InvalidNextToken => ErrorKind::InvalidInput,
            Self::InvalidKeyId { .. } | Self::Crypto(_) => ErrorKind::CryptoFailure,
            Self::Codec(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Wire error code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParameterNotFound { .. } => "ParameterNotFound",
            Self::ParameterAlreadyExists { .. } => "ParameterAlreadyExists",
            Self::Validation { .. } => "ValidationException",
            Self::HierarchyLevelLimitExceeded { .. } => "HierarchyLevelLimitExceededException",
            Self::InvalidKeyId { .. } | Self::Crypto(CryptoError::UnknownKey { .. }) => "InvalidKeyId",
            Self::InvalidFilterKey { .. } => "InvalidFilterKey",
            Self::InvalidFilterOption { .. } => "InvalidFilterOption",
            Self::InvalidFilterValue { .. } => "InvalidFilterValue",
            Self::InvalidNextToken => "InvalidNextToken",
            Self::Crypto(
                CryptoError::Decryption { .. }
                | CryptoError::CiphertextTooShort { .. }
                | CryptoError::InvalidEncoding { .. },
            ) => "InvalidCiphertext",
            Self::Crypto(_) => "KeyInternalError",
            Self::Codec(_) | Self::Storage(_) => "InternalError",
        }
    }
}

/// Errors from dumping an engine's keys.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// Scanning the store failed.
    #[error("dump storage error: {0}")]
    Storage(#[from] StorageError),

    /// Writing to the output failed.
    #[error("dump write error: {0}")]
    Io(#[from] std::io::Error),
}
