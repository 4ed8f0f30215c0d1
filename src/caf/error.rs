//! Error types for CAF validation and folio lookups.

use thiserror::Error;

/// Errors raised while authenticating the authority's signature on a CAF.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Invalid RSA modulus encoding: {0}")]
    InvalidModulus(String),

    #[error("Invalid RSA exponent encoding: {0}")]
    InvalidExponent(String),

    #[error("RSA exponent does not fit in a machine integer ({bytes} bytes)")]
    ExponentTooLarge { bytes: usize },

    #[error("Invalid RSA public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signature does not match the authorization data: {0}")]
    Mismatch(String),

    #[error("Invalid RSA private key: {0}")]
    InvalidPrivateKey(String),
}

/// Content validation failures.
///
/// These are reported inside [`ValidationResult`](crate::caf::ValidationResult),
/// never through the outer error channel of `validate_caf`.
#[derive(Debug, Error)]
pub enum CafError {
    #[error("Failed to decode CAF XML: {0}")]
    Decode(String),

    #[error("CAF signature check failed: {0}")]
    Signature(#[from] SignatureError),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid emission date {value:?}: {reason}")]
    InvalidEmissionDate { value: String, reason: String },

    #[error("Emission date {issued_on} is after the current date")]
    EmissionDateInFuture { issued_on: String },

    #[error("Invalid folio range {start}-{end}")]
    InvalidFolioRange { start: u64, end: u64 },

    #[error("CAF expired on {expires_on}")]
    Expired { expires_on: String },
}

/// Errors reported by a [`CacheService`](crate::caf::CacheService) backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Key not found: {key}")]
    Miss { key: String },

    #[error("Cache backend failed: {0}")]
    Backend(String),

    #[error("Failed to (de)serialize cached value for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

/// Errors surfaced through the outer channel of the validator operations.
#[derive(Debug, Error)]
pub enum OracleError {
    /// No usable CAF is cached for this document type: never validated,
    /// expired out of the cache, cache cleared, or backend unreachable.
    #[error("No CAF found for DTE type {dte_type}")]
    RangeUnavailable {
        dte_type: u32,
        #[source]
        source: CacheError,
    },

    #[error("Cached entry {key} is not a usable CAF: {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("Folio {folio} of DTE type {dte_type} was already used by {rut}")]
    FolioUsed {
        rut: String,
        dte_type: u32,
        folio: u64,
    },

    #[error("Used-folio store failed for {key}")]
    UsedFolioStore {
        key: String,
        #[source]
        source: CacheError,
    },
}

impl OracleError {
    /// True when re-validating the CAF is the expected recovery.
    pub fn is_range_unavailable(&self) -> bool {
        matches!(self, OracleError::RangeUnavailable { .. })
    }

    pub fn is_folio_used(&self) -> bool {
        matches!(self, OracleError::FolioUsed { .. })
    }
}
