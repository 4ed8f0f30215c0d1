//! CAF (Código de Autorización de Folios) validation.
//!
//! Before a DTE can be stamped with a folio, the issuing software must prove
//! that the CAF covering it was really signed by the SII and that the folio
//! falls inside the authorized range. This module does both.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ CAF XML      │────▶│ CafAuthorization│────▶│ verify_signature │
//! │ (bytes)      │     │  (xml module)   │     │ (RSA/SHA-1)      │
//! └──────────────┘     └─────────────────┘     └──────────────────┘
//!                                                       │
//!                                                       ▼
//! ┌──────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ folio_range  │◀────│  CacheService   │◀────│CachedCafValidator│
//! │validate_folio│     │ (memory/redis)  │     │  (CafValidator)  │
//! └──────────────┘     └─────────────────┘     └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sii_caf::caf::{CachedCafValidator, CafValidator, MemoryCache};
//!
//! let cache = Arc::new(MemoryCache::default());
//! let validator = CachedCafValidator::new(cache);
//!
//! let result = validator.validate_caf(&xml).await?;
//! if !result.is_valid() {
//!     // the CAF is not authentic, do not use it
//! }
//!
//! match validator.validate_folio(folio, 33).await {
//!     Ok(true) => { /* stamp the document */ }
//!     Ok(false) => { /* folio outside the authorized range */ }
//!     Err(e) => { /* no range cached: validate the CAF again */ }
//! }
//! ```

pub mod cache;
pub mod error;
pub mod signature;
pub mod types;
pub mod validator;
pub mod xml;

// Re-export main types for convenience
pub use cache::{CacheService, MemoryCache, RedisCache};
pub use error::{CacheError, CafError, OracleError, SignatureError};
pub use signature::verify_signature;
pub use types::{Caf, DteType, FolioRange, UsedFolio, ValidationResult};
pub use validator::{
    caf_key, dte_type_key, used_folio_key, CachedCafValidator, CafValidator, ValidatorConfig,
};
pub use xml::CafAuthorization;
