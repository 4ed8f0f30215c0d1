//! Validation of SII folio authorization codes (CAF).
//!
//! A CAF is the signed XML document the Chilean tax authority issues to
//! authorize a contiguous range of folios for one taxpayer and one DTE type.
//! This crate authenticates CAFs, caches them, and answers whether a given
//! folio may be used.

pub mod caf;
pub mod config;

pub use caf::{
    CachedCafValidator, Caf, CafError, CafValidator, CacheService, DteType, FolioRange,
    MemoryCache, OracleError, UsedFolio, ValidationResult,
};
