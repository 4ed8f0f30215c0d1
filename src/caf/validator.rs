//! CAF validator and folio range oracle.
//!
//! This module authenticates CAF documents and answers folio queries against
//! the CAFs cached by earlier validations.

use crate::caf::cache::{CacheService, MemoryCache};
use crate::caf::error::{CacheError, CafError, OracleError};
use crate::caf::signature::verify_signature;
use crate::caf::types::{
    parse_emission_date, Caf, DteType, FolioRange, UsedFolio, ValidationResult,
};
use crate::caf::xml::CafAuthorization;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// TTL of cached CAF entries (24 hours).
pub const CAF_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// TTL of used-folio markers (366 days), longer than any CAF stays usable.
pub const USED_FOLIO_TTL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Months a CAF stays usable after its authorization date.
pub const DEFAULT_VALIDITY_MONTHS: u32 = 6;

/// Canonical cache key of a CAF: `CAF_{RUT}_{TipoDTE}`.
pub fn caf_key(rut: &str, dte_type: u32) -> String {
    format!("CAF_{}_{}", rut, dte_type)
}

/// Per-type index key, holding the latest CAF validated for that type.
pub fn dte_type_key(dte_type: u32) -> String {
    format!("CAF_TD_{}", dte_type)
}

/// Marker key of a used folio: `CAF_USED_{RUT}_{TipoDTE}_{folio}`.
pub fn used_folio_key(rut: &str, dte_type: u32, folio: u64) -> String {
    format!("CAF_USED_{}_{}_{}", rut, dte_type, folio)
}

/// Trait for CAF validation and folio lookups.
///
/// This trait abstracts the validation logic to enable testing with mock implementations.
#[async_trait]
pub trait CafValidator: Send + Sync {
    /// Authenticate a CAF document and cache it on success.
    ///
    /// Content problems (malformed XML, bad signature, bad or future emission
    /// date) come back as an invalid [`ValidationResult`] inside `Ok`. The
    /// `Err` channel is reserved for infrastructure failures.
    async fn validate_caf(&self, xml: &[u8]) -> Result<ValidationResult, OracleError>;

    /// Whether `folio` falls inside the cached range for `dte_type`.
    ///
    /// `Ok(false)` rejects the folio; `Err` means no range is available and
    /// the CAF must be validated again.
    async fn validate_folio(&self, folio: u64, dte_type: u32) -> Result<bool, OracleError> {
        let range = self.folio_range(dte_type).await?;
        Ok(range.contains(folio))
    }

    /// Authorized range of the CAF cached for `dte_type`.
    async fn folio_range(&self, dte_type: u32) -> Result<FolioRange, OracleError>;
}

/// Validator settings.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub cache_ttl: Duration,
    pub used_folio_ttl: Duration,
    pub validity_months: u32,
    /// Reject CAFs whose expiry date has passed.
    pub enforce_expiry: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: CAF_CACHE_TTL,
            used_folio_ttl: USED_FOLIO_TTL,
            validity_months: DEFAULT_VALIDITY_MONTHS,
            enforce_expiry: false,
        }
    }
}

/// Cache-backed CAF validator.
///
/// Holds no mutable state; all shared state lives in the caches, so one
/// instance can serve any number of concurrent tasks.
///
/// Used folios are tracked in a second store. It defaults to an in-process
/// [`MemoryCache`]; hosts that run several instances pass a shared one
/// through [`with_used_folios`](Self::with_used_folios).
pub struct CachedCafValidator {
    cache: Arc<dyn CacheService<Caf>>,
    used_folios: Arc<dyn CacheService<UsedFolio>>,
    config: ValidatorConfig,
}

impl CachedCafValidator {
    pub fn new(cache: Arc<dyn CacheService<Caf>>) -> Self {
        Self::with_config(cache, ValidatorConfig::default())
    }

    pub fn with_config(cache: Arc<dyn CacheService<Caf>>, config: ValidatorConfig) -> Self {
        Self {
            cache,
            used_folios: Arc::new(MemoryCache::<UsedFolio>::default()),
            config,
        }
    }

    pub fn with_used_folios(mut self, used_folios: Arc<dyn CacheService<UsedFolio>>) -> Self {
        self.used_folios = used_folios;
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Decode, verify and check dates, without touching the cache.
    pub fn authenticate(&self, xml: &[u8], now: DateTime<Utc>) -> Result<Caf, CafError> {
        let auth = CafAuthorization::from_xml(xml)?;
        debug!(
            "Decoded CAF for {} type {} range {}-{}",
            auth.data().rut,
            auth.data().dte_type,
            auth.data().range.start,
            auth.data().range.end
        );

        verify_signature(&auth)?;

        let issued_on = parse_emission_date(&auth.data().issued_on)?;
        if issued_on > now {
            return Err(CafError::EmissionDateInFuture {
                issued_on: auth.data().issued_on.trim().to_string(),
            });
        }

        let caf = Caf::from_authorization(&auth, xml, self.config.validity_months)?;

        if self.config.enforce_expiry && caf.is_expired(now) {
            return Err(CafError::Expired {
                expires_on: caf.expires_on.date_naive().to_string(),
            });
        }

        Ok(caf)
    }

    /// Range of the CAF cached for a specific taxpayer.
    pub async fn folio_range_for(
        &self,
        rut: &str,
        dte_type: u32,
    ) -> Result<FolioRange, OracleError> {
        let caf = self.cached_caf(&caf_key(rut, dte_type), dte_type).await?;
        Ok(caf.range())
    }

    /// Check a folio for a specific issuer before stamping it.
    ///
    /// Reads the issuer's own CAF, so a RUT or document type that does not
    /// match any validated CAF is `RangeUnavailable`. `Ok(false)` means out
    /// of range; a folio marked by [`mark_folio_used`](Self::mark_folio_used)
    /// is `Err(FolioUsed)`.
    pub async fn validate_folio_for(
        &self,
        rut: &str,
        dte_type: u32,
        folio: u64,
    ) -> Result<bool, OracleError> {
        let key = caf_key(rut, dte_type);
        let caf = self.cached_caf(&key, dte_type).await?;
        if caf.rut != rut {
            return Err(OracleError::CorruptEntry {
                key,
                reason: format!("holds RUT {}", caf.rut),
            });
        }

        if !caf.range().contains(folio) {
            debug!(
                "Folio {} outside {} for {} type {}",
                folio,
                caf.range(),
                rut,
                dte_type
            );
            return Ok(false);
        }

        if self.is_folio_used(rut, dte_type, folio).await? {
            return Err(OracleError::FolioUsed {
                rut: rut.to_string(),
                dte_type,
                folio,
            });
        }

        Ok(true)
    }

    /// Record that `folio` has been stamped on a document.
    ///
    /// Marking an already used folio fails with `FolioUsed`. The check and
    /// the write are two cache calls, so concurrent callers claiming the same
    /// folio must serialize above this method.
    pub async fn mark_folio_used(
        &self,
        rut: &str,
        dte_type: u32,
        folio: u64,
    ) -> Result<(), OracleError> {
        if self.is_folio_used(rut, dte_type, folio).await? {
            return Err(OracleError::FolioUsed {
                rut: rut.to_string(),
                dte_type,
                folio,
            });
        }

        let key = used_folio_key(rut, dte_type, folio);
        let marker = UsedFolio {
            rut: rut.to_string(),
            dte_type: DteType(dte_type),
            folio,
            used_at: Utc::now(),
        };
        self.used_folios
            .set(&key, marker, self.config.used_folio_ttl)
            .await
            .map_err(|source| OracleError::UsedFolioStore {
                key: key.clone(),
                source,
            })?;

        info!("Folio {} of type {} marked used for {}", folio, dte_type, rut);
        Ok(())
    }

    async fn is_folio_used(
        &self,
        rut: &str,
        dte_type: u32,
        folio: u64,
    ) -> Result<bool, OracleError> {
        let key = used_folio_key(rut, dte_type, folio);
        match self.used_folios.get(&key).await {
            Ok(_) => Ok(true),
            Err(CacheError::Miss { .. }) => Ok(false),
            Err(source) => Err(OracleError::UsedFolioStore { key, source }),
        }
    }

    /// The CAF currently cached for `dte_type`.
    pub async fn cached(&self, dte_type: u32) -> Result<Caf, OracleError> {
        self.cached_caf(&dte_type_key(dte_type), dte_type).await
    }

    async fn cached_caf(&self, key: &str, dte_type: u32) -> Result<Caf, OracleError> {
        let caf = match self.cache.get(key).await {
            Ok(caf) => caf,
            Err(CacheError::Serialization { reason, .. }) => {
                return Err(OracleError::CorruptEntry {
                    key: key.to_string(),
                    reason,
                });
            }
            Err(source) => {
                debug!("No CAF cached under {}: {}", key, source);
                return Err(OracleError::RangeUnavailable { dte_type, source });
            }
        };

        if caf.dte_type.code() != dte_type {
            return Err(OracleError::CorruptEntry {
                key: key.to_string(),
                reason: format!("holds DTE type {}", caf.dte_type.code()),
            });
        }

        Ok(caf)
    }

    async fn store(&self, caf: &Caf) {
        let ttl = self.config.cache_ttl;
        let keys = [
            caf_key(&caf.rut, caf.dte_type.code()),
            dte_type_key(caf.dte_type.code()),
        ];

        for key in keys {
            if let Err(e) = self.cache.set(&key, caf.clone(), ttl).await {
                warn!("Failed to cache CAF under {}: {}", key, e);
            }
        }
    }
}

#[async_trait]
impl CafValidator for CachedCafValidator {
    async fn validate_caf(&self, xml: &[u8]) -> Result<ValidationResult, OracleError> {
        let caf = match self.authenticate(xml, Utc::now()) {
            Ok(caf) => caf,
            Err(e) => {
                warn!("CAF rejected: {}", e);
                return Ok(ValidationResult::invalid(e));
            }
        };

        self.store(&caf).await;

        info!(
            "CAF validated for {} ({}), type {}, folios {}, sha256 {}",
            caf.rut,
            caf.business_name,
            caf.dte_type,
            caf.range(),
            &caf.fingerprint()[..16]
        );

        Ok(ValidationResult::valid(caf))
    }

    async fn folio_range(&self, dte_type: u32) -> Result<FolioRange, OracleError> {
        let caf = self.cached(dte_type).await?;
        Ok(caf.range())
    }
}
