//! Settings loaded from the process environment.

use std::env;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use crate::caf::cache::{CacheService, MemoryCache, RedisCache, DEFAULT_CAPACITY};
use crate::caf::validator::{ValidatorConfig, DEFAULT_VALIDITY_MONTHS, USED_FOLIO_TTL};
use crate::caf::{CacheError, Caf, UsedFolio};

/// Where validated CAFs are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis,
}

impl std::str::FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(format!("unknown cache backend {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub cache_backend: CacheBackend,
    pub redis_url: String,
    pub cache_ttl_secs: u64,
    pub used_folio_ttl_secs: u64,
    pub cache_capacity: u64,
    pub enforce_expiry: bool,
    pub validity_months: u32,
}

impl Settings {
    /// Build settings from any key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Settings {
            cache_backend: lookup("CAF_CACHE_BACKEND")
                .unwrap_or_else(|| "memory".to_string())
                .parse()?,
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            cache_ttl_secs: lookup("CAF_CACHE_TTL_SECS")
                .unwrap_or_else(|| "86400".to_string())
                .parse()?,
            used_folio_ttl_secs: lookup("CAF_USED_FOLIO_TTL_SECS")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(USED_FOLIO_TTL.as_secs()),
            cache_capacity: lookup("CAF_CACHE_CAPACITY")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(DEFAULT_CAPACITY),
            enforce_expiry: lookup("CAF_ENFORCE_EXPIRY")
                .unwrap_or_else(|| "false".to_string())
                .parse()?,
            validity_months: lookup("CAF_VALIDITY_MONTHS")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(DEFAULT_VALIDITY_MONTHS),
        })
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            used_folio_ttl: Duration::from_secs(self.used_folio_ttl_secs),
            validity_months: self.validity_months,
            enforce_expiry: self.enforce_expiry,
        }
    }

    /// Create the configured cache backend.
    pub fn build_cache(&self) -> Result<Arc<dyn CacheService<Caf>>, CacheError> {
        match self.cache_backend {
            CacheBackend::Memory => Ok(Arc::new(MemoryCache::<Caf>::new(self.cache_capacity))),
            CacheBackend::Redis => Ok(Arc::new(RedisCache::<Caf>::open(&self.redis_url)?)),
        }
    }

    /// Create the used-folio store on the configured backend.
    pub fn build_used_folio_store(&self) -> Result<Arc<dyn CacheService<UsedFolio>>, CacheError> {
        match self.cache_backend {
            CacheBackend::Memory => Ok(Arc::new(MemoryCache::<UsedFolio>::new(
                self.cache_capacity,
            ))),
            CacheBackend::Redis => Ok(Arc::new(RedisCache::<UsedFolio>::open(&self.redis_url)?)),
        }
    }
}

pub fn load_config() -> Result<Settings, Box<dyn Error>> {
    Settings::from_lookup(|key| env::var(key).ok())
}
