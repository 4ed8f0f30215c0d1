//! CAF fixtures signed the way the SII signs them.

#![allow(dead_code)]

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand_core::OsRng;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::{Digest, Sha1};
use sii_caf::caf::{CacheError, CacheService, Caf};

/// Key standing in for the authority's CAF signing key.
pub fn authority_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 1024).expect("generate RSA key"))
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone)]
pub struct CafFixture {
    pub rut: String,
    pub business_name: String,
    pub dte_type: String,
    pub start: String,
    pub end: String,
    pub issued_on: String,
    pub key_id: String,
    pub include_keys: bool,
    pub latin1: bool,
}

impl Default for CafFixture {
    fn default() -> Self {
        Self {
            rut: "76543210-K".to_string(),
            business_name: "COMERCIAL EJEMPLO LTDA".to_string(),
            dte_type: "33".to_string(),
            start: "1".to_string(),
            end: "100".to_string(),
            issued_on: "2024-03-15".to_string(),
            key_id: "100".to_string(),
            include_keys: true,
            latin1: false,
        }
    }
}

impl CafFixture {
    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.start = start.to_string();
        self.end = end.to_string();
        self
    }

    pub fn with_type(mut self, dte_type: u32) -> Self {
        self.dte_type = dte_type.to_string();
        self
    }

    pub fn with_rut(mut self, rut: &str) -> Self {
        self.rut = rut.to_string();
        self
    }

    pub fn issued_on(mut self, date: &str) -> Self {
        self.issued_on = date.to_string();
        self
    }

    fn modulus(&self) -> String {
        STANDARD.encode(authority_key().n().to_bytes_be())
    }

    fn exponent(&self) -> String {
        STANDARD.encode(authority_key().e().to_bytes_be())
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        if self.latin1 {
            text.chars().map(|c| c as u32 as u8).collect()
        } else {
            text.as_bytes().to_vec()
        }
    }

    /// The `FRMA` value for the current field texts.
    pub fn signature(&self) -> String {
        let data = format!(
            "{}{}{}{}{}{}{}{}",
            self.rut,
            self.business_name,
            self.dte_type,
            self.start,
            self.end,
            self.issued_on,
            self.modulus(),
            self.exponent()
        );
        let digest = Sha1::digest(self.encode(&data));
        let signature = authority_key()
            .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
            .expect("sign CAF data");
        STANDARD.encode(signature)
    }

    /// Signed document.
    pub fn xml(&self) -> Vec<u8> {
        self.render(&self.signature())
    }

    /// Document carrying the given `FRMA` value.
    pub fn render(&self, signature: &str) -> Vec<u8> {
        let encoding = if self.latin1 { "ISO-8859-1" } else { "UTF-8" };

        let keys = if self.include_keys {
            let key = authority_key();
            let private_pem = key
                .to_pkcs1_pem(LineEnding::LF)
                .expect("encode private key");
            let public_pem = key
                .to_public_key()
                .to_pkcs1_pem(LineEnding::LF)
                .expect("encode public key");
            format!(
                "<RSASK>{}</RSASK>\n<RSAPUBK>{}</RSAPUBK>\n",
                private_pem.as_str(),
                public_pem
            )
        } else {
            String::new()
        };

        let document = format!(
            r#"<?xml version="1.0" encoding="{encoding}"?>
<AUTORIZACION version="1.0">
<CAF version="1.0">
<DA>
<RE>{rut}</RE>
<RS>{rs}</RS>
<TD>{td}</TD>
<RNG><D>{d}</D><H>{h}</H></RNG>
<FA>{fa}</FA>
<RSAPK><M>{m}</M><E>{e}</E></RSAPK>
<IDK>{idk}</IDK>
</DA>
<FRMA algoritmo="SHA1withRSA">{signature}</FRMA>
</CAF>
{keys}</AUTORIZACION>
"#,
            encoding = encoding,
            rut = self.rut,
            rs = self.business_name,
            td = self.dte_type,
            d = self.start,
            h = self.end,
            fa = self.issued_on,
            m = self.modulus(),
            e = self.exponent(),
            idk = self.key_id,
            signature = signature,
            keys = keys,
        );

        self.encode(&document)
    }
}

/// Cache whose writes always fail and which never holds anything.
pub struct UnwritableCache;

#[async_trait]
impl CacheService<Caf> for UnwritableCache {
    async fn get(&self, key: &str) -> Result<Caf, CacheError> {
        Err(CacheError::Miss {
            key: key.to_string(),
        })
    }

    async fn set(&self, _key: &str, _value: Caf, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Cache whose reads hang, standing in for an unresponsive network store.
pub struct StalledCache;

#[async_trait]
impl CacheService<Caf> for StalledCache {
    async fn get(&self, key: &str) -> Result<Caf, CacheError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(CacheError::Backend(format!("timed out reading {}", key)))
    }

    async fn set(&self, _key: &str, _value: Caf, _ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Store whose every call fails, for any value type.
pub struct BrokenStore;

#[async_trait]
impl<V> CacheService<V> for BrokenStore
where
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<V, CacheError> {
        Err(CacheError::Backend(format!("read of {} refused", key)))
    }

    async fn set(&self, key: &str, _value: V, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend(format!("write of {} refused", key)))
    }

    async fn remove(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Backend("remove refused".to_string()))
    }
}
