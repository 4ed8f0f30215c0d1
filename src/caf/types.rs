//! Domain types for CAF validation.

use std::fmt;

use chrono::{DateTime, Months, NaiveDate, Utc};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::caf::error::{CafError, SignatureError};
use crate::caf::signature;
use crate::caf::xml::CafAuthorization;

/// Layout of the `FA` element.
pub const EMISSION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Numeric SII document type code (`TD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DteType(pub u32);

impl DteType {
    pub const FACTURA: DteType = DteType(33);
    pub const FACTURA_EXENTA: DteType = DteType(34);
    pub const BOLETA: DteType = DteType(39);
    pub const BOLETA_EXENTA: DteType = DteType(41);
    pub const LIQUIDACION_FACTURA: DteType = DteType(43);
    pub const FACTURA_COMPRA: DteType = DteType(46);
    pub const GUIA_DESPACHO: DteType = DteType(52);
    pub const NOTA_DEBITO: DteType = DteType(56);
    pub const NOTA_CREDITO: DteType = DteType(61);
    pub const FACTURA_EXPORTACION: DteType = DteType(110);
    pub const NOTA_DEBITO_EXPORTACION: DteType = DteType(111);
    pub const NOTA_CREDITO_EXPORTACION: DteType = DteType(112);

    pub fn code(self) -> u32 {
        self.0
    }

    /// Official name of the document type, when known.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            33 => "Factura Electrónica",
            34 => "Factura Exenta Electrónica",
            39 => "Boleta Electrónica",
            41 => "Boleta Exenta Electrónica",
            43 => "Liquidación Factura Electrónica",
            46 => "Factura de Compra Electrónica",
            52 => "Guía de Despacho Electrónica",
            56 => "Nota de Débito Electrónica",
            61 => "Nota de Crédito Electrónica",
            110 => "Factura de Exportación Electrónica",
            111 => "Nota de Débito de Exportación Electrónica",
            112 => "Nota de Crédito de Exportación Electrónica",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u32> for DteType {
    fn from(code: u32) -> Self {
        DteType(code)
    }
}

impl fmt::Display for DteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Inclusive folio range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolioRange {
    pub start: u64,
    pub end: u64,
}

impl FolioRange {
    pub fn contains(&self, folio: u64) -> bool {
        folio >= self.start && folio <= self.end
    }

    /// Number of folios in the range, zero when inverted.
    pub fn count(&self) -> u64 {
        if self.start > self.end {
            return 0;
        }
        (self.end - self.start).saturating_add(1)
    }
}

impl fmt::Display for FolioRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A CAF whose signature has been verified.
///
/// Built only by the validator; cached under `CAF_{RUT}_{TipoDTE}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caf {
    pub rut: String,
    pub business_name: String,
    pub dte_type: DteType,
    pub folio_start: u64,
    pub folio_end: u64,
    pub issued_on: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
    pub key_id: Option<u32>,

    /// `RSASK` PEM text, empty when the document carries none.
    #[serde(with = "base64_bytes")]
    pub private_key_pem: Vec<u8>,

    /// PKCS#1 DER encoding of the `RSAPK` public key.
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,

    /// The signed document exactly as received.
    #[serde(with = "base64_bytes")]
    pub xml: Vec<u8>,
}

impl Caf {
    /// Build the entity from an authorization whose signature already verified.
    pub(crate) fn from_authorization(
        auth: &CafAuthorization,
        xml: &[u8],
        validity_months: u32,
    ) -> Result<Self, CafError> {
        let da = auth.data();

        let dte_type = parse_number::<u32>("TD", &da.dte_type)?;
        let folio_start = parse_number::<u64>("RNG/D", &da.range.start)?;
        let folio_end = parse_number::<u64>("RNG/H", &da.range.end)?;
        if folio_start == 0 || folio_start > folio_end {
            return Err(CafError::InvalidFolioRange {
                start: folio_start,
                end: folio_end,
            });
        }

        // IDK is outside the signed data, so an odd value never rejects the CAF.
        let key_id = da.key_id.trim().parse::<u32>().ok();

        let issued_on = parse_emission_date(&da.issued_on)?;
        let expires_on = issued_on
            .checked_add_months(Months::new(validity_months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let public_key = signature::public_key(&da.public_key)?
            .to_pkcs1_der()
            .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))?
            .as_bytes()
            .to_vec();

        Ok(Self {
            rut: da.rut.trim().to_string(),
            business_name: da.business_name.trim().to_string(),
            dte_type: DteType(dte_type),
            folio_start,
            folio_end,
            issued_on,
            expires_on,
            key_id,
            private_key_pem: auth
                .private_key_pem
                .as_deref()
                .map(|pem| pem.trim().as_bytes().to_vec())
                .unwrap_or_default(),
            public_key,
            xml: xml.to_vec(),
        })
    }

    pub fn range(&self) -> FolioRange {
        FolioRange {
            start: self.folio_start,
            end: self.folio_end,
        }
    }

    /// Inclusive count of folios this CAF authorizes.
    pub fn available_folios(&self) -> u64 {
        self.range().count()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_on
    }

    /// Hex SHA-256 of the original document.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.xml))
    }

    /// Parse the embedded `RSASK` key used to stamp documents.
    pub fn signing_key(&self) -> Result<RsaPrivateKey, SignatureError> {
        if self.private_key_pem.is_empty() {
            return Err(SignatureError::InvalidPrivateKey(
                "CAF carries no RSASK element".to_string(),
            ));
        }
        let pem = std::str::from_utf8(&self.private_key_pem)
            .map_err(|e| SignatureError::InvalidPrivateKey(e.to_string()))?;
        RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| SignatureError::InvalidPrivateKey(e.to_string()))
    }

    /// Decode the retained document again and re-check the authority signature.
    pub fn reverify(&self) -> Result<(), CafError> {
        let auth = CafAuthorization::from_xml(&self.xml)?;
        signature::verify_signature(&auth)?;
        Ok(())
    }
}

/// Marker recording that a folio has been stamped on a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedFolio {
    pub rut: String,
    pub dte_type: DteType,
    pub folio: u64,
    pub used_at: DateTime<Utc>,
}

/// Parse an `FA` value into midnight UTC of that day.
pub fn parse_emission_date(value: &str) -> Result<DateTime<Utc>, CafError> {
    let date = NaiveDate::parse_from_str(value.trim(), EMISSION_DATE_FORMAT).map_err(|e| {
        CafError::InvalidEmissionDate {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, CafError> {
    value.trim().parse().map_err(|_| CafError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Outcome of a single `validate_caf` call.
///
/// A valid result never carries an error.
#[derive(Debug)]
pub struct ValidationResult {
    valid: bool,
    error: Option<CafError>,
    details: String,
    timestamp: DateTime<Utc>,
    caf: Option<Caf>,
}

impl ValidationResult {
    pub fn valid(caf: Caf) -> Self {
        let details = format!(
            "Valid CAF for {}, DTE type {}, folios {}",
            caf.business_name,
            caf.dte_type.code(),
            caf.range()
        );
        Self {
            valid: true,
            error: None,
            details,
            timestamp: Utc::now(),
            caf: Some(caf),
        }
    }

    pub fn invalid(error: CafError) -> Self {
        Self {
            valid: false,
            details: error.to_string(),
            error: Some(error),
            timestamp: Utc::now(),
            caf: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn error(&self) -> Option<&CafError> {
        self.error.as_ref()
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The authenticated CAF, present only on success.
    pub fn caf(&self) -> Option<&Caf> {
        self.caf.as_ref()
    }

    pub fn into_result(self) -> Result<Caf, CafError> {
        match (self.caf, self.error) {
            (Some(caf), _) => Ok(caf),
            (None, Some(error)) => Err(error),
            (None, None) => Err(CafError::Decode("empty validation result".to_string())),
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
