//! Wire shape of the authority's `AUTORIZACION` document.
//!
//! ```text
//! <AUTORIZACION version="1.0">
//!   <CAF version="1.0">
//!     <DA>
//!       <RE/> <RS/> <TD/> <RNG><D/><H/></RNG> <FA/>
//!       <RSAPK><M/><E/></RSAPK> <IDK/>
//!     </DA>
//!     <FRMA algoritmo="SHA1withRSA">base64</FRMA>
//!   </CAF>
//!   <RSASK>PEM</RSASK>
//!   <RSAPUBK>PEM</RSAPUBK>
//! </AUTORIZACION>
//! ```
//!
//! Every leaf is kept as the literal text of the document. The signed byte
//! string is built from those texts, so nothing is parsed or re-formatted
//! until the signature has been checked.

use std::borrow::Cow;

use serde::Deserialize;

use crate::caf::error::CafError;

/// Character encoding the document was read with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1, the encoding the SII issues CAF files in.
    Latin1,
}

impl TextEncoding {
    /// Encode `text` back into the bytes it was read from.
    pub fn encode(self, text: &str, out: &mut Vec<u8>) {
        match self {
            TextEncoding::Utf8 => out.extend_from_slice(text.as_bytes()),
            // Decoded from Latin-1, so every char is <= U+00FF.
            TextEncoding::Latin1 => out.extend(text.chars().map(|c| c as u32 as u8)),
        }
    }
}

/// Root `AUTORIZACION` element.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "AUTORIZACION")]
pub struct CafAuthorization {
    #[serde(rename = "@version", default)]
    pub version: String,

    #[serde(rename = "CAF")]
    pub caf: CafBody,

    /// Private key the authority issues for stamping documents.
    #[serde(rename = "RSASK", default)]
    pub private_key_pem: Option<String>,

    #[serde(rename = "RSAPUBK", default)]
    pub public_key_pem: Option<String>,

    #[serde(skip)]
    pub encoding: TextEncoding,
}

/// `CAF` element: authorization data plus the authority's signature over it.
#[derive(Debug, Clone, Deserialize)]
pub struct CafBody {
    #[serde(rename = "@version", default)]
    pub version: String,

    #[serde(rename = "DA")]
    pub data: AuthorizationData,

    #[serde(rename = "FRMA")]
    pub signature: CafSignature,
}

/// `DA` element.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationData {
    /// Taxpayer RUT.
    #[serde(rename = "RE")]
    pub rut: String,

    /// Business name.
    #[serde(rename = "RS")]
    pub business_name: String,

    /// Document type code.
    #[serde(rename = "TD")]
    pub dte_type: String,

    #[serde(rename = "RNG")]
    pub range: RangeXml,

    /// Authorization date, `YYYY-MM-DD`.
    #[serde(rename = "FA")]
    pub issued_on: String,

    #[serde(rename = "RSAPK")]
    pub public_key: RsaPublicKeyXml,

    #[serde(rename = "IDK", default)]
    pub key_id: String,
}

/// `RNG` element, inclusive folio bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct RangeXml {
    #[serde(rename = "D")]
    pub start: String,

    #[serde(rename = "H")]
    pub end: String,
}

/// `RSAPK` element, base64 big-endian modulus and exponent.
#[derive(Debug, Clone, Deserialize)]
pub struct RsaPublicKeyXml {
    #[serde(rename = "M")]
    pub modulus: String,

    #[serde(rename = "E")]
    pub exponent: String,
}

/// `FRMA` element.
#[derive(Debug, Clone, Deserialize)]
pub struct CafSignature {
    #[serde(rename = "@algoritmo", default)]
    pub algorithm: String,

    #[serde(rename = "$text", default)]
    pub value: String,
}

impl CafAuthorization {
    /// Decode a CAF document. Accepts UTF-8 and ISO-8859-1 input.
    pub fn from_xml(xml: &[u8]) -> Result<Self, CafError> {
        let (text, encoding) = decode_text(xml);
        if text.trim().is_empty() {
            return Err(CafError::Decode("empty document".to_string()));
        }

        let mut authorization: CafAuthorization =
            quick_xml::de::from_str(&text).map_err(|e| CafError::Decode(e.to_string()))?;
        authorization.encoding = encoding;
        Ok(authorization)
    }

    pub fn data(&self) -> &AuthorizationData {
        &self.caf.data
    }

    /// The byte string the authority signed:
    /// `RE RS TD D H FA M E`, concatenated without separators.
    ///
    /// Each text is trimmed of surrounding whitespace, which also covers
    /// pretty-printed `M`/`E` values. Inner text is never changed.
    pub fn signed_data(&self) -> Vec<u8> {
        let da = &self.caf.data;
        let parts = [
            da.rut.trim(),
            da.business_name.trim(),
            da.dte_type.trim(),
            da.range.start.trim(),
            da.range.end.trim(),
            da.issued_on.trim(),
            da.public_key.modulus.trim(),
            da.public_key.exponent.trim(),
        ];

        let mut out = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
        for part in parts {
            self.encoding.encode(part, &mut out);
        }
        out
    }
}

/// Read the raw bytes as text, honoring an ISO-8859-1 declaration.
fn decode_text(xml: &[u8]) -> (Cow<'_, str>, TextEncoding) {
    let xml = xml.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(xml);

    if !declares_latin1(xml) {
        if let Ok(text) = std::str::from_utf8(xml) {
            return (Cow::Borrowed(text), TextEncoding::Utf8);
        }
    }

    let text: String = xml.iter().map(|&b| b as char).collect();
    (Cow::Owned(text), TextEncoding::Latin1)
}

fn declares_latin1(xml: &[u8]) -> bool {
    if !xml.starts_with(b"<?xml") {
        return false;
    }
    let end = xml
        .windows(2)
        .position(|w| w == b"?>")
        .unwrap_or(xml.len().min(128));
    let declaration = String::from_utf8_lossy(&xml[..end]).to_ascii_lowercase();
    declaration.contains("iso-8859-1") || declaration.contains("latin1")
}
