//! Authority signature verification for CAF documents.
//!
//! The SII signs `SHA1(RE || RS || TD || D || H || FA || M || E)` with
//! RSA PKCS#1 v1.5, where every part is the literal element text. The public
//! key is the `RSAPK` pair carried inside the same `DA` element.
//!
//! Verification is stateless and performs no I/O.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use sha1::{Digest, Sha1};

use crate::caf::error::SignatureError;
use crate::caf::xml::{CafAuthorization, RsaPublicKeyXml};

/// The only algorithm the authority signs CAFs with.
pub const SIGNATURE_ALGORITHM: &str = "SHA1withRSA";

/// Verify the authority's signature over the `DA` element.
pub fn verify_signature(auth: &CafAuthorization) -> Result<(), SignatureError> {
    let frma = &auth.caf.signature;
    let algorithm = frma.algorithm.trim();
    if !algorithm.is_empty() && !algorithm.eq_ignore_ascii_case(SIGNATURE_ALGORITHM) {
        return Err(SignatureError::UnsupportedAlgorithm(algorithm.to_string()));
    }

    let public_key = public_key(&auth.data().public_key)?;

    let digest = Sha1::digest(auth.signed_data());

    let signature = decode_base64(&frma.value)
        .map_err(|e| SignatureError::InvalidSignatureEncoding(e.to_string()))?;
    if signature.is_empty() {
        return Err(SignatureError::InvalidSignatureEncoding(
            "empty FRMA value".to_string(),
        ));
    }

    public_key
        .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, &signature)
        .map_err(|e| SignatureError::Mismatch(e.to_string()))
}

/// Build the RSA public key from the base64 `RSAPK` modulus and exponent.
pub fn public_key(rsapk: &RsaPublicKeyXml) -> Result<RsaPublicKey, SignatureError> {
    let modulus = decode_base64(&rsapk.modulus)
        .map_err(|e| SignatureError::InvalidModulus(e.to_string()))?;
    if modulus.iter().all(|&b| b == 0) {
        return Err(SignatureError::InvalidModulus("modulus is zero".to_string()));
    }

    let exponent = decode_base64(&rsapk.exponent)
        .map_err(|e| SignatureError::InvalidExponent(e.to_string()))?;
    let significant = exponent.iter().skip_while(|&&b| b == 0).count();
    if significant == 0 {
        return Err(SignatureError::InvalidExponent("exponent is zero".to_string()));
    }
    if significant > std::mem::size_of::<u64>() {
        return Err(SignatureError::ExponentTooLarge { bytes: significant });
    }

    RsaPublicKey::new(
        BigUint::from_bytes_be(&modulus),
        BigUint::from_bytes_be(&exponent),
    )
    .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))
}

/// Standard base64 that tolerates line breaks and indentation inside the text.
fn decode_base64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}
