//! Digest nonce wire format.
//!
//! A nonce carries its own expiry and a signature binding that expiry to the
//! server key, so the server keeps no per-nonce state:
//!
//! ```text
//! nonce     = base64(expiry_time + ":" + signature)
//! signature = hex(md5(expiry_time + ":" + server_key))
//! ```
//!
//! `expiry_time` is in epoch milliseconds.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::{Digest, Md5};
use subtle::ConstantTimeEq;

use crate::error::NonceError;

/// Computes the signature embedded in a nonce.
pub trait NonceSigner: Send + Sync + fmt::Debug {
    /// Sign `expiry_time` with `server_key`.
    fn sign(&self, expiry_time: i64, server_key: &str) -> String;
}

/// The default signer: `hex(md5(expiry_time ":" server_key))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5NonceSigner;

impl NonceSigner for Md5NonceSigner {
    fn sign(&self, expiry_time: i64, server_key: &str) -> String {
        hex::encode(Md5::digest(format!("{expiry_time}:{server_key}").as_bytes()))
    }
}

/// A nonce split into its two tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedNonce {
    /// Expiry in epoch milliseconds.
    pub expiry_time: i64,
    /// Signature as sent by the client.
    pub signature: String,
}

impl DecodedNonce {
    /// Whether the nonce is expired at `now_ms` (epoch milliseconds).
    #[must_use]
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expiry_time
    }
}

/// Encodes, decodes and checks Digest nonces.
#[derive(Debug, Clone)]
pub struct NonceCodec {
    signer: Arc<dyn NonceSigner>,
}

impl NonceCodec {
    /// Create a codec using a custom signer.
    #[must_use]
    pub fn new(signer: Arc<dyn NonceSigner>) -> Self {
        Self { signer }
    }

    /// Encode a nonce expiring at `expiry_time` (epoch milliseconds).
    ///
    /// # Examples
    ///
    /// ```
    /// use tollgate_auth::NonceCodec;
    ///
    /// let codec = NonceCodec::default();
    /// let nonce = codec.encode(1_000, "key");
    /// let decoded = NonceCodec::decode(&nonce).unwrap();
    /// assert_eq!(decoded.expiry_time, 1_000);
    /// assert!(codec.verify_signature(&decoded, "key"));
    /// ```
    #[must_use]
    pub fn encode(&self, expiry_time: i64, server_key: &str) -> String {
        let signature = self.signer.sign(expiry_time, server_key);
        BASE64.encode(format!("{expiry_time}:{signature}"))
    }

    /// Decode a nonce into its expiry and signature without checking either.
    pub fn decode(nonce: &str) -> Result<DecodedNonce, NonceError> {
        let bytes = BASE64.decode(nonce).map_err(|_| NonceError::NotBase64)?;
        let plain = String::from_utf8(bytes).map_err(|_| NonceError::NotBase64)?;

        let tokens: Vec<&str> = plain.split(':').collect();
        let [expiry, signature] = tokens.as_slice() else {
            return Err(NonceError::WrongTokenCount(tokens.len()));
        };

        let expiry_time = expiry
            .parse::<i64>()
            .map_err(|_| NonceError::NonNumericExpiry((*expiry).to_owned()))?;

        Ok(DecodedNonce {
            expiry_time,
            signature: (*signature).to_owned(),
        })
    }

    /// Check, in constant time, that the nonce was signed with `server_key`.
    #[must_use]
    pub fn verify_signature(&self, nonce: &DecodedNonce, server_key: &str) -> bool {
        let expected = self.signer.sign(nonce.expiry_time, server_key);
        expected.as_bytes().ct_eq(nonce.signature.as_bytes()).into()
    }
}

impl Default for NonceCodec {
    fn default() -> Self {
        Self::new(Arc::new(Md5NonceSigner))
    }
}
