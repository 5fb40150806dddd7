//! Keyed integrity hashes
//!
//! Banks authenticate 3D form posts, callbacks and some API requests with a
//! digest over an ordered list of field values followed by a shared secret.
//! The field order is bank-specific; the engine here only knows how to join,
//! hash and compare.

use sha1::Sha1;
use sha2::{Digest, Sha512};
use tracing::{debug, warn};

use crate::payments::codec::Payload;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha512,
}

/// Hash function plus field separator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashEngine {
    pub algorithm: HashAlgorithm,
    pub separator: &'static str,
}

/// Names of the callback fields carrying the bank-declared field list, the
/// bank-declared concatenation and the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParamKeys {
    pub params: &'static str,
    pub params_val: &'static str,
    pub hash: &'static str,
}

impl HashParamKeys {
    pub const UPPERCASE: HashParamKeys = HashParamKeys {
        params: "HASHPARAMS",
        params_val: "HASHPARAMSVAL",
        hash: "HASH",
    };

    pub const LOWERCASE: HashParamKeys = HashParamKeys {
        params: "hashparams",
        params_val: "hashparamsval",
        hash: "hash",
    };
}

/// Outcome of a `HASHPARAMS` style check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCheck {
    /// Received digest equals the recomputed one
    pub digest_matches: bool,
    /// Bank-declared concatenation equals the local one
    pub values_match: bool,
}

impl HashCheck {
    pub fn is_valid(&self) -> bool {
        self.digest_matches && self.values_match
    }
}

impl HashEngine {
    pub const fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            separator: "",
        }
    }

    pub const fn with_separator(mut self, separator: &'static str) -> Self {
        self.separator = separator;
        self
    }

    /// Uppercase hex digest of `input`
    pub fn digest(&self, input: &str) -> String {
        match self.algorithm {
            HashAlgorithm::Sha1 => hex::encode_upper(Sha1::digest(input.as_bytes())),
            HashAlgorithm::Sha512 => hex::encode_upper(Sha512::digest(input.as_bytes())),
        }
    }

    /// Hash of `fields ++ [secret]` joined by the separator
    pub fn compute<S: AsRef<str>>(&self, fields: &[S], secret: &str) -> String {
        let joined = fields
            .iter()
            .map(|field| field.as_ref())
            .chain(std::iter::once(secret))
            .collect::<Vec<_>>()
            .join(self.separator);
        self.digest(&joined)
    }

    /// Recompute and compare in constant time. Case of the received digest is
    /// ignored.
    pub fn verify<S: AsRef<str>>(&self, fields: &[S], received: &str, secret: &str) -> bool {
        let expected = self.compute(fields, secret);
        constant_time_eq(&expected, &received.trim().to_ascii_uppercase())
    }

    /// Check a callback carrying its own field list.
    ///
    /// The colon-separated names in `keys.params` select the fields whose
    /// values are concatenated in that order. Both the digest over that
    /// concatenation plus `secret` and the concatenation itself must match
    /// what the bank sent.
    pub fn verify_hash_params(
        &self,
        data: &Payload,
        keys: &HashParamKeys,
        secret: &str,
    ) -> HashCheck {
        let Some(params) = data.text(keys.params) else {
            warn!("Callback carries no {} field", keys.params);
            return HashCheck {
                digest_matches: false,
                values_match: false,
            };
        };

        let values: Vec<&str> = params
            .split(':')
            .filter(|name| !name.is_empty())
            .filter_map(|name| data.get(name).and_then(|value| value.as_text()))
            .collect();
        let concatenated = values.join(self.separator);

        let received = data.text(keys.hash).unwrap_or_default();
        let declared = data.text(keys.params_val).unwrap_or_default();

        let check = HashCheck {
            digest_matches: self.verify(values.as_slice(), received, secret),
            values_match: constant_time_eq(&concatenated, declared),
        };

        if check.is_valid() {
            debug!("Hash check passed over {} fields", values.len());
        } else {
            warn!(
                "Hash check failed: digest_matches={}, values_match={}",
                check.digest_matches, check.values_match
            );
        }
        check
    }
}

/// Byte-wise comparison that does not short-circuit on the first mismatch
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
