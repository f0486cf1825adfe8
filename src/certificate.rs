//! Temporary certificates: signed, time-bounded scope delegations
//! (spec.md §3 "Temporary certificate", §4.4.3).
//!
//! Parsing follows spec.md §9's guidance against runtime-type dispatch:
//! [`RawCertificate`] pulls the raw JSON values for every recognized
//! field up front, and [`TryFrom`] turns that into a validated
//! [`Certificate`] in one pass (type checks, seed length, version,
//! time window, name/issuer pairing — spec.md §4.4.4 steps 2-5a).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::error::ValidationError;
use crate::scope::Scope;

type HmacSha256 = Hmac<Sha256>;

/// The certificate's fields as raw JSON values, before type checking.
/// Mirrors the "tagged sum, validate up front" shape spec.md §9 calls
/// for instead of matching on `serde_json::Value` variants ad hoc
/// throughout the validator.
pub struct RawCertificate {
    version: Value,
    seed: Value,
    start: Value,
    expiry: Value,
    scopes: Value,
    signature: Value,
    name: Option<Value>,
    issuer: Option<Value>,
}

impl RawCertificate {
    /// Pull the recognized fields out of `ext.certificate` (spec.md
    /// §4.4.3 "Required fields" / "Optional fields").
    pub fn from_value(v: &Value) -> Result<RawCertificate, ValidationError> {
        let obj = v.as_object().ok_or(ValidationError::CertificateNotObject)?;
        Ok(RawCertificate {
            version: obj.get("version").cloned().unwrap_or(Value::Null),
            seed: obj.get("seed").cloned().unwrap_or(Value::Null),
            start: obj.get("start").cloned().unwrap_or(Value::Null),
            expiry: obj.get("expiry").cloned().unwrap_or(Value::Null),
            scopes: obj.get("scopes").cloned().unwrap_or(Value::Null),
            signature: obj.get("signature").cloned().unwrap_or(Value::Null),
            name: obj.get("name").cloned(),
            issuer: obj.get("issuer").cloned(),
        })
    }
}

/// A validated temporary certificate (spec.md §4.4.3). Validity here
/// covers only fields internal to the certificate itself; the
/// cross-checks against the outer request (name/clientId, issuer
/// scopes, signature, client lookup) are the validator's job
/// (spec.md §4.4.4 steps 5b-8).
#[derive(Debug, Clone)]
pub struct Certificate {
    pub version: i64,
    pub seed: String,
    pub start: i64,
    pub expiry: i64,
    pub scopes: Vec<Scope>,
    pub signature: String,
    pub name: Option<String>,
    pub issuer: Option<String>,
}

impl TryFrom<(RawCertificate, DateTime<Utc>)> for Certificate {
    type Error = ValidationError;

    fn try_from((raw, now): (RawCertificate, DateTime<Utc>)) -> Result<Self, Self::Error> {
        let version = raw
            .version
            .as_i64()
            .ok_or(ValidationError::CertificateVersionNotInteger)?;
        let seed = raw
            .seed
            .as_str()
            .ok_or(ValidationError::CertificateSeedNotString)?
            .to_string();
        if seed.chars().count() != 44 {
            return Err(ValidationError::CertificateSeedWrongLength);
        }
        let start = raw
            .start
            .as_i64()
            .ok_or(ValidationError::CertificateStartNotInteger)?;
        let expiry = raw
            .expiry
            .as_i64()
            .ok_or(ValidationError::CertificateExpiryNotInteger)?;
        let scopes_array = raw
            .scopes
            .as_array()
            .ok_or(ValidationError::CertificateScopesNotArray)?;
        let mut scopes = Vec::with_capacity(scopes_array.len());
        for entry in scopes_array {
            let s = entry
                .as_str()
                .ok_or(ValidationError::CertificateScopesInvalid)?;
            scopes.push(Scope::new(s).map_err(|_| ValidationError::CertificateScopesInvalid)?);
        }
        let signature = raw
            .signature
            .as_str()
            .ok_or(ValidationError::CertificateSignatureNotString)?
            .to_string();
        let name = match raw.name {
            Some(v) => Some(
                v.as_str()
                    .ok_or(ValidationError::CertificateNameNotString)?
                    .to_string(),
            ),
            None => None,
        };
        let issuer = match raw.issuer {
            Some(v) => Some(
                v.as_str()
                    .ok_or(ValidationError::CertificateIssuerNotString)?
                    .to_string(),
            ),
            None => None,
        };

        if version != 1 {
            return Err(ValidationError::CertificateVersionUnsupported);
        }

        let now_ms = now.timestamp_millis();
        if start > now_ms {
            return Err(ValidationError::CertificateNotYetValid);
        }
        if expiry < now_ms {
            return Err(ValidationError::CertificateExpired);
        }
        const THIRTY_ONE_DAYS_MS: i64 = 31 * 24 * 60 * 60 * 1000;
        if expiry - start > THIRTY_ONE_DAYS_MS {
            return Err(ValidationError::CertificateTooLong);
        }

        match (&name, &issuer) {
            (Some(_), None) => return Err(ValidationError::NameWithoutIssuer),
            (None, Some(_)) => return Err(ValidationError::IssuerWithoutName),
            (Some(name), Some(issuer)) if name == issuer => {
                return Err(ValidationError::NameEqualsIssuer)
            }
            _ => {}
        }

        Ok(Certificate {
            version,
            seed,
            start,
            expiry,
            scopes,
            signature,
            name,
            issuer,
        })
    }
}

impl Certificate {
    /// True for a named-delegation certificate (spec.md §4.4.3
    /// "Optional fields").
    pub fn is_named_delegation(&self) -> bool {
        self.name.is_some()
    }

    /// The canonical line-separated signing payload (spec.md §4.4.3).
    pub fn canonical_payload(&self) -> String {
        let mut lines = vec![format!("version:{}", self.version)];
        if let Some(name) = &self.name {
            lines.push(format!("name:{name}"));
        }
        if let Some(issuer) = &self.issuer {
            lines.push(format!("issuer:{issuer}"));
        }
        lines.push(format!("seed:{}", self.seed));
        lines.push(format!("start:{}", self.start));
        lines.push(format!("expiry:{}", self.expiry));
        lines.push("scopes:".to_string());
        for s in &self.scopes {
            lines.push(s.as_str().to_string());
        }
        lines.join("\n")
    }

    /// Recompute the signature over `canonical_payload` keyed by the
    /// issuer's access token and compare it, constant-time, against
    /// the claimed `signature` (spec.md §4.4.4 step 7, §9 "Constant-time
    /// comparison").
    pub fn verify_signature(&self, issuer_access_token: &str) -> bool {
        let expected = sign(issuer_access_token.as_bytes(), self.canonical_payload().as_bytes());
        constant_time_eq::constant_time_eq(expected.as_bytes(), self.signature.as_bytes())
    }

    /// `HMAC-SHA256(issuer.accessToken, seed)`, base64 URL-safe,
    /// unpadded (spec.md §4.4.3 "derived access token").
    pub fn derived_access_token(&self, issuer_access_token: &str) -> String {
        sign(issuer_access_token.as_bytes(), self.seed.as_bytes())
    }

    /// Build and sign a certificate from already-validated fields.
    /// Exists for tests exercising invariant 6 (signature round-trip)
    /// and for callers that issue certificates rather than validate
    /// received ones.
    pub fn issue(
        seed: String,
        start: i64,
        expiry: i64,
        scopes: Vec<Scope>,
        name: Option<String>,
        issuer: Option<String>,
        issuer_access_token: &str,
    ) -> Certificate {
        let mut cert = Certificate {
            version: 1,
            seed,
            start,
            expiry,
            scopes,
            signature: String::new(),
            name,
            issuer,
        };
        cert.signature = sign(issuer_access_token.as_bytes(), cert.canonical_payload().as_bytes());
        cert
    }
}

fn sign(key: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}
