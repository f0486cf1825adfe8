//! Error types for the scope algebra, role expansion, and signature
//! validation surfaces.
//!
//! Validation failures are classified but flat (SPEC_FULL.md §7): every
//! `ValidationError` variant's `Display` output is the stable message
//! string a caller branches on, so changing these strings is a breaking
//! change even though the enum itself is free to grow.

use thiserror::Error;

/// A scope string failed the syntactic rules in spec.md §3.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("scope must not be empty")]
    EmptyScope,
    #[error("scope must not contain a newline")]
    NewlineInScope,
    #[error("scope `{0}` contains a `*` that is not the final character")]
    InternalWildcard(String),
}

/// A single malformed role, reported back to the role-table supplier
/// without poisoning the rest of the table (spec.md §4.2, §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("role `{role_id}` rejected: {source}")]
pub struct RoleTableError {
    pub role_id: String,
    #[source]
    pub source: ScopeError,
}

/// Flat, stable-message validation failures produced by
/// [`crate::validator::SignatureValidator`]. `Display` output is part of
/// the external contract (spec.md §4.4, §7) and must not be reworded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Failed to parse ext")]
    ExtParseFailed,

    #[error("ext.certificate must be an object")]
    CertificateNotObject,
    #[error("ext.certificate.version must be an integer")]
    CertificateVersionNotInteger,
    #[error("ext.certificate.seed must be a string")]
    CertificateSeedNotString,
    #[error("ext.certificate.seed must be 44 characters")]
    CertificateSeedWrongLength,
    #[error("ext.certificate.start must be an integer")]
    CertificateStartNotInteger,
    #[error("ext.certificate.expiry must be an integer")]
    CertificateExpiryNotInteger,
    #[error("ext.certificate.scopes must be an array")]
    CertificateScopesNotArray,
    #[error("ext.certificate.scopes must be valid scopes")]
    CertificateScopesInvalid,
    #[error("ext.certificate.signature must be a string")]
    CertificateSignatureNotString,
    #[error("ext.certificate.name must be a string")]
    CertificateNameNotString,
    #[error("ext.certificate.issuer must be a string")]
    CertificateIssuerNotString,

    #[error("ext.certificate.version must be 1")]
    CertificateVersionUnsupported,

    #[error("ext.certificate.start > now")]
    CertificateNotYetValid,
    #[error("ext.certificate.expiry < now")]
    CertificateExpired,
    #[error("ext.certificate cannot last longer than 31 days!")]
    CertificateTooLong,

    #[error("name must only be used with issuer")]
    NameWithoutIssuer,
    #[error("issuer must only be used with name")]
    IssuerWithoutName,
    #[error("name must not equal issuer")]
    NameEqualsIssuer,
    #[error("name must match the clientId of the caller")]
    NameNotCallerClientId,
    #[error("ext.certificate issuer lacks `auth:create-client:{0}`")]
    IssuerCreateClientScopeMissing(String),

    #[error("no such clientId")]
    NoSuchClientId,

    #[error("ext.certificate.signature is not valid")]
    CertificateSignatureInvalid,
    #[error("ext.certificate issuer `{0}` doesn't have sufficient scopes")]
    CertificateScopesNotSubsetOfIssuer(String),
    #[error("ext.authorizedScopes oversteps your scopes")]
    AuthorizedScopesOverstep,

    #[error("ext.authorizedScopes must be an array of valid scopes")]
    AuthorizedScopesInvalid,

    #[error("Bad Request: Invalid bewit structure")]
    InvalidBewit,

    #[error("request signature verification failed")]
    MacVerificationFailed,

    #[error("internal error")]
    Internal,
}
