//! Request signature validation: recovers the issuer, verifies any
//! delegated certificate, and produces the authorized scope set
//! (spec.md §4.4, in full).

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::certificate::{Certificate, RawCertificate};
use crate::client::{effective_scopes, Client, ClientLoader};
use crate::error::ValidationError;
use crate::resolver::Resolver;
use crate::scope::{self, Scope};

/// Credentials carried by an inline-MAC request (spec.md §4.4.1).
#[derive(Debug, Clone)]
pub struct Credentials {
    pub id: String,
    pub key: String,
    /// Raw (already base64-decoded by the transport layer) `ext` JSON
    /// text, if present.
    pub ext: Option<String>,
}

/// A bewit's decoded fields, equivalent in content to [`Credentials`]
/// (spec.md §4.4.5).
#[derive(Debug, Clone)]
pub struct BewitToken {
    pub id: String,
    pub key: String,
    pub ext: Option<String>,
}

/// `{method, resource, host, port, authorization?, bewit?}` (spec.md §6).
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: String,
    pub resource: String,
    pub host: String,
    pub port: u16,
    pub authorization: Option<Credentials>,
    pub bewit: Option<String>,
}

/// The off-the-shelf HMAC request-signing primitive this crate
/// consumes rather than reimplements (spec.md §1 Non-goals, §4.4.1).
/// A real deployment plugs in an actual HAWK/bewit implementation; the
/// crate's own test support ships an in-memory double.
pub trait RequestAuthenticator: Send + Sync {
    /// Verify the request's MAC against `key`. `key` is either the
    /// issuer's raw `accessToken` or, when a certificate is present,
    /// the certificate's derived access token (spec.md §4.4.4 step 8).
    fn verify_mac(&self, request: &IncomingRequest, key: &[u8]) -> bool;

    /// Decode a bewit token found on `resource`. `Err` signals a
    /// malformed token (spec.md §4.4.5).
    fn extract_bewit(&self, token: &str) -> Result<BewitToken, ()>;
}

/// Which payload shape a successful authorization was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Mac,
    Bewit,
}

/// The validator's presented result (spec.md §4.4, §6).
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Success {
        client_id: String,
        scopes: Vec<Scope>,
        scheme: Scheme,
    },
    Failed {
        message: String,
    },
}

impl AuthOutcome {
    fn failed(err: ValidationError) -> AuthOutcome {
        AuthOutcome::Failed {
            message: err.to_string(),
        }
    }
}

/// Parses authorization payloads, verifies certificates and delegation
/// constraints, and produces the authorized scope set by calling the
/// resolver (spec.md §4.4).
pub struct SignatureValidator {
    resolver: Arc<ArcSwap<Resolver>>,
    client_loader: Arc<dyn ClientLoader>,
    authenticator: Arc<dyn RequestAuthenticator>,
}

impl SignatureValidator {
    pub fn new(
        resolver: Arc<ArcSwap<Resolver>>,
        client_loader: Arc<dyn ClientLoader>,
        authenticator: Arc<dyn RequestAuthenticator>,
    ) -> Self {
        SignatureValidator {
            resolver,
            client_loader,
            authenticator,
        }
    }

    pub async fn authorize(&self, request: IncomingRequest) -> AuthOutcome {
        let (scheme, id, key, ext_text) = match self.recover_credentials(&request) {
            Ok(parts) => parts,
            Err(err) => return AuthOutcome::failed(err),
        };

        let ext = match parse_ext(ext_text.as_deref()) {
            Ok(ext) => ext,
            Err(err) => return AuthOutcome::failed(err),
        };

        let certificate = match ext.get("certificate") {
            Some(v) => match RawCertificate::from_value(v)
                .and_then(|raw| Certificate::try_from((raw, Utc::now())))
            {
                Ok(cert) => Some(cert),
                Err(err) => return AuthOutcome::failed(err),
            },
            None => None,
        };

        let (issuer_client, final_client_id) = match self
            .resolve_issuer(&id, certificate.as_ref())
            .await
        {
            Ok(pair) => pair,
            Err(err) => return AuthOutcome::failed(err),
        };

        if let Some(cert) = &certificate {
            if !cert.verify_signature(&issuer_client.access_token) {
                return AuthOutcome::failed(ValidationError::CertificateSignatureInvalid);
            }
        }

        let mac_key = match &certificate {
            Some(cert) => cert.derived_access_token(&issuer_client.access_token),
            None => issuer_client.access_token.clone(),
        };
        if !self.authenticator.verify_mac(&request, mac_key.as_bytes()) {
            warn!(client_id = %final_client_id, "MAC verification failed");
            return AuthOutcome::failed(ValidationError::MacVerificationFailed);
        }
        let _ = key; // the recovered `key` identifies the credential; the primitive verifies it.

        let resolver = self.resolver.load();
        let mut scopes = effective_scopes(&resolver, &issuer_client);

        if let Some(cert) = &certificate {
            let cert_scopes = scope::normalize(cert.scopes.clone());
            if !scope::satisfies(&scopes, &cert_scopes) {
                return AuthOutcome::failed(ValidationError::CertificateScopesNotSubsetOfIssuer(
                    issuer_client.client_id.clone(),
                ));
            }
            scopes = cert_scopes;
        }

        if let Some(authorized) = ext.get("authorizedScopes") {
            let authorized_scopes = match parse_scope_array(authorized) {
                Ok(s) => s,
                Err(()) => return AuthOutcome::failed(ValidationError::AuthorizedScopesInvalid),
            };
            let authorized_scopes = scope::normalize(authorized_scopes);
            if !scope::satisfies(&scopes, &authorized_scopes) {
                return AuthOutcome::failed(ValidationError::AuthorizedScopesOverstep);
            }
            scopes = authorized_scopes;
        }

        debug!(client_id = %final_client_id, scheme = ?scheme, "authorized");
        AuthOutcome::Success {
            client_id: final_client_id,
            scopes,
            scheme,
        }
    }

    fn recover_credentials(
        &self,
        request: &IncomingRequest,
    ) -> Result<(Scheme, String, String, Option<String>), ValidationError> {
        if let Some(token) = &request.bewit {
            let decoded = self
                .authenticator
                .extract_bewit(token)
                .map_err(|()| ValidationError::InvalidBewit)?;
            return Ok((Scheme::Bewit, decoded.id, decoded.key, decoded.ext));
        }
        if let Some(creds) = &request.authorization {
            return Ok((
                Scheme::Mac,
                creds.id.clone(),
                creds.key.clone(),
                creds.ext.clone(),
            ));
        }
        Err(ValidationError::Internal)
    }

    /// Resolve which client's `accessToken` signs this request, and the
    /// `clientId` reported on success (spec.md §4.4.4 steps 5b-6).
    async fn resolve_issuer(
        &self,
        outer_id: &str,
        certificate: Option<&Certificate>,
    ) -> Result<(Client, String), ValidationError> {
        match certificate {
            Some(cert) if cert.is_named_delegation() => {
                let name = cert.name.as_ref().expect("checked by is_named_delegation");
                let issuer_id = cert.issuer.as_ref().expect("paired with name");
                // Open question resolution (DESIGN.md): name/clientId
                // equality is checked before the issuer scope check.
                if name != outer_id {
                    return Err(ValidationError::NameNotCallerClientId);
                }
                let issuer = self
                    .client_loader
                    .load(issuer_id)
                    .await
                    .ok_or(ValidationError::NoSuchClientId)?;
                let resolver = self.resolver.load();
                let issuer_scopes = effective_scopes(&resolver, &issuer);
                let required = Scope::new(format!("auth:create-client:{name}"))
                    .map_err(|_| ValidationError::Internal)?;
                if !scope::satisfies(&issuer_scopes, std::slice::from_ref(&required)) {
                    return Err(ValidationError::IssuerCreateClientScopeMissing(
                        name.clone(),
                    ));
                }
                Ok((issuer, name.clone()))
            }
            _ => {
                let client = self
                    .client_loader
                    .load(outer_id)
                    .await
                    .ok_or(ValidationError::NoSuchClientId)?;
                let id = client.client_id.clone();
                Ok((client, id))
            }
        }
    }
}

fn parse_ext(text: Option<&str>) -> Result<serde_json::Map<String, Value>, ValidationError> {
    let text = match text {
        Some(t) => t,
        None => return Ok(serde_json::Map::new()),
    };
    let value: Value =
        serde_json::from_str(text).map_err(|_| ValidationError::ExtParseFailed)?;
    value
        .as_object()
        .cloned()
        .ok_or(ValidationError::ExtParseFailed)
}

fn parse_scope_array(v: &Value) -> Result<Vec<Scope>, ()> {
    let arr = v.as_array().ok_or(())?;
    let mut scopes = Vec::with_capacity(arr.len());
    for entry in arr {
        let s = entry.as_str().ok_or(())?;
        scopes.push(Scope::new(s).map_err(|_| ())?);
    }
    Ok(scopes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{self, RoleEntry};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeClientLoader(HashMap<String, Client>);

    #[async_trait]
    impl ClientLoader for FakeClientLoader {
        async fn load(&self, client_id: &str) -> Option<Client> {
            self.0.get(client_id).cloned()
        }
    }

    struct AllowAllAuthenticator {
        expected_key: Mutex<Option<Vec<u8>>>,
    }

    impl RequestAuthenticator for AllowAllAuthenticator {
        fn verify_mac(&self, _request: &IncomingRequest, key: &[u8]) -> bool {
            match &*self.expected_key.lock().unwrap() {
                Some(expected) => expected.as_slice() == key,
                None => true,
            }
        }
        fn extract_bewit(&self, _token: &str) -> Result<BewitToken, ()> {
            Err(())
        }
    }

    fn make_request(id: &str, ext: Option<String>) -> IncomingRequest {
        IncomingRequest {
            method: "GET".to_string(),
            resource: "/v1/thing".to_string(),
            host: "example.com".to_string(),
            port: 443,
            authorization: Some(Credentials {
                id: id.to_string(),
                key: "irrelevant".to_string(),
                ext,
            }),
            bewit: None,
        }
    }

    fn make_bewit_request(token: &str) -> IncomingRequest {
        IncomingRequest {
            method: "GET".to_string(),
            resource: "/v1/thing".to_string(),
            host: "example.com".to_string(),
            port: 443,
            authorization: None,
            bewit: Some(token.to_string()),
        }
    }

    /// Decodes one fixed token, matching the teacher's style of a
    /// single-purpose test double rather than a general fake.
    struct FixedBewitAuthenticator {
        valid_token: &'static str,
        decoded: BewitToken,
        expected_key: Option<Vec<u8>>,
    }

    impl RequestAuthenticator for FixedBewitAuthenticator {
        fn verify_mac(&self, _request: &IncomingRequest, key: &[u8]) -> bool {
            match &self.expected_key {
                Some(expected) => expected.as_slice() == key,
                None => true,
            }
        }
        fn extract_bewit(&self, token: &str) -> Result<BewitToken, ()> {
            if token == self.valid_token {
                Ok(self.decoded.clone())
            } else {
                Err(())
            }
        }
    }

    fn validator(clients: Vec<Client>, expected_key: Option<Vec<u8>>) -> SignatureValidator {
        let (roles, _) = role::parse_roles(Vec::<RoleEntry>::new());
        let roles = role::expand_roles(roles);
        let resolver = Arc::new(ArcSwap::from_pointee(Resolver::compile(&roles)));
        let loader = Arc::new(FakeClientLoader(
            clients.into_iter().map(|c| (c.client_id.clone(), c)).collect(),
        ));
        let auth = Arc::new(AllowAllAuthenticator {
            expected_key: Mutex::new(expected_key),
        });
        SignatureValidator::new(resolver, loader, auth)
    }

    #[tokio::test]
    async fn scenario_6_unknown_client_is_rejected() {
        let v = validator(vec![], None);
        let outcome = v.authorize(make_request("ghost", None)).await;
        match outcome {
            AuthOutcome::Failed { message } => assert_eq!(message, "no such clientId"),
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn scenario_7_expired_certificate_is_rejected() {
        let client = Client {
            client_id: "alice".to_string(),
            access_token: "alices-token".to_string(),
            scopes: vec![Scope::new("read:foo").unwrap()],
        };
        let v = validator(vec![client], None);
        let ext = serde_json::json!({
            "certificate": {
                "version": 1,
                "seed": "a".repeat(44),
                "start": 0,
                "expiry": 1,
                "scopes": ["read:foo"],
                "signature": "sig",
            }
        })
        .to_string();
        let outcome = v.authorize(make_request("alice", Some(ext))).await;
        match outcome {
            AuthOutcome::Failed { message } => {
                assert_eq!(message, "ext.certificate.expiry < now")
            }
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn plain_mac_request_succeeds_and_expands_scopes() {
        let client = Client {
            client_id: "alice".to_string(),
            access_token: "alices-token".to_string(),
            scopes: vec![Scope::new("read:foo").unwrap()],
        };
        let v = validator(vec![client], Some(b"alices-token".to_vec()));
        let outcome = v.authorize(make_request("alice", None)).await;
        match outcome {
            AuthOutcome::Success {
                client_id, scopes, ..
            } => {
                assert_eq!(client_id, "alice");
                assert!(scopes.iter().any(|s| s.as_str() == "read:foo"));
            }
            AuthOutcome::Failed { message } => panic!("expected success, got {message}"),
        }
    }

    #[tokio::test]
    async fn named_delegation_round_trips() {
        let seed = "s".repeat(44);
        let cert = Certificate::issue(
            seed,
            0,
            i64::MAX / 2,
            vec![Scope::new("read:foo").unwrap()],
            Some("bob".to_string()),
            Some("alice".to_string()),
            "alices-token",
        );
        let expected_key = cert.derived_access_token("alices-token");

        let issuer = Client {
            client_id: "alice".to_string(),
            access_token: "alices-token".to_string(),
            scopes: vec![
                Scope::new("read:foo").unwrap(),
                Scope::new("auth:create-client:bob").unwrap(),
            ],
        };
        let v2 = validator(vec![issuer], Some(expected_key.into_bytes()));
        let ext = serde_json::json!({
            "certificate": {
                "version": cert.version,
                "seed": cert.seed,
                "start": cert.start,
                "expiry": cert.expiry,
                "scopes": ["read:foo"],
                "signature": cert.signature,
                "name": "bob",
                "issuer": "alice",
            }
        })
        .to_string();
        let outcome = v2.authorize(make_request("bob", Some(ext))).await;
        match outcome {
            AuthOutcome::Success {
                client_id, scopes, ..
            } => {
                assert_eq!(client_id, "bob");
                assert!(scopes.iter().any(|s| s.as_str() == "read:foo"));
            }
            AuthOutcome::Failed { message } => panic!("expected success, got {message}"),
        }
    }

    #[tokio::test]
    async fn bewit_request_succeeds_and_reports_bewit_scheme() {
        let client = Client {
            client_id: "alice".to_string(),
            access_token: "alices-token".to_string(),
            scopes: vec![Scope::new("read:foo").unwrap()],
        };
        let (roles, _) = role::parse_roles(Vec::<RoleEntry>::new());
        let roles = role::expand_roles(roles);
        let resolver = Arc::new(ArcSwap::from_pointee(Resolver::compile(&roles)));
        let loader = Arc::new(FakeClientLoader(HashMap::from([(
            client.client_id.clone(),
            client,
        )])));
        let auth = Arc::new(FixedBewitAuthenticator {
            valid_token: "valid-bewit-token",
            decoded: BewitToken {
                id: "alice".to_string(),
                key: "irrelevant".to_string(),
                ext: None,
            },
            expected_key: Some(b"alices-token".to_vec()),
        });
        let v = SignatureValidator::new(resolver, loader, auth);

        let outcome = v.authorize(make_bewit_request("valid-bewit-token")).await;
        match outcome {
            AuthOutcome::Success {
                client_id,
                scopes,
                scheme,
            } => {
                assert_eq!(client_id, "alice");
                assert_eq!(scheme, Scheme::Bewit);
                assert!(scopes.iter().any(|s| s.as_str() == "read:foo"));
            }
            AuthOutcome::Failed { message } => panic!("expected success, got {message}"),
        }
    }

    #[tokio::test]
    async fn malformed_bewit_is_rejected() {
        let (roles, _) = role::parse_roles(Vec::<RoleEntry>::new());
        let roles = role::expand_roles(roles);
        let resolver = Arc::new(ArcSwap::from_pointee(Resolver::compile(&roles)));
        let loader = Arc::new(FakeClientLoader(HashMap::new()));
        let auth = Arc::new(FixedBewitAuthenticator {
            valid_token: "valid-bewit-token",
            decoded: BewitToken {
                id: "alice".to_string(),
                key: "irrelevant".to_string(),
                ext: None,
            },
            expected_key: None,
        });
        let v = SignatureValidator::new(resolver, loader, auth);

        let outcome = v.authorize(make_bewit_request("garbage")).await;
        match outcome {
            AuthOutcome::Failed { message } => {
                assert_eq!(message, "Bad Request: Invalid bewit structure")
            }
            AuthOutcome::Success { .. } => panic!("expected failure"),
        }
    }
}
