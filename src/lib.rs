//! Scope resolution and request-signature authorization kernel.
//!
//! Four components, leaf-first:
//!
//! - [`scope`] — wildcard-aware comparison, normalization, satisfaction.
//! - [`role`] — fixed-point expansion of role dependencies into closed roles.
//! - [`resolver`] — compiles closed roles into a character DFA.
//! - [`validator`] — parses authorization payloads, verifies delegated
//!   certificates, and produces the authorized scope set by calling
//!   the resolver.
//!
//! `client` and `certificate` are the data types the validator and
//! resolver share. HTTP transport, persistence, role/client CRUD, and
//! the wire MAC/bewit algorithm itself are out of scope; this crate
//! consumes them through [`client::ClientLoader`] and
//! [`validator::RequestAuthenticator`].

pub mod certificate;
pub mod client;
#[cfg(feature = "harness")]
pub mod config;
pub mod error;
pub mod resolver;
pub mod role;
pub mod scope;
pub mod validator;

pub use certificate::Certificate;
pub use client::{Client, ClientLoader};
pub use error::{RoleTableError, ScopeError, ValidationError};
pub use resolver::Resolver;
pub use role::{Role, RoleEntry};
pub use scope::Scope;
pub use validator::{AuthOutcome, IncomingRequest, RequestAuthenticator, Scheme, SignatureValidator};

/// Parse, validate, expand, and compile a role table in one call
/// (spec.md §2 data flow: role table → closed roles → resolver).
/// Malformed entries are reported rather than poisoning the build
/// (spec.md §4.2, §7).
pub fn build_resolver(
    entries: impl IntoIterator<Item = RoleEntry>,
) -> (Resolver, Vec<RoleTableError>) {
    let (roles, errors) = role::parse_roles(entries);
    let roles = role::expand_roles(roles);
    (Resolver::compile(&roles), errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_resolver_reports_malformed_roles_without_failing_the_build() {
        let (resolver, errors) = build_resolver(vec![
            RoleEntry {
                role_id: "good".to_string(),
                scopes: vec!["X".to_string()],
            },
            RoleEntry {
                role_id: "ba\nd".to_string(),
                scopes: vec!["Y".to_string()],
            },
        ]);
        assert_eq!(errors.len(), 1);
        let got = resolver.resolve_one(&Scope::new("assume:good").unwrap());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].as_str(), "X");
    }
}
