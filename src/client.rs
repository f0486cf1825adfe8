//! Clients: principals that hold scopes directly and act as issuers of
//! temporary certificates (spec.md §3 "Client").

use async_trait::async_trait;

use crate::scope::Scope;

/// A principal record: `(clientId, accessToken, scopes)` (spec.md §3,
/// §6 "Client loader").
#[derive(Debug, Clone)]
pub struct Client {
    pub client_id: String,
    pub access_token: String,
    pub scopes: Vec<Scope>,
}

/// External collaborator resolving a `clientId` to its record
/// (spec.md §6 "Client loader"). Must be safe to call concurrently;
/// we require `Send + Sync` so a resolved implementation can be shared
/// across request tasks the way the teacher shares its Postgres pool.
#[async_trait]
pub trait ClientLoader: Send + Sync {
    async fn load(&self, client_id: &str) -> Option<Client>;
}

/// The activation scope a client's own `clientId` corresponds to
/// (spec.md §3: "Expansion of a client's effective scopes treats the
/// client as if it owned a role with `roleId = "client-id:<clientId>"`").
pub fn client_role_activation(client_id: &str) -> String {
    format!("assume:client-id:{client_id}")
}

/// Expand a client's effective scopes: its own scopes plus whatever
/// role(s) its implicit `client-id:<clientId>` activation triggers.
pub fn effective_scopes(resolver: &crate::resolver::Resolver, client: &Client) -> Vec<Scope> {
    let mut queries = client.scopes.clone();
    if let Ok(activation) = Scope::new(client_role_activation(&client.client_id)) {
        queries.push(activation);
    }
    resolver.resolve(&queries)
}
