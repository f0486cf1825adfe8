//! Role expansion: turning a role table into closed roles (spec.md §4.2
//! `RoleExpander`).
//!
//! Expansion is a least fixed point over
//! `F(R) = R.scopes ∪ ⋃ { R'.scopes : R' activated by some s ∈ R.scopes }`.
//! We iterate full passes over the role list until a pass produces no
//! growth anywhere — simple and obviously correct. This runs once per
//! role-table load, off the request hot path that [`crate::resolver`]
//! owns, so we don't chase the SCC-collapse/topological-condensation
//! optimizations spec.md §4.2 calls out as permitted but not required.

use tracing::debug;

use crate::error::RoleTableError;
use crate::scope::{self, Scope};

/// One row of the external role table (spec.md §6 `Role table`).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RoleEntry {
    #[serde(rename = "roleId")]
    pub role_id: String,
    pub scopes: Vec<String>,
}

/// A role with its activation pattern and (initially unexpanded)
/// scope set.
#[derive(Debug, Clone)]
pub struct Role {
    role_id: Scope,
    activation: Scope,
    scopes: Vec<Scope>,
}

impl Role {
    /// The `roleId` (itself scope-like; may end in `*`).
    pub fn role_id(&self) -> &Scope {
        &self.role_id
    }

    /// `assume:<roleId>` — the scope that activates this role.
    pub fn activation(&self) -> &Scope {
        &self.activation
    }

    /// The role's (closed, once expanded) scope set.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }
}

/// Parse and validate a role table, reporting malformed entries rather
/// than failing the whole load (spec.md §4.2 "Failure", §7).
pub fn parse_roles(entries: impl IntoIterator<Item = RoleEntry>) -> (Vec<Role>, Vec<RoleTableError>) {
    let mut roles = Vec::new();
    let mut errors = Vec::new();
    for entry in entries {
        match build_role(&entry) {
            Ok(role) => roles.push(role),
            Err(source) => errors.push(RoleTableError {
                role_id: entry.role_id,
                source,
            }),
        }
    }
    (roles, errors)
}

fn build_role(entry: &RoleEntry) -> Result<Role, crate::error::ScopeError> {
    let role_id = Scope::new(entry.role_id.clone())?;
    let activation = Scope::new(format!("assume:{}", entry.role_id))?;
    let mut scopes = Vec::with_capacity(entry.scopes.len());
    for s in &entry.scopes {
        scopes.push(Scope::new(s.clone())?);
    }
    Ok(Role {
        role_id,
        activation,
        scopes: scope::normalize(scopes),
    })
}

/// Expand every role to its closed form (spec.md §4.2, §8 invariant 5).
///
/// Never panics on cyclic role graphs: growth is monotonic and bounded
/// by the finite universe of scopes appearing (syntactically, plus
/// wildcard composition) in the table, so the loop below always
/// terminates.
pub fn expand_roles(mut roles: Vec<Role>) -> Vec<Role> {
    loop {
        let mut changed = false;
        for i in 0..roles.len() {
            let current = roles[i].scopes.clone();
            let mut additions: Vec<Scope> = Vec::new();
            for s in &current {
                for role_j in &roles {
                    if scope::covers(s, role_j.activation()) {
                        additions.extend(role_j.scopes.iter().cloned());
                    }
                }
            }
            if additions.is_empty() {
                continue;
            }
            let merged = scope::merge_scope_sets(&current, &scope::normalize(additions));
            if merged != current {
                roles[i].scopes = merged;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    debug!(role_count = roles.len(), "role expansion reached fixed point");
    roles
}
