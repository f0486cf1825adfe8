//! Loads a role table from disk and compiles it, reporting any
//! malformed roles. Exists to exercise `build_resolver` outside of
//! `cargo test`; not part of the library's contract.

use clap::Parser;
use warden::build_resolver;
use warden::config::Config;
use warden::RoleEntry;

#[derive(serde::Deserialize)]
struct RoleTableFile {
    roles: Vec<RoleEntry>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config::parse();

    let text = std::fs::read_to_string(&config.role_table_path)?;
    let table: RoleTableFile = serde_json::from_str(&text)?;

    let (resolver, errors) = build_resolver(table.roles);
    for err in &errors {
        tracing::warn!(%err, "rejected malformed role");
    }
    tracing::info!(roles_rejected = errors.len(), "resolver compiled");
    let _ = resolver;
    Ok(())
}
