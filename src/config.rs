//! Configuration for the crate's own test-harness binary (feature
//! `harness`). Not part of the library surface — the resolver and
//! validator take their collaborators as constructor arguments, not
//! environment state (SPEC_FULL.md §2 "Configuration").

use clap::Parser;

/// Knobs a host process needs to stand up a harness around the
/// resolver/validator. The HMAC algorithm and the 31-day certificate
/// lifetime cap are fixed by spec, so neither is configurable here.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "warden scope-resolution test harness", long_about = None)]
pub struct Config {
    /// Path to a JSON file of `{roleId, scopes}` records to load as
    /// the role table.
    #[arg(long, env)]
    pub role_table_path: String,
}
