//! Wildcard-aware scope comparison, normalization, and satisfaction
//! (spec.md §4.1 `ScopeAlgebra`).
//!
//! A [`Scope`] is validated once at construction; every other function
//! in this module assumes its inputs are already valid, matching the
//! teacher's pattern of validating at the edge
//! (`validation.rs::is_valid_bucket_name`) rather than re-checking on
//! every call.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::ScopeError;

/// A validated scope string: non-empty, no newline, `*` only as the
/// final character.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Scope(Arc<str>);

impl Scope {
    pub fn new(s: impl Into<String>) -> Result<Self, ScopeError> {
        let s = s.into();
        if s.is_empty() {
            return Err(ScopeError::EmptyScope);
        }
        if s.contains('\n') {
            return Err(ScopeError::NewlineInScope);
        }
        if let Some(pos) = s[..s.len() - 1].find('*') {
            return Err(ScopeError::InternalWildcard(format!("{s}@{pos}")));
        }
        Ok(Scope(Arc::from(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this scope ends in `*` (spec.md §3 "pattern").
    pub fn is_pattern(&self) -> bool {
        self.0.ends_with('*')
    }

    /// The literal prefix of a pattern (everything but the trailing
    /// `*`); for a literal scope this is the whole string.
    pub fn prefix(&self) -> &str {
        if self.is_pattern() {
            &self.0[..self.0.len() - 1]
        } else {
            &self.0
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Scope {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Total order used to canonicalize scope sets and drive DFA
/// construction (spec.md §4.1 `compare`, §4.3.2
/// `sortRolesForDFAGeneration` — the same ordering serves both).
///
/// Patterns precede their own matches: `a*` < `a` < `aa` < `aab`;
/// `*` is the minimum of any set it appears in.
pub fn compare(a: &str, b: &str) -> Ordering {
    let (ab, bb) = (a.as_bytes(), b.as_bytes());
    let n = ab.len().min(bb.len());
    for i in 0..n {
        let (ca, cb) = (ab[i], bb[i]);
        if ca == cb {
            continue;
        }
        if ca == b'*' {
            return Ordering::Less;
        }
        if cb == b'*' {
            return Ordering::Greater;
        }
        return ca.cmp(&cb);
    }
    // One is a prefix of the other (or they're equal).
    match ab.len().cmp(&bb.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Less => {
            // `b` continues past `a`; if its very next byte is `*`,
            // `b` is a pattern whose prefix is `a` and sorts first.
            if bb[ab.len()] == b'*' {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        Ordering::Greater => {
            if ab[bb.len()] == b'*' {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    }
}

/// Does `held` cover `required`? The single asymmetric wildcard
/// primitive spec.md §4.1/§4.3.1 is built from:
///
/// - a literal `required` is covered by an equal literal, or by any
///   held pattern `p*` whose prefix `p` is a literal-prefix of it;
/// - a pattern `required = r*` is covered only by `*`, by a held
///   pattern `p*` whose prefix `p` is a prefix of `r`, or by `r*`
///   itself — a held literal never covers a required pattern.
pub fn covers(held: &Scope, required: &Scope) -> bool {
    if held == required {
        return true;
    }
    if !held.is_pattern() {
        return false;
    }
    let held_prefix = held.prefix();
    if required.is_pattern() {
        required.prefix().starts_with(held_prefix)
    } else {
        required.as_str().starts_with(held_prefix)
    }
}

/// `satisfies(held, required)`: every scope in `required` is matched
/// by at least one scope in `held` (spec.md §4.1).
pub fn satisfies(held: &[Scope], required: &[Scope]) -> bool {
    required
        .iter()
        .all(|r| held.iter().any(|h| covers(h, r)))
}

/// Remove any scope covered by another scope in the same set; the
/// result is sorted by [`compare`] and in normal form (spec.md §4.1
/// `normalize`).
pub fn normalize(scopes: impl IntoIterator<Item = Scope>) -> Vec<Scope> {
    let mut sorted: Vec<Scope> = scopes.into_iter().collect();
    sorted.sort_by(|a, b| compare(a.as_str(), b.as_str()));
    sorted.dedup();
    reduce_sorted(sorted)
}

/// Drop entries covered by an earlier (broader-or-equal) entry in an
/// already-[`compare`]-sorted, duplicate-free sequence.
fn reduce_sorted(sorted: Vec<Scope>) -> Vec<Scope> {
    let mut out: Vec<Scope> = Vec::with_capacity(sorted.len());
    // Active pattern prefixes in scope, outermost-first. Because the
    // input is sorted with patterns preceding their matches, once a
    // candidate no longer shares a prefix with the stack top, nothing
    // deeper on the stack can match later candidates either.
    let mut stack: Vec<String> = Vec::new();
    for s in sorted {
        while let Some(top) = stack.last() {
            if s.as_str().starts_with(top.as_str()) {
                break;
            }
            stack.pop();
        }
        if stack.last().is_some() {
            // Covered by an active wildcard prefix; drop it.
            continue;
        }
        if s.is_pattern() {
            stack.push(s.prefix().to_string());
        }
        out.push(s);
    }
    out
}

/// Given two already-sorted, normalized sets, produce their
/// normalized union in one linear pass (spec.md §4.1
/// `mergeScopeSets`) — the resolver's hot path.
pub fn merge_scope_sets(a: &[Scope], b: &[Scope]) -> Vec<Scope> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match compare(a[i].as_str(), b[j].as_str()) {
            Ordering::Less => {
                merged.push(a[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                merged.push(b[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                merged.push(a[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    merged.dedup();
    reduce_sorted(merged)
}
