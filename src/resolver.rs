//! Compiles a role table into a character DFA that maps a query scope
//! to the union of every activated role's scope set in O(|query|)
//! time (spec.md §4.3 `DFAResolver`).
//!
//! Construction sorts roles by [`scope::compare`] applied to their
//! activation pattern (spec.md §4.3.2 `sortRolesForDFAGeneration` is
//! the same total order `ScopeAlgebra::compare` already provides —
//! patterns precede their matches either way), then recursively
//! partitions the sorted window by character, exactly as spec.md
//! §4.3.3 describes. Accept sets are indices into a single shared
//! table so that `M` distinct scope sets across `N` states cost
//! `O(M)`, not `O(N)`, allocations (spec.md §9).

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::role::Role;
use crate::scope::{self, Scope};

type StateId = usize;

#[derive(Debug)]
struct DfaState {
    /// Chain of set-table indices active once this state is reached —
    /// already includes everything inherited from ancestor wildcards.
    accept: Vec<usize>,
    transitions: HashMap<u8, StateId>,
    /// Transition for any byte not in `transitions`.
    default: StateId,
}

/// A compiled, immutable, `Send + Sync` lookup function over a role
/// table snapshot (spec.md §5: safe to share across any number of
/// concurrent readers).
#[derive(Debug)]
pub struct Resolver {
    states: Vec<DfaState>,
    sets: Vec<Vec<Scope>>,
    root: StateId,
}

impl Resolver {
    /// Compile a (post-expansion) role list into a resolver. This is
    /// the one-time construction step; callers serialize rebuilds and
    /// publish the result via [`crate::swap`] (spec.md §5).
    pub fn compile(roles: &[Role]) -> Resolver {
        let mut refs: Vec<&Role> = roles.iter().collect();
        refs.sort_by(|a, b| scope::compare(a.activation().as_str(), b.activation().as_str()));

        let mut builder = Builder {
            states: Vec::new(),
            sets: Vec::new(),
            set_index: HashMap::new(),
            leaf_cache: HashMap::new(),
        };
        let root = builder.build(&refs, 0, Vec::new());
        debug!(
            roles = roles.len(),
            states = builder.states.len(),
            sets = builder.sets.len(),
            "compiled DFA resolver"
        );
        Resolver {
            states: builder.states,
            sets: builder.sets,
            root,
        }
    }

    fn transition(&self, state: StateId, byte: u8) -> StateId {
        let st = &self.states[state];
        *st.transitions.get(&byte).unwrap_or(&st.default)
    }

    fn collect_into(&self, state: StateId, seen: &mut HashSet<usize>, acc: &mut Vec<usize>) {
        for &idx in &self.states[state].accept {
            if seen.insert(idx) {
                acc.push(idx);
            }
        }
    }

    /// Union every accept set reachable from `start`, including
    /// through self-looping fallback states (spec.md §4.3.4: "a
    /// wildcard in the query admits all continuations").
    fn collect_reachable(&self, start: StateId, seen: &mut HashSet<usize>, acc: &mut Vec<usize>) {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(s) = stack.pop() {
            if !visited.insert(s) {
                continue;
            }
            self.collect_into(s, seen, acc);
            let st = &self.states[s];
            stack.extend(st.transitions.values().copied());
            stack.push(st.default);
        }
    }

    /// Evaluate a single query scope against the compiled DFA,
    /// returning the (normalized) union of every role whose activation
    /// pattern intersects it (spec.md §4.3.1, §4.3.4). This is the
    /// pure DFA primitive; it does not pass literal non-role queries
    /// through — see [`Resolver::resolve`] for that.
    pub fn resolve_one(&self, query: &Scope) -> Vec<Scope> {
        let q = query.as_str();
        let (literal, is_pattern) = if query.is_pattern() {
            (&q[..q.len() - 1], true)
        } else {
            (q, false)
        };

        let mut seen = HashSet::new();
        let mut acc = Vec::new();
        let mut state = self.root;
        self.collect_into(state, &mut seen, &mut acc);
        for &byte in literal.as_bytes() {
            state = self.transition(state, byte);
            self.collect_into(state, &mut seen, &mut acc);
        }
        if is_pattern {
            self.collect_reachable(state, &mut seen, &mut acc);
        }

        let mut result: Vec<Scope> = Vec::new();
        for idx in acc {
            result = scope::merge_scope_sets(&result, &self.sets[idx]);
        }
        result
    }

    /// The top-level lookup (spec.md §4.3.1, last paragraph, and §2
    /// "Data flow"): queries that don't begin with `assume:` pass
    /// through unchanged, merged with whatever `assume:`-bearing
    /// queries activate.
    pub fn resolve(&self, queries: &[Scope]) -> Vec<Scope> {
        let mut result = scope::normalize(queries.iter().cloned());
        for q in queries {
            let expanded = self.resolve_one(q);
            if !expanded.is_empty() {
                result = scope::merge_scope_sets(&result, &expanded);
            }
        }
        result
    }
}

struct Builder<'a> {
    states: Vec<DfaState>,
    sets: Vec<Vec<Scope>>,
    set_index: HashMap<Vec<Scope>, usize>,
    /// Self-looping fallback/dead states are shared by their inherited
    /// chain so an all-literal subtree doesn't allocate a fresh state
    /// per remaining byte value.
    leaf_cache: HashMap<Vec<usize>, StateId>,
}

impl<'a> Builder<'a> {
    fn set_id_for(&mut self, scopes: &[Scope]) -> usize {
        if let Some(&id) = self.set_index.get(scopes) {
            return id;
        }
        let id = self.sets.len();
        self.sets.push(scopes.to_vec());
        self.set_index.insert(scopes.to_vec(), id);
        id
    }

    /// Build the state for `window` (roles sharing the prefix
    /// consumed so far) at character depth `depth`, given the chain of
    /// set-table indices inherited from enclosing wildcard roles.
    fn build(&mut self, window: &[&'a Role], depth: usize, inherited: Vec<usize>) -> StateId {
        if window.is_empty() {
            if let Some(&id) = self.leaf_cache.get(&inherited) {
                return id;
            }
            let id = self.states.len();
            self.states.push(DfaState {
                accept: inherited.clone(),
                transitions: HashMap::new(),
                default: id,
            });
            self.leaf_cache.insert(inherited, id);
            return id;
        }

        let mut own_accept = inherited.clone();
        let mut child_inherited = inherited;
        let mut idx = 0;
        while idx < window.len() {
            let activation = window[idx].activation().as_str();
            if activation.len() == depth {
                let set_id = self.set_id_for(window[idx].scopes());
                own_accept.push(set_id);
                idx += 1;
            } else if activation.len() == depth + 1 && activation.as_bytes()[depth] == b'*' {
                let set_id = self.set_id_for(window[idx].scopes());
                own_accept.push(set_id);
                child_inherited.push(set_id);
                idx += 1;
            } else {
                break;
            }
        }

        let remaining = &window[idx..];
        let mut transitions = HashMap::new();
        let mut i = 0;
        while i < remaining.len() {
            let c = remaining[i].activation().as_str().as_bytes()[depth];
            let mut j = i + 1;
            while j < remaining.len()
                && remaining[j].activation().as_str().as_bytes()[depth] == c
            {
                j += 1;
            }
            let child = self.build(&remaining[i..j], depth + 1, child_inherited.clone());
            transitions.insert(c, child);
            i = j;
        }
        let default = self.build(&[], depth + 1, child_inherited);

        let id = self.states.len();
        self.states.push(DfaState {
            accept: own_accept,
            transitions,
            default,
        });
        id
    }
}
