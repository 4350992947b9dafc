//! Filter evaluation for the store and find paths.
//!
//! A registration holds at most one [`Filter`]; `None` accepts everything.
//! The two gates are evaluated independently so a policy can stop new
//! entries for a pattern while earlier entries stay retrievable.

use sharecache_core::Filter;

/// Which path a name is being checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Store,
    Find,
}

impl Gate {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Find => "find",
        }
    }
}

/// Evaluate `filter` for `name` on one gate.
pub fn admits(filter: Option<&Filter>, gate: Gate, name: &str) -> bool {
    let accepted = match (filter, gate) {
        (None, _) => true,
        (Some(f), Gate::Store) => f.accepts_for_store(name),
        (Some(f), Gate::Find) => f.accepts_for_find(name),
    };
    if !accepted {
        tracing::debug!(gate = gate.as_str(), name, "Name rejected by filter");
    }
    accepted
}

/// Store gate.
pub fn accepts_for_store(filter: Option<&Filter>, name: &str) -> bool {
    admits(filter, Gate::Store, name)
}

/// Find gate.
pub fn accepts_for_find(filter: Option<&Filter>, name: &str) -> bool {
    admits(filter, Gate::Find, name)
}
