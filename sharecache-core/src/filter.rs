//! Name filters for cache admission and visibility
//!
//! A [`Filter`] carries two independent predicates: one gating which names
//! may be stored, one gating which names may be found. Either may be
//! replaced without touching the other.

use crate::error::ConfigError;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied predicate over names.
pub type NameFn = dyn Fn(&str) -> bool + Send + Sync;

/// A predicate over class or resource names.
#[derive(Clone)]
pub enum NamePredicate {
    /// Matches every name.
    AcceptAll,
    /// Matches no name.
    RejectAll,
    /// Exact string match.
    Exact(String),
    /// Name starts with the given prefix.
    Prefix(String),
    /// Name ends with the given suffix.
    Suffix(String),
    /// Name contains the given substring.
    Contains(String),
    /// Name matches a regular expression.
    Regex(Regex),
    /// Logical NOT.
    Not(Box<NamePredicate>),
    /// Logical OR. An empty list matches nothing.
    AnyOf(Vec<NamePredicate>),
    /// Logical AND. An empty list matches everything.
    AllOf(Vec<NamePredicate>),
    /// Arbitrary caller predicate.
    Custom(Arc<NameFn>),
}

impl NamePredicate {
    /// Create a prefix predicate.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// Create an exact-match predicate.
    pub fn exact(name: impl Into<String>) -> Self {
        Self::Exact(name.into())
    }

    /// Create a substring predicate.
    pub fn contains(needle: impl Into<String>) -> Self {
        Self::Contains(needle.into())
    }

    /// Create a suffix predicate.
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self::Suffix(suffix.into())
    }

    /// Compile a regex predicate.
    pub fn regex(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| ConfigError::InvalidValue {
                field: "filter.regex".to_string(),
                value: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Negate a predicate.
    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: NamePredicate) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Matches every name that does not start with `prefix`.
    pub fn reject_prefix(prefix: impl Into<String>) -> Self {
        Self::not(Self::prefix(prefix))
    }

    /// Wrap a closure.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Evaluate the predicate.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::AcceptAll => true,
            Self::RejectAll => false,
            Self::Exact(s) => name == s,
            Self::Prefix(p) => name.starts_with(p.as_str()),
            Self::Suffix(s) => name.ends_with(s.as_str()),
            Self::Contains(s) => name.contains(s.as_str()),
            Self::Regex(re) => re.is_match(name),
            Self::Not(inner) => !inner.matches(name),
            Self::AnyOf(preds) => preds.iter().any(|p| p.matches(name)),
            Self::AllOf(preds) => preds.iter().all(|p| p.matches(name)),
            Self::Custom(f) => f(name),
        }
    }
}

impl Default for NamePredicate {
    fn default() -> Self {
        Self::AcceptAll
    }
}

impl fmt::Debug for NamePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AcceptAll => f.write_str("AcceptAll"),
            Self::RejectAll => f.write_str("RejectAll"),
            Self::Exact(s) => f.debug_tuple("Exact").field(s).finish(),
            Self::Prefix(s) => f.debug_tuple("Prefix").field(s).finish(),
            Self::Suffix(s) => f.debug_tuple("Suffix").field(s).finish(),
            Self::Contains(s) => f.debug_tuple("Contains").field(s).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Self::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Self::AnyOf(preds) => f.debug_tuple("AnyOf").field(preds).finish(),
            Self::AllOf(preds) => f.debug_tuple("AllOf").field(preds).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Store and find gates for one registration.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    store: NamePredicate,
    find: NamePredicate,
}

impl Filter {
    /// Create a filter with separate store and find predicates.
    pub fn new(store: NamePredicate, find: NamePredicate) -> Self {
        Self { store, find }
    }

    /// A filter that accepts every name on both paths.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Apply the same predicate to both paths.
    pub fn both(predicate: NamePredicate) -> Self {
        Self {
            store: predicate.clone(),
            find: predicate,
        }
    }

    /// Gate only stores; every name remains findable.
    pub fn store_only(predicate: NamePredicate) -> Self {
        Self {
            store: predicate,
            find: NamePredicate::AcceptAll,
        }
    }

    /// Gate only finds; every name remains storable.
    pub fn find_only(predicate: NamePredicate) -> Self {
        Self {
            store: NamePredicate::AcceptAll,
            find: predicate,
        }
    }

    /// Whether `name` may be written to the cache.
    pub fn accepts_for_store(&self, name: &str) -> bool {
        self.store.matches(name)
    }

    /// Whether `name` may be returned from the cache.
    pub fn accepts_for_find(&self, name: &str) -> bool {
        self.find.matches(name)
    }

    /// The store predicate.
    pub fn store_predicate(&self) -> &NamePredicate {
        &self.store
    }

    /// The find predicate.
    pub fn find_predicate(&self) -> &NamePredicate {
        &self.find
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// A predicate and its negation never agree.
        #[test]
        fn prop_not_inverts(prefix in "[a-z]{0,4}", name in "[a-z]{0,8}") {
            let p = NamePredicate::prefix(prefix.clone());
            let n = NamePredicate::reject_prefix(prefix);
            prop_assert_ne!(p.matches(&name), n.matches(&name));
        }

        /// Store and find gates of `both` always agree.
        #[test]
        fn prop_both_agrees(prefix in "[a-z]{0,3}", name in "[a-z]{0,6}") {
            let f = Filter::both(NamePredicate::prefix(prefix));
            prop_assert_eq!(f.accepts_for_store(&name), f.accepts_for_find(&name));
        }
    }
}
