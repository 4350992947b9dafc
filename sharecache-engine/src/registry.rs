//! Classpath registry.
//!
//! Owns one [`Registration`] per registered (owner, roots) pair. A
//! registration is a private, in-process view: nothing about it is shared
//! with other processes except the store entries written through it.
//!
//! # Locking
//!
//! The registry map and each registration's mutable state sit behind their
//! own `RwLock`. Both are held only long enough to copy out a
//! [`RegistrationView`]; no lock is held across a store call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sharecache_core::{
    CacheError, CacheResult, Filter, OwnerId, PartitionToken, RegistrationId, RootRef,
};

#[derive(Debug)]
struct RegistrationState {
    roots: Vec<RootRef>,
    confirmed: bool,
    filter: Option<Filter>,
}

/// One consumer's binding to an ordered classpath.
#[derive(Debug)]
pub struct Registration {
    id: RegistrationId,
    owner: OwnerId,
    partition: PartitionToken,
    state: RwLock<RegistrationState>,
}

/// Point-in-time copy of a registration's routing state.
#[derive(Debug, Clone)]
pub struct RegistrationView {
    pub id: RegistrationId,
    pub partition: PartitionToken,
    pub roots: Vec<RootRef>,
    pub filter: Option<Filter>,
}

impl RegistrationView {
    /// Root at `index`, or `IndexOutOfRange`.
    pub fn root(&self, index: usize) -> CacheResult<&RootRef> {
        self.roots.get(index).ok_or(CacheError::IndexOutOfRange {
            index,
            len: self.roots.len(),
        })
    }
}

impl Registration {
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn partition(&self) -> &PartitionToken {
        &self.partition
    }

    fn read(&self) -> CacheResult<std::sync::RwLockReadGuard<'_, RegistrationState>> {
        self.state.read().map_err(|_| CacheError::LockPoisoned)
    }

    fn write(&self) -> CacheResult<std::sync::RwLockWriteGuard<'_, RegistrationState>> {
        self.state.write().map_err(|_| CacheError::LockPoisoned)
    }

    /// Copy the current roots and filter.
    pub fn view(&self) -> CacheResult<RegistrationView> {
        let state = self.read()?;
        Ok(RegistrationView {
            id: self.id,
            partition: self.partition.clone(),
            roots: state.roots.clone(),
            filter: state.filter.clone(),
        })
    }

    pub fn roots(&self) -> CacheResult<Vec<RootRef>> {
        Ok(self.read()?.roots.clone())
    }

    pub fn is_confirmed(&self) -> CacheResult<bool> {
        Ok(self.read()?.confirmed)
    }

    pub fn filter(&self) -> CacheResult<Option<Filter>> {
        Ok(self.read()?.filter.clone())
    }

    /// Swap the whole root list. Fails once confirmed.
    pub fn replace_roots(&self, roots: Vec<RootRef>) -> CacheResult<()> {
        validate_roots(&roots)?;
        let mut state = self.write()?;
        if state.confirmed {
            return Err(CacheError::CannotReplace {
                registration: self.id,
            });
        }
        state.roots = roots;
        Ok(())
    }

    /// Freeze the root list. Returns true if this call changed the state.
    pub fn confirm(&self) -> CacheResult<bool> {
        let mut state = self.write()?;
        let changed = !state.confirmed;
        state.confirmed = true;
        Ok(changed)
    }

    /// Replace the filter; `None` accepts everything.
    pub fn set_filter(&self, filter: Option<Filter>) -> CacheResult<()> {
        self.write()?.filter = filter;
        Ok(())
    }
}

fn validate_roots(roots: &[RootRef]) -> CacheResult<()> {
    for (index, root) in roots.iter().enumerate() {
        if root.id().is_empty() {
            return Err(CacheError::InvalidRoot {
                index,
                reason: "empty root identity".to_string(),
            });
        }
    }
    Ok(())
}

/// All live registrations of this process.
#[derive(Debug)]
pub struct ClasspathRegistry {
    registrations: RwLock<HashMap<RegistrationId, Arc<Registration>>>,
    max_registrations: usize,
}

impl ClasspathRegistry {
    pub fn new(max_registrations: usize) -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            max_registrations,
        }
    }

    /// Create an unconfirmed registration.
    pub fn register(
        &self,
        owner: OwnerId,
        partition: PartitionToken,
        roots: Vec<RootRef>,
    ) -> CacheResult<RegistrationId> {
        validate_roots(&roots)?;
        let mut map = self
            .registrations
            .write()
            .map_err(|_| CacheError::LockPoisoned)?;
        if map.len() >= self.max_registrations {
            return Err(CacheError::TooManyRegistrations {
                limit: self.max_registrations,
            });
        }

        let id = RegistrationId::new();
        map.insert(
            id,
            Arc::new(Registration {
                id,
                owner,
                partition,
                state: RwLock::new(RegistrationState {
                    roots,
                    confirmed: false,
                    filter: None,
                }),
            }),
        );
        Ok(id)
    }

    /// Look up a registration.
    pub fn get(&self, id: RegistrationId) -> CacheResult<Arc<Registration>> {
        self.registrations
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .get(&id)
            .cloned()
            .ok_or(CacheError::UnknownRegistration { registration: id })
    }

    /// Drop one registration. Returns false if it was already gone.
    pub fn unregister(&self, id: RegistrationId) -> CacheResult<bool> {
        Ok(self
            .registrations
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .remove(&id)
            .is_some())
    }

    /// Drop every registration of `owner`. Returns how many went.
    pub fn discard_owner(&self, owner: OwnerId) -> CacheResult<usize> {
        let mut map = self
            .registrations
            .write()
            .map_err(|_| CacheError::LockPoisoned)?;
        let before = map.len();
        map.retain(|_, r| r.owner != owner);
        Ok(before - map.len())
    }

    pub fn len(&self) -> CacheResult<usize> {
        Ok(self
            .registrations
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .len())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharecache_core::NamePredicate;

    fn roots(ids: &[&str]) -> Vec<RootRef> {
        ids.iter().map(|id| RootRef::archive(*id)).collect()
    }

    fn registry() -> ClasspathRegistry {
        ClasspathRegistry::new(16)
    }

    #[test]
    fn test_register_and_view() {
        let registry = registry();
        let id = registry
            .register(OwnerId::new(), PartitionToken::new("P"), roots(&["/a", "/b"]))
            .unwrap();
        let reg = registry.get(id).unwrap();
        assert!(!reg.is_confirmed().unwrap());

        let view = reg.view().unwrap();
        assert_eq!(view.partition.as_str(), "P");
        assert_eq!(view.root(1).unwrap().id(), "/b");
        assert!(matches!(
            view.root(2),
            Err(CacheError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_replace_until_confirmed() {
        let registry = registry();
        let id = registry
            .register(OwnerId::new(), PartitionToken::default(), roots(&["/a"]))
            .unwrap();
        let reg = registry.get(id).unwrap();

        reg.replace_roots(roots(&["/x", "/y"])).unwrap();
        assert_eq!(reg.roots().unwrap(), roots(&["/x", "/y"]));

        assert!(reg.confirm().unwrap());
        assert!(!reg.confirm().unwrap());
        let err = reg.replace_roots(roots(&["/z"])).unwrap_err();
        assert_eq!(err, CacheError::CannotReplace { registration: id });
        assert_eq!(reg.roots().unwrap(), roots(&["/x", "/y"]));
    }

    #[test]
    fn test_invalid_root_rejected() {
        let registry = registry();
        let err = registry
            .register(
                OwnerId::new(),
                PartitionToken::default(),
                vec![RootRef::archive("/a"), RootRef::archive("")],
            )
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidRoot { index: 1, .. }));
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_filter_replacement() {
        let registry = registry();
        let id = registry
            .register(OwnerId::new(), PartitionToken::default(), roots(&["/a"]))
            .unwrap();
        let reg = registry.get(id).unwrap();
        assert!(reg.filter().unwrap().is_none());

        reg.set_filter(Some(Filter::both(NamePredicate::prefix("java."))))
            .unwrap();
        assert!(reg.filter().unwrap().is_some());
        reg.set_filter(None).unwrap();
        assert!(reg.view().unwrap().filter.is_none());
    }

    #[test]
    fn test_limit_and_discard() {
        let registry = ClasspathRegistry::new(2);
        let owner = OwnerId::new();
        let first = registry
            .register(owner, PartitionToken::default(), roots(&["/a"]))
            .unwrap();
        registry
            .register(owner, PartitionToken::default(), roots(&["/b"]))
            .unwrap();
        assert_eq!(
            registry
                .register(OwnerId::new(), PartitionToken::default(), roots(&["/c"]))
                .unwrap_err(),
            CacheError::TooManyRegistrations { limit: 2 }
        );

        assert!(registry.unregister(first).unwrap());
        assert!(!registry.unregister(first).unwrap());
        assert!(matches!(
            registry.get(first),
            Err(CacheError::UnknownRegistration { .. })
        ));
        assert_eq!(registry.discard_owner(owner).unwrap(), 1);
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_poisoned_map_is_reported() {
        let registry = ClasspathRegistry::new(4);
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = registry.registrations.write().unwrap();
            panic!("poison the registry lock");
        }));
        assert_eq!(registry.len(), Err(CacheError::LockPoisoned));
        assert!(registry.is_empty().is_err());
    }
}
