//! The tracked global scope of an isolate.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{SandboxError, SandboxResult};

/// Keys that may never be bound, whatever the caller.
const RESERVED_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// One scope binding with property-descriptor semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot<V> {
    /// The bound value.
    pub value: V,
    /// Whether the value may be replaced.
    pub writable: bool,
    /// Whether the binding may be redefined or removed.
    pub configurable: bool,
}

/// An isolate's global scope: named slots plus a tracking set of every key
/// injected on behalf of the current request.
///
/// `reset(keep)` removes exactly the tracked keys not named in `keep`,
/// which is what lets tool teardown be force-completed even when a tool's
/// own teardown fails.
#[derive(Debug, Default)]
pub struct Scope<V> {
    slots: BTreeMap<String, Slot<V>>,
    injected: BTreeSet<String>,
    locked_names: BTreeSet<String>,
}

impl<V> Scope<V> {
    /// An empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            injected: BTreeSet::new(),
            locked_names: BTreeSet::new(),
        }
    }

    fn check_key(&self, key: &str) -> SandboxResult<()> {
        if RESERVED_KEYS.contains(&key) {
            return Err(SandboxError::ReservedKey(key.to_string()));
        }
        if key.contains('.') {
            return Err(SandboxError::DottedKey(key.to_string()));
        }
        if self.locked_names.contains(key) {
            return Err(SandboxError::LockedName(key.to_string()));
        }
        Ok(())
    }

    /// Define a binding with explicit descriptor flags. Does not track the
    /// key as injected; used for baseline bindings the runtime owns.
    ///
    /// # Errors
    ///
    /// Rejects reserved, dotted, and locked keys, and refuses to redefine a
    /// non-configurable binding.
    pub fn define(
        &mut self,
        key: impl Into<String>,
        value: V,
        writable: bool,
        configurable: bool,
    ) -> SandboxResult<()> {
        let key = key.into();
        self.check_key(&key)?;
        if let Some(existing) = self.slots.get(&key)
            && !existing.configurable
        {
            return Err(SandboxError::NotWritable(key));
        }
        self.slots.insert(
            key,
            Slot {
                value,
                writable,
                configurable,
            },
        );
        Ok(())
    }

    /// Inject a per-request binding: non-writable, non-configurable, and
    /// tracked for removal by [`Scope::reset`].
    ///
    /// Injection is idempotent: if the key already holds a
    /// non-configurable binding the call is a no-op.
    ///
    /// # Errors
    ///
    /// Rejects reserved, dotted, and locked keys.
    pub fn inject(&mut self, key: impl Into<String>, value: V) -> SandboxResult<()> {
        let key = key.into();
        self.check_key(&key)?;
        if let Some(existing) = self.slots.get(&key) {
            if !existing.configurable {
                return Ok(());
            }
        }
        self.slots.insert(
            key.clone(),
            Slot {
                value,
                writable: false,
                configurable: false,
            },
        );
        self.injected.insert(key);
        Ok(())
    }

    /// Remove every injected key not named in `keep`. Returns the removed
    /// keys.
    pub fn reset(&mut self, keep: &[&str]) -> Vec<String> {
        let to_remove: Vec<String> = self
            .injected
            .iter()
            .filter(|key| !keep.contains(&key.as_str()))
            .cloned()
            .collect();
        for key in &to_remove {
            self.slots.remove(key);
            self.injected.remove(key);
        }
        to_remove
    }

    /// Make every current binding non-writable and non-configurable.
    /// Returns the number of slots sealed.
    pub fn seal_all(&mut self) -> usize {
        let mut sealed: usize = 0;
        for slot in self.slots.values_mut() {
            if slot.writable || slot.configurable {
                slot.writable = false;
                slot.configurable = false;
                sealed = sealed.saturating_add(1);
            }
        }
        sealed
    }

    /// Forbid any future binding of `name`.
    pub fn lock_name(&mut self, name: impl Into<String>) {
        self.locked_names.insert(name.into());
    }

    /// Whether `name` is locked against binding.
    #[must_use]
    pub fn is_locked(&self, name: &str) -> bool {
        self.locked_names.contains(name)
    }

    /// Look up a binding.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Slot<V>> {
        self.slots.get(key)
    }

    /// Whether a binding exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// All binding names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// All bindings in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Slot<V>)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The keys currently tracked as injected.
    pub fn injected_keys(&self) -> impl Iterator<Item = &str> {
        self.injected.iter().map(String::as_str)
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the scope has no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether every binding is sealed (non-writable, non-configurable).
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.slots
            .values()
            .all(|slot| !slot.writable && !slot.configurable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_and_dotted_keys_are_rejected() {
        let mut scope: Scope<i64> = Scope::new();
        assert_eq!(
            scope.inject("__proto__", 1),
            Err(SandboxError::ReservedKey("__proto__".into()))
        );
        assert_eq!(
            scope.inject("constructor", 1),
            Err(SandboxError::ReservedKey("constructor".into()))
        );
        assert_eq!(
            scope.inject("a.b", 1),
            Err(SandboxError::DottedKey("a.b".into()))
        );
        assert!(scope.is_empty());
    }

    #[test]
    fn inject_is_idempotent_over_sealed_slots() {
        let mut scope: Scope<i64> = Scope::new();
        scope.inject("crypto", 1).unwrap();
        scope.inject("crypto", 2).unwrap();
        assert_eq!(scope.get("crypto").unwrap().value, 1);
    }

    #[test]
    fn reset_removes_exactly_the_injected_keys() {
        let mut scope: Scope<i64> = Scope::new();
        scope.define("console", 0, false, false).unwrap();
        scope.inject("crypto", 1).unwrap();
        scope.inject("db", 2).unwrap();
        scope.inject("channel", 3).unwrap();

        let removed = scope.reset(&["db"]);
        assert_eq!(removed.len(), 2);
        assert!(scope.contains("console"));
        assert!(scope.contains("db"));
        assert!(!scope.contains("crypto"));
        assert!(!scope.contains("channel"));

        // A second reset clears the kept key too.
        let removed = scope.reset(&[]);
        assert_eq!(removed, vec!["db".to_string()]);
    }

    #[test]
    fn locked_names_cannot_be_bound() {
        let mut scope: Scope<i64> = Scope::new();
        scope.lock_name("eval");
        assert_eq!(
            scope.inject("eval", 1),
            Err(SandboxError::LockedName("eval".into()))
        );
        assert!(scope.is_locked("eval"));
    }

    #[test]
    fn seal_all_reports_count_and_sticks() {
        let mut scope: Scope<i64> = Scope::new();
        scope.define("a", 1, true, true).unwrap();
        scope.define("b", 2, false, false).unwrap();
        assert_eq!(scope.seal_all(), 1);
        assert!(scope.is_sealed());
        assert_eq!(
            scope.define("a", 9, true, true),
            Err(SandboxError::NotWritable("a".into()))
        );
    }
}
