//! Registries of the builtin namespaces and API types an isolate installs.

use std::collections::BTreeMap;

use crate::error::{SandboxError, SandboxResult};

/// Descriptor flags for one property of a registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PropertyFlags {
    configurable: bool,
}

/// One builtin namespace object (e.g. `console`, `crypto`) with its
/// property table.
#[derive(Debug, Clone)]
pub struct BuiltinObject {
    properties: BTreeMap<String, PropertyFlags>,
    frozen: bool,
}

impl BuiltinObject {
    /// A namespace exposing the given property names, all configurable.
    #[must_use]
    pub fn with_properties<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: properties
                .into_iter()
                .map(|name| (name.into(), PropertyFlags { configurable: true }))
                .collect(),
            frozen: false,
        }
    }

    /// Make every property non-configurable and freeze the object.
    /// Returns the number of descriptors that changed.
    fn freeze(&mut self) -> usize {
        let mut changed: usize = 0;
        for flags in self.properties.values_mut() {
            if flags.configurable {
                flags.configurable = false;
                changed = changed.saturating_add(1);
            }
        }
        if !self.frozen {
            self.frozen = true;
            changed = changed.saturating_add(1);
        }
        changed
    }

    /// Whether the object is frozen with no configurable property left.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen && self.properties.values().all(|flags| !flags.configurable)
    }

    /// The property names.
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }
}

/// The namespaces installed on the isolate's global environment.
///
/// Hardening locks the registry first, so nothing can be (re)registered
/// while or after the individual objects are frozen, then freezes the
/// objects in priority order.
#[derive(Debug, Default)]
pub struct BuiltinRegistry {
    objects: BTreeMap<String, BuiltinObject>,
    priority: Vec<String>,
    locked: bool,
}

impl BuiltinRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names frozen before all others, in the given order.
    #[must_use]
    pub fn with_priority<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            objects: BTreeMap::new(),
            priority: names.into_iter().map(Into::into).collect(),
            locked: false,
        }
    }

    /// Register a namespace object.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::RegistryLocked`] once the registry is locked.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        object: BuiltinObject,
    ) -> SandboxResult<()> {
        let name = name.into();
        if self.locked {
            return Err(SandboxError::RegistryLocked(name));
        }
        self.objects.insert(name, object);
        Ok(())
    }

    /// Lock the registry and freeze every object, priority names first.
    /// Returns `(operations, failures)` where a failure is a priority name
    /// with no registered object.
    pub fn freeze_all(&mut self) -> (usize, usize) {
        self.locked = true;
        let mut operations: usize = 1; // the lock itself
        let mut failures: usize = 0;

        let mut order: Vec<String> = Vec::with_capacity(self.objects.len());
        for name in &self.priority {
            if self.objects.contains_key(name) {
                order.push(name.clone());
            } else {
                failures = failures.saturating_add(1);
            }
        }
        for name in self.objects.keys() {
            if !order.contains(name) {
                order.push(name.clone());
            }
        }

        for name in order {
            if let Some(object) = self.objects.get_mut(&name) {
                operations = operations.saturating_add(object.freeze());
            }
        }
        (operations, failures)
    }

    /// Whether the registry is locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Look up a registered object.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BuiltinObject> {
        self.objects.get(name)
    }

    /// All registered objects in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BuiltinObject)> {
        self.objects.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of registered objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// The shape of one registered API type: its method table plus freeze
/// state for the type and its prototype side.
#[derive(Debug, Clone)]
pub struct TypeShape {
    methods: BTreeMap<String, PropertyFlags>,
    type_frozen: bool,
    prototype_frozen: bool,
}

impl TypeShape {
    /// A type exposing the given method names.
    #[must_use]
    pub fn with_methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: methods
                .into_iter()
                .map(|name| (name.into(), PropertyFlags { configurable: true }))
                .collect(),
            type_frozen: false,
            prototype_frozen: false,
        }
    }

    fn freeze(&mut self) -> usize {
        let mut changed: usize = 0;
        for flags in self.methods.values_mut() {
            if flags.configurable {
                flags.configurable = false;
                changed = changed.saturating_add(1);
            }
        }
        if !self.type_frozen {
            self.type_frozen = true;
            changed = changed.saturating_add(1);
        }
        if !self.prototype_frozen {
            self.prototype_frozen = true;
            changed = changed.saturating_add(1);
        }
        changed
    }

    /// Whether both the type and its prototype side are frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.type_frozen
            && self.prototype_frozen
            && self.methods.values().all(|flags| !flags.configurable)
    }

    /// The method names.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// The API types (tool handles, console, …) registered on the engine.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeShape>,
    locked: bool,
}

impl TypeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type shape.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::RegistryLocked`] once the registry is locked.
    pub fn register(&mut self, name: impl Into<String>, shape: TypeShape) -> SandboxResult<()> {
        let name = name.into();
        if self.locked {
            return Err(SandboxError::RegistryLocked(name));
        }
        self.types.insert(name, shape);
        Ok(())
    }

    /// Lock the registry and freeze every type and its prototype side.
    /// Returns the number of descriptor operations performed.
    pub fn freeze_all(&mut self) -> usize {
        self.locked = true;
        let mut operations: usize = 1;
        for shape in self.types.values_mut() {
            operations = operations.saturating_add(shape.freeze());
        }
        operations
    }

    /// Whether the registry is locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Look up a registered type.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeShape> {
        self.types.get(name)
    }

    /// All registered types in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeShape)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
