//! Read-only facade over the isolate's environment variables.

use std::collections::BTreeMap;

use crate::error::{SandboxError, SandboxResult};

/// A snapshot of the environment variables visible to snippet code.
///
/// The facade is populated once from the resolved env grants, then frozen
/// by hardening; after that every mutation fails. Reads never touch the
/// process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvFacade {
    vars: BTreeMap<String, String>,
    frozen: bool,
}

impl EnvFacade {
    /// An empty, unfrozen facade.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the given variables.
    #[must_use]
    pub fn snapshot<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            frozen: false,
        }
    }

    /// Look up a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set a variable.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::FrozenEnv`] once the facade is frozen.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> SandboxResult<()> {
        if self.frozen {
            return Err(SandboxError::FrozenEnv);
        }
        self.vars.insert(key.into(), value.into());
        Ok(())
    }

    /// Freeze the facade. Idempotent.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether the facade is frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the facade holds no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// All variables in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
