//! The capability grant model.
//!
//! A [`PermissionSet`] is either the literal `"none"`, the forbidden literal
//! `"inherit"` (downgraded to none during normalization), or an object
//! granting each [`Capability`] kind either a blanket boolean or a list of
//! specific grants (hosts, paths, variable names). The merge/normalize/
//! resolve operations over these values live in `islet-permissions`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A class of external effect a snippet may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Environment variable access.
    Env,
    /// Outbound network access.
    Net,
    /// Filesystem reads.
    Read,
    /// Filesystem writes.
    Write,
    /// Subprocess execution.
    Run,
    /// Foreign function interface access.
    Ffi,
    /// High-resolution time access.
    Hrtime,
}

impl Capability {
    /// Every capability kind, in canonical order.
    pub const ALL: [Self; 7] = [
        Self::Env,
        Self::Net,
        Self::Read,
        Self::Write,
        Self::Run,
        Self::Ffi,
        Self::Hrtime,
    ];

    /// The canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Net => "net",
            Self::Read => "read",
            Self::Write => "write",
            Self::Run => "run",
            Self::Ffi => "ffi",
            Self::Hrtime => "hrtime",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The grant for a single capability kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grant {
    /// Blanket allow (`true`) or deny (`false`).
    Blanket(bool),
    /// Specific grants: hosts for `net`, paths for `read`/`write`/`ffi`,
    /// commands for `run`, variable names for `env`.
    List(Vec<String>),
}

impl Grant {
    /// Whether this grant denies everything.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        match self {
            Self::Blanket(allowed) => !allowed,
            Self::List(items) => items.is_empty(),
        }
    }

    /// Whether this grant is a blanket allow.
    #[must_use]
    pub fn allows_all(&self) -> bool {
        matches!(self, Self::Blanket(true))
    }

    /// The specific grant list, if this is a list grant.
    #[must_use]
    pub fn items(&self) -> Option<&[String]> {
        match self {
            Self::Blanket(_) => None,
            Self::List(items) => Some(items),
        }
    }
}

impl Default for Grant {
    fn default() -> Self {
        Self::Blanket(false)
    }
}

/// Per-capability grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrants {
    /// Environment variable grants.
    #[serde(default, skip_serializing_if = "Grant::is_denied")]
    pub env: Grant,
    /// Network grants.
    #[serde(default, skip_serializing_if = "Grant::is_denied")]
    pub net: Grant,
    /// Filesystem read grants.
    #[serde(default, skip_serializing_if = "Grant::is_denied")]
    pub read: Grant,
    /// Filesystem write grants.
    #[serde(default, skip_serializing_if = "Grant::is_denied")]
    pub write: Grant,
    /// Subprocess grants.
    #[serde(default, skip_serializing_if = "Grant::is_denied")]
    pub run: Grant,
    /// FFI grants.
    #[serde(default, skip_serializing_if = "Grant::is_denied")]
    pub ffi: Grant,
    /// High-resolution time grants.
    #[serde(default, skip_serializing_if = "Grant::is_denied")]
    pub hrtime: Grant,
}

impl PermissionGrants {
    /// The grant for one capability kind.
    #[must_use]
    pub fn get(&self, capability: Capability) -> &Grant {
        match capability {
            Capability::Env => &self.env,
            Capability::Net => &self.net,
            Capability::Read => &self.read,
            Capability::Write => &self.write,
            Capability::Run => &self.run,
            Capability::Ffi => &self.ffi,
            Capability::Hrtime => &self.hrtime,
        }
    }

    /// Replace the grant for one capability kind.
    pub fn set(&mut self, capability: Capability, grant: Grant) {
        match capability {
            Capability::Env => self.env = grant,
            Capability::Net => self.net = grant,
            Capability::Read => self.read = grant,
            Capability::Write => self.write = grant,
            Capability::Run => self.run = grant,
            Capability::Ffi => self.ffi = grant,
            Capability::Hrtime => self.hrtime = grant,
        }
    }

    /// Iterate over every capability kind with a non-denied grant.
    pub fn granted(&self) -> impl Iterator<Item = (Capability, &Grant)> {
        Capability::ALL
            .iter()
            .map(|capability| (*capability, self.get(*capability)))
            .filter(|(_, grant)| !grant.is_denied())
    }

    /// Whether every capability is denied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.granted().next().is_none()
    }
}

/// The permission literals `"none"` and `"inherit"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLiteral {
    /// No capabilities at all.
    None,
    /// Inherit the host's capabilities. Forbidden: normalization downgrades
    /// this to `None` with a warning.
    Inherit,
}

/// A full permission set: a literal or per-capability grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionSet {
    /// `"none"` or `"inherit"`.
    Literal(PermissionLiteral),
    /// Per-capability grants.
    Grants(PermissionGrants),
}

impl PermissionSet {
    /// The empty permission set.
    #[must_use]
    pub fn none() -> Self {
        Self::Literal(PermissionLiteral::None)
    }

    /// Whether this set grants nothing.
    #[must_use]
    pub fn is_none(&self) -> bool {
        match self {
            Self::Literal(PermissionLiteral::None) => true,
            Self::Literal(PermissionLiteral::Inherit) => false,
            Self::Grants(grants) => grants.is_empty(),
        }
    }

    /// Whether this set is the forbidden `"inherit"` literal.
    #[must_use]
    pub fn is_inherit(&self) -> bool {
        matches!(self, Self::Literal(PermissionLiteral::Inherit))
    }

    /// The grants object, if this is the object form.
    #[must_use]
    pub fn grants(&self) -> Option<&PermissionGrants> {
        match self {
            Self::Literal(_) => None,
            Self::Grants(grants) => Some(grants),
        }
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::none()
    }
}

impl From<PermissionGrants> for PermissionSet {
    fn from(grants: PermissionGrants) -> Self {
        Self::Grants(grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literal_none_round_trips() {
        let set: PermissionSet = serde_json::from_value(json!("none")).unwrap();
        assert!(set.is_none());
        assert_eq!(serde_json::to_value(&set).unwrap(), json!("none"));
    }

    #[test]
    fn inherit_parses_as_literal() {
        let set: PermissionSet = serde_json::from_value(json!("inherit")).unwrap();
        assert!(set.is_inherit());
        assert!(!set.is_none());
    }

    #[test]
    fn object_form_mixes_booleans_and_lists() {
        let set: PermissionSet = serde_json::from_value(json!({
            "net": ["db.internal:5432"],
            "hrtime": true
        }))
        .unwrap();
        let grants = set.grants().unwrap();
        assert_eq!(
            grants.net.items().unwrap(),
            &["db.internal:5432".to_string()]
        );
        assert!(grants.hrtime.allows_all());
        assert!(grants.env.is_denied());
    }

    #[test]
    fn denied_grants_are_skipped_when_serialized() {
        let mut grants = PermissionGrants::default();
        grants.set(Capability::Env, Grant::List(vec!["PUBLIC_URL".into()]));
        let value = serde_json::to_value(PermissionSet::Grants(grants)).unwrap();
        assert_eq!(value, json!({ "env": ["PUBLIC_URL"] }));
    }

    #[test]
    fn empty_object_counts_as_none() {
        let set: PermissionSet = serde_json::from_value(json!({})).unwrap();
        assert!(set.is_none());
    }
}
