//! Normalize, merge, detect, and validate permission sets.

use tracing::warn;

use islet_core::{Capability, Grant, PermissionGrants, PermissionSet};

use crate::error::{PermissionError, PermissionResult};

/// Hosts that count as local for [`detect`].
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "::1"];

/// Host-count threshold above which [`validate`] warns.
const HOST_WARN_THRESHOLD: usize = 16;

/// Map an optional permission set to a well-formed one.
///
/// Nullish input becomes none. The forbidden `"inherit"` literal is
/// downgraded to none with a warning; everything else passes through.
#[must_use]
pub fn normalize(permissions: Option<&PermissionSet>) -> PermissionSet {
    match permissions {
        None => PermissionSet::none(),
        Some(set) if set.is_inherit() => {
            warn!("\"inherit\" permissions are forbidden; downgrading to none");
            PermissionSet::none()
        },
        Some(set) => set.clone(),
    }
}

/// Union two permission sets.
///
/// None is the identity on either side. For the object forms the result
/// grants, per capability, the union of both sides: a blanket `true`
/// absorbs any list, and list grants are concatenated with duplicates
/// removed. Grants never shrink.
///
/// # Errors
///
/// Returns [`PermissionError::InheritForbidden`] if either side is the
/// `"inherit"` literal; callers are expected to [`normalize`] first.
pub fn merge(a: &PermissionSet, b: &PermissionSet) -> PermissionResult<PermissionSet> {
    if a.is_inherit() || b.is_inherit() {
        return Err(PermissionError::InheritForbidden);
    }
    if a.is_none() {
        return Ok(b.clone());
    }
    if b.is_none() {
        return Ok(a.clone());
    }

    let mut merged = PermissionGrants::default();
    for capability in Capability::ALL {
        let left = a
            .grants()
            .map_or(Grant::Blanket(false), |g| g.get(capability).clone());
        let right = b
            .grants()
            .map_or(Grant::Blanket(false), |g| g.get(capability).clone());
        merged.set(capability, merge_grant(left, right));
    }
    Ok(PermissionSet::Grants(merged))
}

fn merge_grant(a: Grant, b: Grant) -> Grant {
    match (a, b) {
        (Grant::Blanket(true), _) | (_, Grant::Blanket(true)) => Grant::Blanket(true),
        (Grant::Blanket(false), other) | (other, Grant::Blanket(false)) => other,
        (Grant::List(mut left), Grant::List(right)) => {
            for item in right {
                if !left.contains(&item) {
                    left.push(item);
                }
            }
            Grant::List(left)
        },
    }
}

/// Flags produced by [`detect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Detection {
    /// Any capability carries a blanket `true` grant.
    pub wild: bool,
    /// Number of distinct network host grants.
    pub hosts: usize,
    /// Any network grant targets a local host.
    pub local: bool,
}

/// Inspect a set for the conditions strict validation warns about.
#[must_use]
pub fn detect(permissions: &PermissionSet) -> Detection {
    let Some(grants) = permissions.grants() else {
        return Detection::default();
    };

    let wild = grants.granted().any(|(_, grant)| grant.allows_all());
    let (hosts, local) = match grants.get(Capability::Net) {
        Grant::Blanket(_) => (0, false),
        Grant::List(items) => {
            let local = items.iter().any(|host| {
                let name = host.split(':').next().unwrap_or(host);
                LOCAL_HOSTS.contains(&name)
            });
            (items.len(), local)
        },
    };

    Detection { wild, hosts, local }
}

/// Emit strict-mode warnings for a permission set.
///
/// Never fails: suspicious grants are logged, not rejected. With `strict`
/// unset this is a no-op.
pub fn validate(permissions: &PermissionSet, strict: bool) {
    if !strict {
        return;
    }
    let detection = detect(permissions);
    if detection.wild {
        warn!("permission set contains a blanket grant");
    }
    if detection.hosts > HOST_WARN_THRESHOLD {
        warn!(hosts = detection.hosts, "permission set grants an unusually large host list");
    }
    if detection.local {
        warn!("permission set grants network access to a local host");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grants(value: serde_json::Value) -> PermissionSet {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn normalize_maps_nullish_and_inherit_to_none() {
        assert!(normalize(None).is_none());
        let inherit = grants(serde_json::json!("inherit"));
        let normalized = normalize(Some(&inherit));
        assert!(normalized.is_none());
        assert!(!normalized.is_inherit());
    }

    #[test]
    fn none_is_the_merge_identity() {
        let p = grants(serde_json::json!({ "net": ["a.example"], "hrtime": true }));
        let none = PermissionSet::none();
        assert_eq!(merge(&none, &p).unwrap(), p);
        assert_eq!(merge(&p, &none).unwrap(), p);
    }

    #[test]
    fn merge_is_commutative_up_to_list_order() {
        let a = grants(serde_json::json!({ "net": ["a.example", "b.example"], "env": true }));
        let b = grants(serde_json::json!({ "net": ["b.example", "c.example"], "read": ["/data"] }));
        let ab = merge(&a, &b).unwrap();
        let ba = merge(&b, &a).unwrap();

        let hosts = |set: &PermissionSet| {
            let mut items = set
                .grants()
                .unwrap()
                .get(Capability::Net)
                .items()
                .unwrap()
                .to_vec();
            items.sort();
            items
        };
        assert_eq!(hosts(&ab), hosts(&ba));
        assert!(ab.grants().unwrap().get(Capability::Env).allows_all());
        assert!(ba.grants().unwrap().get(Capability::Env).allows_all());
        assert_eq!(hosts(&ab), vec!["a.example", "b.example", "c.example"]);
    }

    #[test]
    fn blanket_true_absorbs_lists() {
        let a = grants(serde_json::json!({ "net": true }));
        let b = grants(serde_json::json!({ "net": ["a.example"] }));
        let merged = merge(&a, &b).unwrap();
        assert!(merged.grants().unwrap().get(Capability::Net).allows_all());
    }

    #[test]
    fn merge_rejects_inherit_on_either_side() {
        let inherit = grants(serde_json::json!("inherit"));
        let p = PermissionSet::none();
        assert_eq!(merge(&inherit, &p), Err(PermissionError::InheritForbidden));
        assert_eq!(merge(&p, &inherit), Err(PermissionError::InheritForbidden));
    }

    #[test]
    fn detect_flags_wild_hosts_and_local() {
        let p = grants(serde_json::json!({
            "net": ["db.internal:5432", "localhost:5432"],
            "hrtime": true
        }));
        let detection = detect(&p);
        assert!(detection.wild);
        assert_eq!(detection.hosts, 2);
        assert!(detection.local);

        assert_eq!(detect(&PermissionSet::none()), Detection::default());
    }

    #[test]
    fn validate_never_fails() {
        let p = grants(serde_json::json!({ "net": true }));
        validate(&p, true);
        validate(&p, false);
    }
}
