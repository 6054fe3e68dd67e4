//! The crypto tool: a budgeted view over host randomness and digests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use rand::RngCore;
use rhai::Dynamic;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256, Sha384, Sha512};
use uuid::Uuid;

use crate::error::{ApiError, ToolError, ToolResult};
use crate::tool::{Tool, ToolHost, ToolScope};

/// Per-call byte cap on random byte requests, matching the Web Crypto
/// quota.
const MAX_RANDOM_BYTES: usize = 65_536;

/// Service-level crypto policy.
#[derive(Debug, Clone)]
pub struct CryptoPolicy {
    /// Total API calls allowed per installed tool instance.
    pub limit: i64,
    /// Whether digest operations are exposed.
    pub subtle: bool,
    /// Permitted operation names; `None` exposes the full enumerated set.
    pub methods: Option<Vec<String>>,
}

impl Default for CryptoPolicy {
    fn default() -> Self {
        Self {
            limit: 1000,
            subtle: false,
            methods: None,
        }
    }
}

/// Request-level overrides accepted in the tool config.
#[derive(Debug, Default, Deserialize)]
struct CryptoConfig {
    /// Lower (never raise) the call budget.
    limit: Option<i64>,
}

/// The capability-scoped crypto view injected as `crypto`.
///
/// Only the enumerated operations exist, further narrowed by the policy's
/// method whitelist; each call draws from a shared budget that errors on
/// overflow. Everything else is denied by construction.
#[derive(Debug, Clone)]
pub struct CryptoApi {
    budget: Arc<AtomicI64>,
    subtle: bool,
    methods: Option<Vec<String>>,
}

impl CryptoApi {
    /// An API instance for the given policy, with the budget already
    /// narrowed to `limit`.
    #[must_use]
    pub fn new(limit: i64, policy: &CryptoPolicy) -> Self {
        Self {
            budget: Arc::new(AtomicI64::new(limit)),
            subtle: policy.subtle,
            methods: policy.methods.clone(),
        }
    }

    fn charge(&self, method: &str) -> Result<(), ApiError> {
        if let Some(methods) = &self.methods
            && !methods.iter().any(|allowed| allowed == method)
        {
            return Err(ApiError::new(
                "NotSupportedError",
                format!("crypto method not permitted: {method}"),
            ));
        }
        if self.budget.fetch_sub(1, Ordering::SeqCst) <= 0 {
            return Err(ApiError::new(
                "QuotaExceededError",
                "crypto call budget exhausted",
            ));
        }
        Ok(())
    }

    /// Remaining calls in the budget.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.budget.load(Ordering::SeqCst).max(0)
    }

    /// Fill a fresh buffer of `len` random bytes.
    ///
    /// # Errors
    ///
    /// `QuotaExceededError` for requests over the per-call byte cap or once
    /// the call budget is exhausted.
    pub fn get_random_values(&self, len: i64) -> Result<Vec<u8>, ApiError> {
        self.charge("get_random_values")?;
        let len = usize::try_from(len)
            .map_err(|_| ApiError::new("QuotaExceededError", "negative byte count"))?;
        if len > MAX_RANDOM_BYTES {
            return Err(ApiError::new(
                "QuotaExceededError",
                format!("requested {len} bytes, cap is {MAX_RANDOM_BYTES}"),
            ));
        }
        let mut bytes = vec![0_u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        Ok(bytes)
    }

    /// A random v4 UUID string.
    ///
    /// # Errors
    ///
    /// `QuotaExceededError` once the call budget is exhausted.
    pub fn random_uuid(&self) -> Result<String, ApiError> {
        self.charge("random_uuid")?;
        Ok(Uuid::new_v4().to_string())
    }

    /// Digest `data` with the named algorithm. Only available when the
    /// service enables `crypto.subtle`.
    ///
    /// # Errors
    ///
    /// `NotSupportedError` when subtle is disabled or the algorithm is
    /// unknown; `QuotaExceededError` once the budget is exhausted.
    pub fn digest(&self, algorithm: &str, data: &[u8]) -> Result<Vec<u8>, ApiError> {
        self.charge("digest")?;
        if !self.subtle {
            return Err(ApiError::new(
                "NotSupportedError",
                "subtle crypto is disabled",
            ));
        }
        match algorithm.to_ascii_uppercase().as_str() {
            "SHA-256" => Ok(Sha256::digest(data).to_vec()),
            "SHA-384" => Ok(Sha384::digest(data).to_vec()),
            "SHA-512" => Ok(Sha512::digest(data).to_vec()),
            other => Err(ApiError::new(
                "NotSupportedError",
                format!("unknown digest algorithm: {other}"),
            )),
        }
    }
}

/// The registry entry installing [`CryptoApi`].
#[derive(Debug, Default)]
pub struct CryptoTool;

impl Tool for CryptoTool {
    fn name(&self) -> &'static str {
        "crypto"
    }

    fn setup(&self, scope: &mut ToolScope, host: &ToolHost, config: &Value) -> ToolResult<()> {
        let overrides: CryptoConfig =
            serde_json::from_value(config.clone()).unwrap_or_default();
        let limit = overrides
            .limit
            .map_or(host.crypto.limit, |requested| requested.min(host.crypto.limit));
        let api = CryptoApi::new(limit, &host.crypto);
        scope
            .inject("crypto", Dynamic::from(api))
            .map_err(|err| ToolError::Setup {
                tool: "crypto".into(),
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(limit: i64, subtle: bool) -> CryptoApi {
        CryptoApi::new(
            limit,
            &CryptoPolicy {
                subtle,
                ..CryptoPolicy::default()
            },
        )
    }

    #[test]
    fn byte_cap_is_enforced_per_call() {
        let api = api(10, false);
        assert_eq!(api.get_random_values(16).unwrap().len(), 16);
        let err = api.get_random_values(65_537).unwrap_err();
        assert_eq!(err.name, "QuotaExceededError");
        assert!(api.get_random_values(-1).is_err());
    }

    #[test]
    fn call_budget_throws_on_overflow() {
        let api = api(2, false);
        api.random_uuid().unwrap();
        api.random_uuid().unwrap();
        let err = api.random_uuid().unwrap_err();
        assert_eq!(err.name, "QuotaExceededError");
        assert_eq!(api.remaining(), 0);
    }

    #[test]
    fn uuids_are_distinct() {
        let api = api(10, false);
        assert_ne!(api.random_uuid().unwrap(), api.random_uuid().unwrap());
    }

    #[test]
    fn digest_is_gated_behind_subtle() {
        let closed = api(10, false);
        assert_eq!(closed.digest("SHA-256", b"x").unwrap_err().name, "NotSupportedError");

        let open = api(10, true);
        let hash = open.digest("sha-256", b"abc").unwrap();
        assert_eq!(hash.len(), 32);
        assert_eq!(open.digest("MD5", b"x").unwrap_err().name, "NotSupportedError");
    }

    #[test]
    fn method_whitelist_denies_everything_else() {
        let narrowed = CryptoApi::new(
            10,
            &CryptoPolicy {
                methods: Some(vec!["random_uuid".to_string()]),
                ..CryptoPolicy::default()
            },
        );
        assert!(narrowed.random_uuid().is_ok());
        assert_eq!(
            narrowed.get_random_values(8).unwrap_err().name,
            "NotSupportedError"
        );
    }
}
