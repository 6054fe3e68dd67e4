//! The request packet that crosses the host→isolate boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered tool names plus their configurations, as installed by the worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolContext {
    /// Tool names in installation order.
    pub names: Vec<String>,
    /// Per-tool configuration values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configs: BTreeMap<String, Value>,
}

/// Everything a worker needs to run one request.
///
/// A packet exists for exactly one worker round-trip: the host builds it
/// from the pipeline context, sends it, and discards it once the result
/// message arrives (or the deadline fires).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    /// Snippet source code.
    pub code: String,
    /// Input value for the entry function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Entry function name.
    pub entry: String,
    /// Data URL identifying the loaded module.
    pub url: String,
    /// Values to install on the isolate's global scope before execution,
    /// such as resolved environment grants.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub globals: BTreeMap<String, Value>,
    /// Tools to install, when the request asked for any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ToolContext>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_sections_are_omitted() {
        let packet = Packet {
            code: "fn default() { 1 }".into(),
            input: None,
            entry: "default".into(),
            url: "data:text/plain;base64,Zm4=".into(),
            globals: BTreeMap::new(),
            context: None,
        };
        let value = serde_json::to_value(&packet).unwrap();
        assert!(value.get("globals").is_none());
        assert!(value.get("context").is_none());
        assert!(value.get("input").is_none());
    }

    #[test]
    fn context_round_trips() {
        let packet = Packet {
            code: String::new(),
            input: Some(json!(5)),
            entry: "default".into(),
            url: String::new(),
            globals: BTreeMap::from([("PUBLIC_URL".to_string(), json!("https://x"))]),
            context: Some(ToolContext {
                names: vec!["crypto".into()],
                configs: BTreeMap::from([("crypto".to_string(), json!({"limit": 10}))]),
            }),
        };
        let parsed: Packet = serde_json::from_value(serde_json::to_value(&packet).unwrap()).unwrap();
        assert_eq!(parsed.context.unwrap().names, vec!["crypto".to_string()]);
        assert_eq!(parsed.globals["PUBLIC_URL"], json!("https://x"));
    }
}
