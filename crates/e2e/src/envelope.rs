//! Tolerant access to response envelopes
//!
//! The API has not settled on one envelope: a subscription list may arrive as
//! `{data: {subscriptions: [...]}}`, `{subscriptions: [...]}`, `{data: [...]}`
//! or a bare array. Callers list every accepted shape as dotted paths, most
//! canonical first; `""` is the root. A match on anything but the first path
//! is logged so the drift stays visible.

use serde_json::Value;
use tracing::warn;

fn walk<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |v, key| v.get(key))
}

/// First non-null value found under any of `paths`
pub fn pick<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    pick_where(value, paths, |v| !v.is_null())
}

/// First array found under any of `paths`
pub fn pick_array<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Vec<Value>> {
    pick_where(value, paths, Value::is_array).and_then(Value::as_array)
}

/// First string found under any of `paths`
pub fn pick_str<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a str> {
    pick_where(value, paths, Value::is_string).and_then(Value::as_str)
}

pub fn pick_bool(value: &Value, paths: &[&str]) -> Option<bool> {
    pick_where(value, paths, Value::is_boolean).and_then(Value::as_bool)
}

/// Whether any of `paths` holds a non-null value
pub fn has_field(value: &Value, paths: &[&str]) -> bool {
    pick(value, paths).is_some()
}

fn pick_where<'a, F>(value: &'a Value, paths: &[&str], accept: F) -> Option<&'a Value>
where
    F: Fn(&Value) -> bool,
{
    for (i, path) in paths.iter().enumerate() {
        if let Some(found) = walk(value, path).filter(|v| accept(v)) {
            if i > 0 {
                let shape = if path.is_empty() { "<root>" } else { path };
                warn!(
                    "Response used non-canonical envelope '{}' (expected '{}')",
                    shape, paths[0]
                );
            }
            return Some(found);
        }
    }
    None
}

/// Accepted shapes for a list of servers
pub const SERVER_LIST: &[&str] = &["data", "servers", "data.servers", ""];

/// Accepted shapes for a list of subscriptions
pub const SUBSCRIPTION_LIST: &[&str] = &["data.subscriptions", "subscriptions", "data", ""];

/// Accepted shapes for a single server record
pub const SERVER_RECORD: &[&str] = &["data", ""];

/// Accepted shapes for a server status string
pub const SERVER_STATUS: &[&str] = &["status", "data.status"];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_subscriptions_in_every_known_shape() {
        let nested = json!({ "data": { "subscriptions": [{ "id": "a" }] } });
        let flat = json!({ "subscriptions": [{ "id": "b" }, { "id": "c" }] });
        let data_array = json!({ "data": [] });
        let bare = json!([{ "id": "d" }]);

        assert_eq!(pick_array(&nested, SUBSCRIPTION_LIST).unwrap().len(), 1);
        assert_eq!(pick_array(&flat, SUBSCRIPTION_LIST).unwrap().len(), 2);
        assert_eq!(pick_array(&data_array, SUBSCRIPTION_LIST).unwrap().len(), 0);
        assert_eq!(pick_array(&bare, SUBSCRIPTION_LIST).unwrap()[0]["id"], "d");
    }

    #[test]
    fn object_under_data_is_not_mistaken_for_a_list() {
        let body = json!({ "data": { "subscriptions": null }, "subscriptions": [1] });
        assert_eq!(pick_array(&body, SUBSCRIPTION_LIST).unwrap().len(), 1);
    }

    #[test]
    fn status_reads_top_level_or_nested() {
        assert_eq!(pick_str(&json!({ "status": "running" }), SERVER_STATUS), Some("running"));
        assert_eq!(
            pick_str(&json!({ "data": { "status": "pending" } }), SERVER_STATUS),
            Some("pending")
        );
        assert_eq!(pick_str(&json!({ "data": {} }), SERVER_STATUS), None);
    }

    #[test]
    fn null_counts_as_absent() {
        let body = json!({ "data": { "cancelAt": null } });
        assert!(!has_field(&body, &["data.cancelAt"]));
        assert!(has_field(&json!({ "data": { "cancelAt": "2026-11-01" } }), &["data.cancelAt"]));
    }

    #[test]
    fn server_record_falls_back_to_root() {
        let body = json!({ "serverId": "srv-1", "tier": "small" });
        let record = pick(&body, SERVER_RECORD).unwrap();
        assert_eq!(record["serverId"], "srv-1");
    }
}
