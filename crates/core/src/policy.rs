//! Field policy: strip volatile metadata, redact sensitive payloads.
//!
//! All functions take the document by value and hand back the only reference,
//! so callers can treat the result as the sole live copy.

use serde_json::Value;

/// Replacement for the `data` payload of sensitive kinds.
pub const REDACTION_SENTINEL: &str = "[redacted]";

/// Object kind whose `data` field must never leave the process unredacted.
pub const SENSITIVE_KIND: &str = "Secret";

/// Remove cluster-internal bookkeeping from `metadata`.
///
/// Total and idempotent; an absent `metadata` section is a no-op.
pub fn strip_managed_metadata(mut doc: Value) -> Value {
    if let Some(meta) = doc.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
        meta.remove("resourceVersion");
    }
    doc
}

/// Replace the whole value at key `data` with [`REDACTION_SENTINEL`] when
/// `kind_tag` names the sensitive kind (case-insensitive). Every other key is
/// untouched; an absent `data` key passes the document through unchanged.
pub fn redact_if_sensitive_kind(mut doc: Value, kind_tag: &str) -> Value {
    if !kind_tag.eq_ignore_ascii_case(SENSITIVE_KIND) {
        return doc;
    }
    if let Some(data) = doc.get_mut("data") {
        *data = Value::String(REDACTION_SENTINEL.to_string());
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_removes_bookkeeping_fields() {
        let doc = json!({
            "kind": "ConfigMap",
            "metadata": {
                "name": "cm",
                "resourceVersion": "12345",
                "managedFields": [{"manager": "kubectl"}],
                "labels": {"app": "web"}
            }
        });
        let out = strip_managed_metadata(doc);
        let meta = out.get("metadata").and_then(|m| m.as_object()).expect("metadata");
        assert!(!meta.contains_key("managedFields"));
        assert!(!meta.contains_key("resourceVersion"));
        assert_eq!(meta.get("name"), Some(&json!("cm")));
        assert_eq!(meta.get("labels"), Some(&json!({"app": "web"})));
    }

    #[test]
    fn strip_is_idempotent_and_total() {
        let doc = json!({"metadata": {"name": "x", "managedFields": []}});
        let once = strip_managed_metadata(doc.clone());
        let twice = strip_managed_metadata(once.clone());
        assert_eq!(once, twice);
        // no metadata at all is fine
        assert_eq!(strip_managed_metadata(json!({"kind": "Pod"})), json!({"kind": "Pod"}));
        // scalar metadata is left alone rather than erroring
        assert_eq!(
            strip_managed_metadata(json!({"metadata": "odd"})),
            json!({"metadata": "odd"})
        );
    }

    #[test]
    fn redact_replaces_entire_data_value() {
        let doc = json!({
            "kind": "Secret",
            "metadata": {"name": "creds"},
            "data": {"password": "aHVudGVyMg=="},
            "type": "Opaque"
        });
        let out = redact_if_sensitive_kind(doc, "Secret");
        assert_eq!(out.get("data"), Some(&json!(REDACTION_SENTINEL)));
        assert_eq!(out.get("type"), Some(&json!("Opaque")));
        assert_eq!(out.get("metadata"), Some(&json!({"name": "creds"})));
    }

    #[test]
    fn redact_matches_kind_case_insensitively() {
        let doc = json!({"data": {"k": "v"}});
        let out = redact_if_sensitive_kind(doc, "secret");
        assert_eq!(out.get("data"), Some(&json!(REDACTION_SENTINEL)));
    }

    #[test]
    fn redact_skips_other_kinds_and_absent_data() {
        let cm = json!({"kind": "ConfigMap", "data": {"k": "v"}});
        assert_eq!(redact_if_sensitive_kind(cm.clone(), "ConfigMap"), cm);

        let no_data = json!({"kind": "Secret", "metadata": {"name": "creds"}});
        assert_eq!(redact_if_sensitive_kind(no_data.clone(), "Secret"), no_data);
    }

    #[test]
    fn redact_twice_equals_once() {
        let doc = json!({"kind": "Secret", "data": {"k": "v"}});
        let once = redact_if_sensitive_kind(doc, "Secret");
        let twice = redact_if_sensitive_kind(once.clone(), "Secret");
        assert_eq!(once, twice);
    }
}
