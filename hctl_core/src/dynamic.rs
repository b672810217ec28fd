//! Typed helpers for navigating arbitrarily-shaped dynamic Kubernetes objects.
//!
//! Several flows read custom resources whose exact shape hctl doesn't own
//! (conditions arrays, nested labels/annotations, controller-defined status
//! fields that may be absent on older controllers). Rather than deserializing
//! into a rigid struct and panicking on a shape mismatch, callers navigate a
//! `serde_json::Value` through these helpers, which always return a
//! `(value, present)` pair instead of panicking.
use serde_json::Value;

/// Walk `obj` through a dotted/segmented path of object keys, returning the
/// string at that path if present and if it actually holds a string.
///
/// `present` is `true` only when the full path resolved to a JSON string;
/// a path that resolves to `null`, a number, or doesn't exist at all all
/// report `present = false` rather than distinguishing those cases, since
/// callers in this codebase only ever care about "did we get a usable
/// string", matching the "absent means Unknown, not Error" rule in design
/// notes §9.
pub fn lookup_string(obj: &Value, path: &[&str]) -> (String, bool) {
    match lookup(obj, path) {
        Some(Value::String(s)) => (s.clone(), true),
        _ => (String::new(), false),
    }
}

/// Same as `lookup_string` but for a JSON array; returns the empty vec and
/// `false` if the path is absent or not an array.
pub fn lookup_slice<'a>(obj: &'a Value, path: &[&str]) -> (Vec<&'a Value>, bool) {
    match lookup(obj, path) {
        Some(Value::Array(items)) => (items.iter().collect(), true),
        _ => (Vec::new(), false),
    }
}

/// Same as `lookup_string` but for a bool.
pub fn lookup_bool(obj: &Value, path: &[&str]) -> (bool, bool) {
    match lookup(obj, path) {
        Some(Value::Bool(b)) => (*b, true),
        _ => (false, false),
    }
}

/// Raw recursive descent through object keys. `None` at any step short-circuits.
fn lookup<'a>(obj: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = obj;
    for seg in path {
        cur = cur.as_object()?.get(*seg)?;
    }
    Some(cur)
}

/// Find the first element of a `conditions[]`-shaped array whose `type` field
/// equals `cond_type`, mirroring the `.status.conditions[?type=X].status`
/// JSONPath idiom used throughout the platform's CRDs (Kratix `Work`, ArgoCD
/// health, the vCluster request's own `conditions[]`).
///
/// Returns `(status_value, present)`.
pub fn lookup_condition_status(obj: &Value, cond_type: &str) -> (String, bool) {
    let (conditions, present) = lookup_slice(obj, &["status", "conditions"]);
    if !present {
        return (String::new(), false);
    }
    for cond in conditions {
        let (ty, has_ty) = lookup_string(cond, &["type"]);
        if has_ty && ty == cond_type {
            return lookup_string(cond, &["status"]);
        }
    }
    (String::new(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_string_present() {
        let v = json!({"status": {"phase": "Ready"}});
        let (s, present) = lookup_string(&v, &["status", "phase"]);
        assert!(present);
        assert_eq!(s, "Ready");
    }

    #[test]
    fn lookup_string_absent_is_not_an_error() {
        let v = json!({"status": {}});
        let (s, present) = lookup_string(&v, &["status", "phase"]);
        assert!(!present);
        assert_eq!(s, "");
    }

    #[test]
    fn lookup_string_wrong_shape_does_not_panic() {
        let v = json!({"status": "not-an-object"});
        let (_, present) = lookup_string(&v, &["status", "phase"]);
        assert!(!present);
    }

    #[test]
    fn condition_status_found() {
        let v = json!({
            "status": {
                "conditions": [
                    {"type": "Ready", "status": "False"},
                    {"type": "Available", "status": "True"}
                ]
            }
        });
        let (status, present) = lookup_condition_status(&v, "Available");
        assert!(present);
        assert_eq!(status, "True");
    }

    #[test]
    fn condition_status_missing_type_is_unknown() {
        let v = json!({"status": {"conditions": []}});
        let (_, present) = lookup_condition_status(&v, "Available");
        assert!(!present);
    }
}
