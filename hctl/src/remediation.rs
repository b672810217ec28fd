//! The built-in remediation lookup table.
use hctl_core::status::RemediationTable;
use once_cell::sync::Lazy;

static TABLE: Lazy<RemediationTable> = Lazy::new(build_table);

pub fn default_table() -> &'static RemediationTable {
    &TABLE
}

fn build_table() -> RemediationTable {
    let mut t = RemediationTable::default();

    t.insert("ConfigError", "run 'hctl init' or check $HCTL_CONFIG");
    t.insert("ValidationError", "check the input against the documented shape and retry");
    t.insert("NotFoundError", "confirm the name and namespace with 'hctl status'");
    t.insert("NetworkError", "check cluster connectivity and the current context ('hctl context')");
    t.insert("PermissionError", "check RBAC bindings for the current kube context's identity");
    t.insert("ConflictError", "re-fetch and retry; something else modified the resource concurrently");
    t.insert("TimeoutError", "the cluster may be slow or unreachable; retry with a larger --deadline");
    t.insert("InternalError", "this is unexpected; rerun with --verbose and file an issue");

    t.insert_for_component("NetworkError", "argocd", "check the argocd-server Service and its sync status");
    t.insert_for_component("NetworkError", "git", "check 'git remote -v' and your credential helper");
    t.insert_for_component(
        "NotFoundError",
        "kubeconfig-secret",
        "the controller may not have reconciled a kubeconfig secret yet; wait and retry",
    );
    t.insert_for_component(
        "ConflictError",
        "argocd-patch",
        "another sync or manual-reconciliation request is in flight; retry shortly",
    );

    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_kind_has_a_generic_hint() {
        let t = default_table();
        for label in [
            "ConfigError",
            "ValidationError",
            "NotFoundError",
            "NetworkError",
            "PermissionError",
            "ConflictError",
            "TimeoutError",
            "InternalError",
        ] {
            assert!(t.lookup(label, None).is_some(), "missing hint for {}", label);
        }
    }
}
