//! Human-readable descriptions of resources and objects for error messages.

fn in_namespace(namespace: Option<&str>) -> String {
    namespace
        .filter(|ns| !ns.is_empty())
        .map(|ns| format!(" in namespace {ns}"))
        .unwrap_or_default()
}

/// `parent resource K in store S`
pub fn parent_resource(kind: &str, store: &str) -> String {
    format!("parent resource {kind} in store {store}")
}

/// `child resource K[ in namespace N] in store S`
pub fn child_resource(kind: &str, namespace: Option<&str>, store: &str) -> String {
    format!("child resource {kind}{} in store {store}", in_namespace(namespace))
}

/// `parent object K name[ in namespace N] in store S`
pub fn parent_object(kind: &str, name: &str, namespace: Option<&str>, store: &str) -> String {
    format!("parent object {kind} {name}{} in store {store}", in_namespace(namespace))
}

/// `child object K name[ in namespace N] in store S`
///
/// A child not yet created has no name; its generated-name prefix is shown.
pub fn child_object(kind: &str, name: &str, namespace: Option<&str>, store: &str) -> String {
    format!("child object {kind} {name}{} in store {store}", in_namespace(namespace))
}

/// `K name[ in namespace N] in store S`, for objects with no parent/child role.
pub fn object(kind: &str, name: &str, namespace: Option<&str>, store: &str) -> String {
    format!("{kind} {name}{} in store {store}", in_namespace(namespace))
}
