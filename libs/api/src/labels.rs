//! Well-known labels, annotations and finalizers.

/// Label carrying the owning integration name on derived objects.
pub const INTEGRATION: &str = "kforge.dev/integration";

/// Label carrying the owning kit name on its builds.
pub const KIT: &str = "kforge.dev/kit";

/// Kit type label (`platform`, `user`, `external`).
pub const KIT_TYPE: &str = "kforge.dev/kit.type";

/// Kit priority label; higher wins among ready kits.
pub const KIT_PRIORITY: &str = "kforge.dev/kit.priority";

/// Runtime version a kit was built for.
pub const RUNTIME_VERSION: &str = "kforge.dev/runtime.version";

/// Runtime provider a kit was built for.
pub const RUNTIME_PROVIDER: &str = "kforge.dev/runtime.provider";

/// Kind of the object that created a platform kit.
pub const CREATOR_KIND: &str = "kforge.dev/created.by.kind";

/// Name of the object that created a platform kit.
pub const CREATOR_NAME: &str = "kforge.dev/created.by.name";

/// Namespace of the object that created a platform kit.
pub const CREATOR_NAMESPACE: &str = "kforge.dev/created.by.namespace";

/// Resource version of the creator when the kit was created.
pub const CREATOR_VERSION: &str = "kforge.dev/created.by.version";

/// When `"true"`, a self-built integration stops at `BuildComplete`.
pub const DONT_RUN_AFTER_BUILD: &str = "kforge.dev/dont-run-after-build";

/// Finalizer holding integrations until owned objects are collected.
pub const INTEGRATION_FINALIZER: &str = "kforge.dev/integration-finalizer";

/// Copies the creator labels of `labels` (used to tag derived builds).
pub fn creator_labels(
    labels: &std::collections::BTreeMap<String, String>,
) -> std::collections::BTreeMap<String, String> {
    labels
        .iter()
        .filter(|(k, _)| k.starts_with("kforge.dev/created.by."))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
