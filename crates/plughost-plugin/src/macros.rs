//! Convenience macros for plugin development.

/// Builds [`PluginMetadata`](crate::metadata::PluginMetadata) from key/value pairs.
///
/// # Example
/// ```rust,ignore
/// let metadata = plugin_metadata!(
///     name: "Event Log",
///     version: "1.0.0",
///     main: "event-log",
///     hooks: ["plugin.event"],
///     permissions: ["hooks.trigger"],
/// );
/// ```
#[macro_export]
macro_rules! plugin_metadata {
    (
        name: $name:expr,
        version: $version:expr,
        main: $main:expr
        $(, description: $desc:expr)?
        $(, dependencies: [$($dep:expr),* $(,)?])?
        $(, hooks: [$($hook:expr),* $(,)?])?
        $(, permissions: [$($perm:expr),* $(,)?])?
        $(, interfaces: [$($iface:expr),* $(,)?])?
        $(, apis: [$($api:expr),* $(,)?])?
        $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut metadata = $crate::prelude::PluginMetadata::new($name, $version, $main);
        $( metadata = metadata.with_description($desc); )?
        $($( metadata = metadata.with_dependency($dep); )*)?
        $($( metadata = metadata.with_hook($hook); )*)?
        $($( metadata = metadata.with_permission($perm); )*)?
        $($( metadata = metadata.with_interface($iface); )*)?
        $($( metadata = metadata.with_api($api); )*)?
        metadata
    }};
}

/// Builds a [`HookContext`](crate::hooks::HookContext).
///
/// # Example
/// ```rust,ignore
/// let ctx = hook_context!({
///     "message_id" => json!("abc-123"),
///     "folder" => json!("inbox"),
/// });
/// ```
#[macro_export]
macro_rules! hook_context {
    () => {
        $crate::prelude::HookContext::new()
    };
    ({ $($key:expr => $value:expr),* $(,)? }) => {{
        #[allow(unused_mut)]
        let mut context = $crate::prelude::HookContext::new();
        $(
            context.insert($key, $value);
        )*
        context
    }};
}
