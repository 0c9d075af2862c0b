use serde::{Deserialize, Serialize};

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub commands: CommandDefaults,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Defaults applied to commands built inside a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefaults {
    /// Execution policy for commands that don't choose one (default: concurrent).
    #[serde(default)]
    pub default_policy: ExecutionPolicy,
    /// Whether composite commands filter children by active state (default: false).
    #[serde(default)]
    pub monitor_activity: bool,
    /// Name prefix used for composite commands built without a name.
    #[serde(default = "default_composite_name")]
    pub composite_name: String,
}

/// How overlapping `execute` calls on one command are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// Overlapping calls run independently.
    #[default]
    Concurrent,
    /// A call while one is in flight fails with `CommandError::Busy`.
    SequentialReject,
    /// Calls run one at a time in arrival order.
    SequentialQueue,
}

/// Interaction request behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// What happens to a request raised with no attached consumer.
    #[serde(default)]
    pub unattended: UnattendedPolicy,
}

/// Policy for interaction requests raised before any consumer subscribed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnattendedPolicy {
    /// Drop the request and log a warning. The callback never runs.
    #[default]
    DropAndWarn,
    /// Keep the most recent request and deliver it to the next consumer.
    ReplayLast,
}

/// Diagnostics collector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Track live instances and warnings (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Maximum number of warnings retained (default: 256).
    #[serde(default = "default_max_warnings")]
    pub max_warnings: usize,
}

fn default_composite_name() -> String {
    "composite".to_string()
}

fn default_max_warnings() -> usize {
    256
}

impl Default for CommandDefaults {
    fn default() -> Self {
        Self {
            default_policy: ExecutionPolicy::default(),
            monitor_activity: false,
            composite_name: default_composite_name(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_warnings: default_max_warnings(),
        }
    }
}
