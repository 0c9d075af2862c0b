//! Injectable diagnostics collector.
//!
//! Tracks how many instances of each kind are alive (created and not yet
//! disposed) and keeps a bounded list of [`ConfigurationWarning`]s. The
//! collector is owned by the host or test harness and handed to scopes
//! explicitly; nothing here is global.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DiagnosticsConfig;

/// Category of a non-fatal configuration problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A command without active-awareness was registered into a composite
    /// that monitors activity. It is always treated as eligible.
    NotActiveAware,
    /// Something was registered into a scope that had already been disposed.
    /// It was released immediately.
    RegisteredAfterDispose,
}

/// A non-fatal configuration warning. Logged, never thrown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationWarning {
    pub kind: WarningKind,
    /// Name of the offending entity.
    pub subject: String,
    pub message: String,
}

impl std::fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}

/// Handle to a diagnostics collector. Cheap to clone.
///
/// A disabled collector (the default) still logs warnings through
/// `tracing` but records nothing.
#[derive(Clone, Default)]
pub struct Diagnostics {
    inner: Option<Arc<DiagnosticsInner>>,
}

struct DiagnosticsInner {
    live: Mutex<BTreeMap<&'static str, usize>>,
    warnings: Mutex<VecDeque<ConfigurationWarning>>,
    max_warnings: usize,
}

impl Diagnostics {
    /// A recording collector keeping at most `max_warnings` warnings.
    pub fn new(max_warnings: usize) -> Self {
        Self {
            inner: Some(Arc::new(DiagnosticsInner {
                live: Mutex::new(BTreeMap::new()),
                warnings: Mutex::new(VecDeque::new()),
                max_warnings: max_warnings.max(1),
            })),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn from_config(config: &DiagnosticsConfig) -> Self {
        if config.enabled {
            Self::new(config.max_warnings)
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Count a new live instance of `kind` until the token is released.
    pub(crate) fn track(&self, kind: &'static str) -> InstanceToken {
        if let Some(inner) = &self.inner {
            *inner.live.lock().entry(kind).or_insert(0) += 1;
        }
        InstanceToken {
            inner: self.inner.clone(),
            kind,
            released: AtomicBool::new(false),
        }
    }

    /// Number of live instances of `kind`.
    pub fn live(&self, kind: &str) -> usize {
        self.inner
            .as_ref()
            .and_then(|inner| inner.live.lock().get(kind).copied())
            .unwrap_or(0)
    }

    /// Live instance counts for every kind with at least one instance.
    pub fn live_counts(&self) -> BTreeMap<String, usize> {
        let Some(inner) = &self.inner else {
            return BTreeMap::new();
        };
        inner
            .live
            .lock()
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(kind, count)| (kind.to_string(), *count))
            .collect()
    }

    /// Log a warning and record it if enabled.
    pub fn warn(&self, warning: ConfigurationWarning) {
        tracing::warn!(
            kind = ?warning.kind,
            subject = %warning.subject,
            "{}",
            warning.message
        );
        let Some(inner) = &self.inner else {
            return;
        };
        let mut warnings = inner.warnings.lock();
        if warnings.len() == inner.max_warnings {
            warnings.pop_front();
        }
        warnings.push_back(warning);
    }

    /// Recorded warnings, oldest first.
    pub fn warnings(&self) -> Vec<ConfigurationWarning> {
        self.inner
            .as_ref()
            .map(|inner| inner.warnings.lock().iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("enabled", &self.is_enabled())
            .field("live", &self.live_counts())
            .finish()
    }
}

/// Counts one live instance; released on dispose or drop, once.
pub(crate) struct InstanceToken {
    inner: Option<Arc<DiagnosticsInner>>,
    kind: &'static str,
    released: AtomicBool,
}

impl InstanceToken {
    pub(crate) fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = &self.inner {
            if let Some(count) = inner.live.lock().get_mut(self.kind) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

impl Drop for InstanceToken {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(subject: &str) -> ConfigurationWarning {
        ConfigurationWarning {
            kind: WarningKind::NotActiveAware,
            subject: subject.to_string(),
            message: "not active-aware".to_string(),
        }
    }

    #[test]
    fn tokens_count_live_instances() {
        let diagnostics = Diagnostics::new(4);
        let a = diagnostics.track("command");
        let b = diagnostics.track("command");
        assert_eq!(diagnostics.live("command"), 2);

        a.release();
        a.release();
        assert_eq!(diagnostics.live("command"), 1);

        drop(b);
        assert_eq!(diagnostics.live("command"), 0);
        assert!(diagnostics.live_counts().is_empty());
    }

    #[test]
    fn warnings_are_bounded() {
        let diagnostics = Diagnostics::new(2);
        diagnostics.warn(warning("a"));
        diagnostics.warn(warning("b"));
        diagnostics.warn(warning("c"));

        let subjects: Vec<_> = diagnostics
            .warnings()
            .into_iter()
            .map(|w| w.subject)
            .collect();
        assert_eq!(subjects, vec!["b", "c"]);
    }

    #[test]
    fn disabled_collector_records_nothing() {
        let diagnostics = Diagnostics::disabled();
        let _token = diagnostics.track("command");
        diagnostics.warn(warning("a"));
        assert_eq!(diagnostics.live("command"), 0);
        assert!(diagnostics.warnings().is_empty());
    }

    #[test]
    fn from_config_respects_enabled_flag() {
        let mut config = DiagnosticsConfig::default();
        assert!(!Diagnostics::from_config(&config).is_enabled());
        config.enabled = true;
        assert!(Diagnostics::from_config(&config).is_enabled());
    }
}
