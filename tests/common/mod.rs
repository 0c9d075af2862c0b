//! Shared test utilities.

#![allow(dead_code, unused_imports)]

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use vmkit::cell::Observable;
use vmkit::{Command, Diagnostics, LifecycleScope, StateCell, Subscription};

pub type Recorded<T> = Arc<Mutex<Vec<T>>>;

/// Record every value `source` emits.
pub fn record<T, O>(source: &O) -> (Recorded<T>, Subscription)
where
    T: Clone + PartialEq + Send + Sync + 'static,
    O: Observable<T>,
{
    let seen: Recorded<T> = Arc::new(Mutex::new(Vec::new()));
    let sub = {
        let seen = seen.clone();
        source.subscribe(move |value: &T| seen.lock().push(value.clone()))
    };
    (seen, sub)
}

/// A scope with a recording diagnostics collector.
pub fn diagnosed_scope(name: &str) -> (LifecycleScope, Diagnostics) {
    let diagnostics = Diagnostics::new(32);
    let scope = LifecycleScope::builder(name)
        .diagnostics(diagnostics.clone())
        .build();
    (scope, diagnostics)
}

/// A command gated by its own boolean cell.
pub fn gated_command(scope: &LifecycleScope, name: &str, enabled: bool) -> (Command<(), ()>, StateCell<bool>) {
    let gate = StateCell::new(scope.domain(), enabled);
    let command = Command::new(scope, name, |_: ()| async { Ok(()) }).observes_can_execute(&gate);
    (command, gate)
}

/// A command that counts its runs and then succeeds with `value`.
pub fn counting_command(
    scope: &LifecycleScope,
    name: &str,
    value: u32,
) -> (Command<(), u32>, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let command = {
        let runs = runs.clone();
        Command::new(scope, name, move |_: ()| {
            runs.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value) }
        })
    };
    (command, runs)
}

/// A command whose body always fails with `message`.
pub fn failing_command(scope: &LifecycleScope, name: &str, message: &'static str) -> Command<(), u32> {
    Command::new(scope, name, move |_: ()| async move {
        Err(anyhow::anyhow!(message))
    })
}

/// Write `content` to a config file in a fresh temp dir.
pub fn temp_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, content).expect("Failed to write config");
    (temp_dir, config_path)
}
