mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{counting_command, diagnosed_scope, failing_command, gated_command, record};
use vmkit::command::{ChildOutcome, CompositeOptions};
use vmkit::{
    ActiveAwareness, CancelToken, Command, CommandError, CompositeCommand, LifecycleScope,
    Observable, StateCell, WarningKind,
};

/// An empty composite is enabled and idle.
#[test]
fn test_empty_composite_is_enabled_and_idle() {
    let scope = LifecycleScope::new("shell");
    let composite: CompositeCommand<(), ()> = CompositeCommand::new(&scope);
    assert!(composite.can_execute().get());
    assert!(!composite.is_executing().get());
}

/// [C1 enabled, C2 disabled] is disabled; unregistering C2 enables it.
#[test]
fn test_unregistering_disabled_child_enables_composite() {
    let scope = LifecycleScope::new("shell");
    let composite = CompositeCommand::new(&scope);
    let (c1, _g1) = gated_command(&scope, "c1", true);
    let (c2, _g2) = gated_command(&scope, "c2", false);
    composite.register(&c1);
    composite.register(&c2);
    assert!(!composite.can_execute().get());

    let (seen, _sub) = record(&composite.can_execute());
    assert!(composite.unregister(&c2));
    assert!(composite.can_execute().get());
    assert_eq!(*seen.lock(), vec![true]);
}

/// `can_execute` is the AND over children for every combination.
#[test]
fn test_can_execute_is_and_over_children() {
    let scope = LifecycleScope::new("shell");
    let composite = CompositeCommand::new(&scope);
    let gates: Vec<_> = (0..3)
        .map(|i| {
            let (command, gate) = gated_command(&scope, &format!("c{i}"), true);
            composite.register(&command);
            gate
        })
        .collect();

    for mask in 0u8..8 {
        scope.domain().batch(|| {
            for (i, gate) in gates.iter().enumerate() {
                gate.set(mask & (1 << i) != 0);
            }
        });
        assert_eq!(composite.can_execute().get(), mask == 0b111, "mask {mask:03b}");
    }
}

/// `is_executing` is true while any eligible child runs.
#[tokio::test]
async fn test_is_executing_is_or_over_children() {
    let scope = LifecycleScope::new("shell");
    let composite = CompositeCommand::new(&scope);
    let slow = Command::new(&scope, "slow", |_: ()| async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(())
    });
    let (idle, _) = gated_command(&scope, "idle", true);
    composite.register(&slow);
    composite.register(&idle);

    let (seen, _sub) = record(&composite.is_executing());
    let running = {
        let slow = slow.clone();
        tokio::spawn(async move { slow.execute(()).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(composite.is_executing().get());

    running.await.expect("task").expect("slow ok");
    assert!(!composite.is_executing().get());
    assert_eq!(*seen.lock(), vec![true, false]);
}

/// [C1 succeeds, C2 fails] aggregates both outcomes; C1 already ran.
#[tokio::test]
async fn test_partial_failure_reports_every_child() {
    let scope = LifecycleScope::new("shell");
    let composite = CompositeCommand::new(&scope);
    let (c1, c1_runs) = counting_command(&scope, "c1", 7);
    let c2 = failing_command(&scope, "c2", "disk full");
    composite.register(&c1);
    composite.register(&c2);

    let error = composite.execute(()).await.expect_err("aggregate");
    assert_eq!(c1_runs.load(Ordering::SeqCst), 1);
    assert_eq!(error.outcomes.len(), 2);

    assert_eq!(error.outcomes[0].command, "c1");
    assert!(matches!(error.outcomes[0].outcome, ChildOutcome::Succeeded(7)));

    assert_eq!(error.outcomes[1].command, "c2");
    match &error.outcomes[1].outcome {
        ChildOutcome::Failed(CommandError::Execution { source, .. }) => {
            assert_eq!(source.to_string(), "disk full");
        }
        other => panic!("expected execution failure, got {other:?}"),
    }
    assert!(!c1.is_executing().get());
}

/// A failing child does not stop a slower sibling.
#[tokio::test]
async fn test_failure_does_not_cancel_siblings() {
    let scope = LifecycleScope::new("shell");
    let composite = CompositeCommand::new(&scope);
    let fast_fail = failing_command(&scope, "fast", "nope");
    let slow_ok = Command::new(&scope, "slow", |_: ()| async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(9)
    });
    composite.register(&fast_fail);
    composite.register(&slow_ok);

    let error = composite.execute(()).await.expect_err("aggregate");
    assert!(matches!(error.outcomes[1].outcome, ChildOutcome::Succeeded(9)));
    assert_eq!(error.failures().count(), 1);
}

/// Monitoring skips inactive children and warns about non-aware ones.
#[tokio::test]
async fn test_monitor_activity_filters_execution() {
    let (scope, diagnostics) = diagnosed_scope("shell");
    let composite = CompositeCommand::with_options(
        &scope,
        CompositeOptions {
            name: Some("save-all".to_string()),
            monitor_activity: Some(true),
        },
    );

    let active_tab = ActiveAwareness::new(&scope, true);
    let hidden_tab = ActiveAwareness::new(&scope, false);
    let save_active = Command::builder("save-active")
        .active_awareness(active_tab)
        .build(&scope, |_: ()| async { Ok("active") });
    let save_hidden = Command::builder("save-hidden")
        .active_awareness(hidden_tab.clone())
        .build(&scope, |_: ()| async { Ok("hidden") });
    composite.register(&save_active);
    composite.register(&save_hidden);
    assert!(diagnostics.warnings().is_empty());

    assert_eq!(composite.execute(()).await.expect("ok"), vec!["active"]);

    hidden_tab.set_active(true);
    assert_eq!(
        composite.execute(()).await.expect("ok"),
        vec!["active", "hidden"]
    );

    let plain = Command::new(&scope, "plain", |_: ()| async { Ok("plain") });
    assert!(composite.register(&plain));
    let warnings = diagnostics.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::NotActiveAware);
}

/// A cancelled token skips undispatched children.
#[tokio::test]
async fn test_cancelled_composite_skips_children() {
    let scope = LifecycleScope::new("shell");
    let composite = CompositeCommand::new(&scope);
    let (c1, runs) = counting_command(&scope, "c1", 1);
    composite.register(&c1);

    let token = CancelToken::new();
    token.cancel();
    let error = composite.execute_with((), &token).await.expect_err("skipped");
    assert!(matches!(error.outcomes[0].outcome, ChildOutcome::Skipped));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

/// Children owned by other view-models aggregate like local ones.
#[tokio::test]
async fn test_children_from_other_view_models() {
    let shell = LifecycleScope::new("shell");
    let editor = LifecycleScope::new("editor-vm");
    let viewer = LifecycleScope::new("viewer-vm");
    let composite = CompositeCommand::with_options(
        &shell,
        CompositeOptions {
            name: Some("save-all".to_string()),
            monitor_activity: Some(true),
        },
    );

    let (save_editor, editor_gate) = gated_command(&editor, "save-editor", true);
    let viewer_tab = ActiveAwareness::new(&viewer, false);
    let save_viewer = Command::builder("save-viewer")
        .active_awareness(viewer_tab.clone())
        .build(&viewer, |_: ()| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(())
        });
    assert!(composite.register(&save_editor));
    assert!(composite.register(&save_viewer));
    assert!(composite.can_execute().get());

    let (seen, _sub) = record(&composite.can_execute());
    editor_gate.set(false);
    assert!(!composite.can_execute().get());
    editor_gate.set(true);
    assert_eq!(*seen.lock(), vec![false, true]);

    viewer_tab.set_active(true);
    let running = {
        let save_viewer = save_viewer.clone();
        tokio::spawn(async move { save_viewer.execute(()).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(composite.is_executing().get());
    running.await.expect("task").expect("viewer ok");
    assert!(!composite.is_executing().get());

    assert_eq!(composite.execute(()).await.expect("ok").len(), 2);
}

/// A child whose view-model is destroyed leaves the composite.
#[tokio::test]
async fn test_disposed_child_leaves_composite() {
    let shell = LifecycleScope::new("shell");
    let tab = LifecycleScope::new("tab-vm");
    let composite = CompositeCommand::new(&shell);

    let (save_shell, shell_runs) = counting_command(&shell, "save-shell", 1);
    let tab_gate = StateCell::new(tab.domain(), false);
    let (save_tab, tab_runs) = counting_command(&tab, "save-tab", 2);
    let save_tab = save_tab.observes_can_execute(&tab_gate);
    composite.register(&save_shell);
    composite.register(&save_tab);
    assert!(!composite.can_execute().get());

    tab.dispose();
    assert!(!composite.contains(&save_tab));
    assert_eq!(composite.children(), vec![save_shell.id()]);
    assert!(composite.can_execute().get());

    assert_eq!(composite.execute(()).await.expect("ok"), vec![1]);
    assert_eq!(shell_runs.load(Ordering::SeqCst), 1);
    assert_eq!(tab_runs.load(Ordering::SeqCst), 0);
    assert!(!composite.register(&save_tab));
}

/// Children run on their own tasks, so blocking bodies overlap.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_children_run_in_parallel() {
    let scope = LifecycleScope::new("shell");
    let composite = CompositeCommand::new(&scope);
    let arrived = Arc::new(AtomicUsize::new(0));
    for name in ["left", "right"] {
        let arrived = arrived.clone();
        let child = Command::new(&scope, name, move |_: ()| {
            let arrived = arrived.clone();
            async move {
                arrived.fetch_add(1, Ordering::SeqCst);
                let deadline = Instant::now() + Duration::from_secs(2);
                while arrived.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(arrived.load(Ordering::SeqCst) == 2)
            }
        });
        composite.register(&child);
    }

    assert_eq!(composite.execute(()).await.expect("ok"), vec![true, true]);
}
