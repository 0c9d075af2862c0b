mod common;

use common::record;
use vmkit::{
    Command, ErrorsContainer, LifecycleScope, Observable, ReactiveProperty, SetOutcome,
    ValidationOutcome,
};

fn email_property(scope: &LifecycleScope, errors: &ErrorsContainer) -> ReactiveProperty<String> {
    ReactiveProperty::builder("email", String::new())
        .validate(|value: &String| {
            if value.contains('@') {
                ValidationOutcome::Valid
            } else {
                ValidationOutcome::invalid("must contain @")
            }
        })
        .errors(errors)
        .build(scope)
}

/// A rejected value never changes the property or notifies.
#[test]
fn test_invalid_value_never_changes_or_notifies() {
    let scope = LifecycleScope::new("form");
    let errors = ErrorsContainer::new(&scope);
    let email = email_property(&scope, &errors);
    email.set_value("a@b".to_string());
    let (seen, _sub) = record(&email);

    for candidate in ["", "nope", "still nope"] {
        let outcome = email.set_value(candidate.to_string());
        assert!(matches!(outcome, SetOutcome::Rejected(_)));
        assert_eq!(email.get_value(), "a@b");
    }
    assert!(seen.lock().is_empty());
    assert_eq!(errors.errors("email"), vec!["must contain @"]);
}

/// Repeated identical sets notify once.
#[test]
fn test_repeated_identical_sets_notify_once() {
    let scope = LifecycleScope::new("form");
    let count = ReactiveProperty::new(&scope, "count", 0u32);
    let (seen, _sub) = record(&count);

    for _ in 0..5 {
        count.set_value(3);
    }
    assert_eq!(*seen.lock(), vec![3]);
}

/// Setting a valid value flips `can_execute` in one notification.
#[test]
fn test_valid_value_flips_can_execute_once() {
    let scope = LifecycleScope::new("form");
    let errors = ErrorsContainer::new(&scope);
    let email = email_property(&scope, &errors);
    let submit = Command::new(&scope, "submit", |_: ()| async { Ok(()) })
        .observes_can_execute(&email.is_valid())
        .observes_property(&email);
    assert!(!submit.can_execute().get());

    let (seen, _sub) = record(&submit.can_execute());
    email.set_value("ada@example.com".to_string());
    assert_eq!(*seen.lock(), vec![true]);

    email.set_value("broken".to_string());
    assert_eq!(*seen.lock(), vec![true, false]);
}

/// Command enablement never reads true while validation fails.
#[test]
fn test_can_execute_never_true_while_invalid() {
    let scope = LifecycleScope::new("form");
    let errors = ErrorsContainer::new(&scope);
    let email = email_property(&scope, &errors);
    let submit = Command::new(&scope, "submit", |_: ()| async { Ok(()) })
        .observes_can_execute(&email.is_valid());

    let validity = email.is_valid();
    let _guard = submit.can_execute().subscribe(move |enabled: &bool| {
        if *enabled {
            assert!(validity.get());
        }
    });
    for candidate in ["x", "x@y", "", "z@z", "zz"] {
        email.set_value(candidate.to_string());
        assert_eq!(submit.can_execute().get(), email.is_valid().get());
    }
}

/// set_errors then clearing flips `has_errors` true then false, once each.
#[test]
fn test_errors_container_aggregate_flips_once() {
    let scope = LifecycleScope::new("form");
    let errors = ErrorsContainer::new(&scope);
    let (flips, _sub) = record(&errors.has_errors());

    errors.set_errors("email", ["required"]);
    errors.set_errors("email", Vec::<String>::new());

    assert_eq!(*flips.lock(), vec![true, false]);
}

/// Clearing every key is one update with one aggregate notification.
#[test]
fn test_clear_all_errors_notifies_once() {
    let scope = LifecycleScope::new("form");
    let errors = ErrorsContainer::new(&scope);
    errors.set_errors("email", ["required"]);
    errors.set_errors("name", ["too short", "not unique"]);
    assert_eq!(errors.errors("name").len(), 2);

    let (flips, _sub) = record(&errors.has_errors());
    errors.clear_errors(None);
    assert_eq!(*flips.lock(), vec![false]);
    assert!(errors.keys().is_empty());
}

/// Value, validity and errors settle together.
#[test]
fn test_property_and_errors_update_in_one_pass() {
    let scope = LifecycleScope::new("form");
    let errors = ErrorsContainer::new(&scope);
    let email = email_property(&scope, &errors);

    let snapshots = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let _sub = {
        let snapshots = snapshots.clone();
        let errors = errors.clone();
        let validity = email.is_valid();
        email.subscribe(move |value: &String| {
            snapshots
                .lock()
                .push((value.clone(), validity.get(), errors.has_errors().get()));
        })
    };

    email.set_value("ok@x".to_string());
    assert_eq!(*snapshots.lock(), vec![("ok@x".to_string(), true, false)]);
}

/// A command can observe a property owned by another view-model.
#[test]
fn test_command_observes_property_of_other_view_model() {
    let form = LifecycleScope::new("form-vm");
    let toolbar = LifecycleScope::new("toolbar-vm");
    let title = ReactiveProperty::new(&form, "title", String::new());
    let publish =
        Command::new(&toolbar, "publish", |_: ()| async { Ok(()) }).observes_property(&title);
    assert!(!publish.can_execute().get());

    let (seen, _sub) = record(&publish.can_execute());
    title.set_value("Release notes".to_string());
    title.set_value("v2".to_string());
    assert_eq!(*seen.lock(), vec![true]);

    title.set_value(String::new());
    assert!(!publish.can_execute().get());
}
