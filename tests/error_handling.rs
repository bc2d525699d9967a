//! Error handling and edge case tests.

use state_namespace::{
    ManualClock, MetricValue, NamespaceConfig, NamespaceError, PathAddress, StateNamespace,
    SubscriptionConfig, SubscriptionId, Timestamp, Transition,
};
use std::sync::Arc;
use std::time::Duration;

fn p(text: &str) -> PathAddress {
    PathAddress::parse(text).unwrap()
}

fn test_namespace() -> StateNamespace {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(0)));
    let config = NamespaceConfig {
        sweep_interval: None,
        ..Default::default()
    };
    StateNamespace::with_clock(config, clock).unwrap()
}

// --- Path Errors ---

#[test]
fn test_invalid_path_text() {
    for text in ["", ".", "a..b", ".a", "a."] {
        assert!(
            matches!(PathAddress::parse(text), Err(NamespaceError::InvalidPath(_))),
            "expected {:?} to be rejected",
            text
        );
    }
    assert!(matches!(
        PathAddress::from_segments(Vec::<String>::new()),
        Err(NamespaceError::InvalidPath(_))
    ));
    assert!(matches!(
        PathAddress::from_segments(["a", ""]),
        Err(NamespaceError::InvalidPath(_))
    ));
}

#[test]
fn test_invalid_path_in_transition_builder() {
    let result = Transition::new().put_text("a..b", 1i64);
    assert!(matches!(result, Err(NamespaceError::InvalidPath(_))));

    let result = Transition::new().remove_text("");
    assert!(matches!(result, Err(NamespaceError::InvalidPath(_))));
}

// --- Type Conflicts ---

#[test]
fn test_put_onto_composite() {
    let namespace = test_namespace();
    namespace.put(p("a.b"), 1i64).unwrap();

    let result = namespace.put(p("a"), 2i64);
    assert!(matches!(result, Err(NamespaceError::TypeConflict { .. })));
    assert_eq!(namespace.value(&p("a.b")), Some(MetricValue::Integer(1)));
}

#[test]
fn test_put_through_metric() {
    let namespace = test_namespace();
    namespace.put(p("a"), 1i64).unwrap();

    let result = namespace.put(p("a.b"), 2i64);
    match result {
        Err(NamespaceError::TypeConflict { path, .. }) => assert_eq!(path, p("a.b")),
        other => panic!("Expected TypeConflict, got {:?}", other),
    }
}

#[test]
fn test_branch_onto_metric() {
    let namespace = test_namespace();
    namespace.put(p("a.b"), 1i64).unwrap();

    let onto = namespace.commit(Transition::new().branch(p("a.b"), None));
    assert!(matches!(onto, Err(NamespaceError::TypeConflict { .. })));

    let through = namespace.commit(Transition::new().branch(p("a.b.c"), None));
    assert!(matches!(through, Err(NamespaceError::TypeConflict { .. })));
}

#[test]
fn test_failed_transition_is_invisible() {
    let namespace = test_namespace();
    namespace.put(p("keep"), "here").unwrap();
    namespace.put(p("blocker"), 0i64).unwrap();
    let version = namespace.version();
    let handle = namespace
        .subscribe(SubscriptionConfig::subtree(p("new")))
        .unwrap();

    let result = namespace.commit(
        Transition::new()
            .put(p("new.one"), 1i64)
            .put(p("new.two"), 2i64)
            .remove(p("keep"))
            .put(p("blocker.child"), 3i64),
    );

    assert!(matches!(result, Err(NamespaceError::TypeConflict { .. })));
    assert_eq!(namespace.version(), version);
    assert!(!namespace.contains(&p("new")));
    assert!(namespace.contains(&p("keep")));
    assert!(handle.recv_timeout(Duration::from_millis(100)).is_err());

    // The namespace is still writable afterwards
    namespace.put(p("new.one"), 1i64).unwrap();
    assert_eq!(namespace.version(), version + 1);
}

// --- Missing Paths ---

#[test]
fn test_remove_missing_path() {
    let namespace = test_namespace();

    let report = namespace
        .commit(
            Transition::new()
                .remove(p("never.existed"))
                .remove(p("also.missing")),
        )
        .unwrap();
    assert_eq!(report.missed_removes, 2);
    assert_eq!(report.changes, 0);
}

#[test]
fn test_remove_below_metric_is_missing() {
    let namespace = test_namespace();
    namespace.put(p("a"), 1i64).unwrap();

    let report = namespace.remove(p("a.b")).unwrap();
    assert_eq!(report.missed_removes, 1);
    assert!(namespace.contains(&p("a")));
}

#[test]
fn test_query_missing_path() {
    let namespace = test_namespace();
    namespace.put(p("a.b"), 1i64).unwrap();

    assert!(namespace.get(&p("x")).is_none());
    assert!(namespace.value(&p("a")).is_none());
    assert!(matches!(
        namespace.child_names(&p("x")),
        Err(NamespaceError::PathNotFound(_))
    ));
    // A metric has no children
    assert!(matches!(
        namespace.child_names(&p("a.b")),
        Err(NamespaceError::PathNotFound(_))
    ));

    let snapshot = namespace.snapshot();
    match snapshot.visit_from(&p("a.c")) {
        Err(NamespaceError::PathNotFound(path)) => assert_eq!(path, p("a.c")),
        Err(e) => panic!("Expected PathNotFound, got {:?}", e),
        Ok(_) => panic!("Expected PathNotFound"),
    }
}

#[test]
fn test_expire_of_live_or_missing_metric() {
    let namespace = test_namespace();
    namespace
        .put_with_ttl(p("a"), 1i64, Duration::from_secs(60))
        .unwrap();
    namespace.put(p("durable"), 1i64).unwrap();

    let report = namespace
        .commit(
            Transition::new()
                .expire(p("a"))
                .expire(p("durable"))
                .expire(p("missing")),
        )
        .unwrap();
    assert_eq!(report.changes, 0);
    assert_eq!(report.missed_removes, 0);
    assert!(namespace.contains(&p("a")));
    assert!(namespace.contains(&p("durable")));
}

// --- Subscriptions ---

#[test]
fn test_unsubscribe_unknown() {
    let namespace = test_namespace();
    let result = namespace.unsubscribe(SubscriptionId(999));
    assert!(matches!(
        result,
        Err(NamespaceError::SubscriptionNotFound(SubscriptionId(999)))
    ));
}

#[test]
fn test_unsubscribe_twice() {
    let namespace = test_namespace();
    let handle = namespace
        .subscribe(SubscriptionConfig::exact(p("a")))
        .unwrap();

    namespace.unsubscribe(handle.id).unwrap();
    assert!(matches!(
        namespace.unsubscribe(handle.id),
        Err(NamespaceError::SubscriptionNotFound(_))
    ));
}

#[test]
fn test_replay_overflowing_buffer() {
    let namespace = test_namespace();
    let transition = Transition::from_updates(
        (0..10i64).map(|i| (p("items").child(i.to_string()), MetricValue::from(i), None)),
    );
    namespace.commit(transition).unwrap();

    let result = namespace.subscribe(
        SubscriptionConfig::subtree(p("items"))
            .with_buffer_size(3)
            .with_replay(),
    );
    assert!(matches!(result, Err(NamespaceError::SubscriptionDropped)));
    assert_eq!(namespace.subscription_count(), 0);
}

// --- Limits and Configuration ---

#[test]
fn test_transition_too_large() {
    let clock = Arc::new(ManualClock::default());
    let config = NamespaceConfig {
        sweep_interval: None,
        max_transition_ops: 3,
        ..Default::default()
    };
    let namespace = StateNamespace::with_clock(config, clock).unwrap();

    let transition = Transition::removing((0..4).map(|i| p("a").child(i.to_string())));
    let result = namespace.commit(transition);
    assert!(matches!(
        result,
        Err(NamespaceError::TransitionTooLarge {
            operations: 4,
            max: 3
        })
    ));
    assert_eq!(namespace.version(), 0);
}

#[test]
fn test_invalid_config() {
    let result = StateNamespace::new(NamespaceConfig {
        default_buffer_size: 0,
        ..Default::default()
    });
    match result {
        Err(NamespaceError::InvalidConfig(message)) => {
            assert!(message.contains("default_buffer_size"))
        }
        Err(e) => panic!("Expected InvalidConfig, got {:?}", e),
        Ok(_) => panic!("Expected InvalidConfig"),
    }
}

#[test]
fn test_error_messages() {
    let err = NamespaceError::TransitionTooLarge {
        operations: 20,
        max: 10,
    };
    assert_eq!(
        err.to_string(),
        "Transition too large: 20 operations (max 10)"
    );

    let err = NamespaceError::PathNotFound(p("a.b"));
    assert_eq!(err.to_string(), "Path not found: a.b");
}
