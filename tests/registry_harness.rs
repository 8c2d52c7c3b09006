#![allow(unused)]
//! Logger tree integration harness: ingestion buffer, registry service and
//! the registry itself working together.
//!
//! # What this covers
//!
//! - **Ordering**: events pushed from several producers in any order are
//!   visible in sequence order, ties broken by arrival.
//! - **Tree maintenance**: dotted logger names build the hierarchy; direct and
//!   aggregate counts stay consistent under removal and clearing.
//! - **Visibility**: disabling a logger hides its subtree, a minimum level hides
//!   quieter events, and neither drops stored events.
//! - **Service**: commands issued through the handle see every event pushed
//!   before them once a flush has run.
//!
//! # Running
//!
//! ```sh
//! cargo test --test registry_harness
//! ```

mod common;
use common::*;

use logtree_core::csv::{into_events, CsvConfig, CsvParser};
use logtree_core::{EventSink, IngestBuffer, LogEvent, LogLevel, LoggerRegistry, RegistryService};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn registry_with(events: Vec<LogEvent>) -> LoggerRegistry {
    let mut registry = LoggerRegistry::new();
    registry.apply_batch(events);
    registry
}

fn messages(events: Vec<&LogEvent>) -> Vec<&str> {
    events.into_iter().map(|e| e.message.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[test]
fn parsed_session_builds_the_expected_tree() {
    let events = into_events(CsvParser::new(CsvConfig::default()).parse_str(SESSION_CSV));
    let registry = registry_with(events);
    let snapshot = registry.snapshot();

    assert_logger_counts!(snapshot, "Shop", direct = 0, total = 5);
    assert_logger_counts!(snapshot, "Shop.Billing", direct = 2, total = 2);
    assert_logger_counts!(snapshot, "Shop.Db", direct = 0, total = 2);
    assert_logger_counts!(snapshot, "Shop.Db.Pool", direct = 1, total = 1);
    assert_eq!(snapshot.total_events, 5);

    let walked: Vec<_> = snapshot
        .root
        .walk()
        .into_iter()
        .map(|(depth, node)| (depth, node.full_path.clone()))
        .collect();
    assert_eq!(
        walked,
        vec![
            (0, String::new()),
            (1, "Shop".to_string()),
            (2, "Shop.Billing".to_string()),
            (2, "Shop.Db".to_string()),
            (3, "Shop.Db.Pool".to_string()),
            (3, "Shop.Db.Query".to_string()),
            (2, "Shop.Startup".to_string()),
        ]
    );
}

#[test]
fn out_of_order_arrival_is_visible_in_sequence_order() {
    let registry = registry_with(vec![
        event(30, "B", LogLevel::Info, "thirty"),
        event(10, "A", LogLevel::Info, "ten"),
        event(20, "A.X", LogLevel::Info, "twenty"),
        event(10, "C", LogLevel::Info, "ten again"),
    ]);
    assert_eq!(messages(registry.visible()), vec!["ten", "ten again", "twenty", "thirty"]);
}

#[test]
fn disabling_hides_a_subtree_and_enabling_restores_it() {
    let mut registry = registry_with(vec![
        event(1, "App", LogLevel::Info, "app"),
        event(2, "App.Db", LogLevel::Info, "db"),
        event(3, "App.Db.Pool", LogLevel::Info, "pool"),
        event(4, "Other", LogLevel::Info, "other"),
    ]);

    assert!(registry.set_enabled("App.Db", false));
    assert_eq!(messages(registry.visible()), vec!["app", "other"]);
    assert_eq!(registry.len(), 4);

    // New loggers below a disabled one start disabled.
    assert!(!registry.apply(event(5, "App.Db.Cache", LogLevel::Info, "cache")));

    assert!(registry.set_enabled("App", true));
    assert_eq!(messages(registry.visible()), vec!["app", "db", "pool", "other", "cache"]);
    assert!(!registry.set_enabled("Nope", false));
}

#[test]
fn min_level_combines_with_enabled_state() {
    let mut registry = registry_with(vec![
        event(1, "A", LogLevel::Debug, "a-debug"),
        event(2, "A", LogLevel::Error, "a-error"),
        event(3, "B", LogLevel::Error, "b-error"),
    ]);
    registry.set_min_level(LogLevel::Warn);
    registry.set_enabled("B", false);
    assert_eq!(messages(registry.visible()), vec!["a-error"]);
    assert_eq!(registry.snapshot().visible_events, 1);
}

#[test]
fn removal_and_clear_keep_counts_consistent() {
    let mut registry = registry_with(vec![
        event(1, "App", LogLevel::Info, "app"),
        event(2, "App.Db", LogLevel::Info, "db"),
        event(3, "App.Db.Pool", LogLevel::Info, "pool"),
        event(4, "Other", LogLevel::Info, "other"),
    ]);

    assert_eq!(registry.remove_logger("App.Db"), Some(2));
    assert_eq!(registry.remove_logger("App.Db"), None);
    assert_eq!(registry.aggregate_count("App"), Some(1));
    assert_eq!(registry.aggregate_count(""), Some(2));
    assert_eq!(messages(registry.visible()), vec!["app", "other"]);

    assert_eq!(registry.clear_all(), 2);
    assert!(registry.is_empty());
    assert!(registry.root().children.is_empty());
}

#[test]
fn search_is_case_insensitive_over_visible_events() {
    let mut registry = registry_with(vec![
        event(1, "Api", LogLevel::Info, "User LOGIN ok"),
        event(2, "Api", LogLevel::Info, "logout").with_property("user", "Login-Bot"),
        event(3, "Hidden", LogLevel::Info, "login hidden"),
    ]);
    registry.set_enabled("Hidden", false);
    assert_eq!(messages(registry.search("login")), vec!["User LOGIN ok", "logout"]);
}

// ---------------------------------------------------------------------------
// Buffer + service
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_producers_all_reach_the_tree() {
    let buffer = Arc::new(IngestBuffer::new());
    let (service, handle) = RegistryService::new(buffer.clone(), Duration::from_secs(3600));
    let task = tokio::spawn(service.run());

    let producers: Vec<_> = (0..4u64)
        .map(|p| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                for i in 0..50u64 {
                    buffer.notify(event(p * 1000 + i, &format!("P{p}.Worker"), LogLevel::Info, "tick"));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.expect("producer");
    }

    handle.flush().await.expect("running");
    let snapshot = handle.snapshot().await.expect("running");
    assert_eq!(snapshot.total_events, 200);
    for p in 0..4 {
        assert_logger_counts!(snapshot, &format!("P{p}"), direct = 0, total = 50);
    }

    handle.shutdown().expect("running");
    let registry = task.await.expect("service task");
    assert_eq!(registry.len(), 200);
}

#[tokio::test]
async fn buffer_numbers_events_without_a_sequence() {
    let buffer = Arc::new(IngestBuffer::new());
    let (service, handle) = RegistryService::new(buffer.clone(), Duration::from_secs(3600));
    let task = tokio::spawn(service.run());

    buffer.notify_batch(vec![
        LogEvent::new("first").with_logger("Udp"),
        LogEvent::new("second").with_logger("Udp"),
        LogEvent::new("third").with_logger("Udp"),
    ]);
    handle.flush().await.expect("running");

    let visible = handle.visible().await.expect("running");
    assert_messages!(visible, ["first", "second", "third"]);
    assert!(visible.iter().all(|e| e.sequence_nr.is_some()));

    handle.shutdown().expect("running");
    task.await.expect("service task");
}

#[tokio::test]
async fn handle_commands_drive_visibility() {
    let buffer = Arc::new(IngestBuffer::new());
    let (service, handle) = RegistryService::new(buffer.clone(), Duration::from_secs(3600));
    let task = tokio::spawn(service.run());

    buffer.notify_batch(vec![
        event(1, "App.Db", LogLevel::Debug, "db debug"),
        event(2, "App.Http", LogLevel::Error, "http error"),
        event(3, "Noise", LogLevel::Warn, "noise"),
    ]);
    handle.flush().await.expect("running");

    assert!(handle.set_enabled("Noise", false).await.expect("running"));
    handle.set_min_level(LogLevel::Info).await.expect("running");
    assert_messages!(handle.visible().await.expect("running"), ["http error"]);
    assert_messages!(handle.search("HTTP").await.expect("running"), ["http error"]);

    assert_eq!(handle.remove_logger("App").await.expect("running"), Some(2));
    assert_eq!(handle.clear_all().await.expect("running"), 1);
    assert_eq!(handle.snapshot().await.expect("running").total_events, 0);

    handle.shutdown().expect("running");
    task.await.expect("service task");
}
