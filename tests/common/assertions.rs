//! Domain-specific assertion macros for logtree harnesses.
//!
//! These wrap `pretty_assertions` and add failure messages that show the
//! events involved rather than just the mismatching values.

/// Assert the messages of a slice of events, in order.
///
/// ```rust
/// assert_messages!(events, ["first", "second"]);
/// ```
#[macro_export]
macro_rules! assert_messages {
    ($events:expr, [$($msg:expr),* $(,)?]) => {{
        let events: &[logtree_core::LogEvent] = &$events;
        let actual: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
        let expected: Vec<&str> = vec![$($msg),*];
        pretty_assertions::assert_eq!(
            actual, expected,
            "assert_messages! failed; events were:\n{:#?}", events
        );
    }};
}

/// Assert the direct and aggregate counts of one logger in a snapshot.
///
/// ```rust
/// assert_logger_counts!(snapshot, "App.Db", direct = 2, total = 5);
/// ```
#[macro_export]
macro_rules! assert_logger_counts {
    ($snapshot:expr, $path:expr, direct = $direct:expr, total = $total:expr) => {{
        let snapshot: &logtree_core::RegistrySnapshot = &$snapshot;
        let path: &str = $path;
        match snapshot.root.find(path) {
            Some(node) => pretty_assertions::assert_eq!(
                (node.message_count, node.aggregate_count),
                ($direct, $total),
                "assert_logger_counts! failed for logger {:?} (direct, total)",
                path
            ),
            None => panic!(
                "assert_logger_counts! failed: logger {:?} not found. Tree:\n{:#?}",
                path, snapshot.root
            ),
        }
    }};
}

/// Assert that no event in the slice is a parser diagnostic.
#[macro_export]
macro_rules! assert_no_diagnostics {
    ($events:expr) => {{
        let events: &[logtree_core::LogEvent] = &$events;
        let diagnostics: Vec<_> = events
            .iter()
            .filter(|e| e.logger_name == logtree_core::csv::DIAGNOSTIC_LOGGER)
            .collect();
        if !diagnostics.is_empty() {
            panic!("assert_no_diagnostics! failed:\n{:#?}", diagnostics);
        }
    }};
}
