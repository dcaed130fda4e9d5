//! Assertion helpers for recipe runs.

use crate::errors::{ErrorKind, RunError};

/// Asserts that every needle occurs in `text`, each after the previous one.
///
/// # Panics
///
/// Panics naming the first needle that is missing or out of order.
pub fn assert_in_order(text: &str, needles: &[&str]) {
    let mut from = 0;
    for needle in needles {
        match text[from..].find(needle) {
            Some(pos) => from += pos + needle.len(),
            None => panic!("expected '{needle}' after byte {from} in:\n{text}"),
        }
    }
}

/// Asserts that a run failed in `stage` with the given error kind.
///
/// # Panics
///
/// Panics if the result is `Ok` or the error does not match.
pub fn assert_failed_at<T: std::fmt::Debug>(result: &Result<T, RunError>, stage: &str, kind: ErrorKind) {
    match result {
        Ok(value) => panic!("expected {kind} in '{stage}', got Ok({value:?})"),
        Err(err) => {
            assert_eq!(err.kind(), kind, "unexpected error kind: {err}");
            assert_eq!(err.stage(), Some(stage), "unexpected failing stage: {err}");
        }
    }
}
