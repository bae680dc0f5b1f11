//! Contract tests for core_types
//!
//! Every rejection reason type used with the event loop must satisfy
//! `RejectionReason`; these tests pin the types the workspace relies on.

use core_types::{AggregateError, JsError, RejectionReason};

fn assert_reason<E: RejectionReason>() {}

#[test]
fn js_error_is_rejection_reason() {
    assert_reason::<JsError>();
}

#[test]
fn string_is_rejection_reason() {
    assert_reason::<String>();
}

#[test]
fn aggregate_of_reasons_is_rejection_reason() {
    assert_reason::<AggregateError<JsError>>();
    assert_reason::<AggregateError<String>>();
}

#[test]
fn errors_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<JsError>();
    assert_send_sync::<core_types::JobError>();
}
