//! Unit tests for JsError, TaskError, JobError and AggregateError

use core_types::{
    AggregateError, ErrorKind, JobError, JobKind, JsError, TaskError, UnhandledRejection,
};

mod js_error_tests {
    use super::*;

    #[test]
    fn test_error_constructor_uses_plain_kind() {
        let error = JsError::error("failed to load");
        assert_eq!(error.kind, ErrorKind::Error);
        assert_eq!(error.message, "failed to load");
    }

    #[test]
    fn test_type_error_constructor() {
        let error = JsError::type_error("x is not a function");
        assert_eq!(error.kind, ErrorKind::TypeError);
    }

    #[test]
    fn test_display_prefixes_kind() {
        let error = JsError::new(ErrorKind::RangeError, "index out of bounds");
        assert_eq!(error.to_string(), "RangeError: index out of bounds");
    }

    #[test]
    fn test_clone_preserves_fields() {
        let error = JsError::error("copy me");
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }

    #[test]
    fn test_is_std_error() {
        let error: Box<dyn std::error::Error> = Box::new(JsError::error("boxed"));
        assert_eq!(error.to_string(), "Error: boxed");
    }
}

mod task_error_tests {
    use super::*;

    #[test]
    fn test_chain_cycle_message_names_promise() {
        let err = TaskError::ChainCycle(12);
        assert_eq!(err.to_string(), "Chaining cycle detected for promise #12");
    }

    #[test]
    fn test_chain_cycle_into_string() {
        let reason: String = TaskError::ChainCycle(3).into();
        assert!(reason.starts_with("Chaining cycle"));
    }

    #[test]
    fn test_callback_panic_into_js_error() {
        let error: JsError = TaskError::CallbackPanicked("bad input".to_string()).into();
        assert_eq!(error.kind, ErrorKind::InternalError);
        assert!(error.message.contains("bad input"));
    }
}

mod aggregate_error_tests {
    use super::*;

    #[test]
    fn test_empty_aggregate_display() {
        let agg: AggregateError<String> = AggregateError::new(vec![]);
        assert_eq!(agg.to_string(), "AggregateError: All promises were rejected");
    }

    #[test]
    fn test_aggregate_keeps_order() {
        let agg = AggregateError::new(vec![JsError::error("first"), JsError::error("second")]);
        assert_eq!(agg.errors[0].message, "first");
        assert_eq!(agg.errors[1].message, "second");
    }

    #[test]
    fn test_aggregate_from_task_error_wraps_single_reason() {
        let agg: AggregateError<JsError> = TaskError::ChainCycle(1).into();
        assert_eq!(agg.errors.len(), 1);
        assert_eq!(agg.errors[0].kind, ErrorKind::TypeError);
    }
}

mod job_error_tests {
    use super::*;

    #[test]
    fn test_failed_display() {
        let err = JobError::Failed {
            kind: JobKind::Microtask,
            source: JsError::error("oops"),
        };
        assert_eq!(err.to_string(), "microtask failed: Error: oops");
        assert_eq!(err.kind(), JobKind::Microtask);
    }

    #[test]
    fn test_unhandled_rejection_display() {
        let report = UnhandledRejection {
            promise_id: 4,
            reason: "Error: lost".to_string(),
        };
        assert_eq!(
            report.to_string(),
            "unhandled rejection of promise #4: Error: lost"
        );
    }
}
