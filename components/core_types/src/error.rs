//! Error types shared by the runtime components.
//!
//! Rejection reasons flow through promises as ordinary values, so the types
//! here are all `Clone`. The scheduler itself never fails: every error it
//! observes is either turned into a rejection or handed to a host sink.

use std::fmt;

use thiserror::Error;

/// The kind of JavaScript error.
///
/// These correspond to JavaScript's built-in error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Plain `Error`
    Error,
    /// Type error (e.g., a promise resolved with itself)
    TypeError,
    /// Reference to an undefined variable
    ReferenceError,
    /// Value out of allowed range
    RangeError,
    /// Every input of an `any` combinator rejected
    AggregateError,
    /// Internal engine error
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::AggregateError => "AggregateError",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// A JavaScript-style error with a kind and a message.
///
/// This is the default rejection reason used by the runtime.
///
/// # Examples
///
/// ```
/// use core_types::{JsError, ErrorKind};
///
/// let error = JsError::new(ErrorKind::TypeError, "undefined is not a function");
/// assert_eq!(error.message, "undefined is not a function");
/// assert_eq!(error.to_string(), "TypeError: undefined is not a function");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl JsError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a plain `Error`, the equivalent of `new Error(message)`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Error, message)
    }

    /// Creates a `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }
}

/// Failures the promise machinery itself turns into rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// A deferred was resolved with itself, directly or through a chain of
    /// adopted deferreds.
    #[error("Chaining cycle detected for promise #{0}")]
    ChainCycle(u64),
    /// A `then`/`catch`/`finally` callback panicked.
    #[error("callback panicked: {0}")]
    CallbackPanicked(String),
}

impl From<TaskError> for JsError {
    fn from(err: TaskError) -> Self {
        let kind = match err {
            TaskError::ChainCycle(_) => ErrorKind::TypeError,
            TaskError::CallbackPanicked(_) => ErrorKind::InternalError,
        };
        JsError::new(kind, err.to_string())
    }
}

impl From<TaskError> for String {
    fn from(err: TaskError) -> Self {
        err.to_string()
    }
}

/// Bound satisfied by every rejection reason type.
///
/// The runtime needs to clone reasons (one per reaction), render them for
/// unhandled-rejection reports, and build them from its own failures.
pub trait RejectionReason: Clone + fmt::Display + From<TaskError> + 'static {}

impl<E> RejectionReason for E where E: Clone + fmt::Display + From<TaskError> + 'static {}

/// Rejection reason of the `any` combinator: every input rejected.
///
/// `errors` holds the individual reasons in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError<E> {
    /// Rejection reasons, in input order
    pub errors: Vec<E>,
}

impl<E> AggregateError<E> {
    /// Wraps the collected reasons.
    pub fn new(errors: Vec<E>) -> Self {
        Self { errors }
    }
}

impl<E: fmt::Display> fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AggregateError: All promises were rejected")?;
        if !self.errors.is_empty() {
            f.write_str(" [")?;
            for (i, err) in self.errors.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{err}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AggregateError<E> {}

impl<E: From<TaskError>> From<TaskError> for AggregateError<E> {
    fn from(err: TaskError) -> Self {
        Self {
            errors: vec![E::from(err)],
        }
    }
}

/// Which queue a failed job came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// A job from the microtask queue
    Microtask,
    /// A timer or other macrotask
    Macrotask,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Microtask => f.write_str("microtask"),
            JobKind::Macrotask => f.write_str("macrotask"),
        }
    }
}

/// A job failed outside of any promise context.
///
/// Delivered to the event loop's error sink; the loop carries on with the
/// next job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The job returned an error.
    #[error("{kind} failed: {source}")]
    Failed {
        /// Queue the job came from
        kind: JobKind,
        /// The returned error
        source: JsError,
    },
    /// The job panicked.
    #[error("{kind} panicked: {message}")]
    Panicked {
        /// Queue the job came from
        kind: JobKind,
        /// Panic payload rendered as text
        message: String,
    },
}

impl JobError {
    /// Returns the queue the failed job came from.
    pub fn kind(&self) -> JobKind {
        match self {
            JobError::Failed { kind, .. } | JobError::Panicked { kind, .. } => *kind,
        }
    }
}

/// A rejected deferred that was dropped without any handler attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledRejection {
    /// Id of the rejected deferred
    pub promise_id: u64,
    /// The rejection reason, rendered with `Display`
    pub reason: String,
}

impl fmt::Display for UnhandledRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unhandled rejection of promise #{}: {}",
            self.promise_id, self.reason
        )
    }
}
