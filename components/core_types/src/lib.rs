//! Error vocabulary shared by the Corten event loop components.
//!
//! # Overview
//!
//! - [`JsError`] - JavaScript-style errors, the default rejection reason
//! - [`ErrorKind`] - Types of JavaScript errors
//! - [`TaskError`] - Failures the promise machinery turns into rejections
//! - [`JobError`] - Failures of raw scheduler jobs, reported to a sink
//! - [`AggregateError`] - Rejection reason of the `any` combinator
//! - [`UnhandledRejection`] - Report for a rejection nobody observed
//! - [`RejectionReason`] - Bound satisfied by every rejection reason type
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorKind, JsError, TaskError};
//!
//! let error = JsError::error("network down");
//! assert_eq!(error.kind, ErrorKind::Error);
//!
//! let cycle: JsError = TaskError::ChainCycle(1).into();
//! assert_eq!(cycle.kind, ErrorKind::TypeError);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;

pub use error::{
    AggregateError, ErrorKind, JobError, JobKind, JsError, RejectionReason, TaskError,
    UnhandledRejection,
};
