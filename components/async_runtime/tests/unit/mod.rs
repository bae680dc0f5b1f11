//! Unit tests for async_runtime

mod combinators_test;
mod tools_test;

use std::cell::RefCell;
use std::rc::Rc;

/// Shared record of observed events, in the order they happened.
pub type Log = Rc<RefCell<Vec<String>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}
