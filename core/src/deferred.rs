//! Continuation-accepting computations.
//!
//! A `Deferred<T>` does nothing until a continuation is supplied with
//! [`Deferred::run`]. The continuation is `FnOnce`, so it can be invoked at
//! most once, and it receives a `Result`, so it always gets exactly one of a
//! value or an error.

use crate::error::MuxError;
use crate::promise::Promise;

/// A single-invocation callback receiving a success-or-error result.
pub type Continuation<T> = Box<dyn FnOnce(Result<T, MuxError>)>;

#[must_use = "a deferred computation does nothing until it is run"]
pub struct Deferred<T> {
    start: Box<dyn FnOnce(Continuation<T>)>,
}

impl<T: 'static> Deferred<T> {
    pub fn new(start: impl FnOnce(Continuation<T>) + 'static) -> Self {
        Self {
            start: Box::new(start),
        }
    }

    /// Completes with `result` as soon as it is run.
    pub fn ready(result: Result<T, MuxError>) -> Self {
        Self::new(move |cb| cb(result))
    }

    pub fn failed(err: MuxError) -> Self {
        Self::ready(Err(err))
    }

    pub fn run(self, cb: impl FnOnce(Result<T, MuxError>) + 'static) {
        (self.start)(Box::new(cb))
    }

    /// Wrap the continuation so `f` is applied to a success value. Errors go
    /// straight through, and so do errors returned by `f`.
    pub fn and_then<U: 'static>(self, f: impl FnOnce(T) -> Result<U, MuxError> + 'static) -> Deferred<U> {
        Deferred::new(move |cb: Continuation<U>| self.run(move |result| cb(result.and_then(f))))
    }

    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> Deferred<U> {
        self.and_then(move |value| Ok(f(value)))
    }

    pub fn into_promise(self) -> Promise<T> {
        Promise::from_deferred(self)
    }
}
