//! Multiplexed request scheduler.
//!
//! # Design
//! The scheduler owns one `Transport` and a table from `TransferId` to the
//! continuation waiting for that transfer. An id is in the table exactly
//! while its handle is registered with the transport and has not completed.
//!
//! Everything runs on one thread. `Scheduler` is a cheap `Rc` handle, so it
//! is `!Send`; continuations are always invoked after the internal borrow is
//! released, which lets a continuation issue new requests on the same
//! scheduler. Completions are dispatched in the order the transport reports
//! them, which is completion order, not submission order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::deferred::{Continuation, Deferred};
use crate::error::MuxError;
use crate::executor::{decode_transfer, Base, DecodeFn, Decoded, Executor, Promised};
use crate::http::PreparedRequest;
use crate::options::{Config, TransferOption};
use crate::transport::{CurlTransport, Event, Transfer, TransferId, Transport};

type Dispatch = (Continuation<Transfer>, Result<Transfer, MuxError>);

struct Inner<T: Transport> {
    transport: Option<T>,
    pending: HashMap<TransferId, Continuation<Transfer>>,
    next_id: u64,
    poll_timeout: Duration,
    defaults: Config,
}

impl<T: Transport> Inner<T> {
    fn transport(&mut self) -> Result<&mut T, MuxError> {
        self.transport.as_mut().ok_or(MuxError::Closed)
    }

    fn prepare(&mut self, request: &PreparedRequest) -> Result<T::Handle, MuxError> {
        Ok(self.transport()?.prepare(request)?)
    }

    /// Register `handle` and park `cb`. On refusal the continuation is
    /// handed back with the error so the caller can invoke it unborrowed.
    fn admit(
        &mut self,
        handle: T::Handle,
        cb: Continuation<Transfer>,
    ) -> Result<TransferId, (Continuation<Transfer>, MuxError)> {
        let id = TransferId(self.next_id);
        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => return Err((cb, MuxError::Closed)),
        };
        if let Err(err) = transport.register(id, handle) {
            warn!(%id, code = err.code, reason = %err.message, "transport refused transfer");
            return Err((
                cb,
                MuxError::Registration {
                    code: err.code,
                    message: err.message,
                },
            ));
        }
        self.next_id += 1;
        self.pending.insert(id, cb);
        debug!(%id, pending = self.pending.len(), "transfer registered");

        // Kick the transfer off now rather than on the next poll.
        loop {
            match transport.drive() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(err) => {
                    warn!(%id, error = %err, "transport drive failed after registration");
                    break;
                }
            }
        }
        Ok(id)
    }

    fn advance(&mut self, timeout: Duration) -> Result<(), MuxError> {
        let transport = self.transport()?;
        transport.wait(timeout)?;
        while transport.drive()? {}
        Ok(())
    }

    /// Pop the next completion and pair it with its continuation. Handles
    /// are out of both the table and the transport before this returns.
    fn next_dispatch(&mut self) -> Option<Dispatch> {
        let transport = self.transport.as_mut()?;
        loop {
            match transport.next_event()? {
                Event::Done { id, result } => {
                    let Some(cb) = self.pending.remove(&id) else {
                        error!(%id, "completion for a transfer with no pending continuation");
                        if let Err(err) = transport.deregister(id) {
                            warn!(%id, code = err.code, reason = %err.message, "failed to release stray transfer");
                        }
                        continue;
                    };
                    let outcome = match result {
                        Ok(()) => {
                            debug!(%id, "transfer completed");
                            transport.deregister(id).map_err(MuxError::from)
                        }
                        Err(err) => {
                            let url = match transport.deregister(id) {
                                Ok(transfer) => transfer.info.effective_url,
                                Err(_) => None,
                            };
                            warn!(%id, code = err.code, reason = %err.message, url = ?url, "transfer failed");
                            Err(MuxError::Transfer {
                                code: err.code,
                                message: err.message,
                                url,
                            })
                        }
                    };
                    return Some((cb, outcome));
                }
                Event::Unexpected { id, detail } => {
                    error!(id = ?id, %detail, "transport reported an unexpected event");
                }
            }
        }
    }

    fn take_pending(&mut self) -> Vec<Continuation<Transfer>> {
        let mut pending: Vec<_> = self.pending.drain().collect();
        pending.sort_by_key(|(id, _)| *id);
        pending.into_iter().map(|(_, cb)| cb).collect()
    }
}

impl<T: Transport> Drop for Inner<T> {
    fn drop(&mut self) {
        let pending = self.take_pending();
        if !pending.is_empty() {
            warn!(count = pending.len(), "scheduler dropped with transfers in flight");
        }
        for cb in pending {
            cb(Err(MuxError::Abandoned));
        }
    }
}

/// Drives many transfers over one transport.
///
/// A continuation that captures a clone of its own scheduler (or of an
/// executor built on it) keeps the shared state alive while it is pending.
/// Dropping the last outside handle then abandons nothing; call
/// [`Scheduler::shutdown`] or drain the scheduler to release such
/// continuations.
pub struct Scheduler<T: Transport = CurlTransport> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T: Transport> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Transport> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("pending", &inner.pending.len())
            .field("closed", &inner.transport.is_none())
            .finish()
    }
}

impl Scheduler<CurlTransport> {
    /// A scheduler over libcurl with default settings.
    pub fn curl() -> Self {
        Self::new(CurlTransport::new())
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_config(CurlTransport::new(), config)
    }
}

impl<T: Transport + 'static> Scheduler<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, &ClientConfig::default())
    }

    /// `config` supplies the default poll timeout and the options every
    /// request from [`Scheduler::raw`] starts with.
    pub fn with_config(transport: T, config: &ClientConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                transport: Some(transport),
                pending: HashMap::new(),
                next_id: 0,
                poll_timeout: config.poll_timeout(),
                defaults: config.to_config(),
            })),
        }
    }

    /// Prepare `request` into a transport handle and run its handle hooks
    /// now; register it once a continuation is supplied.
    ///
    /// If the transport refuses the handle the continuation is invoked
    /// before `run` returns, with `MuxError::Registration`. Otherwise it is
    /// invoked later, from inside [`Scheduler::poll`].
    pub fn register(&self, request: &PreparedRequest) -> Deferred<Transfer> {
        let prepared = self.inner.borrow_mut().prepare(request);
        let prepared = prepared.and_then(|mut handle| {
            request.configure_handle(&mut handle)?;
            Ok(handle)
        });
        let inner = Rc::clone(&self.inner);
        Deferred::new(move |cb| {
            let handle = match prepared {
                Ok(handle) => handle,
                Err(err) => return cb(Err(err)),
            };
            let admitted = inner.borrow_mut().admit(handle, cb);
            if let Err((cb, err)) = admitted {
                cb(Err(err));
            }
        })
    }

    /// One pass: wait up to `timeout`, drive the transport, then dispatch
    /// every completion it reports. Returns the number of transfers still
    /// pending.
    pub fn poll(&self, timeout: Duration) -> Result<usize, MuxError> {
        self.inner.borrow_mut().advance(timeout)?;
        while let Some((cb, outcome)) = self.next_dispatch() {
            cb(outcome);
        }
        Ok(self.pending())
    }

    fn next_dispatch(&self) -> Option<Dispatch> {
        self.inner.borrow_mut().next_dispatch()
    }

    /// Poll until nothing is pending.
    pub fn run_until_drained(&self, timeout: Duration) -> Result<(), MuxError> {
        while self.poll(timeout)? > 0 {}
        Ok(())
    }

    /// [`Scheduler::run_until_drained`] with the configured poll timeout.
    pub fn run(&self) -> Result<(), MuxError> {
        let timeout = self.inner.borrow().poll_timeout;
        self.run_until_drained(timeout)
    }

    pub fn pending(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().transport.is_none()
    }

    /// Release the transport. Transfers still in flight are abandoned and
    /// their continuations receive `MuxError::Abandoned`. The scheduler
    /// refuses all work afterwards.
    pub fn shutdown(&self) {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            inner.transport = None;
            inner.take_pending()
        };
        debug!(abandoned = pending.len(), "scheduler shut down");
        for cb in pending {
            cb(Err(MuxError::Abandoned));
        }
    }

    pub(crate) fn apply_defaults(&self, request: &mut PreparedRequest) {
        let defaults = self.inner.borrow().defaults.clone();
        defaults.apply(request);
    }

    /// Executor delivering raw transfer content and metadata.
    pub fn raw(&self) -> Base<T> {
        Base::new(self.clone())
    }

    /// Executor delivering parsed responses. Header capture is switched on
    /// so the content holds the status line and headers.
    pub fn decoded(&self) -> Decoded<T> {
        self.raw()
            .configure(TransferOption::Header(true))
            .and_then(decode_transfer as DecodeFn)
    }

    /// Executor delivering parsed responses as promises.
    pub fn promises(&self) -> Promised<Decoded<T>> {
        self.decoded().promises()
    }
}
