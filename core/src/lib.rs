//! Asynchronous HTTP client over a single multiplexing engine.
//!
//! # Overview
//! Many requests are issued concurrently over one non-blocking transport
//! (libcurl's multi interface by default). Each request's completion is
//! delivered to a continuation; continuations compose into pipelines
//! (configure, transfer, parse, user callback) and can be adapted into
//! futures at the end.
//!
//! # Design
//! - `Scheduler` owns the transport and the table of pending continuations,
//!   and dispatches completions in the order the transport reports them.
//! - `Executor` is the composition surface: `configure`, `and_then`/`process`
//!   and `promises` wrap an executor in another one. Nothing is sent until a
//!   continuation is supplied.
//! - `parse_response` turns a raw message (status line, headers, body) into
//!   a `Response`.
//! - `Promise` is an adapter over the continuation contract, not a
//!   replacement for it; the scheduler itself needs no async runtime.
//! - Everything is single-threaded; the scheduler is `!Send`.
//!
//! ```no_run
//! use std::time::Duration;
//! use curlmux::{Executor, Scheduler};
//!
//! let scheduler = Scheduler::curl();
//! let client = scheduler.decoded();
//! for url in ["http://example.com/", "http://example.org/"] {
//!     client.get(url).run(|result| match result {
//!         Ok(response) => println!("{} {}", response.status(), response.reason()),
//!         Err(err) => eprintln!("{err}"),
//!     });
//! }
//! client.run_until_drained(Duration::from_millis(1)).unwrap();
//! ```

pub mod config;
pub mod deferred;
pub mod error;
pub mod executor;
pub mod http;
pub mod options;
pub mod parse;
pub mod promise;
pub mod response;
pub mod scheduler;
pub mod transport;

pub use config::ClientConfig;
pub use deferred::{Continuation, Deferred};
pub use error::{MuxError, ParseError, TransportError};
pub use executor::{Base, Configured, Decoded, Executor, Mapped, Promised};
pub use http::{Args, Method, PreparedRequest, RequestDescriptor};
pub use options::{Config, HandleHook, OptionKey, OptionSet, TransferOption};
pub use parse::parse_response;
pub use promise::Promise;
pub use response::{HeaderValue, Headers, Response};
pub use scheduler::Scheduler;
pub use transport::{Collector, CurlTransport, Event, Transfer, TransferId, TransferInfo, Transport};
