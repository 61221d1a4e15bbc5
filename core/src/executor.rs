//! Composable request executors.
//!
//! # Design
//! An executor turns a `PreparedRequest` into a computation that starts once
//! it is given a continuation (a `Deferred`), or into a `Promise` at the end
//! of a pipeline. Stages wrap an inner executor:
//!
//! - `Configured` applies a `Config` to the request, then delegates.
//! - `Mapped` wraps the continuation so a mapper sees the success value.
//! - `Promised` adapts the computation into a `Promise`.
//!
//! Building a pipeline only nests values; no request is prepared and no I/O
//! happens until a request method is called and the result is run. When
//! configured stages are stacked, the outer stage's config is applied first
//! and the stage nearest `Base` last, so inner options win on a conflicting
//! key.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::deferred::Deferred;
use crate::error::MuxError;
use crate::http::{Args, Method, PreparedRequest, RequestDescriptor};
use crate::options::Config;
use crate::parse::parse_response;
use crate::promise::Promise;
use crate::response::Response;
use crate::scheduler::Scheduler;
use crate::transport::{Transfer, Transport};

pub trait Executor: Sized {
    type Transport: Transport + 'static;
    type Output;

    /// Hand an already prepared request to the pipeline.
    fn execute(&self, request: PreparedRequest) -> Self::Output;

    /// An output that fails with `err` when run.
    fn fail(&self, err: MuxError) -> Self::Output;

    fn scheduler(&self) -> &Scheduler<Self::Transport>;

    /// Derive the prepared request from `descriptor`, including the
    /// scheduler's default options.
    fn prepare(&self, descriptor: RequestDescriptor) -> Result<PreparedRequest, MuxError> {
        let mut request = PreparedRequest::new(descriptor)?;
        self.scheduler().apply_defaults(&mut request);
        Ok(request)
    }

    fn send(&self, descriptor: RequestDescriptor, config: impl Into<Config>) -> Self::Output {
        match self.prepare(descriptor) {
            Ok(mut request) => {
                config.into().apply(&mut request);
                self.execute(request)
            }
            Err(err) => self.fail(err),
        }
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        args: impl Into<Args>,
        config: impl Into<Config>,
    ) -> Self::Output {
        self.send(RequestDescriptor::new(method, url, args), config)
    }

    fn get(&self, url: &str) -> Self::Output {
        self.request(Method::Get, url, Args::new(), Config::new())
    }

    fn get_with(&self, url: &str, args: impl Into<Args>, config: impl Into<Config>) -> Self::Output {
        self.request(Method::Get, url, args, config)
    }

    fn head(&self, url: &str) -> Self::Output {
        self.request(Method::Head, url, Args::new(), Config::new())
    }

    fn head_with(&self, url: &str, args: impl Into<Args>, config: impl Into<Config>) -> Self::Output {
        self.request(Method::Head, url, args, config)
    }

    fn configure(self, config: impl Into<Config>) -> Configured<Self> {
        Configured {
            inner: self,
            config: config.into(),
        }
    }

    /// Apply `mapper` to every success value. Errors skip the mapper.
    fn and_then<F, T, U>(self, mapper: F) -> Mapped<Self, F>
    where
        Self: Executor<Output = Deferred<T>>,
        F: Fn(T) -> Result<U, MuxError> + 'static,
        T: 'static,
        U: 'static,
    {
        Mapped {
            inner: self,
            mapper: Rc::new(mapper),
        }
    }

    /// Alias for [`Executor::and_then`].
    fn process<F, T, U>(self, mapper: F) -> Mapped<Self, F>
    where
        Self: Executor<Output = Deferred<T>>,
        F: Fn(T) -> Result<U, MuxError> + 'static,
        T: 'static,
        U: 'static,
    {
        self.and_then(mapper)
    }

    fn promises<T>(self) -> Promised<Self>
    where
        Self: Executor<Output = Deferred<T>>,
        T: 'static,
    {
        Promised { inner: self }
    }

    fn poll(&self, timeout: Duration) -> Result<usize, MuxError> {
        self.scheduler().poll(timeout)
    }

    fn run_until_drained(&self, timeout: Duration) -> Result<(), MuxError> {
        self.scheduler().run_until_drained(timeout)
    }

    fn run(&self) -> Result<(), MuxError> {
        self.scheduler().run()
    }
}

/// Executor backed directly by the scheduler. Delivers raw transfers.
pub struct Base<T: Transport> {
    scheduler: Scheduler<T>,
}

impl<T: Transport> Base<T> {
    pub(crate) fn new(scheduler: Scheduler<T>) -> Self {
        Self { scheduler }
    }
}

impl<T: Transport> Clone for Base<T> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: Transport> fmt::Debug for Base<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Base").field("scheduler", &self.scheduler).finish()
    }
}

impl<T: Transport + 'static> Executor for Base<T> {
    type Transport = T;
    type Output = Deferred<Transfer>;

    fn execute(&self, request: PreparedRequest) -> Deferred<Transfer> {
        self.scheduler.register(&request)
    }

    fn fail(&self, err: MuxError) -> Deferred<Transfer> {
        Deferred::failed(err)
    }

    fn scheduler(&self) -> &Scheduler<T> {
        &self.scheduler
    }
}

/// Applies a `Config` before delegating.
#[derive(Debug, Clone)]
pub struct Configured<E> {
    inner: E,
    config: Config,
}

impl<E: Executor> Executor for Configured<E> {
    type Transport = E::Transport;
    type Output = E::Output;

    fn execute(&self, mut request: PreparedRequest) -> E::Output {
        self.config.apply(&mut request);
        self.inner.execute(request)
    }

    fn fail(&self, err: MuxError) -> E::Output {
        self.inner.fail(err)
    }

    fn scheduler(&self) -> &Scheduler<E::Transport> {
        self.inner.scheduler()
    }

    fn prepare(&self, descriptor: RequestDescriptor) -> Result<PreparedRequest, MuxError> {
        self.inner.prepare(descriptor)
    }
}

/// Maps success values delivered by the inner executor.
pub struct Mapped<E, F> {
    inner: E,
    mapper: Rc<F>,
}

impl<E: Clone, F> Clone for Mapped<E, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            mapper: Rc::clone(&self.mapper),
        }
    }
}

impl<E: fmt::Debug, F> fmt::Debug for Mapped<E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapped").field("inner", &self.inner).finish_non_exhaustive()
    }
}

impl<E, F, T, U> Executor for Mapped<E, F>
where
    E: Executor<Output = Deferred<T>>,
    F: Fn(T) -> Result<U, MuxError> + 'static,
    T: 'static,
    U: 'static,
{
    type Transport = E::Transport;
    type Output = Deferred<U>;

    fn execute(&self, request: PreparedRequest) -> Deferred<U> {
        let mapper = Rc::clone(&self.mapper);
        self.inner.execute(request).and_then(move |value| mapper(value))
    }

    fn fail(&self, err: MuxError) -> Deferred<U> {
        Deferred::failed(err)
    }

    fn scheduler(&self) -> &Scheduler<E::Transport> {
        self.inner.scheduler()
    }

    fn prepare(&self, descriptor: RequestDescriptor) -> Result<PreparedRequest, MuxError> {
        self.inner.prepare(descriptor)
    }
}

/// Adapts the inner executor's computations into promises.
#[derive(Debug, Clone)]
pub struct Promised<E> {
    inner: E,
}

impl<E, T> Executor for Promised<E>
where
    E: Executor<Output = Deferred<T>>,
    T: 'static,
{
    type Transport = E::Transport;
    type Output = Promise<T>;

    fn execute(&self, request: PreparedRequest) -> Promise<T> {
        self.inner.execute(request).into_promise()
    }

    fn fail(&self, err: MuxError) -> Promise<T> {
        Deferred::failed(err).into_promise()
    }

    fn scheduler(&self) -> &Scheduler<E::Transport> {
        self.inner.scheduler()
    }

    fn prepare(&self, descriptor: RequestDescriptor) -> Result<PreparedRequest, MuxError> {
        self.inner.prepare(descriptor)
    }
}

/// The response-decoding stage used by [`Scheduler::decoded`].
pub type DecodeFn = fn(Transfer) -> Result<Response, MuxError>;

/// Raw executor with header capture and the response parser stacked on.
pub type Decoded<T> = Mapped<Configured<Base<T>>, DecodeFn>;

/// Parse a transfer captured with headers into a `Response`.
pub fn decode_transfer(transfer: Transfer) -> Result<Response, MuxError> {
    parse_response(&transfer.content, Some(transfer.info))?.ok_or(MuxError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use bytes::Bytes;

    use super::*;
    use crate::error::ParseError;
    use crate::options::{OptionKey, OptionSet, TransferOption};
    use crate::transport::fake::FakeTransport;

    const TICK: Duration = Duration::from_millis(1);

    fn transport() -> FakeTransport {
        FakeTransport::new()
            .route(
                "http://a/",
                3,
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n",
                "alpha",
            )
            .route("http://b/", 1, "HTTP/1.1 404 Not Found\r\n\r\n", "missing")
            .route(
                "http://c/",
                2,
                "HTTP/1.1 200 OK\r\nSet-Cookie: x=1\r\nSet-Cookie: y=2\r\n\r\n",
                "",
            )
            .route("http://empty/", 1, "", "")
            .route("http://junk/", 1, "", "not http at all")
    }

    /// Record the options a request carries when it reaches the base.
    fn recorder(slot: &Rc<RefCell<Option<OptionSet>>>) -> Config {
        let slot = Rc::clone(slot);
        Config::func(move |req| *slot.borrow_mut() = Some(req.options().clone()))
    }

    #[test]
    fn three_gets_complete_in_latency_order() {
        let scheduler = Scheduler::new(transport());
        let client = scheduler.decoded();
        let seen: Rc<RefCell<Vec<(String, u16)>>> = Rc::default();

        for url in ["http://a/", "http://b/", "http://c/"] {
            let seen = Rc::clone(&seen);
            let tag = url.to_string();
            client.get(url).run(move |result| {
                let response = result.unwrap();
                seen.borrow_mut().push((tag, response.status()));
            });
        }
        client.run_until_drained(TICK).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                ("http://b/".to_string(), 404),
                ("http://c/".to_string(), 200),
                ("http://a/".to_string(), 200),
            ]
        );
    }

    #[test]
    fn decoded_executor_parses_headers_and_body() {
        let scheduler = Scheduler::new(transport());
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        scheduler.decoded().get("http://c/").run(move |r| *sink.borrow_mut() = Some(r));
        scheduler.run_until_drained(TICK).unwrap();

        let response = out.borrow_mut().take().unwrap().unwrap();
        assert_eq!(response.header("set-cookie").unwrap().values(), vec!["x=1", "y=2"]);
        assert!(response.body().is_empty());
        assert_eq!(response.info().unwrap().effective_url.as_deref(), Some("http://c/"));
    }

    #[test]
    fn raw_executor_delivers_unparsed_content() {
        let scheduler = Scheduler::new(transport());
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        scheduler.raw().get("http://a/").run(move |r| *sink.borrow_mut() = Some(r));
        scheduler.run_until_drained(TICK).unwrap();

        let transfer = out.borrow_mut().take().unwrap().unwrap();
        assert_eq!(transfer.content, Bytes::from_static(b"alpha"));
    }

    #[test]
    fn header_capture_survives_call_site_config() {
        let scheduler = Scheduler::new(transport());
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        scheduler
            .decoded()
            .get_with("http://a/", Args::new(), TransferOption::Header(false))
            .run(move |r| *sink.borrow_mut() = Some(r));
        scheduler.run_until_drained(TICK).unwrap();

        let response = out.borrow_mut().take().unwrap().unwrap();
        assert_eq!(response.text(), "alpha");
        assert_eq!(response.header("Content-Type").unwrap().first(), "text/plain");
    }

    #[test]
    fn empty_content_is_an_error_after_decoding() {
        let scheduler = Scheduler::new(transport());
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        scheduler.decoded().get("http://empty/").run(move |r| *sink.borrow_mut() = Some(r));
        scheduler.run_until_drained(TICK).unwrap();
        assert!(matches!(out.borrow_mut().take(), Some(Err(MuxError::EmptyResponse))));
    }

    #[test]
    fn non_http_payload_fails_loudly() {
        let scheduler = Scheduler::new(transport());
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        scheduler.decoded().get("http://junk/").run(move |r| *sink.borrow_mut() = Some(r));
        scheduler.run_until_drained(TICK).unwrap();
        assert!(matches!(
            out.borrow_mut().take(),
            Some(Err(MuxError::Parse(ParseError::MalformedStatusLine(_))))
        ));
    }

    #[test]
    fn stacked_configure_matches_combined_config() {
        let scheduler = Scheduler::new(transport());
        let a = Config::from(TransferOption::FollowLocation(true));
        let b = Config::from(TransferOption::UserAgent("ua".into()));

        let stacked = Rc::new(RefCell::new(None));
        let combined = Rc::new(RefCell::new(None));

        let _ = scheduler
            .raw()
            .configure(recorder(&stacked))
            .configure(a.clone())
            .configure(b.clone())
            .get("http://a/");
        let _ = scheduler
            .raw()
            .configure(recorder(&combined))
            .configure(a.then(b))
            .get("http://a/");

        let stacked = stacked.borrow_mut().take().unwrap();
        let combined = combined.borrow_mut().take().unwrap();
        assert_eq!(stacked.get(OptionKey::FollowLocation), combined.get(OptionKey::FollowLocation));
        assert_eq!(stacked.get(OptionKey::UserAgent), combined.get(OptionKey::UserAgent));
        assert_eq!(stacked.len(), combined.len());
    }

    #[test]
    fn inner_stage_wins_on_conflicting_keys() {
        let scheduler = Scheduler::new(transport());
        let seen = Rc::new(RefCell::new(None));
        let _ = scheduler
            .raw()
            .configure(recorder(&seen))
            .configure(TransferOption::UserAgent("inner".into()))
            .configure(TransferOption::UserAgent("outer".into()))
            .get_with("http://a/", Args::new(), TransferOption::UserAgent("call".into()));

        let options = seen.borrow_mut().take().unwrap();
        assert_eq!(
            options.get(OptionKey::UserAgent),
            Some(&TransferOption::UserAgent("inner".into()))
        );
    }

    #[test]
    fn building_a_pipeline_issues_no_io() {
        let scheduler = Scheduler::new(transport());
        let pipeline = scheduler
            .raw()
            .configure(TransferOption::Verbose(false))
            .and_then(|t: Transfer| Ok(t.content.len()))
            .process(|n: usize| Ok(n * 2));
        assert_eq!(scheduler.pending(), 0);

        let deferred = pipeline.get("http://a/");
        assert_eq!(scheduler.pending(), 0);

        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        deferred.run(move |r| *sink.borrow_mut() = Some(r));
        assert_eq!(scheduler.pending(), 1);
        pipeline.run_until_drained(TICK).unwrap();
        assert_eq!(out.borrow_mut().take().unwrap().unwrap(), 10);
    }

    #[test]
    fn promises_settle_after_polling() {
        let scheduler = Scheduler::new(transport());
        let client = scheduler.promises();
        let mut ok = client.get("http://b/");
        let mut failed = client.get("http://nowhere/");
        assert!(ok.try_take().is_none());

        client.run_until_drained(TICK).unwrap();
        assert_eq!(ok.try_take().unwrap().unwrap().status(), 404);
        assert!(matches!(
            failed.try_take(),
            Some(Err(MuxError::Transfer { code: 6, .. }))
        ));
    }

    #[test]
    fn promises_compose_with_custom_stages() {
        let scheduler = Scheduler::new(transport());
        let lengths = scheduler
            .decoded()
            .and_then(|r: Response| Ok(r.body().len()))
            .promises();
        let mut promise = lengths.get("http://a/");
        lengths.run_until_drained(TICK).unwrap();
        assert_eq!(promise.try_take().unwrap().unwrap(), 5);
    }

    #[test]
    fn unpreparable_request_fails_through_the_pipeline() {
        let scheduler = Scheduler::new(transport());
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        scheduler
            .decoded()
            .request(Method::Get, "", Args::new(), Config::new())
            .run(move |r| *sink.borrow_mut() = Some(r));
        assert!(matches!(out.borrow_mut().take(), Some(Err(MuxError::Transport(_)))));
    }

    #[test]
    fn scheduler_defaults_apply_first() {
        let config = crate::config::ClientConfig {
            user_agent: Some("default".into()),
            follow_location: true,
            ..Default::default()
        };
        let scheduler = Scheduler::with_config(transport(), &config);
        let seen = Rc::new(RefCell::new(None));
        let _ = scheduler
            .raw()
            .configure(recorder(&seen))
            .get_with("http://a/", Args::new(), TransferOption::UserAgent("call".into()));

        let options = seen.borrow_mut().take().unwrap();
        assert_eq!(
            options.get(OptionKey::UserAgent),
            Some(&TransferOption::UserAgent("call".into()))
        );
        assert_eq!(
            options.get(OptionKey::FollowLocation),
            Some(&TransferOption::FollowLocation(true))
        );
    }
}
