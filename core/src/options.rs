//! Transfer options and configurators.
//!
//! # Design
//! A `Config` is an ordered list of steps. Each step is a declarative
//! `OptionSet`, an opaque closure that mutates the `PreparedRequest`, or a
//! [`HandleHook`] that runs against the transport's native handle once the
//! request has been turned into one. Steps run in order and options are
//! keyed, so on a conflicting key the last write wins. Configs are cheap to
//! clone; closures are shared behind `Rc`.

use std::any::{type_name, Any};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::TransportError;
use crate::http::PreparedRequest;

/// A single transport option.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOption {
    /// Include the status line and headers in the transfer content.
    Header(bool),
    FollowLocation(bool),
    MaxRedirections(u32),
    /// Upper bound on the whole transfer, enforced by the transport.
    Timeout(Duration),
    ConnectTimeout(Duration),
    UserAgent(String),
    /// Extra request headers as `Name: value` lines.
    HttpHeaders(Vec<String>),
    /// Empty string means every encoding the transport supports.
    AcceptEncoding(String),
    NoBody(bool),
    Body(Bytes),
    Verbose(bool),
}

/// The identity of an option, independent of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    Header,
    FollowLocation,
    MaxRedirections,
    Timeout,
    ConnectTimeout,
    UserAgent,
    HttpHeaders,
    AcceptEncoding,
    NoBody,
    Body,
    Verbose,
}

impl TransferOption {
    pub fn key(&self) -> OptionKey {
        match self {
            TransferOption::Header(_) => OptionKey::Header,
            TransferOption::FollowLocation(_) => OptionKey::FollowLocation,
            TransferOption::MaxRedirections(_) => OptionKey::MaxRedirections,
            TransferOption::Timeout(_) => OptionKey::Timeout,
            TransferOption::ConnectTimeout(_) => OptionKey::ConnectTimeout,
            TransferOption::UserAgent(_) => OptionKey::UserAgent,
            TransferOption::HttpHeaders(_) => OptionKey::HttpHeaders,
            TransferOption::AcceptEncoding(_) => OptionKey::AcceptEncoding,
            TransferOption::NoBody(_) => OptionKey::NoBody,
            TransferOption::Body(_) => OptionKey::Body,
            TransferOption::Verbose(_) => OptionKey::Verbose,
        }
    }
}

/// Ordered option map. Setting a key that is already present replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionSet {
    entries: Vec<TransferOption>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, option: TransferOption) {
        let key = option.key();
        self.entries.retain(|o| o.key() != key);
        self.entries.push(option);
    }

    pub fn get(&self, key: OptionKey) -> Option<&TransferOption> {
        self.entries.iter().find(|o| o.key() == key)
    }

    pub fn remove(&mut self, key: OptionKey) -> Option<TransferOption> {
        let idx = self.entries.iter().position(|o| o.key() == key)?;
        Some(self.entries.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransferOption> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn merge(&mut self, other: &OptionSet) {
        for option in other.iter() {
            self.set(option.clone());
        }
    }
}

impl FromIterator<TransferOption> for OptionSet {
    fn from_iter<I: IntoIterator<Item = TransferOption>>(iter: I) -> Self {
        let mut set = OptionSet::new();
        for option in iter {
            set.set(option);
        }
        set
    }
}

/// A closure run against the native handle a transport prepared, after the
/// request's options have been applied to it.
///
/// The hook names the handle type it expects (`Easy2<Collector>` for
/// [`CurlTransport`](crate::transport::CurlTransport)). Running it against a
/// different transport fails the request instead of skipping the hook.
#[derive(Clone)]
pub struct HandleHook(Rc<dyn Fn(&mut (dyn Any + 'static)) -> Result<(), TransportError>>);

impl HandleHook {
    pub fn new<H, E>(f: impl Fn(&mut H) -> Result<(), E> + 'static) -> Self
    where
        H: 'static,
        E: Into<TransportError>,
    {
        Self(Rc::new(move |handle: &mut (dyn Any + 'static)| match handle.downcast_mut::<H>() {
            Some(handle) => f(handle).map_err(Into::into),
            None => Err(TransportError::new(
                -1,
                format!("handle hook expects a {} handle", type_name::<H>()),
            )),
        }))
    }

    pub fn run(&self, handle: &mut (dyn Any + 'static)) -> Result<(), TransportError> {
        (self.0)(handle)
    }
}

impl fmt::Debug for HandleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<handle fn>")
    }
}

#[derive(Clone)]
enum Step {
    Options(OptionSet),
    Func(Rc<dyn Fn(&mut PreparedRequest)>),
    Handle(HandleHook),
}

/// A configurator: option sets and closures applied in order.
#[derive(Clone, Default)]
pub struct Config {
    steps: Vec<Step>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(options: impl IntoIterator<Item = TransferOption>) -> Self {
        Self {
            steps: vec![Step::Options(options.into_iter().collect())],
        }
    }

    /// Configure the prepared request directly.
    pub fn func(f: impl Fn(&mut PreparedRequest) + 'static) -> Self {
        Self {
            steps: vec![Step::Func(Rc::new(f))],
        }
    }

    /// Mutate the transport's native handle directly, for anything
    /// [`TransferOption`] does not cover.
    ///
    /// ```no_run
    /// use curl::easy::Easy2;
    /// use curlmux::{Collector, Config};
    ///
    /// let config = Config::handle(|easy: &mut Easy2<Collector>| easy.cookie("flavor=oat"));
    /// ```
    pub fn handle<H, E>(f: impl Fn(&mut H) -> Result<(), E> + 'static) -> Self
    where
        H: 'static,
        E: Into<TransportError>,
    {
        Self {
            steps: vec![Step::Handle(HandleHook::new(f))],
        }
    }

    /// Runs `self`, then `next`.
    pub fn then(mut self, next: impl Into<Config>) -> Self {
        self.steps.extend(next.into().steps);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn apply(&self, request: &mut PreparedRequest) {
        for step in &self.steps {
            match step {
                Step::Options(options) => request.options_mut().merge(options),
                Step::Func(f) => f(request),
                Step::Handle(hook) => {
                    request.on_handle(hook.clone());
                }
            }
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for step in &self.steps {
            match step {
                Step::Options(options) => list.entry(options),
                Step::Func(_) => list.entry(&format_args!("<fn>")),
                Step::Handle(hook) => list.entry(hook),
            };
        }
        list.finish()
    }
}

impl From<TransferOption> for Config {
    fn from(option: TransferOption) -> Self {
        Config::options([option])
    }
}

impl From<Vec<TransferOption>> for Config {
    fn from(options: Vec<TransferOption>) -> Self {
        Config::options(options)
    }
}

impl<const N: usize> From<[TransferOption; N]> for Config {
    fn from(options: [TransferOption; N]) -> Self {
        Config::options(options)
    }
}

impl From<OptionSet> for Config {
    fn from(options: OptionSet) -> Self {
        Self {
            steps: vec![Step::Options(options)],
        }
    }
}
