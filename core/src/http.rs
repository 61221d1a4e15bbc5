//! Request descriptors as plain data.
//!
//! # Design
//! A `RequestDescriptor` is what the caller asks for: method, URL and an
//! ordered list of arguments. A `PreparedRequest` is the descriptor after the
//! defaults every transfer needs have been derived from it (target URL, form
//! body, no-body for HEAD). Configurators mutate the prepared request; the
//! transport turns it into a native handle and never sees it again.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::Serialize;

use crate::error::{MuxError, TransportError};
use crate::options::{HandleHook, OptionSet, TransferOption};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(MuxError::UnknownMethod(s.to_string())),
        }
    }
}

/// Ordered request arguments. Encoded as a query string, or as a form body
/// for POST.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Args(Vec<(String, String)>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn encode(&self) -> Result<String, MuxError> {
        Ok(serde_urlencoded::to_string(self)?)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Args {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<Vec<(String, String)>> for Args {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

/// What the caller asked for. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    args: Args,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>, args: impl Into<Args>) -> Self {
        Self {
            method,
            url: url.into(),
            args: args.into(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    /// The URL the transfer is sent to. POST keeps the URL as given; every
    /// other method carries the args in the query string.
    pub fn target_url(&self) -> Result<String, MuxError> {
        if self.method == Method::Post || self.args.is_empty() {
            return Ok(self.url.clone());
        }
        let query = self.args.encode()?;
        let sep = if self.url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{sep}{query}", self.url))
    }

    /// Form-encoded args for POST, `None` for every other method.
    pub fn form_body(&self) -> Result<Option<Bytes>, MuxError> {
        if self.method != Method::Post {
            return Ok(None);
        }
        Ok(Some(Bytes::from(self.args.encode()?)))
    }
}

/// A descriptor with its transfer options, ready to hand to a transport.
///
/// Configurators receive `&mut PreparedRequest`; options set later override
/// earlier ones with the same key. Handle hooks are kept in order and run
/// once the transport has built its native handle.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    descriptor: RequestDescriptor,
    url: String,
    options: OptionSet,
    hooks: Vec<HandleHook>,
}

impl PreparedRequest {
    pub fn new(descriptor: RequestDescriptor) -> Result<Self, MuxError> {
        let url = descriptor.target_url()?;
        let mut options = OptionSet::new();
        options.set(TransferOption::AcceptEncoding(String::new()));
        if descriptor.method() == Method::Head {
            options.set(TransferOption::NoBody(true));
        }
        if let Some(body) = descriptor.form_body()? {
            options.set(TransferOption::Body(body));
        }
        Ok(Self {
            descriptor,
            url,
            options,
            hooks: Vec::new(),
        })
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    pub fn method(&self) -> Method {
        self.descriptor.method()
    }

    /// Target URL, query string included.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut OptionSet {
        &mut self.options
    }

    pub fn set(&mut self, option: TransferOption) -> &mut Self {
        self.options.set(option);
        self
    }

    pub fn on_handle(&mut self, hook: HandleHook) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    pub fn handle_hooks(&self) -> &[HandleHook] {
        &self.hooks
    }

    /// Run every handle hook against `handle`, stopping at the first error.
    pub fn configure_handle<H: 'static>(&self, handle: &mut H) -> Result<(), TransportError> {
        for hook in &self.hooks {
            hook.run(handle)?;
        }
        Ok(())
    }
}
