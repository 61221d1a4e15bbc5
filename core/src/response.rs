//! Parsed HTTP responses.

use std::borrow::Cow;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::MuxError;
use crate::transport::TransferInfo;

/// One header value, or every value in order of appearance when the header
/// was repeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    List(Vec<String>),
}

impl HeaderValue {
    fn append(&mut self, value: String) {
        match self {
            HeaderValue::Single(first) => {
                let first = std::mem::take(first);
                *self = HeaderValue::List(vec![first, value]);
            }
            HeaderValue::List(values) => values.push(value),
        }
    }

    /// The first value seen.
    pub fn first(&self) -> &str {
        match self {
            HeaderValue::Single(value) => value,
            HeaderValue::List(values) => values.first().map(String::as_str).unwrap_or(""),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            HeaderValue::Single(value) => vec![value.as_str()],
            HeaderValue::List(values) => values.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, HeaderValue::List(_))
    }
}

/// Response headers in order of first appearance. Names compare
/// case-insensitively; the first spelling seen is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Headers {
    entries: Vec<(String, HeaderValue)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, turning the entry into a list if the name is repeated.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some((_, existing)) => existing.append(value),
            None => self.entries.push((name, HeaderValue::Single(value))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed HTTP response. Constructed once by the parser, read-only after.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    protocol: String,
    version: String,
    status: u16,
    reason: String,
    headers: Headers,
    body: Bytes,
    info: Option<TransferInfo>,
}

impl Response {
    pub(crate) fn new(
        protocol: String,
        version: String,
        status: u16,
        reason: String,
        headers: Headers,
        body: Bytes,
        info: Option<TransferInfo>,
    ) -> Self {
        Self {
            protocol,
            version,
            status,
            reason,
            headers,
            body,
            info,
        }
    }

    /// `HTTP` in `HTTP/1.1`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// `1.1` in `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Empty when the status line carried no reason phrase.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, MuxError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Transport metadata, when the response came from a real transfer.
    pub fn info(&self) -> Option<&TransferInfo> {
        self.info.as_ref()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
