//! Scripted transport for scheduler and pipeline tests.
//!
//! Time is counted in `wait` calls: a route with latency `n` completes on the
//! `n`-th wait after it was registered.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::Bytes;

use super::{Event, Transfer, TransferId, TransferInfo, Transport};
use crate::error::TransportError;
use crate::http::PreparedRequest;
use crate::options::{OptionKey, TransferOption};

#[derive(Debug, Clone)]
pub(crate) struct Route {
    latency: u64,
    outcome: Result<(String, Bytes), TransportError>,
}

pub(crate) struct FakeHandle {
    pub(crate) url: String,
    pub(crate) header: bool,
}

struct Active {
    id: TransferId,
    ready_at: u64,
    url: String,
    header: bool,
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: HashMap<String, Route>,
    capacity: Option<usize>,
    tick: u64,
    active: Vec<Active>,
    finished: HashMap<TransferId, (String, bool)>,
    stray: VecDeque<Event>,
    events: VecDeque<Event>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serve `head` + `body` for `url` after `latency` waits. `head` is the
    /// status line and headers, only delivered when header capture is on.
    pub(crate) fn route(mut self, url: &str, latency: u64, head: &str, body: &str) -> Self {
        self.routes.insert(
            url.to_string(),
            Route {
                latency,
                outcome: Ok((head.to_string(), Bytes::copy_from_slice(body.as_bytes()))),
            },
        );
        self
    }

    pub(crate) fn failing_route(mut self, url: &str, latency: u64, err: TransportError) -> Self {
        self.routes.insert(
            url.to_string(),
            Route {
                latency,
                outcome: Err(err),
            },
        );
        self
    }

    pub(crate) fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Queue an event that is reported on the first drive.
    pub(crate) fn stray_event(mut self, event: Event) -> Self {
        self.stray.push_back(event);
        self
    }

    fn route_for(&self, url: &str) -> Route {
        self.routes.get(url).cloned().unwrap_or(Route {
            latency: 1,
            outcome: Err(TransportError::new(6, "Couldn't resolve host name")),
        })
    }
}

impl Transport for FakeTransport {
    type Handle = FakeHandle;

    fn prepare(&mut self, request: &PreparedRequest) -> Result<FakeHandle, TransportError> {
        if request.url().is_empty() {
            return Err(TransportError::new(3, "URL using bad/illegal format or missing URL"));
        }
        let header = matches!(
            request.options().get(OptionKey::Header),
            Some(TransferOption::Header(true))
        );
        Ok(FakeHandle {
            url: request.url().to_string(),
            header,
        })
    }

    fn register(&mut self, id: TransferId, handle: FakeHandle) -> Result<(), TransportError> {
        if self.capacity.is_some_and(|cap| self.active.len() >= cap) {
            return Err(TransportError::new(3, "Out of memory"));
        }
        let ready_at = self.tick + self.route_for(&handle.url).latency;
        self.active.push(Active {
            id,
            ready_at,
            url: handle.url,
            header: handle.header,
        });
        Ok(())
    }

    fn wait(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        self.tick += 1;
        Ok(())
    }

    fn drive(&mut self) -> Result<bool, TransportError> {
        self.events.extend(self.stray.drain(..));
        let tick = self.tick;
        let (mut ready, pending): (Vec<_>, Vec<_>) = self.active.drain(..).partition(|a| a.ready_at <= tick);
        self.active = pending;
        ready.sort_by_key(|a| a.ready_at);
        for a in ready {
            let result = self.route_for(&a.url).outcome.map(|_| ());
            self.events.push_back(Event::Done { id: a.id, result });
            self.finished.insert(a.id, (a.url, a.header));
        }
        Ok(false)
    }

    fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    fn deregister(&mut self, id: TransferId) -> Result<Transfer, TransportError> {
        let (url, header) = self
            .finished
            .remove(&id)
            .ok_or_else(|| TransportError::new(-1, format!("no transfer registered as {id}")))?;
        let mut info = TransferInfo {
            effective_url: Some(url.clone()),
            ..TransferInfo::default()
        };
        let content = match self.route_for(&url).outcome {
            Ok((head, body)) => {
                info.response_code = head
                    .split_whitespace()
                    .nth(1)
                    .and_then(|c| c.parse().ok())
                    .unwrap_or_default();
                info.header_size = head.len() as u64;
                if header {
                    let mut raw = head.into_bytes();
                    raw.extend_from_slice(&body);
                    Bytes::from(raw)
                } else {
                    body
                }
            }
            Err(_) => Bytes::new(),
        };
        Ok(Transfer { content, info })
    }
}
