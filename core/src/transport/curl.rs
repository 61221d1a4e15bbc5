//! `Transport` over the libcurl multi interface.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use ::curl::easy::{Easy2, Handler, List, WriteError};
use ::curl::multi::{Easy2Handle, Multi};
use ::curl::{Error as CurlError, MultiError};
use bytes::Bytes;

use super::{Event, Transfer, TransferId, TransferInfo, Transport};
use crate::error::TransportError;
use crate::http::PreparedRequest;
use crate::options::TransferOption;

impl From<CurlError> for TransportError {
    fn from(err: CurlError) -> Self {
        TransportError::new(err.code() as i32, err.description())
    }
}

impl From<MultiError> for TransportError {
    fn from(err: MultiError) -> Self {
        TransportError::new(err.code() as i32, err.description())
    }
}

/// Accumulates everything curl writes for one transfer.
#[derive(Debug, Default)]
pub struct Collector {
    content: Vec<u8>,
}

impl Handler for Collector {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        self.content.extend_from_slice(data);
        Ok(data.len())
    }
}

/// A libcurl multi handle and the easy handles registered with it.
pub struct CurlTransport {
    // Declared before `multi` so handles are detached before the multi
    // handle is cleaned up.
    handles: HashMap<TransferId, Easy2Handle<Collector>>,
    events: VecDeque<Event>,
    multi: Multi,
}

impl CurlTransport {
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
            events: VecDeque::new(),
            multi: Multi::new(),
        }
    }

    fn collect_messages(&mut self) {
        let events = &mut self.events;
        self.multi.messages(|msg| {
            let id = msg.token().ok().map(|t| TransferId(t as u64));
            match (id, msg.result()) {
                (Some(id), Some(result)) => events.push_back(Event::Done {
                    id,
                    result: result.map_err(TransportError::from),
                }),
                (id, _) => events.push_back(Event::Unexpected {
                    id,
                    detail: "multi message without a completion result".to_string(),
                }),
            }
        });
    }
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for CurlTransport {
    type Handle = Easy2<Collector>;

    fn prepare(&mut self, request: &PreparedRequest) -> Result<Self::Handle, TransportError> {
        let mut easy = Easy2::new(Collector::default());
        easy.url(request.url())?;
        easy.custom_request(request.method().as_str())?;
        for option in request.options().iter() {
            match option {
                TransferOption::Header(on) => easy.show_header(*on)?,
                TransferOption::FollowLocation(on) => easy.follow_location(*on)?,
                TransferOption::MaxRedirections(max) => easy.max_redirections(*max)?,
                TransferOption::Timeout(t) => easy.timeout(*t)?,
                TransferOption::ConnectTimeout(t) => easy.connect_timeout(*t)?,
                TransferOption::UserAgent(ua) => easy.useragent(ua)?,
                TransferOption::HttpHeaders(lines) => {
                    let mut list = List::new();
                    for line in lines {
                        list.append(line)?;
                    }
                    easy.http_headers(list)?;
                }
                TransferOption::AcceptEncoding(enc) => easy.accept_encoding(enc)?,
                TransferOption::NoBody(on) => easy.nobody(*on)?,
                TransferOption::Body(body) => easy.post_fields_copy(body)?,
                TransferOption::Verbose(on) => easy.verbose(*on)?,
            }
        }
        Ok(easy)
    }

    fn register(&mut self, id: TransferId, handle: Self::Handle) -> Result<(), TransportError> {
        let mut handle = self.multi.add2(handle)?;
        if let Err(err) = handle.set_token(id.0 as usize) {
            let _ = self.multi.remove2(handle);
            return Err(err.into());
        }
        self.handles.insert(id, handle);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.multi.wait(&mut [], timeout)?;
        Ok(())
    }

    fn drive(&mut self) -> Result<bool, TransportError> {
        // libcurl >= 7.20 never asks to be called again immediately.
        self.multi.perform()?;
        Ok(false)
    }

    fn next_event(&mut self) -> Option<Event> {
        if self.events.is_empty() {
            self.collect_messages();
        }
        self.events.pop_front()
    }

    fn deregister(&mut self, id: TransferId) -> Result<Transfer, TransportError> {
        let handle = self
            .handles
            .remove(&id)
            .ok_or_else(|| TransportError::new(-1, format!("no transfer registered as {id}")))?;
        let mut easy = self.multi.remove2(handle)?;
        let info = TransferInfo {
            effective_url: easy.effective_url().ok().flatten().map(str::to_string),
            response_code: easy.response_code().unwrap_or_default(),
            total_time: easy.total_time().unwrap_or_default(),
            content_type: easy.content_type().ok().flatten().map(str::to_string),
            redirect_count: easy.redirect_count().unwrap_or_default(),
            header_size: easy.header_size().unwrap_or_default(),
            primary_ip: easy.primary_ip().ok().flatten().map(str::to_string),
        };
        let content = Bytes::from(std::mem::take(&mut easy.get_mut().content));
        Ok(Transfer { content, info })
    }
}
