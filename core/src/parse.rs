//! Raw HTTP response parser.
//!
//! Turns one byte stream holding a status line, headers, a blank line and a
//! body into a [`Response`]. Lines end in `\n` or `\r\n`; the body is sliced
//! out of the input untouched, terminators included.

use bytes::Bytes;

use crate::error::ParseError;
use crate::response::{Headers, Response};
use crate::transport::TransferInfo;

/// Walks `buf` one line at a time, remembering where the next line starts.
struct Lines<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn rest(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let start = self.pos;
        let (end, next) = match self.buf[start..].iter().position(|&b| b == b'\n') {
            Some(i) => (start + i, start + i + 1),
            None => (self.buf.len(), self.buf.len()),
        };
        self.pos = next;
        let line = &self.buf[start..end];
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }
}

struct StatusLine {
    protocol: String,
    version: String,
    status: u16,
    reason: String,
}

fn parse_status_line(line: &[u8]) -> Result<StatusLine, ParseError> {
    let text = String::from_utf8_lossy(line);
    let malformed = || ParseError::MalformedStatusLine(text.to_string());

    let mut parts = text.splitn(3, ' ');
    let (protocol, version) = parts
        .next()
        .and_then(|token| token.trim().split_once('/'))
        .ok_or_else(malformed)?;
    let status = parts
        .next()
        .and_then(|code| code.trim().parse::<u16>().ok())
        .ok_or_else(malformed)?;
    let reason = parts.next().map(|r| r.trim().to_string()).unwrap_or_default();

    Ok(StatusLine {
        protocol: protocol.to_string(),
        version: version.to_string(),
        status,
        reason,
    })
}

fn parse_header_line(line: &[u8], headers: &mut Headers) {
    let text = String::from_utf8_lossy(line);
    match text.split_once(':') {
        Some((name, value)) if !name.is_empty() => headers.append(name.trim(), value.trim()),
        _ => {}
    }
}

fn starts_with_status_line(message: &[u8], pos: usize) -> bool {
    Lines::new(message, pos)
        .next()
        .is_some_and(|line| parse_status_line(line).is_ok())
}

/// Parse a raw response. An empty message yields `Ok(None)`.
///
/// Repeated headers become a list in order of appearance. A header block
/// followed directly by another status line (`100 Continue`, or a redirect
/// the transport followed) is skipped, so the result describes the final
/// response. A status line without a `PROTOCOL/VERSION` token or a numeric
/// code is an error.
pub fn parse_response(message: &Bytes, info: Option<TransferInfo>) -> Result<Option<Response>, ParseError> {
    let mut start = 0;
    loop {
        let mut lines = Lines::new(message, start);
        let Some(status_line) = lines.by_ref().find(|line| !line.is_empty()) else {
            return Ok(None);
        };
        let status = parse_status_line(status_line)?;

        let mut headers = Headers::new();
        let mut body = Bytes::new();
        let mut saw_blank = false;
        while let Some(line) = lines.next() {
            if line.is_empty() {
                saw_blank = true;
                body = message.slice(lines.rest()..);
                break;
            }
            parse_header_line(line, &mut headers);
        }

        // Interim and followed-redirect blocks come back to back, each
        // ending in a blank line. Only the last block is the response.
        if saw_blank && starts_with_status_line(message, lines.rest()) {
            start = lines.rest();
            continue;
        }

        return Ok(Some(Response::new(
            status.protocol,
            status.version,
            status.status,
            status.reason,
            headers,
            body,
            info,
        )));
    }
}
