// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP/1.1 request-line and header-block parsing.
//!
//! IETF RFC 9112.
//!
//! Unlike a parser that assumes the whole request is already in one buffer,
//! `RequestParser` accumulates bytes across as many `advance` calls as it
//! takes for a full header block to arrive — the incremental
//! accumulate-then-parse shape an earlier version of this parser's own doc
//! comment speculated about needing ("keep a buffer for the entire request
//! received over multiple packets, and indexes into the important parts,
//! deferring parsing until it's actually needed") but never implemented.

use std::str::from_utf8;

use super::tokens::{is_request_target_token, is_tchar};
use super::{discard_whitespace, take_after_newline, ParseError};
use crate::chunkqueue::ChunkQueue;
use crate::parser::raw_request::RawRequest;
use crate::parser::{Method, Version};

/// One parsed header field. Borrows directly from `RequestParser`'s internal
/// buffer — no per-header allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header<'a> {
    /// Field name, exactly as received (not lowercased).
    pub name: &'a str,
    /// Field value, with leading/trailing optional whitespace trimmed.
    pub value: &'a str,
}

/// A fully parsed request-line plus header block, borrowed from the
/// parser's internal buffer.
#[derive(Debug)]
pub struct ParsedHead<'a> {
    /// The request method.
    pub method: Method,
    /// The request-target, exactly as received.
    pub target: &'a str,
    /// The declared protocol version.
    pub version: Version,
    /// Every header field, in wire order.
    pub headers: Vec<Header<'a>>,
}

/// Outcome of driving the parser with newly available bytes, exactly
/// spec.md's three-way outcome for the parser/raw_in binding.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A complete header block is available; call `parsed_head` to read it.
    GoOn,
    /// Not enough bytes yet; the caller should wait for more read
    /// readiness before calling `advance` again.
    WaitForEvent,
    /// The header block is malformed, or exceeded the maximum permitted
    /// size before a terminator was found.
    Error(ParseError),
}

/// Headers beyond this count make a request a parse error, guarding against
/// unbounded per-connection memory growth from a hostile peer.
const MAX_HEADERS: usize = 128;
/// A header block larger than this, with no blank-line terminator yet seen,
/// is treated as malformed rather than awaited indefinitely.
const MAX_HEADER_BLOCK: usize = 64 * 1024;

/// Incremental HTTP/1.1 request-line + header parser bound to one
/// connection's `raw_in` queue.
#[derive(Debug, Default)]
pub struct RequestParser {
    buf: Vec<u8>,
}

impl RequestParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        RequestParser::default()
    }

    /// Clears accumulated state, for reuse across a keep-alive connection's
    /// next request.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Steals every byte presently queued in `raw_in` and looks for a
    /// complete header block (`\r\n\r\n`). Never consumes bytes belonging to
    /// the request body: anything past the header terminator is pushed
    /// back onto `raw_in` untouched.
    pub fn advance(&mut self, raw_in: &mut ChunkQueue) -> ParseOutcome {
        if raw_in.length() > 0 {
            self.buf.extend(raw_in.steal_all());
        }

        let Some(terminator_end) = find_header_terminator(&self.buf) else {
            return if self.buf.len() > MAX_HEADER_BLOCK {
                ParseOutcome::Error(ParseError::HeaderTooLong)
            } else {
                ParseOutcome::WaitForEvent
            };
        };

        let body = self.buf.split_off(terminator_end);
        if !body.is_empty() {
            raw_in.append(body);
        }

        ParseOutcome::GoOn
    }

    /// Parses the accumulated header block. Only meaningful after `advance`
    /// has returned `ParseOutcome::GoOn`.
    pub fn parsed_head(&self) -> Result<ParsedHead<'_>, ParseError> {
        let mut cursor = RawRequest::new(&self.buf);
        let method = parse_method(&mut cursor)?;
        let target = parse_target(&mut cursor)?;
        let version = parse_version(&mut cursor)?;
        take_after_newline(&mut cursor)?;
        let headers = parse_headers(&mut cursor)?;

        Ok(ParsedHead {
            method,
            target,
            version,
            headers,
        })
    }
}

/// Finds the index just past the first bare `\r\n\r\n` in `buf`, i.e. the
/// byte offset where the body (if any) begins.
fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn parse_method<'b>(buf: &mut RawRequest<'b>) -> Result<Method, ParseError> {
    if buf.any(|&b| !b.is_ascii_uppercase()) {
        if let Ok(slice) = buf.slice_skip(1) {
            return match slice {
                b"GET" => Ok(Method::Get),
                b"HEAD" => Ok(Method::Head),
                b"POST" => Ok(Method::Post),
                b"PUT" => Ok(Method::Put),
                b"DELETE" => Ok(Method::Delete),
                b"CONNECT" => Ok(Method::Connect),
                b"OPTIONS" => Ok(Method::Options),
                b"TRACE" => Ok(Method::Trace),
                _ => Err(ParseError::Method),
            };
        }
    }

    Err(ParseError::Method)
}

fn parse_target<'b>(buf: &mut RawRequest<'b>) -> Result<&'b str, ParseError> {
    for &b in &mut *buf {
        if b == b' ' {
            if let Ok(slice) = buf.slice_skip(1) {
                return from_utf8(slice).map_err(|_| ParseError::Target);
            }
            break;
        } else if !is_request_target_token(b) {
            break;
        }
    }

    Err(ParseError::Target)
}

fn parse_version<'b>(buf: &mut RawRequest<'b>) -> Result<Version, ParseError> {
    let result = if !buf.take(5).eq(b"HTTP/".iter()) {
        Err(ParseError::Version)
    } else {
        match buf.next() {
            Some(b'1') => {
                if buf.next() == Some(&b'.') {
                    match buf.next() {
                        Some(b'0') => Ok(Version::H1_0),
                        Some(b'1') => Ok(Version::H1_1),
                        _ => Err(ParseError::Version),
                    }
                } else {
                    Err(ParseError::Version)
                }
            }
            Some(b'2') => Ok(Version::H2),
            Some(b'3') => Ok(Version::H3),
            _ => Err(ParseError::Version),
        }
    };

    buf.slice();
    result
}

fn parse_headers<'b>(buf: &mut RawRequest<'b>) -> Result<Vec<Header<'b>>, ParseError> {
    let mut headers = Vec::new();

    loop {
        if buf.peek() == Some(b'\r') || buf.is_empty() {
            super::discard_newline(buf);
            break;
        }

        if headers.len() >= MAX_HEADERS {
            return Err(ParseError::TooManyHeaders);
        }

        let name = buf.take_until(|b| b == b':').ok_or(ParseError::HeaderName)?;
        if !name.iter().all(|&b| is_tchar(b)) {
            return Err(ParseError::HeaderName);
        }
        buf.next();
        buf.slice();
        discard_whitespace(buf);

        let value = buf
            .take_until(|b| b == b'\r')
            .ok_or(ParseError::HeaderValue)?;
        super::discard_newline(buf);
        let value = trim_trailing_ows(value);

        headers.push(Header {
            name: from_utf8(name).map_err(|_| ParseError::HeaderName)?,
            value: from_utf8(value).map_err(|_| ParseError::HeaderValue)?,
        });
    }

    Ok(headers)
}

fn trim_trailing_ows(value: &[u8]) -> &[u8] {
    let end = value
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map(|p| p + 1)
        .unwrap_or(0);
    &value[..end]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunkqueue::ChunkQueue;

    #[test]
    fn waits_for_event_until_terminator_arrives() {
        let mut parser = RequestParser::new();
        let mut raw_in = ChunkQueue::unlimited();
        raw_in.append(b"GET / HTTP/1.1\r\nHost: exa".to_vec());
        assert!(matches!(
            parser.advance(&mut raw_in),
            ParseOutcome::WaitForEvent
        ));
    }

    #[test]
    fn parses_a_complete_request_across_two_reads() {
        let mut parser = RequestParser::new();
        let mut raw_in = ChunkQueue::unlimited();
        raw_in.append(b"GET /index HTTP/1.1\r\nHost: exa".to_vec());
        assert!(matches!(
            parser.advance(&mut raw_in),
            ParseOutcome::WaitForEvent
        ));

        raw_in.append(b"mple.com\r\n\r\n".to_vec());
        assert!(matches!(parser.advance(&mut raw_in), ParseOutcome::GoOn));

        let head = parser.parsed_head().expect("valid request");
        assert_eq!(Method::Get, head.method);
        assert_eq!("/index", head.target);
        assert_eq!(Version::H1_1, head.version);
        assert_eq!(1, head.headers.len());
        assert_eq!("Host", head.headers[0].name);
        assert_eq!("example.com", head.headers[0].value);
    }

    #[test]
    fn leaves_body_bytes_in_raw_in() {
        let mut parser = RequestParser::new();
        let mut raw_in = ChunkQueue::unlimited();
        raw_in.append(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello".to_vec());
        assert!(matches!(parser.advance(&mut raw_in), ParseOutcome::GoOn));
        assert_eq!(5, raw_in.length());
        assert_eq!(b"hello".to_vec(), raw_in.steal_all());
    }

    #[test]
    fn rejects_invalid_method() {
        let mut parser = RequestParser::new();
        let mut raw_in = ChunkQueue::unlimited();
        raw_in.append(b"gEt / HTTP/1.1\r\n\r\n".to_vec());
        assert!(matches!(parser.advance(&mut raw_in), ParseOutcome::GoOn));
        assert!(matches!(parser.parsed_head(), Err(ParseError::Method)));
    }

    #[test]
    fn rejects_missing_version() {
        let mut parser = RequestParser::new();
        let mut raw_in = ChunkQueue::unlimited();
        raw_in.append(b"GET /\r\n\r\n".to_vec());
        assert!(matches!(parser.advance(&mut raw_in), ParseOutcome::GoOn));
        assert!(matches!(parser.parsed_head(), Err(ParseError::Version)));
    }

    #[test]
    fn too_many_headers_is_a_parse_error() {
        let mut parser = RequestParser::new();
        let mut raw_in = ChunkQueue::unlimited();
        let mut req = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..(MAX_HEADERS + 1) {
            req.extend_from_slice(format!("X-{i}: v\r\n").as_bytes());
        }
        req.extend_from_slice(b"\r\n");
        raw_in.append(req);
        assert!(matches!(parser.advance(&mut raw_in), ParseOutcome::GoOn));
        assert!(matches!(
            parser.parsed_head(),
            Err(ParseError::TooManyHeaders)
        ));
    }
}
