//! Response header serialization and the `out -> raw_out` pipeline move,
//! including chunked transfer-encoding for responses (request bodies are
//! never chunk-decoded here — that is an explicit non-goal).

use crate::chunkqueue::ChunkQueue;
use crate::parser::{status::Status, Version};

/// The exact literal emitted for an `Expect: 100-continue` request, before
/// its body is forwarded to the handler.
pub const CONTINUE_100: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Which transfer-encoding, if any, has been negotiated for a response.
/// Modeled as a small bitset (today holding a single flag) to mirror the
/// "negotiated encoding includes the chunked flag" phrasing used to decide
/// `filter_chunked_encode` vs. passthrough.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferEncoding {
    pub chunked: bool,
}

impl TransferEncoding {
    /// No transfer-encoding negotiated: `out` is moved to `raw_out` as-is.
    pub fn identity() -> Self {
        TransferEncoding::default()
    }

    /// Chunked transfer-encoding negotiated.
    pub fn chunked() -> Self {
        TransferEncoding { chunked: true }
    }
}

/// Serializes a status line and header block into `raw_out`. Callers are
/// responsible for only calling this once per request — the idempotent
/// latch itself lives on `Connection` (`response_headers_sent`), since it
/// must be visible to the whole state machine, not just the writer.
pub fn write_headers(
    raw_out: &mut ChunkQueue,
    version: Version,
    status: Status,
    headers: &[(String, String)],
) {
    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(version.to_string().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(status.to_string().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(status.reason_phrase().as_bytes());
    buf.extend_from_slice(b"\r\n");

    for (name, value) in headers {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(b"\r\n");
    raw_out.append(buf);
}

/// Moves every byte presently in `out` to `raw_out`, applying chunked
/// framing if `encoding.chunked`, otherwise a plain passthrough move.
/// Propagates `out.is_closed()` onto `raw_out` once `out` is fully drained.
///
/// Returns `true` if the response is now complete on the writer side (i.e.
/// `raw_out` has been closed because `out` was closed and drained).
pub fn forward_response_body(
    out: &mut ChunkQueue,
    raw_out: &mut ChunkQueue,
    encoding: TransferEncoding,
) -> bool {
    let pending = out.steal_all();

    if encoding.chunked {
        if !pending.is_empty() {
            let mut framed = Vec::with_capacity(pending.len() + 16);
            framed.extend_from_slice(format!("{:x}\r\n", pending.len()).as_bytes());
            framed.extend_from_slice(&pending);
            framed.extend_from_slice(b"\r\n");
            raw_out.append(framed);
        }

        if out.is_finished() {
            raw_out.append_mem(b"0\r\n\r\n");
            raw_out.close();
        }
    } else {
        if !pending.is_empty() {
            raw_out.append(pending);
        }

        if out.is_finished() {
            raw_out.close();
        }
    }

    raw_out.is_finished()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunkqueue::ChunkQueue;

    #[test]
    fn write_headers_serializes_status_line_and_fields() {
        let mut raw_out = ChunkQueue::unlimited();
        write_headers(
            &mut raw_out,
            Version::H1_1,
            Status::NoContent,
            &[("Content-Length".to_string(), "0".to_string())],
        );
        let bytes = raw_out.steal_all();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn passthrough_moves_bytes_without_framing() {
        let mut out = ChunkQueue::unlimited();
        let mut raw_out = ChunkQueue::unlimited();
        out.append(b"hello".to_vec());
        out.close();
        let done = forward_response_body(&mut out, &mut raw_out, TransferEncoding::identity());
        assert!(done);
        assert_eq!(b"hello".to_vec(), raw_out.steal_all());
        assert!(raw_out.is_closed());
    }

    #[test]
    fn chunked_encoding_frames_each_move_and_terminates_on_close() {
        let mut out = ChunkQueue::unlimited();
        let mut raw_out = ChunkQueue::unlimited();
        out.append(b"hi".to_vec());
        forward_response_body(&mut out, &mut raw_out, TransferEncoding::chunked());
        out.close();
        let done = forward_response_body(&mut out, &mut raw_out, TransferEncoding::chunked());
        assert!(done);
        let bytes = raw_out.steal_all();
        assert_eq!(b"2\r\nhi\r\n0\r\n\r\n".to_vec(), bytes);
    }
}
