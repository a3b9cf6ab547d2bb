//! The logical request (`vrequest` in lighttpd2 terms) and the small set of
//! named hooks a connection drives it through.
//!
//! Virtual-request routing — picking *which* action handles a request — is
//! an explicit non-goal. `Action` is the seam a real router would plug into,
//! not a router: `LogicalRequest::new` is handed one `Arc<dyn Action>` and
//! always enters it directly, mirroring `li_action_enter` being called with
//! whatever the (out of scope) action tree resolved to.

use std::sync::Arc;

use crate::chunkqueue::{ChunkQueue, CqLimit};
use crate::parser::h1::request::Header;
use crate::parser::status::Status;
use crate::parser::Version;

/// Every hook in this module reports the same outcome today: the connection
/// always moves on. This mirrors `mainvr_handle_request_headers` and its
/// siblings in `original_source`, which all return `handler_t::HANDLER_GO_ON`
/// unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// Continue driving the connection state machine.
    GoOn,
}

/// The seam virtual-request routing would plug into.
pub trait Action: Send + Sync {
    /// Called once request headers have been parsed, with the logical
    /// request fully addressable (method/target/headers available).
    fn enter(&self, request: &mut LogicalRequest);

    /// Called as body bytes become available in `request.in` (spec.md
    /// §4.4: "After stealing, notify the logical request of new body
    /// bytes"). Choosing which action handles a request is out of scope,
    /// but an already-entered action still needs to observe the body it
    /// asked for — default no-op, for actions that only care about
    /// headers (e.g. `EchoAction`).
    fn on_body(&self, _request: &mut LogicalRequest) {}
}

/// Minimal stand-in used by tests and the bundled binary: answers every
/// request with an empty `204 No Content`, matching spec.md §8 scenario 1.
#[derive(Debug, Default)]
pub struct EchoAction;

impl Action for EchoAction {
    fn enter(&self, request: &mut LogicalRequest) {
        request.set_response_status(Status::NoContent);
        request.close_response_body();
    }
}

/// State belonging to one request/response cycle, owned by a `Connection`
/// and reset (not freed) between keep-alive reuses.
#[derive(Debug)]
pub struct LogicalRequest {
    pub method: Option<String>,
    pub target: Option<String>,
    pub version: Version,
    pub request_headers: Vec<(String, String)>,

    /// Bytes the request body handler has produced / the handler has yet to
    /// consume.
    pub r#in: ChunkQueue,
    /// Bytes the response handler has produced, awaiting the response
    /// writer (`connection::write_response`).
    pub out: ChunkQueue,

    pub response_status: Status,
    pub response_headers: Vec<(String, String)>,

    action: Arc<dyn Action>,
}

impl LogicalRequest {
    /// Creates a fresh logical request sharing its chunk-queue credit limits
    /// with the connection's raw queues (spec.md invariant 7).
    pub fn new(in_limit: std::rc::Rc<std::cell::RefCell<CqLimit>>, out_limit: std::rc::Rc<std::cell::RefCell<CqLimit>>, action: Arc<dyn Action>) -> Self {
        LogicalRequest {
            method: None,
            target: None,
            version: Version::H1_1,
            request_headers: Vec::new(),
            r#in: ChunkQueue::new(in_limit),
            out: ChunkQueue::new(out_limit),
            response_status: Status::r#Ok,
            response_headers: Vec::new(),
            action,
        }
    }

    /// Resets this logical request for reuse on a kept-alive connection,
    /// without releasing its chunk queues' shared limits.
    pub fn reset(&mut self) {
        self.method = None;
        self.target = None;
        self.version = Version::H1_1;
        self.request_headers.clear();
        self.r#in.reset();
        self.out.reset();
        self.response_status = Status::r#Ok;
        self.response_headers.clear();
    }

    fn set_response_status(&mut self, status: Status) {
        self.response_status = status;
    }

    fn close_response_body(&mut self) {
        self.out.close();
    }

    /// `on_request_headers`: fires once a complete, valid header block has
    /// been parsed. Hands the request to the configured action.
    pub fn handle_request_headers(&mut self, method: String, target: String, version: Version, headers: Vec<Header<'_>>) -> HandlerResult {
        self.method = Some(method);
        self.target = Some(target);
        self.version = version;
        self.request_headers = headers
            .iter()
            .map(|h| (h.name.to_string(), h.value.to_string()))
            .collect();

        let action = Arc::clone(&self.action);
        action.enter(self);
        HandlerResult::GoOn
    }

    /// `on_request_body`: called as body bytes become available in `in`.
    /// Bodies are handed to the action synchronously today; a real router
    /// would stream this incrementally.
    pub fn handle_request_body(&mut self) -> HandlerResult {
        let action = Arc::clone(&self.action);
        action.on_body(self);
        HandlerResult::GoOn
    }

    /// `on_response_headers`: fires once, lazily, the first time the
    /// response writer needs a header block (see
    /// `connection::write_response`'s header-emission latch).
    pub fn handle_response_headers(&mut self) -> HandlerResult {
        HandlerResult::GoOn
    }

    /// `on_response_body`: drives `out -> raw_out`. Mirrors
    /// `mainvr_handle_response_body`, which calls `check_response_done`
    /// both before and after moving the pipeline forward, yet always
    /// returns `GoOn` regardless of either result. The pre-check exists so
    /// a response that was already complete before this call doesn't
    /// redundantly re-enter the write path; the post-check's result is
    /// discarded in the original and is preserved unused here too — we do
    /// not know whether the discarded second check was ever meant to
    /// influence the caller, and are not guessing.
    pub fn handle_response_body(&mut self, already_done: bool) -> HandlerResult {
        let _pre = already_done;
        // Pipeline progress (out -> raw_out) happens in the caller
        // (`Connection::write_response`), which has access to raw_out.
        let _post_done_discarded = self.out.is_finished();
        HandlerResult::GoOn
    }

    /// `on_response_error`: fires when the connection converts an internal
    /// error into a terminating response.
    pub fn handle_response_error(&mut self) -> HandlerResult {
        HandlerResult::GoOn
    }
}

/// Registry of close-phase observers, run synchronously on the owning
/// worker when a request finishes (spec.md §4.5).
pub trait ClosePlugin: Send + Sync {
    /// Invoked once per completed request, before the connection is reset
    /// or released.
    fn on_close(&self, request: &LogicalRequest);
}

/// Holds the configured set of close-phase plugins.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn ClosePlugin>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        PluginRegistry::default()
    }

    /// Registers a plugin to be notified on every request close.
    pub fn register(&mut self, plugin: Arc<dyn ClosePlugin>) {
        self.plugins.push(plugin);
    }

    /// Runs every registered plugin's close hook, in registration order.
    pub fn handle_close(&self, request: &LogicalRequest) {
        for plugin in &self.plugins {
            plugin.on_close(request);
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.len())
            .finish()
    }
}
