//! A wiremock responder that serves one resource with HTTP range semantics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Misbehavior injected for requests whose range starts at a given offset.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Answer with this status and no body.
    Status(u16),
    /// Claim the full range but send only the first `n` bytes.
    Truncate(usize),
    /// Start the returned range `n` bytes after the requested start.
    SkipAhead(u64),
    /// Send `n` bytes beyond the requested end.
    Overshoot(usize),
}

#[derive(Debug)]
struct FaultEntry {
    fault: Fault,
    remaining: usize,
}

#[derive(Debug, Default)]
struct State {
    etag: Option<String>,
    last_modified: Option<String>,
    ignore_ranges: bool,
    faults: HashMap<u64, FaultEntry>,
}

/// Serves `body` for HEAD and GET, honoring `Range` and `If-Range`.
#[derive(Debug, Clone)]
pub struct RangeResponder {
    body: Arc<Vec<u8>>,
    state: Arc<Mutex<State>>,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn with_etag(self, etag: &str) -> Self {
        self.set_etag(etag);
        self
    }

    pub fn with_last_modified(self, value: &str) -> Self {
        self.state.lock().unwrap().last_modified = Some(value.to_string());
        self
    }

    /// Answers every GET with `200` and the full body.
    pub fn ignoring_ranges(self) -> Self {
        self.state.lock().unwrap().ignore_ranges = true;
        self
    }

    pub fn set_etag(&self, etag: &str) {
        self.state.lock().unwrap().etag = Some(etag.to_string());
    }

    /// Injects `fault` for the next `times` requests starting at `start`.
    pub fn fail_at(&self, start: u64, fault: Fault, times: usize) {
        self.state.lock().unwrap().faults.insert(
            start,
            FaultEntry {
                fault,
                remaining: times,
            },
        );
    }

    pub fn clear_faults(&self) {
        self.state.lock().unwrap().faults.clear();
    }

    pub async fn mount(&self, server: &MockServer) {
        Mock::given(any()).respond_with(self.clone()).mount(server).await;
    }

    fn take_fault(&self, start: u64) -> Option<Fault> {
        let mut state = self.state.lock().unwrap();
        let entry = state.faults.get_mut(&start)?;
        if entry.remaining == 0 {
            return None;
        }
        entry.remaining -= 1;
        Some(entry.fault)
    }

    fn with_validators(&self, template: ResponseTemplate) -> ResponseTemplate {
        let state = self.state.lock().unwrap();
        let mut template = template.insert_header("accept-ranges", "bytes");
        if let Some(etag) = &state.etag {
            template = template.insert_header("etag", etag.as_str());
        }
        if let Some(value) = &state.last_modified {
            template = template.insert_header("last-modified", value.as_str());
        }
        template
    }

    fn full_body(&self) -> ResponseTemplate {
        self.with_validators(ResponseTemplate::new(200).set_body_bytes(self.body.to_vec()))
    }

    fn if_range_matches(&self, request: &Request) -> bool {
        let Some(value) = request
            .headers
            .get("if-range")
            .and_then(|value| value.to_str().ok())
        else {
            return true;
        };
        let state = self.state.lock().unwrap();
        state.etag.as_deref() == Some(value) || state.last_modified.as_deref() == Some(value)
    }

    fn partial(&self, start: u64, end: u64) -> ResponseTemplate {
        let len = self.body.len() as u64;
        if start >= len {
            return ResponseTemplate::new(416).insert_header("content-range", format!("bytes */{len}"));
        }
        let end = end.min(len - 1);

        let (range_start, body_start, body_end) = match self.take_fault(start) {
            Some(Fault::Status(status)) => return ResponseTemplate::new(status),
            Some(Fault::Truncate(n)) => (start, start, (start + n as u64).min(end + 1)),
            Some(Fault::SkipAhead(n)) => (start + n, start + n, end + 1),
            Some(Fault::Overshoot(n)) => (start, start, (end + 1 + n as u64).min(len)),
            None => (start, start, end + 1),
        };

        let slice = self.body[body_start as usize..body_end as usize].to_vec();
        self.with_validators(
            ResponseTemplate::new(206)
                .insert_header("content-range", format!("bytes {range_start}-{end}/{len}"))
                .set_body_bytes(slice),
        )
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if request.method.as_str() == "HEAD" {
            return self.full_body();
        }
        if self.state.lock().unwrap().ignore_ranges {
            return self.full_body();
        }
        let Some((start, end)) = requested_range(request) else {
            return self.full_body();
        };
        if !self.if_range_matches(request) {
            return self.full_body();
        }
        self.partial(start, end)
    }
}

fn requested_range(request: &Request) -> Option<(u64, u64)> {
    let value = request.headers.get("range")?.to_str().ok()?;
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// Ranges of every GET with a `Range` header the server received, in order.
pub async fn received_ranges(server: &MockServer) -> Vec<(u64, u64)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.as_str() == "GET")
        .filter_map(requested_range)
        .collect()
}

/// Deterministic pseudo-random content, so misplaced bytes are detectable.
pub fn test_body(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}
