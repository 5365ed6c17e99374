//! Loopback availability check for tests that talk to a wiremock server.
//!
//! Sandboxed runners sometimes forbid binding even `127.0.0.1`. Those tests
//! then skip with a note on stderr, unless `FASTGET_REQUIRE_SOCKET_TESTS` is
//! set, in which case they fail.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const STRICT_ENV: &str = "FASTGET_REQUIRE_SOCKET_TESTS";

fn strict_mode() -> bool {
    std::env::var(STRICT_ENV).is_ok_and(|value| {
        ["1", "true", "yes"]
            .iter()
            .any(|on| value.eq_ignore_ascii_case(on))
    })
}

#[track_caller]
fn loopback_unavailable() -> bool {
    if TcpListener::bind(("127.0.0.1", 0)).is_ok() {
        return false;
    }

    let caller = Location::caller();
    let note = format!(
        "fastget: no loopback socket for the mock server ({}:{})",
        caller.file(),
        caller.line()
    );
    assert!(!strict_mode(), "{note}; {STRICT_ENV} is set");
    eprintln!("{note}; test skipped");
    true
}

/// Starts a mock server, or returns `None` when loopback sockets are off limits.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl Future<Output = Option<MockServer>> {
    let unavailable = loopback_unavailable();
    async move {
        if unavailable {
            None
        } else {
            Some(MockServer::start().await)
        }
    }
}

/// Value a skipped test returns.
pub fn socket_skip_return() {}
