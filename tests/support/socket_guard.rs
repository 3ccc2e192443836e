//! Skips wiremock tests in sandboxes that cannot bind localhost.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "HARVESTER_REQUIRE_SOCKET_TESTS";

/// Starts a mock server, or returns `None` when localhost sockets are
/// unavailable.
///
/// # Panics
///
/// Panics instead of skipping when `HARVESTER_REQUIRE_SOCKET_TESTS` is
/// `1`, `true` or `yes`.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl Future<Output = Option<MockServer>> {
    let available = TcpListener::bind("127.0.0.1:0").is_ok();
    if !available {
        let caller = std::panic::Location::caller();
        let required = std::env::var(REQUIRE_ENV)
            .is_ok_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
        assert!(
            !required,
            "{caller}: localhost sockets unavailable and {REQUIRE_ENV} is set"
        );
        eprintln!("{caller}: localhost sockets unavailable, skipping wiremock test");
    }
    async move {
        if available {
            Some(MockServer::start().await)
        } else {
            None
        }
    }
}
