pub mod builders;
pub mod fake_executor;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use flowgraph::engine::RuntimeOptions;
use flowgraph::exec::WaitOptions;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Longest any single test may wait on the runtime or a service.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Install a test-captured subscriber once per test binary.
///
/// Output only shows for failing tests unless run with `--nocapture`.
/// `RUST_LOG=flowgraph=debug` overrides the default `flowgraph=info`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("flowgraph=info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, panicking after [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(out) => out,
        Err(_) => panic!("test timed out after {TEST_TIMEOUT:?}"),
    }
}

/// Millisecond backoff so `wait` loops finish quickly.
pub fn fast_wait() -> WaitOptions {
    WaitOptions {
        unit: Duration::from_millis(1),
        ceiling: 5,
    }
}

/// Runtime options for `hosts` with short polls and no stall timeout.
pub fn fast_runtime(hosts: &[&str]) -> RuntimeOptions {
    RuntimeOptions {
        hosts: hosts.iter().map(|h| h.to_string()).collect(),
        poll_interval: Duration::from_millis(5),
        wait: fast_wait(),
        stall_timeout: None,
    }
}
