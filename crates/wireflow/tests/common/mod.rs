//! Shared test setup.

/// Install a fmt subscriber once per test binary. `RUST_LOG` controls the
/// verbosity of engine traces captured by the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
