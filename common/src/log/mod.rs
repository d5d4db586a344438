pub mod tracing_factory;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs a bare-bones subscriber for unit tests; ignores the error if a
/// global subscriber was already set by an earlier test in the same binary.
pub fn init_test_log() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
