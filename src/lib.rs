pub mod broadcast;
pub mod config;
pub mod error;
pub mod index;
pub mod link;
pub mod memory;
pub mod protocol;
pub mod semantic;
pub mod task;
pub mod util;
pub mod watch;

pub use broadcast::{ChangeAction, ChangeBroadcaster, ChangeEvent, Topic};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};

/// Install a tracing subscriber driven by `RUST_LOG`.
///
/// Call once at process startup. Safe to call again; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
