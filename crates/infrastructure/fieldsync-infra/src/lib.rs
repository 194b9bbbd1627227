pub mod net;

// Re-exports for convenience
pub use net::connectivity::{
    probe_once, wait_until_connected, ConnectivityMonitor, ConnectivityProvider,
};
pub use net::remote::{HttpDocumentStore, RemoteError, RemoteReader, RemoteWriter};
pub use net::default_http_client;
