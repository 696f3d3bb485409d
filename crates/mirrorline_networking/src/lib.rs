//! # Mirrorline Networking
//!
//! The runnable surfaces around the replication engine.
//!
//! - **Transport**: length-prefixed text/binary frames over TCP
//! - **Server**: authoritative world behind one lock, fixed-rate diff broadcast
//! - **Client**: inbound mirror, outbound input batches, render export
//!
//! ## Trust model
//!
//! ```text
//! CLIENT                                SERVER
//!   |                                      |
//!   |--- Update(own player), Instantiate ->|
//!   |    (bullet, placeholder id 0)        | <- per-connection policy
//!   |                                      |
//!   |<-- diffs + player updates each tick -|
//! ```
//!
//! Clients propose; the server decides what enters the world.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mirrorline_networking::{ClientConfig, MirrorClient, ReplicationServer, ServerConfig};
//!
//! # async fn demo() -> mirrorline_networking::NetResult<()> {
//! let server = ReplicationServer::bind(ServerConfig::default()).await?;
//! let addr = server.local_addr()?;
//! tokio::spawn(server.run());
//!
//! let config = ClientConfig {
//!     server_address: addr.to_string(),
//!     ..ClientConfig::default()
//! };
//! let mut client = MirrorClient::connect(&config).await?;
//! client.poll();
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod transport;

pub use client::{
    ClientState, InputBatch, InstanceTransform, MirrorClient, PollSummary, RenderInstances,
};
pub use config::{ClientConfig, ServerConfig};
pub use error::{NetError, NetResult};
pub use server::{
    serve_for, Admission, ClientConnection, ConnectionId, ConnectionPolicy, Delivery, ReplicationServer,
    ServerState, ShutdownHandle, TickLoop, TickOutcome, TickPhase, TickStats,
};
pub use transport::{read_frame, write_frame, Frame, FRAME_HEADER_SIZE};

/// Installs the `tracing` subscriber used by the binaries.
///
/// Honours `RUST_LOG`; defaults to `info`. Calling it twice is harmless.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
