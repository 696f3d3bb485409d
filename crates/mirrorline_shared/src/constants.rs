//! # Simulation & Network Constants
//!
//! Defaults baked into both binaries. Config files override the network ones.

// =============================================================================
// NETWORK CONFIGURATION
// =============================================================================

/// Server port for replication traffic
pub const DEFAULT_PORT: u16 = 7878;

/// Address clients dial when none is configured
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:7878";

/// Broadcast ticks per second
pub const TICK_RATE: u32 = 30;

/// Maximum simultaneous connections
pub const MAX_CLIENTS: usize = 64;

/// Largest frame either side accepts (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1 << 20;

/// Frames queued per client before the server drops it (~8 s at 30 Hz)
pub const OUTBOUND_QUEUE_FRAMES: usize = 256;

// =============================================================================
// SIMULATION
// =============================================================================

/// Vertical acceleration applied to bullets (m/s²)
pub const GRAVITY: f32 = -9.8;

/// Bullets below this height are removed by the server
pub const FLOOR_HEIGHT: f32 = -4.0;

/// Muzzle speed of a fired bullet (m/s)
pub const BULLET_SPEED: f32 = 50.0;

/// Uniform render scale of a bullet
pub const BULLET_SCALE: f32 = 0.1;

/// Players cannot walk below this height
pub const MIN_PLAYER_HEIGHT: f32 = -3.0;
