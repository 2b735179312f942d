//! Client-side controller for MPlayer's line-oriented slave-mode protocol.
//!
//! The controller spawns the player with piped standard streams, serializes
//! commands through a FIFO queue drained by a single writer task, forwards
//! both output streams line-by-line to a caller-supplied consumer, and runs
//! the retry/coalescing loops that keep the desired playback state
//! converging on the state the player actually reports.

mod config;
mod mplayer;

pub use config::{ConfigError, PlayerConfig};
pub use mplayer::{
  find_mplayer, kill_lingering, probe_media, LineConsumer, MPlayerError, MPlayerInstance,
  ProcessError, SubtitleSource, SubtitleTrack,
};
