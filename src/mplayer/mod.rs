//! MPlayer slave-mode module - spawns and drives an external MPlayer process
//! over its standard streams.
//!
//! Architecture:
//! - `process.rs` - binary detection, argument construction, spawning, forced kill
//! - `protocol.rs` - slave-mode command strings and stdout line markers
//! - `queue.rs` - FIFO command queue and the stop-completion latch
//! - `streams.rs` - writer/reader worker loops over the child's stdio
//! - `instance.rs` - high-level controller (lifecycle, pause reconciliation,
//!   seek coalescing, redraw/mute)
//! - `probe.rs` - one-shot metadata probe

mod instance;
mod probe;
mod process;
mod protocol;
mod queue;
mod streams;

pub use instance::{LineConsumer, MPlayerError, MPlayerInstance, SubtitleSource, SubtitleTrack};
pub use probe::probe_media;
pub use process::{find_mplayer, kill_lingering, ProcessError};
