//! Slave-mode protocol text.
//!
//! MPlayer in `-slave` mode reads newline-terminated commands on stdin and
//! reports state as `ID_*` lines on stdout. This module builds the outbound
//! command strings and classifies the few strings the worker loops treat
//! specially (pause-keep prefixes, the `sleep`/`seek` pseudo-commands and
//! the `ID_PAUSED`/`ID_EXIT` markers).

/// Prefix that sends a command without disturbing the player's pause state.
pub const PAUSE_KEEP: &str = "pausing_keep";
/// Stronger variant of [`PAUSE_KEEP`] honored even while stepping frames.
pub const PAUSE_KEEP_FORCE: &str = "pausing_keep_force";

/// stdout marker prefix for the player's self-reported pause state.
pub const ID_PAUSED: &str = "ID_PAUSED";
/// stdout marker prefix emitted when the player exits (ends a probe run).
pub const ID_EXIT: &str = "ID_EXIT";

/// Toggle pause.
pub const PAUSE: &str = "pause";
/// Request a position report (`ANS_TIME_POSITION`).
pub const GET_TIME_POS: &str = "get_time_pos";
/// Advance exactly one frame.
pub const FRAME_STEP: &str = "frame_step";
/// Stop playback.
pub const STOP: &str = "stop";
/// Terminate the player with exit code 0.
pub const QUIT: &str = "quit 0";

/// Absolute seek (`2` selects seek-to-position mode).
pub fn seek_absolute(seconds: i64) -> String {
  format!("seek {seconds} 2")
}

/// Set volume absolute (`1` selects absolute mode).
pub fn volume(level: u32) -> String {
  format!("volume {level} 1")
}

pub fn mute(on: bool) -> String {
  format!("mute {}", if on { 1 } else { 0 })
}

pub fn switch_audio(track_id: &str) -> String {
  format!("switch_audio {track_id}")
}

pub fn sub_demux(track_id: &str) -> String {
  format!("sub_demux {track_id}")
}

pub fn sub_file(track_id: &str) -> String {
  format!("sub_file {track_id}")
}

pub fn sub_load(path: &str) -> String {
  format!("sub_load \"{path}\"")
}

pub fn sub_visibility(visible: bool) -> String {
  format!("set_property sub_visibility {}", if visible { 1 } else { 0 })
}

pub fn get_property(name: &str) -> String {
  format!("get_property {name}")
}

/// Host-side delay pseudo-command; forwarded to the player after the writer
/// has slept for the requested duration.
pub fn sleep(millis: u64) -> String {
  format!("sleep {millis}")
}

/// Strip a pause-keep prefix, returning the bare command.
pub fn strip_pause_keep(cmd: &str) -> &str {
  for prefix in [PAUSE_KEEP_FORCE, PAUSE_KEEP] {
    if let Some(rest) = cmd.strip_prefix(prefix) {
      if let Some(bare) = rest.strip_prefix(' ') {
        return bare;
      }
    }
  }
  cmd
}

/// Millisecond duration of a (bare) `sleep` pseudo-command, if it is one.
pub fn sleep_millis(bare: &str) -> Option<u64> {
  bare.strip_prefix("sleep ")?.trim().parse().ok()
}

/// Whether a (bare) command is a seek, wrapped or not.
pub fn is_seek(bare: &str) -> bool {
  bare.starts_with("seek ")
}

/// Escape backslashes for transmission; the player's slave parser treats a
/// lone backslash as an escape character.
pub fn escape(cmd: &str) -> String {
  cmd.replace('\\', "\\\\")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_command_builders() {
    assert_eq!(seek_absolute(90), "seek 90 2");
    assert_eq!(volume(35), "volume 35 1");
    assert_eq!(mute(true), "mute 1");
    assert_eq!(mute(false), "mute 0");
    assert_eq!(sub_load("/tmp/movie.srt"), "sub_load \"/tmp/movie.srt\"");
    assert_eq!(sub_visibility(false), "set_property sub_visibility 0");
    assert_eq!(get_property("LENGTH"), "get_property LENGTH");
  }

  #[test]
  fn test_strip_pause_keep() {
    assert_eq!(strip_pause_keep("pausing_keep mute 1"), "mute 1");
    assert_eq!(strip_pause_keep("pausing_keep_force seek 10 2"), "seek 10 2");
    assert_eq!(strip_pause_keep("pause"), "pause");
    // no trailing space, not a wrapped command
    assert_eq!(strip_pause_keep("pausing_keep"), "pausing_keep");
  }

  #[test]
  fn test_sleep_parsing() {
    assert_eq!(sleep_millis("sleep 100"), Some(100));
    assert_eq!(sleep_millis(strip_pause_keep("pausing_keep sleep 250")), Some(250));
    assert_eq!(sleep_millis("sleepy 100"), None);
    assert_eq!(sleep_millis("sleep abc"), None);
  }

  #[test]
  fn test_seek_detection() {
    assert!(is_seek("seek 10 2"));
    assert!(is_seek(strip_pause_keep("pausing_keep seek 10 2")));
    assert!(is_seek(strip_pause_keep("pausing_keep_force seek 10 2")));
    assert!(!is_seek("get_time_pos"));
  }

  #[test]
  fn test_escape() {
    assert_eq!(escape(r#"sub_load "C:\movie.srt""#), r#"sub_load "C:\\movie.srt""#);
    assert_eq!(escape("pause"), "pause");
  }
}
