//! MPlayer binary detection, argument construction and process spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::config::PlayerConfig;

/// Grace period between the graceful `quit 0` and the forced kill.
const KILL_GRACE: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPlayer executable not found")]
  NotFound,
  #[error("Failed to spawn MPlayer: {0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("MPlayer spawned without piped standard streams")]
  MissingStreams,
}

/// Find the MPlayer executable in PATH or common locations.
pub fn find_mplayer() -> Option<PathBuf> {
  // Check PATH first
  if let Ok(path) = which::which("mplayer") {
    return Some(path);
  }

  // Platform-specific common locations
  #[cfg(windows)]
  {
    let common_paths = [
      r"C:\Program Files\MPlayer\mplayer.exe",
      r"C:\Program Files (x86)\MPlayer\mplayer.exe",
      r"C:\MPlayer\mplayer.exe",
    ];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "macos")]
  {
    let common_paths = [
      "/usr/local/bin/mplayer",
      "/opt/homebrew/bin/mplayer",
      "/opt/local/bin/mplayer",
    ];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "linux")]
  {
    let common_paths = ["/usr/bin/mplayer", "/usr/local/bin/mplayer"];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  None
}

/// Resolve the binary from configuration or auto-detection.
pub(crate) fn resolve_binary(config: &PlayerConfig) -> Result<PathBuf, ProcessError> {
  config
    .binary_path
    .clone()
    .or_else(find_mplayer)
    .ok_or(ProcessError::NotFound)
}

/// Platform-independent slave-mode base arguments.
fn base_args() -> Vec<String> {
  [
    "-slave",
    "-identify",
    "-prefer-ipv4",
    "-osdlevel",
    "0",
    "-noautosub",
  ]
  .map(String::from)
  .to_vec()
}

/// Argument vector for a playback session: base set, then the caller's
/// platform arguments, then the target.
pub(crate) fn playback_args(config: &PlayerConfig, target: &str) -> Vec<String> {
  let mut args = base_args();
  args.extend(config.extra_args.iter().cloned());
  args.push(target.to_string());
  args
}

/// Argument vector for a metadata probe: null outputs, zero frame limit.
pub(crate) fn probe_args(target: &str) -> Vec<String> {
  let mut args = base_args();
  args.extend(["-vo", "null", "-ao", "null", "-frames", "0"].map(String::from));
  args.push(target.to_string());
  args
}

/// A spawned player with its three stream endpoints taken out of the child.
pub(crate) struct SpawnedPlayer {
  pub child: Child,
  pub stdin: ChildStdin,
  pub stdout: ChildStdout,
  pub stderr: ChildStderr,
}

/// Spawn the player with all three standard streams piped.
pub(crate) fn spawn_player(binary: &Path, args: &[String]) -> Result<SpawnedPlayer, ProcessError> {
  log::info!("Spawning player: {:?} {}", binary, args.join(" "));

  let mut child = Command::new(binary)
    .args(args)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()?;

  let stdin = child.stdin.take().ok_or(ProcessError::MissingStreams)?;
  let stdout = child.stdout.take().ok_or(ProcessError::MissingStreams)?;
  let stderr = child.stderr.take().ok_or(ProcessError::MissingStreams)?;

  Ok(SpawnedPlayer {
    child,
    stdin,
    stdout,
    stderr,
  })
}

/// Spawn the short-lived probe variant; only stdout is read.
pub(crate) fn spawn_probe(binary: &Path, args: &[String]) -> Result<(Child, ChildStdout), ProcessError> {
  log::debug!("Spawning probe: {:?} {}", binary, args.join(" "));

  let mut child = Command::new(binary)
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true)
    .spawn()?;

  let stdout = child.stdout.take().ok_or(ProcessError::MissingStreams)?;
  Ok((child, stdout))
}

/// Force-kill any like-named player processes left behind. OS-level fallback
/// for the graceful quit; failures are logged, never propagated. With
/// `grace_delay` the kill is postponed briefly so a queued `quit 0` can land
/// first.
pub async fn kill_lingering(binary: &Path, grace_delay: bool) {
  if grace_delay {
    tokio::time::sleep(KILL_GRACE).await;
  }
  force_kill(binary).await;
}

#[cfg(target_os = "macos")]
async fn force_kill(binary: &Path) {
  let Some(name) = binary.file_name().and_then(|n| n.to_str()) else {
    return;
  };
  let killall = which::which("killall").unwrap_or_else(|_| PathBuf::from("killall"));
  match Command::new(killall).arg("-9").arg(name).status().await {
    Ok(status) => log::debug!("killall -9 {} exited with {}", name, status),
    Err(e) => log::warn!("killall -9 {} failed: {}", name, e),
  }
}

#[cfg(windows)]
async fn force_kill(binary: &Path) {
  // tskill matches on the image name without extension.
  let Some(name) = binary.file_stem().and_then(|n| n.to_str()) else {
    return;
  };
  match Command::new("cmd").args(["/C", "tskill", name]).status().await {
    Ok(status) => log::debug!("tskill {} exited with {}", name, status),
    Err(e) => log::warn!("tskill {} failed: {}", name, e),
  }
}

#[cfg(not(any(target_os = "macos", windows)))]
async fn force_kill(_binary: &Path) {
  // Graceful quit plus the direct child kill suffice here.
}
