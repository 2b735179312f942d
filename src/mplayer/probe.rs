//! One-shot metadata probe.
//!
//! Spawns the player against null outputs with a zero frame limit purely to
//! harvest its `-identify` output. No command queue, no playback state, just
//! a bounded read of stdout.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::instance::LineConsumer;
use super::process::{self, ProcessError};
use super::protocol;
use crate::config::PlayerConfig;

/// Hard cap on how long the probe may run.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Harvest identification lines for `target`, forwarding every stdout line
/// to `consumer` until the exit marker appears or the timeout elapses.
pub async fn probe_media(
  config: &PlayerConfig,
  target: &str,
  consumer: LineConsumer,
) -> Result<(), ProcessError> {
  let binary = process::resolve_binary(config)?;
  let args = process::probe_args(target);
  let (mut child, stdout) = process::spawn_probe(&binary, &args)?;

  if tokio::time::timeout(PROBE_TIMEOUT, forward_lines(stdout, consumer))
    .await
    .is_err()
  {
    log::debug!("Media probe timed out for {}", target);
  }

  // -frames 0 exits on its own; this only covers a wedged player.
  if let Err(e) = child.start_kill() {
    log::debug!("Probe cleanup kill: {}", e);
  }
  let _ = child.wait().await;
  Ok(())
}

async fn forward_lines<R>(stdout: R, consumer: LineConsumer)
where
  R: AsyncRead + Unpin,
{
  let mut reader = BufReader::new(stdout);
  let mut line = String::new();
  loop {
    line.clear();
    match reader.read_line(&mut line).await {
      Ok(0) => break,
      Ok(_) => {
        let text = line.trim_end_matches(|c| c == '\r' || c == '\n');
        if text.starts_with(protocol::ID_EXIT) {
          break;
        }
        consumer(text);
      }
      Err(e) => {
        log::debug!("Probe read error: {}", e);
        break;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use parking_lot::Mutex;
  use std::sync::Arc;

  #[tokio::test]
  async fn forwarding_stops_at_the_exit_marker() {
    let output = b"ID_FILENAME=movie.avi\nID_LENGTH=4414.00\nID_EXIT=EOF\nID_LATE=1\n";
    let consumed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = consumed.clone();
    let consumer: LineConsumer = Arc::new(move |line: &str| sink.lock().push(line.to_string()));

    forward_lines(&output[..], consumer).await;
    assert_eq!(*consumed.lock(), vec!["ID_FILENAME=movie.avi", "ID_LENGTH=4414.00"]);
  }
}
