//! Worker loops over the player's standard streams.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::instance::{LineConsumer, MPlayerInstance};
use super::protocol;

/// Drain the command queue in strict FIFO order into the player's stdin.
///
/// `sleep` pseudo-commands block this task for the requested duration (and
/// are still forwarded verbatim afterwards); `seek` commands, wrapped or
/// not, record their send timestamp just before hitting the wire. Exits when
/// woken onto an empty queue (shutdown) or on a write error, releasing the
/// stop-completion latch either way so a waiting `stop()` is never stranded.
pub(crate) async fn writer_loop<W>(mut stdin: W, instance: MPlayerInstance)
where
  W: AsyncWrite + Unpin,
{
  log::debug!("player command writer started");
  loop {
    let Some(cmd) = instance.next_command().await else {
      log::debug!("command queue drained, writer exiting");
      break;
    };

    let bare = protocol::strip_pause_keep(&cmd);
    if let Some(millis) = protocol::sleep_millis(bare) {
      tokio::time::sleep(Duration::from_millis(millis)).await;
      instance.note_sleep_done(millis);
    } else if protocol::is_seek(bare) {
      instance.note_seek_sent();
    }

    let line = format!("{}\n", protocol::escape(&cmd));
    if let Err(e) = stdin.write_all(line.as_bytes()).await {
      log::error!("player stdin write failed: {}", e);
      break;
    }
    if let Err(e) = stdin.flush().await {
      log::error!("player stdin flush failed: {}", e);
      break;
    }
  }
  instance.release_stop_completion();
}

/// Forward newline-delimited player output to the consumer.
///
/// When `classify` carries a controller, `ID_PAUSED` transitions are fed back
/// into its observed pause state (the stdout reader; stderr passes `None`).
/// Terminates silently on EOF or read error; a dead reader degrades that one
/// stream only, the rest of the controller keeps running.
pub(crate) async fn reader_loop<R>(stream: R, classify: Option<MPlayerInstance>, consumer: LineConsumer)
where
  R: AsyncRead + Unpin,
{
  let mut reader = BufReader::new(stream);
  let mut line = String::new();
  let mut last_paused = false;
  loop {
    line.clear();
    match reader.read_line(&mut line).await {
      Ok(0) => break,
      Ok(_) => {
        let text = line.trim_end_matches(|c| c == '\r' || c == '\n');
        if let Some(instance) = &classify {
          let is_paused = text.starts_with(protocol::ID_PAUSED);
          if is_paused != last_paused {
            instance.update_observed_paused(is_paused);
            last_paused = is_paused;
          }
        }
        consumer(text);
      }
      Err(e) => {
        log::debug!("player output read error: {}", e);
        break;
      }
    }
  }
  log::debug!("player output reader exiting");
}
