//! High-level slave-mode controller for a single player session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use super::process;
use super::protocol;
use super::queue::{CommandQueue, Completion};
use super::streams;
use crate::config::PlayerConfig;

/// Receives every line the player writes to either output stream.
pub type LineConsumer = Arc<dyn Fn(&str) + Send + Sync>;

/// Delay between pause reconciliation attempts.
const PAUSE_RECONCILE_DELAY: Duration = Duration::from_millis(333);
/// Pause reconciliation attempt budget.
const PAUSE_RECONCILE_ATTEMPTS: u32 = 20;
/// Window a redraw pulse stays alive after the latest request.
const REDRAW_DELAY: Duration = Duration::from_millis(250);
/// Slack when deciding a redraw window has closed.
const REDRAW_TOLERANCE: Duration = Duration::from_millis(25);
/// A pending seek is considered settled this long after transmission even if
/// no position report ever reaches the target.
const SEEK_SETTLE_AFTER: Duration = Duration::from_millis(1000);
/// Reported positions within this many seconds past the target settle a seek.
const SEEK_TOLERANCE: f64 = 2.0;
/// Host-side delay padded in before unmuting a paused player.
const UNMUTE_SLEEP_MILLIS: u64 = 100;

#[derive(Debug, Error)]
pub enum MPlayerError {
  /// `open` was called on a controller that is already opening or has
  /// already run a session; controllers are one-shot.
  #[error("Player already opened")]
  AlreadyOpen,
}

/// Session lifecycle. One controller drives at most one player process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
  Idle,
  /// The process is being spawned; `stop_requested` defers a concurrent
  /// stop until the open sequence completes.
  Opening { stop_requested: bool },
  Running,
  Stopped,
}

/// In-flight seek with the optional superseded target to replay once it
/// settles. Last write wins: a newer request simply overwrites `next`.
#[derive(Debug, Clone, Copy)]
struct ActiveSeek {
  target: i64,
  next: Option<f64>,
}

#[derive(Debug)]
struct SeekState {
  active: Option<ActiveSeek>,
  /// Set by the writer just before a seek command hits the wire; `None`
  /// means no seek is awaiting position confirmation.
  send_time: Option<Instant>,
}

#[derive(Debug)]
struct RedrawState {
  active: bool,
  deadline: Instant,
  last_frame: Instant,
}

/// Where a subtitle track comes from; decides the selection command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleSource {
  Demux,
  File,
}

#[derive(Debug, Clone)]
pub struct SubtitleTrack {
  pub id: String,
  pub source: SubtitleSource,
}

/// All mutable controller state, guarded by one lock.
struct State {
  lifecycle: Lifecycle,
  /// Desired pause state.
  paused: bool,
  /// Last pause state derived from an `ID_PAUSED` transition, with the time
  /// it was observed. `None` until the first observation after a change.
  observed_paused: Option<(bool, Instant)>,
  /// Supersession token: bumped on every desired-pause change. A scheduled
  /// reconciliation check only acts while the epoch it captured is current.
  pause_epoch: u64,
  /// Milliseconds of `sleep` pseudo-commands queued or in flight; pads the
  /// reconciliation timers so host-side delays don't eat the retry budget.
  pending_sleeps: u64,
  mute_count: u32,
  seek: SeekState,
  redraw: RedrawState,
  activate_next_subtitle: bool,
  process: Option<tokio::process::Child>,
}

struct Inner {
  config: PlayerConfig,
  state: Mutex<State>,
  queue: CommandQueue,
  stop_done: Completion,
  /// Binary resolved during `open`, kept for the forced-kill fallback.
  binary: Mutex<Option<PathBuf>>,
}

/// Cloneable handle to one player session.
#[derive(Clone)]
pub struct MPlayerInstance {
  inner: Arc<Inner>,
}

impl MPlayerInstance {
  pub fn new(config: PlayerConfig) -> Self {
    let now = Instant::now();
    Self {
      inner: Arc::new(Inner {
        config,
        state: Mutex::new(State {
          lifecycle: Lifecycle::Idle,
          paused: false,
          observed_paused: None,
          pause_epoch: 0,
          pending_sleeps: 0,
          mute_count: 0,
          seek: SeekState {
            active: None,
            send_time: None,
          },
          redraw: RedrawState {
            active: false,
            deadline: now,
            last_frame: now,
          },
          activate_next_subtitle: false,
          process: None,
        }),
        queue: CommandQueue::new(),
        stop_done: Completion::new(),
        binary: Mutex::new(None),
      }),
    }
  }

  /// Spawn the player for `target` and start the stream workers.
  ///
  /// Fails only on invalid call sequencing. A launch failure is logged and
  /// the session still transitions to running (and can be stopped); the
  /// stop-completion latch is released up front in that case so a racing
  /// `stop` cannot block forever.
  pub async fn open(&self, target: &str, consumer: LineConsumer) -> Result<(), MPlayerError> {
    self.begin_open()?;

    let spawned = process::resolve_binary(&self.inner.config).and_then(|binary| {
      let args = process::playback_args(&self.inner.config, target);
      let spawned = process::spawn_player(&binary, &args)?;
      Ok((binary, spawned))
    });

    match spawned {
      Ok((binary, spawned)) => {
        *self.inner.binary.lock() = Some(binary);
        self.inner.state.lock().process = Some(spawned.child);
        self.attach_streams(spawned.stdout, spawned.stderr, spawned.stdin, consumer);
      }
      Err(e) => {
        log::error!("Failed to launch player: {}", e);
        self.inner.stop_done.release();
      }
    }

    self.finish_open().await;
    Ok(())
  }

  fn begin_open(&self) -> Result<(), MPlayerError> {
    let mut state = self.inner.state.lock();
    if state.lifecycle != Lifecycle::Idle {
      return Err(MPlayerError::AlreadyOpen);
    }
    state.lifecycle = Lifecycle::Opening {
      stop_requested: false,
    };
    Ok(())
  }

  /// Complete the open sequence, honoring a stop requested while opening.
  async fn finish_open(&self) {
    let deferred_stop = {
      let mut state = self.inner.state.lock();
      let deferred = matches!(
        state.lifecycle,
        Lifecycle::Opening {
          stop_requested: true
        }
      );
      state.lifecycle = Lifecycle::Running;
      deferred
    };
    if deferred_stop {
      self.stop().await;
    }
  }

  /// Wire the stream worker tasks. Generic so tests can attach in-memory
  /// pipes in place of the child's stdio.
  fn attach_streams<R1, R2, W>(&self, stdout: R1, stderr: R2, stdin: W, consumer: LineConsumer)
  where
    R1: AsyncRead + Unpin + Send + 'static,
    R2: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
  {
    tokio::spawn(streams::reader_loop(stdout, Some(self.clone()), consumer.clone()));
    tokio::spawn(streams::reader_loop(stderr, None, consumer));
    tokio::spawn(streams::writer_loop(stdin, self.clone()));
  }

  /// Stop the session: queue the graceful `stop` and `quit 0`, destroy the
  /// child, run the delayed platform force-kill, then wait for the writer to
  /// drain out and exit. Idempotent and callable from any task. Called while
  /// the open sequence is still running it only marks the stop as pending
  /// and returns without blocking.
  pub async fn stop(&self) {
    {
      let mut state = self.inner.state.lock();
      match state.lifecycle {
        Lifecycle::Opening { .. } => {
          state.lifecycle = Lifecycle::Opening {
            stop_requested: true,
          };
          return;
        }
        Lifecycle::Stopped => return,
        Lifecycle::Idle | Lifecycle::Running => {
          self.push_command(&state, protocol::STOP, true);
          self.push_command(&state, protocol::QUIT, true);
          state.lifecycle = Lifecycle::Stopped;
        }
      }
    }

    // Unmatched permit: the writer wakes onto the drained queue and exits.
    self.inner.queue.wake();

    let child = self.inner.state.lock().process.take();
    if let Some(mut child) = child {
      log::info!("Killing player process (pid {:?})", child.id());
      if let Err(e) = child.kill().await {
        log::warn!("Player kill failed: {}", e);
      }
    }

    if let Some(binary) = self.inner.binary.lock().clone() {
      process::kill_lingering(&binary, true).await;
    }

    self.inner.stop_done.wait().await;
    log::info!("Player session stopped");
  }

  /// Queue a command, wrapped `pausing_keep` unless `pause_keep` is false.
  /// Dropped silently once the session is stopped.
  fn push_command(&self, state: &State, cmd: &str, pause_keep: bool) {
    if state.lifecycle == Lifecycle::Stopped {
      log::debug!("Dropping command after stop: {}", cmd);
      return;
    }
    let entry = if pause_keep {
      format!("{} {}", protocol::PAUSE_KEEP, cmd)
    } else {
      cmd.to_string()
    };
    self.inner.queue.push(entry);
  }

  fn send_command(&self, cmd: &str) {
    let state = self.inner.state.lock();
    self.push_command(&state, cmd, true);
  }

  /// Request pause. Returns whether a state transition was actually started.
  pub fn pause(&self) -> bool {
    self.set_paused(true)
  }

  /// Request resume. Returns whether a state transition was actually started.
  pub fn resume(&self) -> bool {
    self.set_paused(false)
  }

  fn set_paused(&self, paused: bool) -> bool {
    let epoch = {
      let mut state = self.inner.state.lock();
      if state.paused == paused {
        return false;
      }
      state.paused = paused;
      state.observed_paused = None;
      state.pause_epoch += 1;
      self.push_command(&state, protocol::PAUSE, false);
      state.pause_epoch
    };
    self.schedule_pause_reconcile(epoch);
    true
  }

  /// Keep resending the pause toggle until the player's self-reported state
  /// matches the desired one. The player's state echo is unreliable and
  /// delayed, so the toggle is re-asserted rather than trusted to have
  /// landed, bounded by an attempt budget and superseded by any newer
  /// desired-state change.
  fn schedule_pause_reconcile(&self, epoch: u64) {
    let this = self.clone();
    tokio::spawn(async move {
      let mut attempts = 0u32;
      loop {
        let delay = {
          let state = this.inner.state.lock();
          PAUSE_RECONCILE_DELAY + Duration::from_millis(state.pending_sleeps)
        };
        tokio::time::sleep(delay).await;

        let state = this.inner.state.lock();
        if state.lifecycle == Lifecycle::Stopped
          || state.pause_epoch != epoch
          || attempts >= PAUSE_RECONCILE_ATTEMPTS
        {
          return;
        }
        attempts += 1;
        if let Some((observed, _)) = state.observed_paused {
          if observed == state.paused {
            return;
          }
        }
        this.push_command(&state, protocol::PAUSE, false);
      }
    });
  }

  /// Seek to an absolute position in seconds. Requests made while a seek is
  /// in flight are coalesced: only the most recent one is replayed once the
  /// in-flight seek settles.
  pub fn seek(&self, seconds: f64) {
    let mut state = self.inner.state.lock();
    self.seek_locked(&mut state, seconds);
  }

  fn seek_locked(&self, state: &mut State, seconds: f64) {
    if let Some(active) = state.seek.active.as_mut() {
      active.next = Some(seconds);
      return;
    }
    let target = seconds as i64;
    state.seek.active = Some(ActiveSeek { target, next: None });
    state.seek.send_time = None;
    self.push_command(state, &protocol::seek_absolute(target), true);
    self.push_command(state, protocol::GET_TIME_POS, true);
  }

  /// Feed in a position report. Called for every report, not only after a
  /// seek. The in-flight seek settles once the target is reached within
  /// tolerance, or once the report is old enough that the seek must have
  /// landed however imprecisely.
  pub fn report_position(&self, seconds: f64) {
    let now = Instant::now();
    let mut state = self.inner.state.lock();
    let Some(sent) = state.seek.send_time else {
      return;
    };
    let Some(active) = state.seek.active else {
      return;
    };
    let reached =
      seconds >= active.target as f64 && seconds - active.target as f64 <= SEEK_TOLERANCE;
    if reached || now.duration_since(sent) > SEEK_SETTLE_AFTER {
      self.seek_settled_locked(&mut state);
    }
  }

  /// Mark the in-flight seek as settled, replaying a superseded target.
  pub fn seek_settled(&self) {
    let mut state = self.inner.state.lock();
    self.seek_settled_locked(&mut state);
  }

  fn seek_settled_locked(&self, state: &mut State) {
    let Some(active) = state.seek.active.take() else {
      return;
    };
    state.seek.send_time = None;
    if let Some(next) = active.next {
      self.seek_locked(state, next);
    }
  }

  pub fn set_volume(&self, level: u32) {
    self.send_command(&protocol::volume(level));
  }

  /// Mute is reference counted so overlapping users (the redraw pulse among
  /// them) share one mute window. Unmuting while paused first cancels any
  /// superseded seek and pads in a short host-side sleep; unmuting right
  /// after a pause otherwise produces an audible glitch.
  pub fn mute(&self, on: bool) {
    let mut state = self.inner.state.lock();
    self.mute_locked(&mut state, on);
  }

  fn mute_locked(&self, state: &mut State, on: bool) {
    if on {
      state.mute_count += 1;
      if state.mute_count == 1 {
        self.push_command(state, &protocol::mute(true), true);
      }
      return;
    }
    if state.mute_count == 0 {
      log::warn!("Unbalanced unmute dropped");
      return;
    }
    state.mute_count -= 1;
    if state.mute_count == 0 {
      if state.paused {
        // A superseded seek actioned now would cause audio crap; assume it
        // is no longer wanted.
        if let Some(active) = state.seek.active.as_mut() {
          active.next = None;
        }
        state.pending_sleeps += UNMUTE_SLEEP_MILLIS;
        self.push_command(state, &protocol::sleep(UNMUTE_SLEEP_MILLIS), true);
      }
      self.push_command(state, &protocol::mute(false), true);
    }
  }

  /// Force a single-frame redraw, muted for its duration. Overlapping calls
  /// extend one mute window instead of stacking mute/unmute pairs, and a
  /// running pulse only resends `frame_step` when the previous one is stale.
  pub fn redraw(&self) {
    let now = Instant::now();
    let mut state = self.inner.state.lock();
    state.redraw.deadline = now + REDRAW_DELAY;

    if state.redraw.active {
      if now.duration_since(state.redraw.last_frame) > REDRAW_DELAY {
        state.redraw.last_frame = now;
        self.push_command(&state, protocol::FRAME_STEP, false);
      }
      return;
    }

    self.mute_locked(&mut state, true);
    state.redraw.last_frame = now;
    self.push_command(&state, protocol::FRAME_STEP, false);
    state.redraw.active = true;
    drop(state);
    self.schedule_redraw_check();
  }

  /// Self-rescheduling completion check: unmutes and clears the redraw flag
  /// once the (possibly extended) deadline has passed, within tolerance.
  fn schedule_redraw_check(&self) {
    let this = self.clone();
    tokio::spawn(async move {
      let mut wait = REDRAW_DELAY;
      loop {
        tokio::time::sleep(wait).await;
        let mut state = this.inner.state.lock();
        let remaining = state.redraw.deadline.saturating_duration_since(Instant::now());
        if remaining <= REDRAW_TOLERANCE {
          state.redraw.active = false;
          this.mute_locked(&mut state, false);
          return;
        }
        wait = remaining;
      }
    });
  }

  pub fn set_audio_track(&self, track_id: &str) {
    self.send_command(&protocol::switch_audio(track_id));
  }

  /// Select a subtitle track, or hide subtitles entirely with `None`.
  /// Returns the id that was selected.
  pub fn set_subtitles(&self, track: Option<&SubtitleTrack>) -> Option<String> {
    let state = self.inner.state.lock();
    let Some(track) = track else {
      self.push_command(&state, &protocol::sub_visibility(false), true);
      return None;
    };
    self.push_command(&state, &protocol::sub_visibility(true), true);
    let cmd = match track.source {
      SubtitleSource::Demux => protocol::sub_demux(&track.id),
      SubtitleSource::File => protocol::sub_file(&track.id),
    };
    self.push_command(&state, &cmd, true);
    Some(track.id.clone())
  }

  /// Load an external subtitle file; `auto_activate` asks the embedder to
  /// select it once the player reports it loaded.
  pub fn load_subtitle_file(&self, path: &str, auto_activate: bool) {
    let mut state = self.inner.state.lock();
    state.activate_next_subtitle = auto_activate;
    self.push_command(&state, &protocol::sub_load(path), true);
  }

  /// Whether the most recently loaded subtitle file asked to be activated.
  /// Clears the flag.
  pub fn take_activate_next_subtitle(&self) -> bool {
    let mut state = self.inner.state.lock();
    std::mem::take(&mut state.activate_next_subtitle)
  }

  /// Query the identification property set once the player reports the media
  /// as loaded (length, tracks, geometry, volume).
  pub fn request_media_info(&self) {
    let state = self.inner.state.lock();
    for name in ["LENGTH", "SUB", "ASPECT", "WIDTH", "HEIGHT", "VOLUME"] {
      self.push_command(&state, &protocol::get_property(name), true);
    }
  }

  /// Record the pause state the player just reported on stdout.
  pub(crate) fn update_observed_paused(&self, paused: bool) {
    let mut state = self.inner.state.lock();
    state.observed_paused = Some((paused, Instant::now()));
  }

  /// Writer hook: a seek command is about to hit the wire.
  pub(crate) fn note_seek_sent(&self) {
    self.inner.state.lock().seek.send_time = Some(Instant::now());
  }

  /// Writer hook: a host-side sleep of `millis` just completed.
  pub(crate) fn note_sleep_done(&self, millis: u64) {
    let mut state = self.inner.state.lock();
    state.pending_sleeps = state.pending_sleeps.saturating_sub(millis);
  }

  pub(crate) async fn next_command(&self) -> Option<String> {
    self.inner.queue.pop().await
  }

  pub(crate) fn release_stop_completion(&self) {
    self.inner.stop_done.release();
  }

  #[cfg(test)]
  fn is_seeking(&self) -> bool {
    self.inner.state.lock().seek.active.is_some()
  }

  #[cfg(test)]
  fn mute_count(&self) -> u32 {
    self.inner.state.lock().mute_count
  }

  #[cfg(test)]
  fn pending_sleeps(&self) -> u64 {
    self.inner.state.lock().pending_sleeps
  }

  #[cfg(test)]
  fn observed_paused(&self) -> Option<bool> {
    self.inner.state.lock().observed_paused.map(|(v, _)| v)
  }

  #[cfg(test)]
  fn queued(&self) -> usize {
    self.inner.queue.len()
  }
}
