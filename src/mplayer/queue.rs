//! Command queue and stop-completion latch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

/// FIFO queue of pending slave-mode command strings.
///
/// The wake signal is a counting semaphore deliberately decoupled from the
/// entry count: [`CommandQueue::wake`] grants a permit without pushing, so
/// the drainer can be woken onto an empty queue. An empty pop is the
/// drainer's exit condition during shutdown.
pub(crate) struct CommandQueue {
  entries: Mutex<VecDeque<String>>,
  signal: Semaphore,
}

impl CommandQueue {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(VecDeque::new()),
      signal: Semaphore::new(0),
    }
  }

  /// Append a command and grant the drainer one permit.
  pub fn push(&self, cmd: String) {
    self.entries.lock().push_back(cmd);
    self.signal.add_permits(1);
  }

  /// Grant a permit without pushing anything.
  pub fn wake(&self) {
    self.signal.add_permits(1);
  }

  /// Wait for a permit, then pop the head entry. `None` means the queue was
  /// empty when the permit arrived.
  pub async fn pop(&self) -> Option<String> {
    match self.signal.acquire().await {
      Ok(permit) => permit.forget(),
      // The semaphore is never closed explicitly; treat it as a drain signal.
      Err(_) => return None,
    }
    self.entries.lock().pop_front()
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }
}

/// One-shot "released forever" latch: once released, every current and
/// future wait returns immediately.
pub(crate) struct Completion {
  released: AtomicBool,
  notify: Notify,
}

impl Completion {
  pub fn new() -> Self {
    Self {
      released: AtomicBool::new(false),
      notify: Notify::new(),
    }
  }

  pub fn release(&self) {
    self.released.store(true, Ordering::Release);
    self.notify.notify_waiters();
  }

  pub async fn wait(&self) {
    while !self.released.load(Ordering::Acquire) {
      let notified = self.notify.notified();
      // Re-check after registering so a release between the load and the
      // registration is not missed.
      if self.released.load(Ordering::Acquire) {
        break;
      }
      notified.await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::time::Duration;

  #[tokio::test]
  async fn pops_in_fifo_order() {
    let queue = CommandQueue::new();
    queue.push("first".to_string());
    queue.push("second".to_string());
    queue.push("third".to_string());
    assert_eq!(queue.pop().await.as_deref(), Some("first"));
    assert_eq!(queue.pop().await.as_deref(), Some("second"));
    assert_eq!(queue.pop().await.as_deref(), Some("third"));
  }

  #[tokio::test]
  async fn wake_without_push_pops_none() {
    let queue = CommandQueue::new();
    queue.push("only".to_string());
    queue.wake();
    assert_eq!(queue.pop().await.as_deref(), Some("only"));
    assert_eq!(queue.pop().await, None);
    assert_eq!(queue.len(), 0);
  }

  #[tokio::test]
  async fn completion_release_unblocks_waiters() {
    let latch = Arc::new(Completion::new());

    // Released before waiting: returns immediately.
    latch.release();
    latch.wait().await;

    let latch = Arc::new(Completion::new());
    let waiter = {
      let latch = latch.clone();
      tokio::spawn(async move { latch.wait().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    latch.release();
    tokio::time::timeout(Duration::from_secs(1), waiter)
      .await
      .expect("waiter should be released")
      .expect("waiter task panicked");

    // Still released for later waiters.
    latch.wait().await;
  }
}
