use std::fmt;

use parking_lot::{Condvar, Mutex};

/// A thread-safe LIFO stack of pending tasks.
///
/// The most recently pushed item is popped first; older items may wait
/// indefinitely under sustained load. Besides the non-blocking operations the
/// dispatcher uses [`TaskQueue::pop_blocking`], which parks until an item is
/// pushed or the queue is closed.
pub struct TaskQueue<T> {
  inner: Mutex<QueueInner<T>>,
  available: Condvar,
}

struct QueueInner<T> {
  items: Vec<T>,
  closed: bool,
}

impl<T> TaskQueue<T> {
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(QueueInner {
        items: Vec::new(),
        closed: false,
      }),
      available: Condvar::new(),
    }
  }

  pub fn push(&self, item: T) {
    let mut inner = self.inner.lock();
    inner.items.push(item);
    drop(inner);
    self.available.notify_one();
  }

  pub fn pop(&self) -> Option<T> {
    self.inner.lock().items.pop()
  }

  /// Removes every pending item, most recent first.
  pub fn pop_all(&self) -> Vec<T> {
    let mut items = std::mem::take(&mut self.inner.lock().items);
    items.reverse();
    items
  }

  pub fn len(&self) -> usize {
    self.inner.lock().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Waits for the next item. Returns `None` once the queue is closed, even
  /// if items are still pending.
  pub fn pop_blocking(&self) -> Option<T> {
    let mut inner = self.inner.lock();
    loop {
      if inner.closed {
        return None;
      }
      if let Some(item) = inner.items.pop() {
        return Some(item);
      }
      self.available.wait(&mut inner);
    }
  }

  /// Wakes every blocked [`TaskQueue::pop_blocking`] call. Idempotent.
  pub fn close(&self) {
    self.inner.lock().closed = true;
    self.available.notify_all();
  }
}

impl<T> Default for TaskQueue<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for TaskQueue<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock();
    f.debug_struct("TaskQueue")
      .field("len", &inner.items.len())
      .field("closed", &inner.closed)
      .finish()
  }
}
