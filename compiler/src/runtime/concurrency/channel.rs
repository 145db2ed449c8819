//! Bounded and unbounded FIFO channels with explicit close semantics.
//!
//! Closing a channel fails pending and future sends; receivers drain
//! whatever is buffered and then fail. Ordering is FIFO per channel; no
//! cross-channel ordering is promised.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::RuntimeError;

struct ChannelState<T> {
    queue: VecDeque<T>,
    capacity: Option<usize>,
    closed: bool,
}

impl<T> ChannelState<T> {
    fn is_full(&self) -> bool {
        match self.capacity {
            Some(capacity) => self.queue.len() >= capacity,
            None => false,
        }
    }
}

pub struct Channel<T> {
    state: Mutex<ChannelState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> Channel<T> {
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(ChannelState {
                queue: VecDeque::new(),
                capacity,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Blocking send. Fails once the channel is closed, including sends
    /// that were already waiting for space.
    pub fn send(&self, value: T) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        while state.is_full() && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(RuntimeError::ChannelClosed);
        }
        state.queue.push_back(value);
        self.not_empty.notify_one();
        Ok(())
    }

    pub fn try_send(&self, value: T) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(RuntimeError::ChannelClosed);
        }
        if state.is_full() {
            return Err(RuntimeError::ChannelFull);
        }
        state.queue.push_back(value);
        self.not_empty.notify_one();
        Ok(())
    }

    pub fn send_timeout(&self, value: T, timeout: Duration) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.is_full() && !state.closed {
            if self.not_full.wait_until(&mut state, deadline).timed_out() {
                return Err(RuntimeError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
        if state.closed {
            return Err(RuntimeError::ChannelClosed);
        }
        state.queue.push_back(value);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocking receive. Buffered values drain even after close; an
    /// empty closed channel fails.
    pub fn recv(&self) -> Result<T, RuntimeError> {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                self.not_full.notify_one();
                return Ok(value);
            }
            if state.closed {
                return Err(RuntimeError::ChannelClosed);
            }
            self.not_empty.wait(&mut state);
        }
    }

    pub fn try_recv(&self) -> Result<T, RuntimeError> {
        let mut state = self.state.lock();
        if let Some(value) = state.queue.pop_front() {
            self.not_full.notify_one();
            return Ok(value);
        }
        if state.closed {
            Err(RuntimeError::ChannelClosed)
        } else {
            Err(RuntimeError::ChannelEmpty)
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RuntimeError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                self.not_full.notify_one();
                return Ok(value);
            }
            if state.closed {
                return Err(RuntimeError::ChannelClosed);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return Err(RuntimeError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
    }

    /// Close the channel: pending sends fail, receivers drain then fail.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }
}
