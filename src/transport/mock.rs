//! Mock transport for hardware-free testing
//!
//! Replies are scripted per write: each call to `write` delivers the next
//! queued reply into the read buffer, mimicking a request/response device.

use super::Transport;
use crate::error::Result;
use std::collections::VecDeque;

/// In-memory transport with scripted replies
pub struct MockTransport {
    /// Bytes the driver will read next (device -> host)
    rx: VecDeque<u8>,
    /// Everything the driver has written (host -> device)
    written: Vec<u8>,
    /// Replies delivered one per write call
    replies: VecDeque<Vec<u8>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            written: Vec::new(),
            replies: VecDeque::new(),
        }
    }

    /// Queue a reply to be delivered after the next unanswered write
    pub fn queue_reply(&mut self, bytes: &[u8]) {
        self.replies.push_back(bytes.to_vec());
    }

    /// Pre-load stale bytes into the read buffer (to exercise drain logic)
    pub fn queue_stale(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// All bytes written so far
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Take and clear the written bytes
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let n = buffer.len().min(self.rx.len());
        for b in buffer.iter_mut().take(n) {
            *b = self.rx.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.written.extend_from_slice(data);
        if let Some(reply) = self.replies.pop_front() {
            self.rx.extend(reply);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.rx.len())
    }
}
