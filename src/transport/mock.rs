//! In-memory transport for tests and embedding experiments

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{Transport, TransportError};

/// A [`Transport`] that records every payload written to it.
pub struct MockTransport {
    sent: Mutex<Vec<Bytes>>,
    open: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        }
    }

    /// Everything written so far, in order.
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Drain and return everything written so far.
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut self.sent.lock())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(payload);
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
