//! Middleware pipeline
//!
//! Provides extensibility points around every broker command. Each of the
//! five commands carries an ordered interceptor chain; an interceptor may
//! observe or rewrite the frame, and returning [`Flow::Halt`] stops the
//! chain so the terminal handler never runs (the command is dropped
//! silently and the session stays open).

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::protocol::{Command, Frame, COMMAND_COUNT};
use crate::session::Session;

/// Chain continuation decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Proceed to the next interceptor (or the terminal handler)
    Continue,
    /// Stop: remaining interceptors and the terminal handler are skipped
    Halt,
}

/// A command interceptor
///
/// Implementations receive the issuing session and a mutable view of the
/// frame, so they can rewrite headers or the body before the terminal
/// handler sees them.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, session: &Arc<Session>, frame: &mut Frame) -> Flow;
}

/// Per-command interceptor chains
///
/// Registration is interior-mutable so interceptors can be added and removed
/// while the broker is running; dispatch snapshots the chain and never holds
/// the lock across an interceptor call.
pub struct Pipeline {
    chains: [RwLock<Vec<Arc<dyn Interceptor>>>; COMMAND_COUNT],
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            chains: std::array::from_fn(|_| RwLock::new(Vec::new())),
        }
    }

    fn chain(&self, command: Command) -> &RwLock<Vec<Arc<dyn Interceptor>>> {
        &self.chains[command.index()]
    }

    /// Append an interceptor to a command's chain.
    pub fn add(&self, command: Command, interceptor: Arc<dyn Interceptor>) {
        self.chain(command).write().push(interceptor);
    }

    /// Replace a command's chain with the single given interceptor.
    pub fn set(&self, command: Command, interceptor: Arc<dyn Interceptor>) {
        let mut chain = self.chain(command).write();
        chain.clear();
        chain.push(interceptor);
    }

    /// Remove the first chain entry that is the same interceptor instance.
    /// Returns whether one was removed.
    pub fn remove(&self, command: Command, interceptor: &Arc<dyn Interceptor>) -> bool {
        let mut chain = self.chain(command).write();
        match chain.iter().position(|i| Arc::ptr_eq(i, interceptor)) {
            Some(idx) => {
                chain.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self, command: Command) -> usize {
        self.chain(command).read().len()
    }

    pub fn is_empty(&self, command: Command) -> bool {
        self.chain(command).read().is_empty()
    }

    /// Run a command's chain in registration order.
    pub async fn dispatch(
        &self,
        command: Command,
        session: &Arc<Session>,
        frame: &mut Frame,
    ) -> Flow {
        let chain: Vec<Arc<dyn Interceptor>> = self.chain(command).read().clone();
        for interceptor in chain {
            if interceptor.intercept(session, frame).await == Flow::Halt {
                return Flow::Halt;
            }
        }
        Flow::Continue
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
