use crate::Result;
use tokio::sync::oneshot;

/// A message in a group's mailbox.
#[derive(Debug)]
pub enum GroupRequest {
    /// Wants a fresh number for the mailbox's group.
    Allocate {
        response: oneshot::Sender<Result<u64>>,
    },
    /// Gives `number` back. Completes with the same number on success.
    Rollback {
        number: u64,
        response: oneshot::Sender<Result<u64>>,
    },
    /// Asks the worker to finish what it has queued and stop.
    Shutdown { response: oneshot::Sender<()> },
}

impl GroupRequest {
    pub fn allocate() -> (Self, oneshot::Receiver<Result<u64>>) {
        let (response, rx) = oneshot::channel();
        (Self::Allocate { response }, rx)
    }

    pub fn rollback(number: u64) -> (Self, oneshot::Receiver<Result<u64>>) {
        let (response, rx) = oneshot::channel();
        (Self::Rollback { number, response }, rx)
    }
}
