//! In-process session transport.
//!
//! A [`MemoryNetwork`] routes session requests by party key. Each session
//! is a pair of unbounded mpsc channels, so messages on one session arrive
//! in order and sessions never interleave.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use insure_crypto::PublicKey;
use tokio::sync::{mpsc, Mutex};

use crate::capability::{Session, SessionTransport};
use crate::error::FlowError;

#[derive(Debug)]
pub struct MemorySession {
    peer: PublicKey,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemorySession {
    /// Two connected ends: the first is held by `a` (peer `b`), the second by `b`.
    pub fn pair(a: PublicKey, b: PublicKey) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                peer: b,
                tx: a_tx,
                rx: a_rx,
            },
            Self {
                peer: a,
                tx: b_tx,
                rx: b_rx,
            },
        )
    }
}

#[async_trait]
impl Session for MemorySession {
    fn counterparty(&self) -> PublicKey {
        self.peer
    }

    async fn send(&mut self, bytes: Vec<u8>) -> Result<(), FlowError> {
        self.tx
            .send(bytes)
            .map_err(|_| FlowError::Transport(format!("session to {} closed", self.peer.short())))
    }

    async fn receive(&mut self) -> Result<Vec<u8>, FlowError> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| FlowError::Transport(format!("session from {} closed", self.peer.short())))
    }
}

/// Registry of listening parties.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    listeners: Arc<DashMap<PublicKey, mpsc::UnboundedSender<MemorySession>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `me` to the network. A later join with the same key replaces
    /// the earlier listener.
    pub fn join(&self, me: PublicKey) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.insert(me, tx);
        MemoryTransport {
            me,
            network: self.clone(),
            incoming: Mutex::new(rx),
        }
    }

    pub fn leave(&self, key: &PublicKey) {
        self.listeners.remove(key);
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    me: PublicKey,
    network: MemoryNetwork,
    incoming: Mutex<mpsc::UnboundedReceiver<MemorySession>>,
}

impl MemoryTransport {
    pub fn local_key(&self) -> PublicKey {
        self.me
    }
}

#[async_trait]
impl SessionTransport for MemoryTransport {
    async fn open(&self, counterparty: &PublicKey) -> Result<Box<dyn Session>, FlowError> {
        let listener = self
            .network
            .listeners
            .get(counterparty)
            .map(|l| l.clone())
            .ok_or_else(|| FlowError::Transport(format!("no route to {}", counterparty.short())))?;
        let (ours, theirs) = MemorySession::pair(self.me, *counterparty);
        listener
            .send(theirs)
            .map_err(|_| FlowError::Transport(format!("{} is not accepting sessions", counterparty.short())))?;
        Ok(Box::new(ours))
    }

    async fn accept(&self) -> Option<Box<dyn Session>> {
        let session = self.incoming.lock().await.recv().await?;
        Some(Box::new(session))
    }
}
