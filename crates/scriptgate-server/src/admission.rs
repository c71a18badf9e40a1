//! Bounded admission of inbound connections.
//!
//! A connection needs a [`Slot`] before it is accepted. Slots are counted by a
//! semaphore sized to `max_connections`; the slot travels with the connection
//! through the queue and into its serving worker, and is released when the
//! connection is dropped. While every slot is taken the accept loop waits in
//! [`ConnectionQueue::reserve`], so new connections stay in the kernel's
//! backlog instead of being accepted.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex, OwnedSemaphorePermit, Semaphore};

use scriptgate_common::protocol::error::{Result, ScriptgateError};

/// Permission for one connection to be queued and served.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

/// A connection that holds a slot.
#[derive(Debug)]
pub struct Admitted<T> {
    conn: T,
    peer: SocketAddr,
    slot: Slot,
}

impl<T> Admitted<T> {
    /// Splits into the connection, its peer and its slot. Keep the slot
    /// alive for as long as the connection is being served.
    pub fn into_parts(self) -> (T, SocketAddr, Slot) {
        (self.conn, self.peer, self.slot)
    }
}

/// FIFO queue of admitted, not-yet-served connections.
pub struct ConnectionQueue<T> {
    slots: Arc<Semaphore>,
    tx: mpsc::Sender<Admitted<T>>,
    rx: Mutex<mpsc::Receiver<Admitted<T>>>,
    shutdown: watch::Sender<bool>,
}

impl<T> ConnectionQueue<T> {
    /// Creates a queue admitting at most `capacity` connections at a time.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "connection queue capacity must be at least 1");
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown, _) = watch::channel(false);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            tx,
            rx: Mutex::new(rx),
            shutdown,
        }
    }

    /// Slots free for new connections.
    ///
    /// While the accept loop is waiting in `accept` it already holds one
    /// slot, so an idle agent reports one less than its capacity.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Waits for a free slot. Returns `None` once the queue is closed.
    pub async fn reserve(&self) -> Option<Slot> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .ok()
            .map(|permit| Slot { _permit: permit })
    }

    /// Appends a connection. Never waits: each slot has room in the queue.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptgateError::QueueClosed`] after [`close`](Self::close);
    /// the connection is dropped.
    pub async fn push(&self, conn: T, peer: SocketAddr, slot: Slot) -> Result<()> {
        if self.is_closed() {
            return Err(ScriptgateError::QueueClosed);
        }
        self.tx
            .send(Admitted { conn, peer, slot })
            .await
            .map_err(|_| ScriptgateError::QueueClosed)
    }

    /// Takes the oldest queued connection, waiting for one if needed.
    ///
    /// Returns `None` once the queue is closed; anything still queued at
    /// that point is dropped.
    pub async fn pop(&self) -> Option<Admitted<T>> {
        let mut signal = self.shutdown.subscribe();
        let mut rx = self.rx.lock().await;

        let next = tokio::select! {
            biased;
            _ = async { let _ = signal.wait_for(|closed| *closed).await; } => None,
            item = rx.recv() => item,
        };

        if next.is_none() || self.is_closed() {
            drop(next);
            Self::discard(&mut rx);
            return None;
        }
        next
    }

    /// Stops admission and drops every queued connection.
    ///
    /// Connections already handed out by [`pop`](Self::pop) are untouched.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
        self.slots.close();

        // A waiting `pop` holds the lock and discards on wake-up instead
        if let Ok(mut rx) = self.rx.try_lock() {
            Self::discard(&mut rx);
        }
    }

    fn discard(rx: &mut mpsc::Receiver<Admitted<T>>) {
        rx.close();
        let mut discarded = 0usize;
        while let Ok(admitted) = rx.try_recv() {
            tracing::debug!("Closing queued connection from {}", admitted.peer);
            drop(admitted);
            discarded += 1;
        }
        if discarded > 0 {
            tracing::info!("Closed {} queued connections without serving them", discarded);
        }
    }
}
