use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::{RasterTile, TileRequest};

/// Notification that a tile which was missing on an earlier lookup can now be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileAvailable {
    pub request: TileRequest,
}

/// External source of decoded tiles.
///
/// `get_tile` with `peek = true` only answers from what the store already holds; with
/// `peek = false` a miss may also schedule a fetch, whose completion is later announced
/// on the channels handed out by `subscribe`.
pub trait TileStore: Send {
    fn get_tile(&mut self, request: TileRequest, peek: bool) -> Option<RasterTile>;

    /// Each call returns a fresh receiver; subscribers are expected to resubscribe for
    /// every render surface they mount.
    fn subscribe(&self) -> Receiver<TileAvailable>;
}

/// Fan-out of tile availability notifications to any number of subscribers.
#[derive(Debug, Clone, Default)]
pub struct TileAvailabilityHub {
    subscribers: Arc<Mutex<Vec<Sender<TileAvailable>>>>,
}

impl TileAvailabilityHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<TileAvailable> {
        let (sender, receiver) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Sends to every live subscriber and drops the ones whose receiver is gone.
    pub fn publish(&self, notification: TileAvailable) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sender| sender.send(notification).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
