// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory pub/sub transport.
//!
//! A [`Bus`] stores the last value per `(entity, key)` and fans every
//! publish out to one FIFO queue per connected client. Each client holds a
//! [`BusPort`], which implements [`Transport`] for its `MarkerSystem`.
//! Queued notifications are handed over explicitly with
//! [`BusPort::take_pending`], so tests decide when delivery happens.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use sigil_core::backlog::ChangeNotification;
use sigil_core::entity::{EntityId, InvalidEntityId};
use sigil_core::host::Transport;

#[derive(Debug, Default)]
struct BusState {
    store: BTreeMap<(EntityId, String), String>,
    queues: Vec<VecDeque<ChangeNotification>>,
    connected: Vec<bool>,
    publishes: u64,
    replays: u64,
    rejected: u64,
}

impl BusState {
    fn publish(&mut self, entity: &EntityId, key: &str, value: &str) {
        self.store
            .insert((entity.clone(), key.to_owned()), value.to_owned());
        self.publishes += 1;
        let change = ChangeNotification::new(entity.clone(), key, value);
        for (queue, _) in self
            .queues
            .iter_mut()
            .zip(&self.connected)
            .filter(|(_, connected)| **connected)
        {
            queue.push_back(change.clone());
        }
    }
}

/// Shared last-writer-wins store with per-client delivery queues.
///
/// Cloning a `Bus` yields another handle to the same store.
#[derive(Clone, Debug, Default)]
pub struct Bus {
    state: Rc<RefCell<BusState>>,
}

impl Bus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a new client. Notifications published from now on are
    /// queued for it.
    #[must_use]
    pub fn connect(&self) -> BusPort {
        let mut state = self.state.borrow_mut();
        state.queues.push(VecDeque::new());
        state.connected.push(true);
        BusPort {
            client: state.queues.len() - 1,
            state: Rc::clone(&self.state),
        }
    }

    /// Publishes from outside any client, for example a game master tool.
    pub fn publish(&self, entity: &EntityId, key: &str, value: &str) {
        self.state.borrow_mut().publish(entity, key, value);
    }

    /// Publishes with an unvalidated entity id, as an external tool would.
    ///
    /// Invalid ids are rejected with a warning and never reach the store or
    /// any client.
    ///
    /// # Errors
    ///
    /// Returns the [`InvalidEntityId`] reason.
    pub fn publish_raw(&self, entity: &str, key: &str, value: &str) -> Result<(), InvalidEntityId> {
        match EntityId::new(entity) {
            Ok(entity) => {
                self.publish(&entity, key, value);
                Ok(())
            }
            Err(err) => {
                self.state.borrow_mut().rejected += 1;
                tracing::warn!(entity, key, error = %err, "rejected notification");
                Err(err)
            }
        }
    }

    /// Last stored value for `(entity, key)`.
    #[must_use]
    pub fn value(&self, entity: &EntityId, key: &str) -> Option<String> {
        self.state
            .borrow()
            .store
            .get(&(entity.clone(), key.to_owned()))
            .cloned()
    }

    /// Every stored `(entity, key, value)` in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<(EntityId, String, String)> {
        self.state
            .borrow()
            .store
            .iter()
            .map(|((entity, key), value)| (entity.clone(), key.clone(), value.clone()))
            .collect()
    }

    /// Notifications waiting for `client`.
    #[must_use]
    pub fn pending(&self, client: usize) -> usize {
        self.state
            .borrow()
            .queues
            .get(client)
            .map_or(0, VecDeque::len)
    }

    /// Total publishes so far.
    #[must_use]
    pub fn publishes(&self) -> u64 {
        self.state.borrow().publishes
    }

    /// Publishes refused by [`publish_raw`](Self::publish_raw).
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.state.borrow().rejected
    }

    /// Total replay requests so far.
    #[must_use]
    pub fn replays(&self) -> u64 {
        self.state.borrow().replays
    }
}

/// One client's connection to a [`Bus`].
#[derive(Debug)]
pub struct BusPort {
    client: usize,
    state: Rc<RefCell<BusState>>,
}

impl BusPort {
    /// Index of this client on the bus.
    #[must_use]
    pub fn client(&self) -> usize {
        self.client
    }

    /// Removes and returns every queued notification, oldest first.
    #[must_use]
    pub fn take_pending(&self) -> Vec<ChangeNotification> {
        self.state
            .borrow_mut()
            .queues
            .get_mut(self.client)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Stops queueing notifications for this client and drops what is
    /// already queued. Stored values are unaffected.
    pub fn disconnect(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(queue) = state.queues.get_mut(self.client) {
            queue.clear();
        }
        if let Some(connected) = state.connected.get_mut(self.client) {
            *connected = false;
        }
    }

    /// Resumes queueing after [`disconnect`](Self::disconnect).
    pub fn reconnect(&self) {
        if let Some(connected) = self.state.borrow_mut().connected.get_mut(self.client) {
            *connected = true;
        }
    }
}

impl Transport for BusPort {
    fn publish(&mut self, entity: &EntityId, key: &str, value: &str) {
        self.state.borrow_mut().publish(entity, key, value);
    }

    fn read(&self, entity: &EntityId, key: &str) -> Option<String> {
        self.state
            .borrow()
            .store
            .get(&(entity.clone(), key.to_owned()))
            .cloned()
    }

    fn request_replay(&mut self) {
        let mut state = self.state.borrow_mut();
        state.replays += 1;
        let replay: Vec<ChangeNotification> = state
            .store
            .iter()
            .map(|((entity, key), value)| ChangeNotification::new(entity.clone(), key, value))
            .collect();
        tracing::debug!(client = self.client, entries = replay.len(), "replaying store");
        if let Some(queue) = state.queues.get_mut(self.client) {
            queue.extend(replay);
        }
    }
}
