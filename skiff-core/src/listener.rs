//! Remote port-forward listeners and their pending-connection queues.

use std::collections::{BTreeMap, VecDeque};

use crate::channel::Channel;

/// A forward the peer agreed to listen on for us.
///
/// Connections the peer forwards to `host:port` are accepted by the
/// dispatcher and parked here until the upper layer calls [`accept`].
///
/// [`accept`]: Listener::accept
#[derive(Debug)]
pub struct Listener {
    host: String,
    port: u32,
    /// Maximum pending connections; 0 means unbounded.
    queue_max: usize,
    queue: VecDeque<Channel>,
}

impl Listener {
    pub fn new(host: impl Into<String>, port: u32, queue_max: usize) -> Self {
        Self {
            host: host.into(),
            port,
            queue_max,
            queue: VecDeque::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn queue_max(&self) -> usize {
        self.queue_max
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    pub fn matches(&self, host: &[u8], port: u32) -> bool {
        self.port == port && self.host.as_bytes() == host
    }

    pub fn is_full(&self) -> bool {
        self.queue_max != 0 && self.queue.len() >= self.queue_max
    }

    pub(crate) fn enqueue(&mut self, channel: Channel) {
        self.queue.push_back(channel);
    }

    /// Take the oldest pending connection.
    pub fn accept(&mut self) -> Option<Channel> {
        self.queue.pop_front()
    }
}

/// Handle of a registered listener.
///
/// Ids are never reused, so a handle taken before a listener is removed
/// can only miss, never hit a different listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// All listeners registered on a connection, in registration order.
#[derive(Debug, Default)]
pub struct ListenerSet {
    listeners: BTreeMap<ListenerId, Listener>,
    next_id: u64,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.insert(id, listener);
        id
    }

    pub fn get(&self, id: ListenerId) -> Option<&Listener> {
        self.listeners.get(&id)
    }

    pub fn get_mut(&mut self, id: ListenerId) -> Option<&mut Listener> {
        self.listeners.get_mut(&id)
    }

    /// The oldest listener bound to `host:port`.
    pub fn find(&self, host: &[u8], port: u32) -> Option<ListenerId> {
        self.listeners
            .iter()
            .find(|(_, l)| l.matches(host, port))
            .map(|(&id, _)| id)
    }

    /// Cancel a forward; its pending connections go with it.
    pub fn remove(&mut self, id: ListenerId) -> Option<Listener> {
        self.listeners.remove(&id)
    }

    /// Pending connections across all listeners.
    pub fn pending_total(&self) -> usize {
        self.listeners.values().map(Listener::queue_size).sum()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.values()
    }
}
