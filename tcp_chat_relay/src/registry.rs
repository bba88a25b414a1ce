// Connection registry: who is connected, in which role, under which name.
//
// Two membership maps (publishers, subscribers) keyed by `ConnectionId`, plus
// a separate name → id index for publishers. Names and membership are
// separate views. Every insert and remove updates both together, so a
// removal can never leave a stale name behind.
//
// Ids are handed out monotonically and never reused. `BTreeMap` iteration is
// therefore registration order, which is the order the session fans out
// broadcasts in.
//
// The registry is pure bookkeeping. It takes ownership of a connection on
// insert and hands it back on removal. Closing it is the caller's job.
// `*_ids()` return snapshots so callers can remove entries while walking
// them.
//
// Generic over the connection type so tests can register plain values; the
// relay uses `Registry<TcpStream>`.

use std::collections::{BTreeMap, HashMap};

use crate::error::RegistryError;

/// Relay-assigned handle for a registered connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connection handed back by `remove`.
#[derive(Debug, PartialEq, Eq)]
pub enum Removed<C> {
    Publisher { name: String, conn: C },
    Subscriber { conn: C },
}

impl<C> Removed<C> {
    pub fn into_connection(self) -> C {
        match self {
            Removed::Publisher { conn, .. } | Removed::Subscriber { conn } => conn,
        }
    }
}

struct PublisherEntry<C> {
    name: String,
    conn: C,
}

pub struct Registry<C> {
    next_id: u64,
    publishers: BTreeMap<ConnectionId, PublisherEntry<C>>,
    subscribers: BTreeMap<ConnectionId, C>,
    names: HashMap<String, ConnectionId>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            publishers: BTreeMap::new(),
            subscribers: BTreeMap::new(),
            names: HashMap::new(),
        }
    }

    /// Register a publisher under `name`. On failure the connection is
    /// returned untouched alongside the reason, and the registry is
    /// unchanged.
    pub fn add_publisher(
        &mut self,
        conn: C,
        name: &str,
    ) -> Result<ConnectionId, (C, RegistryError)> {
        if let Err(error) = self.check_name(name) {
            return Err((conn, error));
        }
        let id = self.allocate_id();
        self.names.insert(name.to_string(), id);
        self.publishers.insert(
            id,
            PublisherEntry {
                name: name.to_string(),
                conn,
            },
        );
        Ok(id)
    }

    pub fn add_subscriber(&mut self, conn: C) -> ConnectionId {
        let id = self.allocate_id();
        self.subscribers.insert(id, conn);
        id
    }

    /// Whether `name` could be claimed right now. Names end up inside
    /// `\n`-terminated broadcast lines, so control characters are refused.
    pub fn check_name(&self, name: &str) -> Result<(), RegistryError> {
        if name.is_empty() {
            Err(RegistryError::EmptyName)
        } else if name.chars().any(char::is_control) {
            Err(RegistryError::InvalidName(name.to_string()))
        } else if self.names.contains_key(name) {
            Err(RegistryError::NameTaken(name.to_string()))
        } else {
            Ok(())
        }
    }

    /// Remove a connection in whatever role it holds. Removing an unknown or
    /// already-removed id is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Removed<C>> {
        if let Some(entry) = self.publishers.remove(&id) {
            self.names.remove(&entry.name);
            return Some(Removed::Publisher {
                name: entry.name,
                conn: entry.conn,
            });
        }
        self.subscribers
            .remove(&id)
            .map(|conn| Removed::Subscriber { conn })
    }

    /// Empty the registry, handing back every connection (publishers first).
    pub fn drain(&mut self) -> Vec<Removed<C>> {
        self.names.clear();
        let publishers = std::mem::take(&mut self.publishers)
            .into_values()
            .map(|entry| Removed::Publisher {
                name: entry.name,
                conn: entry.conn,
            });
        let subscribers = std::mem::take(&mut self.subscribers)
            .into_values()
            .map(|conn| Removed::Subscriber { conn });
        publishers.chain(subscribers).collect()
    }

    pub fn name(&self, id: ConnectionId) -> Option<&str> {
        self.publishers.get(&id).map(|entry| entry.name.as_str())
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&C> {
        self.publishers
            .get(&id)
            .map(|entry| &entry.conn)
            .or_else(|| self.subscribers.get(&id))
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut C> {
        match self.publishers.get_mut(&id) {
            Some(entry) => Some(&mut entry.conn),
            None => self.subscribers.get_mut(&id),
        }
    }

    /// Snapshot of publisher ids in registration order.
    pub fn publisher_ids(&self) -> Vec<ConnectionId> {
        self.publishers.keys().copied().collect()
    }

    /// Snapshot of subscriber ids in registration order.
    pub fn subscriber_ids(&self) -> Vec<ConnectionId> {
        self.subscribers.keys().copied().collect()
    }

    /// Snapshot of every registered id: publishers, then subscribers.
    pub fn all_ids(&self) -> Vec<ConnectionId> {
        self.publishers
            .keys()
            .chain(self.subscribers.keys())
            .copied()
            .collect()
    }

    /// Publisher names in registration order.
    pub fn publisher_names(&self) -> Vec<String> {
        self.publishers
            .values()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Subscribers in registration order, for fan-out.
    pub fn subscribers_mut(&mut self) -> impl Iterator<Item = (ConnectionId, &mut C)> {
        self.subscribers.iter_mut().map(|(id, conn)| (*id, conn))
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.publishers.len() + self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn allocate_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        id
    }
}
