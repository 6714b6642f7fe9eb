//! The backlog store: durable, insertion-ordered record of work items.
//!
//! Items are held in insertion order (the dispatch tie-break depends on it)
//! with an id index on the side. All mutation goes through `insert` and
//! `transition`; callers never touch item fields directly. The run loop owns
//! the store exclusively on a single thread, which is what makes
//! `transition` atomic with respect to concurrent dispatch decisions.
//!
//! Persistence is a versioned JSON snapshot written atomically. `load`
//! checks structural invariants and reports violations as `CorruptState`
//! without attempting repair.

use super::{validate_item_id, ItemState, WorkItem};
use crate::error::{Result, TrinityError};
use crate::fs::atomic_write_file;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    items: Vec<WorkItem>,
}

/// In-memory backlog with JSON snapshot persistence.
#[derive(Debug, Default)]
pub struct BacklogStore {
    /// Items in insertion order.
    items: Vec<WorkItem>,
    /// Map of item id to index in `items`.
    index: HashMap<String, usize>,
}

impl BacklogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items in the store.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an item by id.
    pub fn get(&self, id: &str) -> Option<&WorkItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    /// All items in insertion order.
    pub fn all_items(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter()
    }

    /// Next free item number for id generation.
    pub fn next_number(&self) -> u32 {
        self.items
            .iter()
            .filter_map(|i| super::item_number(&i.id))
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Add a new item to the end of the backlog.
    ///
    /// Rejects duplicate ids and dependency references to unknown items.
    pub fn insert(&mut self, item: WorkItem) -> Result<()> {
        if self.index.contains_key(&item.id) {
            return Err(TrinityError::UserError(format!(
                "item '{}' already exists in the backlog",
                item.id
            )));
        }
        for dep in &item.depends_on {
            if dep == &item.id {
                return Err(TrinityError::UserError(format!(
                    "item '{}' cannot depend on itself",
                    item.id
                )));
            }
            if !self.index.contains_key(dep) {
                return Err(TrinityError::UserError(format!(
                    "item '{}' depends on unknown item '{}'",
                    item.id, dep
                )));
            }
        }

        self.index.insert(item.id.clone(), self.items.len());
        self.items.push(item);
        Ok(())
    }

    /// Items eligible for dispatch, in insertion order.
    ///
    /// An item is eligible iff it is Pending and every dependency has
    /// Succeeded. Ordering here is the stable base order; the dispatch-time
    /// tie-break (fewest attempts first) is applied by the controller.
    pub fn list_eligible(&self) -> Vec<&WorkItem> {
        self.items
            .iter()
            .filter(|item| item.state == ItemState::Pending && self.deps_satisfied(item))
            .collect()
    }

    fn deps_satisfied(&self, item: &WorkItem) -> bool {
        item.depends_on
            .iter()
            .all(|dep| self.get(dep).map(|d| d.state) == Some(ItemState::Succeeded))
    }

    /// Items that can never become eligible because a dependency ended
    /// Failed or Blocked.
    pub fn permanently_ineligible(&self) -> Vec<&WorkItem> {
        self.items
            .iter()
            .filter(|item| {
                item.state == ItemState::Pending
                    && item.depends_on.iter().any(|dep| {
                        matches!(
                            self.get(dep).map(|d| d.state),
                            Some(ItemState::Failed) | Some(ItemState::Blocked)
                        )
                    })
            })
            .collect()
    }

    /// Move an item to a new state, enforcing the state machine.
    pub fn transition(&mut self, id: &str, to: ItemState) -> Result<()> {
        let idx = *self.index.get(id).ok_or_else(|| {
            TrinityError::UserError(format!("item '{}' not found in the backlog", id))
        })?;

        let from = self.items[idx].state;
        if !from.can_transition_to(to) {
            return Err(TrinityError::InvalidTransition {
                item: id.to_string(),
                from,
                to,
            });
        }

        self.items[idx].state = to;
        Ok(())
    }

    /// Increment the attempt count for an item (on dispatch).
    pub fn increment_attempts(&mut self, id: &str) -> Result<u32> {
        let idx = *self.index.get(id).ok_or_else(|| {
            TrinityError::UserError(format!("item '{}' not found in the backlog", id))
        })?;
        self.items[idx].attempt_count += 1;
        Ok(self.items[idx].attempt_count)
    }

    /// Set the attempt count for an item (resume reconciliation only).
    pub fn set_attempts(&mut self, id: &str, count: u32) -> Result<()> {
        let idx = *self.index.get(id).ok_or_else(|| {
            TrinityError::UserError(format!("item '{}' not found in the backlog", id))
        })?;
        self.items[idx].attempt_count = count;
        Ok(())
    }

    /// Counts of items per state.
    pub fn state_counts(&self) -> HashMap<ItemState, usize> {
        let mut counts = HashMap::new();
        for item in &self.items {
            *counts.entry(item.state).or_insert(0) += 1;
        }
        counts
    }

    /// Whether any item is still Pending or InProgress.
    pub fn has_open_items(&self) -> bool {
        self.items
            .iter()
            .any(|i| matches!(i.state, ItemState::Pending | ItemState::InProgress))
    }

    /// Persist the store as a versioned JSON snapshot.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            items: self.items.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| {
            TrinityError::IoFailure(format!("failed to serialize backlog snapshot: {}", e))
        })?;
        atomic_write_file(path, &json)
    }

    /// Load a store from a snapshot file, validating structural invariants.
    ///
    /// An empty store is returned when the file does not exist yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            TrinityError::IoFailure(format!(
                "failed to read backlog snapshot '{}': {}",
                path.display(),
                e
            ))
        })?;

        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            TrinityError::CorruptState(format!(
                "backlog snapshot '{}' is not valid JSON: {}",
                path.display(),
                e
            ))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(TrinityError::CorruptState(format!(
                "backlog snapshot version {} is not supported (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let mut store = Self::new();
        for item in snapshot.items {
            validate_item_id(&item.id).map_err(|_| {
                TrinityError::CorruptState(format!("malformed item id '{}'", item.id))
            })?;
            if store.index.contains_key(&item.id) {
                return Err(TrinityError::CorruptState(format!(
                    "duplicate item id '{}'",
                    item.id
                )));
            }
            store.index.insert(item.id.clone(), store.items.len());
            store.items.push(item);
        }

        // Dependency references are checked against the full set, so forward
        // references between snapshot entries are fine.
        for item in &store.items {
            for dep in &item.depends_on {
                if dep == &item.id {
                    return Err(TrinityError::CorruptState(format!(
                        "item '{}' depends on itself",
                        item.id
                    )));
                }
                if !store.index.contains_key(dep) {
                    return Err(TrinityError::CorruptState(format!(
                        "item '{}' depends on unknown item '{}'",
                        item.id, dep
                    )));
                }
            }
        }

        Ok(store)
    }
}
