use crate::rbool::QueryNode;
use crate::realm::RealmInner;
use crate::schema::ColKey;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

/// Change descriptor delivered to collection observers, batched per refresh
/// cycle. Index sets refer to positions at the time each mutation was applied.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectionChange {
    pub insertions: Vec<usize>,
    pub deletions: Vec<usize>,
    pub modifications: Vec<usize>,
    /// The object owning this collection was deleted; may be reported even
    /// when the index sets are empty.
    pub root_deleted: bool,
}

impl CollectionChange {
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty() && !self.root_deleted
    }
}

/// A named old/new value pair for one changed property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub name: &'static str,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ObjectChange {
    pub property_changes: Vec<PropertyChange>,
    pub is_deleted: bool,
}

impl ObjectChange {
    pub fn is_empty(&self) -> bool {
        self.property_changes.is_empty() && !self.is_deleted
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResultsChange {
    pub insertions: Vec<usize>,
    pub deletions: Vec<usize>,
    pub modifications: Vec<usize>,
}

impl ResultsChange {
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty()
    }
}

/// One entry of the write-transaction change log. Folded into per-observer
/// change sets when the session refreshes.
#[derive(Debug, Clone)]
pub(crate) enum ChangeRecord {
    Prop { table: &'static str, key: u64, name: &'static str, old: Value, new: Value },
    Collection { table: &'static str, key: u64, col: ColKey, op: CollOp },
    RowCreated { table: &'static str, key: u64 },
    RowDeleted { table: &'static str, key: u64 },
}

#[derive(Debug, Copy, Clone)]
pub(crate) enum CollOp {
    Insert(usize),
    Delete(usize),
    Modify(usize),
}

pub(crate) enum Observer {
    Object {
        table: &'static str,
        key: u64,
        cb: Box<dyn FnMut(ObjectChange) + Send>,
    },
    Collection {
        table: &'static str,
        key: u64,
        col: ColKey,
        cb: Box<dyn FnMut(CollectionChange) + Send>,
    },
    Results {
        table: &'static str,
        node: QueryNode,
        /// (row key, row fingerprint) of the last delivered evaluation.
        last: Vec<(u64, u64)>,
        cb: Box<dyn FnMut(ResultsChange) + Send>,
    },
}

#[derive(Default)]
pub(crate) struct Registry {
    next: u64,
    pub(crate) observers: HashMap<u64, Observer>,
    /// Ids unregistered while delivery had the observer map checked out.
    pub(crate) tombstones: HashSet<u64>,
}

impl Registry {
    pub(crate) fn register(&mut self, observer: Observer) -> u64 {
        let id = self.next;
        self.next += 1;
        self.observers.insert(id, observer);
        id
    }

    pub(crate) fn unregister(&mut self, id: u64) {
        if self.observers.remove(&id).is_none() {
            self.tombstones.insert(id);
        }
    }
}

/// Cancellable subscription handle; dropping it (or calling `unregister`)
/// ends the subscription.
#[derive(Debug)]
pub struct NotificationToken {
    pub(crate) id: u64,
    pub(crate) realm: Weak<RealmInner>,
}

impl NotificationToken {
    pub(crate) fn new(id: u64, realm: &Arc<RealmInner>) -> Self {
        NotificationToken { id, realm: Arc::downgrade(realm) }
    }

    pub fn unregister(&self) {
        if let Some(inner) = self.realm.upgrade() {
            if let Ok(mut registry) = inner.notifiers.lock() {
                registry.unregister(self.id);
            }
        }
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Folds the change log into the change set for one observed object.
pub(crate) fn fold_object_changes(log: &[ChangeRecord], table: &str, key: u64) -> ObjectChange {
    let mut change = ObjectChange::default();
    for record in log {
        match record {
            ChangeRecord::Prop { table: t, key: k, name, old, new } if *t == table && *k == key => {
                change.property_changes.push(PropertyChange {
                    name,
                    old: Some(old.clone()),
                    new: Some(new.clone()),
                });
            }
            ChangeRecord::RowDeleted { table: t, key: k } if *t == table && *k == key => {
                change.is_deleted = true;
            }
            _ => {}
        }
    }
    change
}

/// Folds the change log into the change set for one observed collection.
pub(crate) fn fold_collection_changes(log: &[ChangeRecord], table: &str, key: u64, col: ColKey) -> CollectionChange {
    let mut change = CollectionChange::default();
    for record in log {
        match record {
            ChangeRecord::Collection { table: t, key: k, col: c, op } if *t == table && *k == key && *c == col => {
                match op {
                    CollOp::Insert(ix) => change.insertions.push(*ix),
                    CollOp::Delete(ix) => change.deletions.push(*ix),
                    CollOp::Modify(ix) => change.modifications.push(*ix),
                }
            }
            ChangeRecord::RowDeleted { table: t, key: k } if *t == table && *k == key => {
                change.root_deleted = true;
            }
            _ => {}
        }
    }
    change
}

/// Diffs two evaluated result sets into index sets: deletions are positions in
/// the old evaluation, insertions and modifications positions in the new one.
pub(crate) fn diff_results(old: &[(u64, u64)], new: &[(u64, u64)]) -> ResultsChange {
    let old_keys: HashMap<u64, u64> = old.iter().copied().collect();
    let new_keys: HashSet<u64> = new.iter().map(|(k, _)| *k).collect();
    let mut change = ResultsChange::default();
    for (ix, (key, _)) in old.iter().enumerate() {
        if !new_keys.contains(key) {
            change.deletions.push(ix);
        }
    }
    for (ix, (key, fingerprint)) in new.iter().enumerate() {
        match old_keys.get(key) {
            None => change.insertions.push(ix),
            Some(old_fingerprint) if old_fingerprint != fingerprint => change.modifications.push(ix),
            Some(_) => {}
        }
    }
    change
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_collection_ops_for_matching_target() {
        let col = crate::schema::ColKey(2);
        let other = crate::schema::ColKey(3);
        let log = vec![
            ChangeRecord::Collection { table: "T", key: 1, col, op: CollOp::Insert(0) },
            ChangeRecord::Collection { table: "T", key: 1, col, op: CollOp::Insert(1) },
            ChangeRecord::Collection { table: "T", key: 1, col: other, op: CollOp::Delete(0) },
            ChangeRecord::Collection { table: "T", key: 2, col, op: CollOp::Insert(0) },
        ];
        let change = fold_collection_changes(&log, "T", 1, col);
        assert_eq!(change.insertions, vec![0, 1]);
        assert!(change.deletions.is_empty());
        assert!(!change.root_deleted);
    }

    #[test]
    fn root_deletion_is_reported_without_index_changes() {
        let log = vec![ChangeRecord::RowDeleted { table: "T", key: 7 }];
        let change = fold_collection_changes(&log, "T", 7, crate::schema::ColKey(0));
        assert!(change.root_deleted);
        assert!(change.insertions.is_empty());
    }

    #[test]
    fn results_diff_reports_all_three_sets() {
        let old = [(1, 10), (2, 20), (3, 30)];
        let new = [(2, 21), (3, 30), (4, 40)];
        let change = diff_results(&old, &new);
        assert_eq!(change.deletions, vec![0]);
        assert_eq!(change.insertions, vec![2]);
        assert_eq!(change.modifications, vec![0]);
    }
}
