//! Groups of fragments awaiting a sufficient solve.

use crate::{group_key, Fragment, GroupKey};
use prometheus_client::metrics::gauge::Gauge;
use std::{collections::HashMap, sync::Mutex};

/// Distinguishes successive groups opened under the same [GroupKey].
pub(crate) type Epoch = u64;

/// A snapshot of one group, taken right after a fragment was appended to it.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub key: GroupKey,
    pub epoch: Epoch,
    pub fragments: Vec<Fragment>,
}

struct Group {
    epoch: Epoch,
    fragments: Vec<Fragment>,
}

struct Groups {
    open: HashMap<GroupKey, Group>,
    next_epoch: Epoch,
}

/// Maps each open [GroupKey] to the fragments received for it, in processing order.
///
/// All access is mediated by a single lock, so an append (with its snapshot) and any erase
/// of the same group are totally ordered. A present group is never empty.
pub(crate) struct Store {
    groups: Mutex<Groups>,
    open: Gauge,
}

impl Store {
    pub fn new(open: Gauge) -> Self {
        Self {
            groups: Mutex::new(Groups {
                open: HashMap::new(),
                next_epoch: 0,
            }),
            open,
        }
    }

    /// Append `fragment` to its group (creating the group if absent) and return a copy of the
    /// group as it stands after the append.
    pub fn append(&self, fragment: Fragment) -> Snapshot {
        let key = group_key(fragment);
        let mut groups = self.groups.lock().unwrap();
        let Groups { open, next_epoch } = &mut *groups;
        let group = open.entry(key).or_insert_with(|| {
            let epoch = *next_epoch;
            *next_epoch += 1;
            self.open.inc();
            Group {
                epoch,
                fragments: Vec::new(),
            }
        });
        group.fragments.push(fragment);
        Snapshot {
            key,
            epoch: group.epoch,
            fragments: group.fragments.clone(),
        }
    }

    /// Erase the group identified by `key` if it is still the group opened at `epoch`.
    ///
    /// Returns `true` for exactly one caller per group. Several workers may solve snapshots of
    /// the same group concurrently; only the first to claim it reports a result.
    pub fn claim(&self, key: GroupKey, epoch: Epoch) -> bool {
        let mut groups = self.groups.lock().unwrap();
        if groups.open.get(&key).map(|group| group.epoch) != Some(epoch) {
            return false;
        }
        groups.open.remove(&key);
        self.open.dec();
        true
    }

    /// Erase and return an arbitrary group, or `None` if no group is open.
    pub fn take_any(&self) -> Option<(GroupKey, Vec<Fragment>)> {
        let mut groups = self.groups.lock().unwrap();
        let key = *groups.open.keys().next()?;
        let group = groups.open.remove(&key)?;
        self.open.dec();
        Some((key, group.fragments))
    }

    pub fn len(&self) -> usize {
        self.groups.lock().unwrap().open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
