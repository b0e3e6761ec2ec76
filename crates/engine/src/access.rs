//! Allow-list access control.
//!
//! The allow-list is fixed at startup; membership is the only question asked.

use std::collections::BTreeSet;

use courier_common::types::SubscriberId;

/// Static set of subscribers permitted to invoke guarded commands.
#[derive(Debug, Clone)]
pub struct AccessControl {
    allowed: BTreeSet<SubscriberId>,
}

impl AccessControl {
    pub fn new(allowed: impl IntoIterator<Item = SubscriberId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Unknown ids are simply not authorized.
    pub fn is_authorized(&self, id: SubscriberId) -> bool {
        self.allowed.contains(&id)
    }

    /// All allow-listed subscribers, in ascending id order.
    pub fn subscribers(&self) -> impl Iterator<Item = SubscriberId> + '_ {
        self.allowed.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}
