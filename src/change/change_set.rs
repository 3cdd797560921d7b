use std::fmt;
use std::sync::Arc;

use super::Change;
use super::ChangeBatch;
use super::ChangeReason;

/// Ordered, immutable batch of keyed changes produced by one commit.
///
/// Clones share the same backing storage, so broadcasting one changeset to
/// many subscribers never copies the changes.
pub struct ChangeSet<V, K> {
    changes: Arc<Vec<Change<V, K>>>,
}

impl<V, K> ChangeSet<V, K> {
    pub fn new(changes: Vec<Change<V, K>>) -> Self {
        Self {
            changes: Arc::new(changes),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change<V, K>> {
        self.changes.iter()
    }

    pub fn as_slice(&self) -> &[Change<V, K>] {
        &self.changes
    }

    pub fn adds(&self) -> usize {
        self.count_reason(ChangeReason::Add)
    }

    pub fn updates(&self) -> usize {
        self.count_reason(ChangeReason::Update)
    }

    pub fn removes(&self) -> usize {
        self.count_reason(ChangeReason::Remove)
    }

    pub fn refreshes(&self) -> usize {
        self.count_reason(ChangeReason::Refresh)
    }

    pub fn moves(&self) -> usize {
        self.count_reason(ChangeReason::Moved)
    }

    fn count_reason(
        &self,
        reason: ChangeReason,
    ) -> usize {
        self.changes.iter().filter(|c| c.reason() == reason).count()
    }
}

impl<V: Clone, K: Clone> ChangeSet<V, K> {
    pub fn to_vec(&self) -> Vec<Change<V, K>> {
        self.changes.as_ref().clone()
    }
}

impl<V, K> Clone for ChangeSet<V, K> {
    fn clone(&self) -> Self {
        Self {
            changes: Arc::clone(&self.changes),
        }
    }
}

impl<V, K> Default for ChangeSet<V, K> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V: fmt::Debug, K: fmt::Debug> fmt::Debug for ChangeSet<V, K> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_list().entries(self.changes.iter()).finish()
    }
}

impl<V: PartialEq, K: PartialEq> PartialEq for ChangeSet<V, K> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.changes == other.changes
    }
}

impl<V, K> FromIterator<Change<V, K>> for ChangeSet<V, K> {
    fn from_iter<I: IntoIterator<Item = Change<V, K>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a, V, K> IntoIterator for &'a ChangeSet<V, K> {
    type Item = &'a Change<V, K>;
    type IntoIter = std::slice::Iter<'a, Change<V, K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl<V, K> ChangeBatch for ChangeSet<V, K>
where
    V: Clone + Send + Sync + 'static,
    K: Clone + Send + Sync + 'static,
{
    type Item = Change<V, K>;

    fn is_empty(&self) -> bool {
        ChangeSet::is_empty(self)
    }

    fn append_to(
        &self,
        buffer: &mut Vec<Self::Item>,
    ) {
        buffer.extend(self.changes.iter().cloned());
    }

    fn from_changes(changes: Vec<Self::Item>) -> Self {
        Self::new(changes)
    }
}
