use std::fmt;
use std::sync::Arc;

use super::ChangeBatch;

/// Why an entry appears in a positional (list) changeset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListChangeReason {
    Add,
    AddRange,
    Replace,
    Remove,
    RemoveRange,
    Refresh,
    Moved,
    Clear,
}

/// Whether a list change describes one item or a contiguous range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Item,
    Range,
}

impl ListChangeReason {
    pub fn change_type(self) -> ChangeType {
        match self {
            ListChangeReason::Add
            | ListChangeReason::Replace
            | ListChangeReason::Remove
            | ListChangeReason::Refresh
            | ListChangeReason::Moved => ChangeType::Item,
            ListChangeReason::AddRange | ListChangeReason::RemoveRange | ListChangeReason::Clear => {
                ChangeType::Range
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemChange<T> {
    pub current: T,
    pub previous: Option<T>,
    pub current_index: Option<usize>,
    pub previous_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeChange<T> {
    pub items: Vec<T>,
    /// Index of the first item, when known
    pub index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListChangeKind<T> {
    Item(ItemChange<T>),
    Range(RangeChange<T>),
}

/// One mutation record of a positional collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ListChange<T> {
    reason: ListChangeReason,
    kind: ListChangeKind<T>,
}

impl<T> ListChange<T> {
    pub fn add(
        item: T,
        index: Option<usize>,
    ) -> Self {
        Self::item(ListChangeReason::Add, item, None, index, None)
    }

    pub fn replace(
        current: T,
        previous: T,
        index: Option<usize>,
    ) -> Self {
        Self::item(ListChangeReason::Replace, current, Some(previous), index, index)
    }

    pub fn remove(
        item: T,
        index: Option<usize>,
    ) -> Self {
        Self::item(ListChangeReason::Remove, item, None, index, None)
    }

    pub fn refresh(
        item: T,
        index: Option<usize>,
    ) -> Self {
        Self::item(ListChangeReason::Refresh, item, None, index, None)
    }

    pub fn moved(
        item: T,
        current_index: usize,
        previous_index: usize,
    ) -> Self {
        Self::item(
            ListChangeReason::Moved,
            item,
            None,
            Some(current_index),
            Some(previous_index),
        )
    }

    pub fn add_range(
        items: Vec<T>,
        index: Option<usize>,
    ) -> Self {
        Self::range(ListChangeReason::AddRange, items, index)
    }

    pub fn remove_range(
        items: Vec<T>,
        index: Option<usize>,
    ) -> Self {
        Self::range(ListChangeReason::RemoveRange, items, index)
    }

    pub fn clear(items: Vec<T>) -> Self {
        Self::range(ListChangeReason::Clear, items, Some(0))
    }

    fn item(
        reason: ListChangeReason,
        current: T,
        previous: Option<T>,
        current_index: Option<usize>,
        previous_index: Option<usize>,
    ) -> Self {
        Self {
            reason,
            kind: ListChangeKind::Item(ItemChange {
                current,
                previous,
                current_index,
                previous_index,
            }),
        }
    }

    fn range(
        reason: ListChangeReason,
        items: Vec<T>,
        index: Option<usize>,
    ) -> Self {
        Self {
            reason,
            kind: ListChangeKind::Range(RangeChange { items, index }),
        }
    }

    pub fn reason(&self) -> ListChangeReason {
        self.reason
    }

    pub fn change_type(&self) -> ChangeType {
        self.reason.change_type()
    }

    pub fn kind(&self) -> &ListChangeKind<T> {
        &self.kind
    }

    pub fn as_item(&self) -> Option<&ItemChange<T>> {
        match &self.kind {
            ListChangeKind::Item(item) => Some(item),
            ListChangeKind::Range(_) => None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeChange<T>> {
        match &self.kind {
            ListChangeKind::Range(range) => Some(range),
            ListChangeKind::Item(_) => None,
        }
    }

    /// Number of items this change touches
    pub fn item_count(&self) -> usize {
        match &self.kind {
            ListChangeKind::Item(_) => 1,
            ListChangeKind::Range(range) => range.items.len(),
        }
    }
}

/// Ordered, immutable batch of positional changes.
pub struct ListChangeSet<T> {
    changes: Arc<Vec<ListChange<T>>>,
}

impl<T> ListChangeSet<T> {
    pub fn new(changes: Vec<ListChange<T>>) -> Self {
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

    pub fn iter(&self) -> std::slice::Iter<'_, ListChange<T>> {
        self.changes.iter()
    }

    /// Items touched across every change, expanding ranges
    pub fn total_changes(&self) -> usize {
        self.changes.iter().map(ListChange::item_count).sum()
    }
}

impl<T: Clone + PartialEq> ListChangeSet<T> {
    /// Applies every change to a positional collection.
    ///
    /// Known indexes are honored; changes without an index fall back to
    /// appending (adds) or locating the item by equality (removes, replaces).
    pub fn apply_to(
        &self,
        target: &mut Vec<T>,
    ) {
        for change in self.changes.iter() {
            match (&change.reason, &change.kind) {
                (ListChangeReason::Add, ListChangeKind::Item(item)) => match item.current_index {
                    Some(index) if index <= target.len() => target.insert(index, item.current.clone()),
                    _ => target.push(item.current.clone()),
                },
                (ListChangeReason::AddRange, ListChangeKind::Range(range)) => match range.index {
                    Some(index) if index <= target.len() => {
                        let tail = target.split_off(index);
                        target.extend(range.items.iter().cloned());
                        target.extend(tail);
                    }
                    _ => target.extend(range.items.iter().cloned()),
                },
                (ListChangeReason::Replace, ListChangeKind::Item(item)) => {
                    let position = match item.current_index {
                        Some(index) if index < target.len() => Some(index),
                        _ => item
                            .previous
                            .as_ref()
                            .and_then(|previous| target.iter().position(|t| t == previous)),
                    };
                    match position {
                        Some(index) => target[index] = item.current.clone(),
                        None => target.push(item.current.clone()),
                    }
                }
                (ListChangeReason::Remove, ListChangeKind::Item(item)) => {
                    let position = match item.current_index {
                        Some(index) if index < target.len() => Some(index),
                        _ => target.iter().position(|t| *t == item.current),
                    };
                    if let Some(index) = position {
                        target.remove(index);
                    }
                }
                (ListChangeReason::RemoveRange, ListChangeKind::Range(range)) => match range.index {
                    Some(index) if index + range.items.len() <= target.len() => {
                        target.drain(index..index + range.items.len());
                    }
                    _ => {
                        for item in &range.items {
                            if let Some(index) = target.iter().position(|t| t == item) {
                                target.remove(index);
                            }
                        }
                    }
                },
                (ListChangeReason::Moved, ListChangeKind::Item(item)) => {
                    let from = match item.previous_index {
                        Some(index) if index < target.len() => Some(index),
                        _ => target.iter().position(|t| *t == item.current),
                    };
                    if let (Some(from), Some(to)) = (from, item.current_index) {
                        let moved = target.remove(from);
                        target.insert(to.min(target.len()), moved);
                    }
                }
                (ListChangeReason::Clear, _) => target.clear(),
                // Refresh changes nothing structurally
                _ => {}
            }
        }
    }
}

impl<T> Clone for ListChangeSet<T> {
    fn clone(&self) -> Self {
        Self {
            changes: Arc::clone(&self.changes),
        }
    }
}

impl<T> Default for ListChangeSet<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for ListChangeSet<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_list().entries(self.changes.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for ListChangeSet<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.changes == other.changes
    }
}

impl<T> FromIterator<ListChange<T>> for ListChangeSet<T> {
    fn from_iter<I: IntoIterator<Item = ListChange<T>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> ChangeBatch for ListChangeSet<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = ListChange<T>;

    fn is_empty(&self) -> bool {
        ListChangeSet::is_empty(self)
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
