/// Why a keyed entry appears in a changeset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    /// Key was not present before this batch
    Add,
    /// Key was present and now holds a new value
    Update,
    /// Key was present and is gone after this batch
    Remove,
    /// Value unchanged; downstream should re-evaluate it
    Refresh,
    /// Position changed (sorted/indexed views only)
    Moved,
}

/// One mutation record of a keyed collection.
///
/// `Update` always carries the previous value and `Remove` carries the last
/// value subscribers observed. The constructors are the only way to build a
/// change, which keeps those invariants intact.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<V, K> {
    reason: ChangeReason,
    key: K,
    current: V,
    previous: Option<V>,
    current_index: Option<usize>,
    previous_index: Option<usize>,
}

impl<V, K> Change<V, K> {
    pub fn add(
        key: K,
        current: V,
    ) -> Self {
        Self::item(ChangeReason::Add, key, current, None)
    }

    pub fn update(
        key: K,
        current: V,
        previous: V,
    ) -> Self {
        Self::item(ChangeReason::Update, key, current, Some(previous))
    }

    pub fn remove(
        key: K,
        current: V,
    ) -> Self {
        Self::item(ChangeReason::Remove, key, current, None)
    }

    pub fn refresh(
        key: K,
        current: V,
    ) -> Self {
        Self::item(ChangeReason::Refresh, key, current, None)
    }

    pub fn moved(
        key: K,
        current: V,
        current_index: usize,
        previous_index: usize,
    ) -> Self {
        Self {
            reason: ChangeReason::Moved,
            key,
            current,
            previous: None,
            current_index: Some(current_index),
            previous_index: Some(previous_index),
        }
    }

    fn item(
        reason: ChangeReason,
        key: K,
        current: V,
        previous: Option<V>,
    ) -> Self {
        Self {
            reason,
            key,
            current,
            previous,
            current_index: None,
            previous_index: None,
        }
    }

    /// Attaches positional information for indexed views.
    pub fn with_indexes(
        mut self,
        current_index: Option<usize>,
        previous_index: Option<usize>,
    ) -> Self {
        self.current_index = current_index;
        self.previous_index = previous_index;
        self
    }

    pub fn reason(&self) -> ChangeReason {
        self.reason
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn current(&self) -> &V {
        &self.current
    }

    /// Present for `Update` only
    pub fn previous(&self) -> Option<&V> {
        self.previous.as_ref()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn previous_index(&self) -> Option<usize> {
        self.previous_index
    }

    pub fn into_parts(self) -> (ChangeReason, K, V, Option<V>) {
        (self.reason, self.key, self.current, self.previous)
    }

    /// Projects the values of this change, keeping reason, key and indexes.
    pub fn map_value<D>(
        self,
        mut f: impl FnMut(V) -> D,
    ) -> Change<D, K> {
        Change {
            reason: self.reason,
            key: self.key,
            current: f(self.current),
            previous: self.previous.map(f),
            current_index: self.current_index,
            previous_index: self.previous_index,
        }
    }
}
