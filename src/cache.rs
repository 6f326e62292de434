use crate::model::{CellKey, CellValue, PendingEdit, Rank, RequestCell};
use crate::priority::RankSet;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// Authoritative cells plus in-flight speculative edits, keyed by
/// (user, date).
///
/// Each key has a generation counter bumped on every optimistic write. Edits
/// to one key may overlap, so pending values are kept oldest first and the
/// newest one is displayed. `applied` is the highest generation already
/// folded into the authoritative side; answers at or below it carry nothing
/// new and are dropped.
#[derive(Debug, Default)]
pub struct RequestCache {
    committed: HashMap<CellKey, RequestCell>,
    pending: HashMap<CellKey, Vec<PendingEdit>>,
    generations: HashMap<CellKey, u64>,
    applied: HashMap<CellKey, u64>,
}

impl RequestCache {
    pub fn from_cells<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = RequestCell>,
    {
        let mut cache = RequestCache::default();
        for c in cells {
            cache.committed.insert(c.key(), c);
        }
        cache
    }

    /// Replaces the authoritative side from a fresh read and drops every
    /// pending edit. Every write issued before the reload becomes stale.
    pub fn reload<I>(&mut self, cells: I)
    where
        I: IntoIterator<Item = RequestCell>,
    {
        for (key, gen) in self.generations.iter_mut() {
            *gen += 1;
            self.applied.insert(key.clone(), *gen);
        }
        self.pending.clear();
        self.committed = cells.into_iter().map(|c| (c.key(), c)).collect();
    }

    /// The newest in-flight edit for `key`.
    pub fn pending(&self, key: &CellKey) -> Option<&PendingEdit> {
        self.pending.get(key).and_then(|edits| edits.last())
    }

    /// Number of cells with at least one edit in flight.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// What the grid shows: the newest pending value if an edit is in
    /// flight, otherwise the authoritative one.
    pub fn displayed(&self, key: &CellKey) -> Option<&CellValue> {
        match self.pending(key) {
            Some(pe) => pe.value.as_ref(),
            None => self.committed.get(key).map(|c| &c.value),
        }
    }

    /// Whether either side holds a value for this key.
    pub fn is_occupied(&self, key: &CellKey) -> bool {
        self.committed.contains_key(key)
            || self
                .pending(key)
                .map(|pe| pe.value.is_some())
                .unwrap_or(false)
    }

    fn pending_tops(&self) -> impl Iterator<Item = &PendingEdit> {
        self.pending.values().filter_map(|edits| edits.last())
    }

    /// Distinct dates in the user's week holding a committed or pending value.
    pub fn occupied_days(&self, user_id: &str, week_start: NaiveDate) -> usize {
        let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();
        for key in self.committed.keys() {
            if key.user_id == user_id && key.week_start() == week_start {
                dates.insert(key.date);
            }
        }
        for pe in self.pending_tops() {
            if pe.value.is_some() && pe.key.user_id == user_id && pe.key.week_start() == week_start
            {
                dates.insert(pe.key.date);
            }
        }
        dates.len()
    }

    /// Ranks held by other days of the same user and week, across committed
    /// and pending values.
    pub fn taken_ranks(&self, exclude: &CellKey) -> RankSet {
        let week = exclude.week_start();
        let same_week =
            |k: &CellKey| k != exclude && k.user_id == exclude.user_id && k.week_start() == week;

        let committed = self
            .committed
            .iter()
            .filter(|(k, _)| same_week(k))
            .filter_map(|(_, c)| c.value.rank());
        let pending = self
            .pending_tops()
            .filter(|pe| same_week(&pe.key))
            .filter_map(|pe| pe.value.as_ref().and_then(|v| v.rank()));
        committed.chain(pending).collect()
    }

    pub fn current_rank(&self, key: &CellKey) -> Option<Rank> {
        self.displayed(key).and_then(|v| v.rank())
    }

    pub fn latest_generation(&self, key: &CellKey) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }

    /// True when the authoritative side already reflects `generation` or
    /// something newer (a later answer or a reload).
    pub fn is_settled(&self, key: &CellKey, generation: u64) -> bool {
        generation <= self.applied.get(key).copied().unwrap_or(0)
    }

    /// Records an optimistic value and returns its generation token.
    pub fn record_pending(&mut self, key: CellKey, value: Option<CellValue>) -> u64 {
        let gen = self.generations.entry(key.clone()).or_insert(0);
        *gen += 1;
        let generation = *gen;
        self.pending.entry(key.clone()).or_default().push(PendingEdit {
            key,
            value,
            generation,
        });
        generation
    }

    /// Removes the pending entry written with `generation`, if still there.
    pub fn take_pending(&mut self, key: &CellKey, generation: u64) -> Option<PendingEdit> {
        let edits = self.pending.get_mut(key)?;
        let pos = edits.iter().position(|pe| pe.generation == generation)?;
        let taken = edits.remove(pos);
        if edits.is_empty() {
            self.pending.remove(key);
        }
        Some(taken)
    }

    /// Applies the store's answer for `generation` to the authoritative side.
    /// `None` removes it, and pending edits older than `generation` go with
    /// it. Returns false, and does nothing, when a newer answer or a reload
    /// was applied first.
    pub fn commit(&mut self, key: &CellKey, generation: u64, record: Option<RequestCell>) -> bool {
        if self.is_settled(key, generation) {
            return false;
        }
        match record {
            Some(cell) => {
                self.committed.insert(key.clone(), cell);
            }
            None => {
                self.committed.remove(key);
            }
        }
        self.applied.insert(key.clone(), generation);
        if let Some(edits) = self.pending.get_mut(key) {
            edits.retain(|pe| pe.generation > generation);
            if edits.is_empty() {
                self.pending.remove(key);
            }
        }
        true
    }
}
