use crate::model::Rank;

/// Ranks already used by other days of the same user and week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RankSet {
    first: bool,
    second: bool,
}

impl RankSet {
    pub fn insert(&mut self, rank: Rank) {
        match rank {
            Rank::First => self.first = true,
            Rank::Second => self.second = true,
        }
    }

    pub fn contains(&self, rank: Rank) -> bool {
        match rank {
            Rank::First => self.first,
            Rank::Second => self.second,
        }
    }

    pub fn is_full(&self) -> bool {
        self.first && self.second
    }
}

impl FromIterator<Rank> for RankSet {
    fn from_iter<I: IntoIterator<Item = Rank>>(iter: I) -> Self {
        let mut set = RankSet::default();
        for r in iter {
            set.insert(r);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOutcome {
    /// Rank to store with the day off; `None` means a plain day off.
    Assign(Option<Rank>),
    /// Both ranks are in use elsewhere this week.
    Blocked,
}

/// Next rank for one activation of the strong-preference control.
///
/// Cycles None -> 1 -> 2 -> None. A taken rank is skipped in favour of the
/// other one; stepping back to None is always allowed.
pub fn next_rank(current: Option<Rank>, taken: RankSet) -> RankOutcome {
    let desired = match current {
        None => Rank::First,
        Some(Rank::First) => Rank::Second,
        Some(Rank::Second) => return RankOutcome::Assign(None),
    };

    if !taken.contains(desired) {
        return RankOutcome::Assign(Some(desired));
    }
    if !taken.contains(desired.other()) {
        return RankOutcome::Assign(Some(desired.other()));
    }
    RankOutcome::Blocked
}
