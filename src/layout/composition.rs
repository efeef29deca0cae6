//! Composition enumeration
//!
//! A composition of `total` into `k` slots is a vector of `k` non-negative
//! counts summing to `total`. The layout search walks compositions in
//! reverse lexicographic order: the first slot starts full and mass moves
//! rightwards one unit at a time. With layouts sorted by preference this
//! tries the most preferred distributions first.
//!
//! Slots may carry an upper bound. The uncapped walk is the capped walk with
//! every cap at `usize::MAX`.

/// Current position of a composition walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    counts: Vec<usize>,
    caps: Option<Vec<usize>>,
}

impl Composition {
    /// First composition of `total` into `slots`: everything in slot 0
    pub fn first(total: usize, slots: usize) -> Option<Self> {
        if slots == 0 {
            return (total == 0).then(|| Self::from_counts(Vec::new(), None));
        }
        let mut counts = vec![0; slots];
        counts[0] = total;
        Some(Self::from_counts(counts, None))
    }

    /// First composition under per-slot caps, filled greedily from the left
    ///
    /// Returns `None` when the caps cannot hold `total`.
    pub fn first_capped(total: usize, caps: Vec<usize>) -> Option<Self> {
        let mut remaining = total;
        let counts: Vec<usize> = caps
            .iter()
            .map(|cap| {
                let take = (*cap).min(remaining);
                remaining -= take;
                take
            })
            .collect();

        if remaining > 0 {
            return None;
        }
        Some(Self::from_counts(counts, Some(caps)))
    }

    /// Resume a walk from arbitrary counts
    pub fn from_counts(counts: Vec<usize>, caps: Option<Vec<usize>>) -> Self {
        Self { counts, caps }
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn into_counts(self) -> Vec<usize> {
        self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    fn cap(&self, slot: usize) -> usize {
        self.caps
            .as_ref()
            .and_then(|caps| caps.get(slot).copied())
            .unwrap_or(usize::MAX)
    }

    /// Step to the next composition in reverse lexicographic order
    ///
    /// Takes one unit from the rightmost slot that still has one and whose
    /// suffix can absorb it, then refills the suffix as far left as the caps
    /// allow. Returns `false` once the walk is exhausted, leaving the counts
    /// untouched.
    pub fn advance(&mut self) -> bool {
        let k = self.counts.len();
        if k < 2 {
            return false;
        }

        // sum and capacity of the slots right of `i`
        let mut tail = self.counts[k - 1];
        let mut tail_cap = self.cap(k - 1);

        for i in (0..k - 1).rev() {
            if self.counts[i] > 0 && tail < tail_cap {
                self.counts[i] -= 1;
                let mut remaining = tail + 1;
                for j in i + 1..k {
                    let take = self.cap(j).min(remaining);
                    self.counts[j] = take;
                    remaining -= take;
                }
                return true;
            }
            tail += self.counts[i];
            tail_cap = tail_cap.saturating_add(self.cap(i));
        }

        false
    }
}

/// Iterator over every composition from a starting point onwards
#[derive(Debug, Clone)]
pub struct Compositions {
    current: Option<Composition>,
    started: bool,
}

impl Compositions {
    /// All compositions of `total` into `slots`
    pub fn new(total: usize, slots: usize) -> Self {
        Self::starting_at(Composition::first(total, slots))
    }

    /// All compositions of `total` under the given caps
    pub fn capped(total: usize, caps: Vec<usize>) -> Self {
        Self::starting_at(Composition::first_capped(total, caps))
    }

    pub fn starting_at(start: Option<Composition>) -> Self {
        Self {
            current: start,
            started: false,
        }
    }
}

impl Iterator for Compositions {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.as_mut()?;
        if self.started && !current.advance() {
            self.current = None;
            return None;
        }
        self.started = true;
        Some(current.counts().to_vec())
    }
}
