//! Reclaim sweeps over the entry table
//!
//! A sweep is one pass of the reclamation algorithm:
//!
//! 1. Every eager entry is reclaimed.
//! 2. If the pressure level is at or above the reclaim threshold, persistent
//!    entries are reclaimed least recently accessed first, until the
//!    estimated relief would bring pressure below the threshold (or a fixed
//!    batch has been reclaimed when no estimator is configured).
//! 3. The entry touched by the operation that triggered the sweep is never
//!    reclaimed by that sweep.
//!
//! Sweeps are synchronous and bounded by the number of entries.

use std::fmt;
use std::hash::Hash;

use tracing::{debug, trace};

use crate::pressure::{BatchFraction, PressureLevel, PressureRelief, PressureSignal};
use crate::table::EntryTable;

/// What caused a sweep to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTrigger {
    /// The host reported a new pressure level
    PressureChange,
    /// An insert or capacity change needed room
    Capacity,
    /// The caller asked for a sweep explicitly
    Forced,
}

impl fmt::Display for SweepTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepTrigger::PressureChange => write!(f, "pressure-change"),
            SweepTrigger::Capacity => write!(f, "capacity"),
            SweepTrigger::Forced => write!(f, "forced"),
        }
    }
}

/// Outcome of a single sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// What caused the sweep
    pub trigger: SweepTrigger,

    /// Pressure level the sweep ran at
    pub pressure: PressureLevel,

    /// Eager entries reclaimed
    pub eager_reclaimed: usize,

    /// Persistent entries reclaimed
    pub persistent_reclaimed: usize,
}

impl SweepReport {
    /// Total entries reclaimed by the sweep
    pub fn total(&self) -> usize {
        self.eager_reclaimed + self.persistent_reclaimed
    }
}

/// How much persistent reclamation an eligible sweep performs
enum ReclaimBudget<K, V> {
    Batch(BatchFraction),
    Estimated(Box<dyn PressureRelief<K, V>>),
}

/// Applies the tier rules to an entry table
pub struct ReclaimSweeper<K, V> {
    budget: ReclaimBudget<K, V>,
}

impl<K, V> ReclaimSweeper<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Sweeper that reclaims a fixed fraction of persistent entries per eligible sweep
    pub fn with_batch_fraction(batch: BatchFraction) -> Self {
        Self {
            budget: ReclaimBudget::Batch(batch),
        }
    }

    /// Sweeper that reclaims persistent entries until the estimated relief
    /// brings pressure below the threshold
    pub fn with_relief<R>(estimator: R) -> Self
    where
        R: PressureRelief<K, V> + 'static,
    {
        Self {
            budget: ReclaimBudget::Estimated(Box::new(estimator)),
        }
    }

    /// Returns true if a relief estimator drives persistent reclamation
    pub fn has_estimator(&self) -> bool {
        matches!(self.budget, ReclaimBudget::Estimated(_))
    }

    /// Run one sweep over `table`
    pub(crate) fn sweep(
        &self,
        table: &mut EntryTable<K, V>,
        signal: &PressureSignal,
        trigger: SweepTrigger,
        protected: Option<&K>,
    ) -> SweepReport {
        let eager_reclaimed = table.remove_eager(protected);

        let persistent_reclaimed = if signal.persistent_eligible() {
            let victims = self.select_persistent(table, signal, protected);
            for key in &victims {
                if table.remove(key).is_some() {
                    trace!(tier = "persistent", "entry reclaimed");
                }
            }
            victims.len()
        } else {
            0
        };

        table.assert_consistent();

        let report = SweepReport {
            trigger,
            pressure: signal.level(),
            eager_reclaimed,
            persistent_reclaimed,
        };
        debug!(
            trigger = %report.trigger,
            pressure = %report.pressure,
            eager = report.eager_reclaimed,
            persistent = report.persistent_reclaimed,
            remaining = table.len(),
            "sweep complete"
        );
        report
    }

    fn select_persistent(
        &self,
        table: &EntryTable<K, V>,
        signal: &PressureSignal,
        protected: Option<&K>,
    ) -> Vec<K> {
        let candidates = table
            .persistent_by_recency()
            .filter(|(key, _)| Some(*key) != protected);

        match &self.budget {
            ReclaimBudget::Batch(batch) => {
                let candidates: Vec<&K> = candidates.map(|(key, _)| key).collect();
                let count = batch.batch_size(candidates.len());
                candidates.into_iter().take(count).cloned().collect()
            }
            ReclaimBudget::Estimated(estimator) => {
                let needed = f64::from(signal.levels_above_threshold());
                let mut relieved = 0.0;
                let mut victims = Vec::new();
                for (key, entry) in candidates {
                    if relieved >= needed {
                        break;
                    }
                    relieved += estimator.relief(key, entry.value()).max(0.0);
                    victims.push(key.clone());
                }
                victims
            }
        }
    }

    /// Reclaim least recently accessed persistent entries until at most
    /// `limit` entries remain, returning how many were reclaimed
    ///
    /// Eager entries are expected to have been swept already; only the
    /// `protected` key can survive this loop past `limit`.
    pub(crate) fn reclaim_to_fit(
        &self,
        table: &mut EntryTable<K, V>,
        limit: usize,
        protected: Option<&K>,
    ) -> usize {
        let mut evicted = 0;
        while table.len() > limit {
            let Some(key) = table.oldest_persistent(protected) else {
                break;
            };
            table.remove(&key);
            evicted += 1;
            trace!(limit, "persistent entry evicted for capacity");
        }
        table.assert_consistent();
        evicted
    }
}

impl<K, V> Default for ReclaimSweeper<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::with_batch_fraction(BatchFraction::default())
    }
}

impl<K, V> fmt::Debug for ReclaimSweeper<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.budget {
            ReclaimBudget::Batch(batch) => f
                .debug_struct("ReclaimSweeper")
                .field("batch_fraction", &batch.fraction())
                .finish(),
            ReclaimBudget::Estimated(_) => f
                .debug_struct("ReclaimSweeper")
                .field("estimator", &"<dyn PressureRelief>")
                .finish(),
        }
    }
}
