//! Pending Set Module
//!
//! Holds sectors that were registered but not yet submitted, their cutoffs,
//! and the callers waiting on each sector's outcome. A single mutex guards all
//! three maps; every critical section is a map mutation, nothing blocks while
//! the lock is held.
//!
//! Every registration gets a generation number. A processing step works on a
//! [`Snapshot`] taken outside the lock, and completing it only releases the
//! registrations that snapshot saw: a sector registered again while its
//! message is in flight stays queued, with its new payload, for a later step.

use crate::{PreCommitBatchRes, SectorNumber, SectorPreCommitInfo, TokenAmount};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A sector waiting to be pre-committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub deposit: TokenAmount,
    pub info: SectorPreCommitInfo,
}

/// Queued entry tagged with the registration that installed it.
struct Queued {
    generation: u64,
    entry: PendingEntry,
}

/// Caller blocked on a sector, tagged with its registration.
struct Waiter {
    generation: u64,
    tx: oneshot::Sender<PreCommitBatchRes>,
}

#[derive(Default)]
struct PendingState {
    next_generation: u64,
    cutoffs: HashMap<SectorNumber, Instant>,
    todo: HashMap<SectorNumber, Queued>,
    waiting: HashMap<SectorNumber, Vec<Waiter>>,
}

/// Pending entries as of one moment, ascending by sector number.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub entries: Vec<(SectorNumber, PendingEntry)>,
    /// Generation of each entry at snapshot time.
    generations: HashMap<SectorNumber, u64>,
}

#[derive(Default)]
pub struct PendingSet {
    state: Mutex<PendingState>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        // Every critical section leaves the maps consistent, so a poisoned
        // guard is still safe to use.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install or replace `sector`'s entry and add a waiter for its result.
    ///
    /// Re-registering replaces the deposit and payload, and the cutoff is
    /// taken from this registration alone.
    pub fn register(
        &self,
        sector: SectorNumber,
        cutoff: Option<Instant>,
        entry: PendingEntry,
    ) -> oneshot::Receiver<PreCommitBatchRes> {
        let (tx, rx) = oneshot::channel();

        let mut state = self.lock();
        state.next_generation += 1;
        let generation = state.next_generation;

        match cutoff {
            Some(c) => state.cutoffs.insert(sector, c),
            None => state.cutoffs.remove(&sector),
        };
        state.todo.insert(sector, Queued { generation, entry });
        state
            .waiting
            .entry(sector)
            .or_default()
            .push(Waiter { generation, tx });

        rx
    }

    pub fn len(&self) -> usize {
        self.lock().todo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every pending entry, ascending by sector number.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();

        let mut entries: Vec<_> = state
            .todo
            .iter()
            .map(|(sn, q)| (*sn, q.entry.clone()))
            .collect();
        entries.sort_unstable_by_key(|(sn, _)| *sn);

        let generations = state
            .todo
            .iter()
            .map(|(sn, q)| (*sn, q.generation))
            .collect();

        Snapshot {
            entries,
            generations,
        }
    }

    /// Queued sector numbers, ascending.
    pub fn sector_numbers(&self) -> Vec<SectorNumber> {
        let mut out: Vec<_> = self.lock().todo.keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// Cutoffs of all queued sectors and of every sector with waiters, or
    /// `None` when nothing is queued.
    pub fn cutoffs(&self) -> Option<Vec<Option<Instant>>> {
        let state = self.lock();
        if state.todo.is_empty() {
            return None;
        }
        Some(
            state
                .todo
                .keys()
                .chain(state.waiting.keys())
                .map(|sn| state.cutoffs.get(sn).copied())
                .collect(),
        )
    }

    /// Deliver `res` to the waiters `snapshot` covered and forget their sectors.
    ///
    /// Registrations newer than the snapshot keep their entry, cutoff and
    /// waiters. Returns the number of waiters that were handed the result.
    pub fn complete(&self, snapshot: &Snapshot, res: &PreCommitBatchRes) -> usize {
        let mut delivered = 0;
        let mut state = self.lock();

        for sn in &res.sectors {
            let Some(&seen) = snapshot.generations.get(sn) else {
                continue;
            };

            let waiters = state.waiting.remove(sn).unwrap_or_default();
            let (covered, later): (Vec<_>, Vec<_>) =
                waiters.into_iter().partition(|w| w.generation <= seen);
            for w in covered {
                // A dropped receiver means that caller gave up; others still get it.
                if w.tx.send(res.clone()).is_ok() {
                    delivered += 1;
                }
            }
            if !later.is_empty() {
                state.waiting.insert(*sn, later);
            }

            if state.todo.get(sn).is_some_and(|q| q.generation == seen) {
                state.todo.remove(sn);
                state.cutoffs.remove(sn);
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(sn: SectorNumber, deposit: TokenAmount) -> PendingEntry {
        PendingEntry {
            deposit,
            info: SectorPreCommitInfo {
                seal_proof: 8,
                sector_number: sn,
                sealed_cid: format!("bagboea-{sn}"),
                seal_rand_epoch: 10,
                deal_ids: vec![],
                expiration: 100_000,
            },
        }
    }

    #[tokio::test]
    async fn test_reregister_replaces_entry_and_keeps_waiters() {
        let set = PendingSet::new();
        let mut first = set.register(7, None, entry(7, 5));
        let mut second = set.register(7, None, entry(7, 9));

        assert_eq!(set.len(), 1);
        let snapshot = set.snapshot();
        assert_eq!(snapshot.entries[0].1.deposit, 9);

        let res = PreCommitBatchRes {
            sectors: vec![7],
            error: Some("boom".into()),
            ..Default::default()
        };
        assert_eq!(set.complete(&snapshot, &res), 2);
        assert!(set.is_empty());
        assert_eq!(first.try_recv().unwrap(), res);
        assert_eq!(second.try_recv().unwrap(), res);
    }

    #[tokio::test]
    async fn test_complete_skips_dropped_waiters() {
        let set = PendingSet::new();
        drop(set.register(1, None, entry(1, 1)));
        let mut kept = set.register(1, None, entry(1, 1));

        let snapshot = set.snapshot();
        let res = PreCommitBatchRes {
            sectors: vec![1],
            ..Default::default()
        };
        assert_eq!(set.complete(&snapshot, &res), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_registration_after_snapshot_stays_queued() {
        let set = PendingSet::new();
        let now = Instant::now();
        let mut early = set.register(3, None, entry(3, 5));
        let snapshot = set.snapshot();

        let mut late = set.register(3, Some(now + Duration::from_secs(60)), entry(3, 9));
        let mut other = set.register(4, None, entry(4, 1));

        let res = PreCommitBatchRes {
            sectors: vec![3],
            ..Default::default()
        };
        assert_eq!(set.complete(&snapshot, &res), 1);
        assert_eq!(early.try_recv().unwrap(), res);
        assert!(late.try_recv().is_err());
        assert!(other.try_recv().is_err());

        let next = set.snapshot();
        let queued: Vec<_> = next.entries.iter().map(|(sn, e)| (*sn, e.deposit)).collect();
        assert_eq!(queued, vec![(3, 9), (4, 1)]);
        assert_eq!(
            set.cutoffs().unwrap().into_iter().flatten().min(),
            Some(now + Duration::from_secs(60))
        );

        let res = PreCommitBatchRes {
            sectors: vec![3, 4],
            ..Default::default()
        };
        assert_eq!(set.complete(&next, &res), 2);
        assert!(set.is_empty());
        assert_eq!(late.try_recv().unwrap(), res);
    }

    #[tokio::test]
    async fn test_snapshot_and_listing_sorted() {
        let set = PendingSet::new();
        for sn in [30, 10, 20] {
            let _ = set.register(sn, None, entry(sn, sn as TokenAmount));
        }
        assert_eq!(set.sector_numbers(), vec![10, 20, 30]);
        let snap: Vec<_> = set.snapshot().entries.into_iter().map(|(sn, _)| sn).collect();
        assert_eq!(snap, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_cutoffs_follow_latest_registration() {
        let set = PendingSet::new();
        assert!(set.cutoffs().is_none());

        let now = Instant::now();
        let _a = set.register(1, Some(now + Duration::from_secs(5)), entry(1, 1));
        let _b = set.register(1, None, entry(1, 1));
        let cutoffs = set.cutoffs().unwrap();
        assert!(cutoffs.iter().all(Option::is_none));
    }
}
