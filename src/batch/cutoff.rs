//! Cutoff Module
//!
//! Computes when each sector must be pre-committed by, and from that how long
//! the scheduling loop may sleep before it has to act.

use crate::{BatcherError, ChainEpoch, SectorInfo};
use std::time::Duration;
use tokio::time::Instant;

pub const EPOCHS_IN_DAY: ChainEpoch = 2880;
pub const CHAIN_FINALITY: ChainEpoch = 900;

/// How far behind the head a pre-commit's sealing ticket may be.
pub const MAX_PRECOMMIT_RANDOMNESS_LOOKBACK: ChainEpoch = EPOCHS_IN_DAY + CHAIN_FINALITY;

/// Shortest wait the loop ever sleeps. Never zero, so an overdue cutoff
/// cannot turn the loop into a busy spin.
pub const MIN_WAIT: Duration = Duration::from_nanos(1);

/// Last epoch at which `sector` can still be pre-committed: its ticket
/// lookback bound, or the start of its earliest deal if that comes first.
pub fn precommit_cutoff_epoch(sector: &SectorInfo) -> ChainEpoch {
    sector
        .pieces
        .iter()
        .filter_map(|p| p.deal_info.as_ref())
        .map(|d| d.start_epoch)
        .fold(
            sector.ticket_epoch + MAX_PRECOMMIT_RANDOMNESS_LOOKBACK,
            ChainEpoch::min,
        )
}

/// Wall-clock cutoff for `sector` given the current head height.
pub fn precommit_cutoff(
    cur_epoch: ChainEpoch,
    sector: &SectorInfo,
    now: Instant,
    block_delay: Duration,
) -> Result<Instant, BatcherError> {
    let cutoff = precommit_cutoff_epoch(sector);
    if cutoff <= cur_epoch {
        return Err(BatcherError::CutoffPassed {
            cutoff,
            current: cur_epoch,
        });
    }

    let epochs = u32::try_from(cutoff - cur_epoch).unwrap_or(u32::MAX);
    Ok(now + block_delay.saturating_mul(epochs))
}

/// How long the loop may wait before the next processing step.
///
/// `cutoffs` is `None` when nothing is queued. Sectors without a cutoff never
/// shorten the wait.
pub fn batch_wait(
    cutoffs: Option<Vec<Option<Instant>>>,
    max_wait: Duration,
    slack: Duration,
    now: Instant,
) -> Duration {
    let Some(earliest) = cutoffs.and_then(|c| c.into_iter().flatten().min()) else {
        return max_wait.max(MIN_WAIT);
    };

    match earliest.checked_sub(slack) {
        Some(target) if target > now => (target - now).min(max_wait).max(MIN_WAIT),
        _ => MIN_WAIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DealInfo, Piece};
    use rstest::rstest;

    fn sector(ticket_epoch: ChainEpoch, deal_starts: &[ChainEpoch]) -> SectorInfo {
        SectorInfo {
            sector_number: 1,
            ticket_epoch,
            pieces: deal_starts
                .iter()
                .enumerate()
                .map(|(i, start)| Piece {
                    size: 2048,
                    deal_info: Some(DealInfo {
                        deal_id: i as u64,
                        start_epoch: *start,
                    }),
                })
                .chain(std::iter::once(Piece {
                    size: 2048,
                    deal_info: None,
                }))
                .collect(),
        }
    }

    #[rstest]
    #[case(100, &[], 100 + MAX_PRECOMMIT_RANDOMNESS_LOOKBACK)]
    #[case(100, &[500, 300], 300)]
    #[case(100, &[10_000], 100 + MAX_PRECOMMIT_RANDOMNESS_LOOKBACK)]
    fn test_cutoff_epoch(
        #[case] ticket: ChainEpoch,
        #[case] deals: &[ChainEpoch],
        #[case] expected: ChainEpoch,
    ) {
        assert_eq!(precommit_cutoff_epoch(&sector(ticket, deals)), expected);
    }

    #[test]
    fn test_cutoff_converts_epochs_to_time() {
        let now = Instant::now();
        let cutoff = precommit_cutoff(250, &sector(100, &[300]), now, Duration::from_secs(30)).unwrap();
        assert_eq!(cutoff - now, Duration::from_secs(50 * 30));
    }

    #[test]
    fn test_passed_cutoff_rejected() {
        let res = precommit_cutoff(300, &sector(100, &[300]), Instant::now(), Duration::from_secs(30));
        assert_eq!(res, Err(BatcherError::CutoffPassed { cutoff: 300, current: 300 }));
    }

    #[test]
    fn test_wait_without_pending_is_max() {
        let max = Duration::from_secs(60);
        assert_eq!(batch_wait(None, max, Duration::ZERO, Instant::now()), max);
        assert_eq!(batch_wait(Some(vec![None, None]), max, Duration::ZERO, Instant::now()), max);
    }

    #[test]
    fn test_zero_max_wait_never_spins() {
        let now = Instant::now();
        assert_eq!(batch_wait(None, Duration::ZERO, Duration::ZERO, now), MIN_WAIT);
        let cutoffs = vec![Some(now + Duration::from_secs(30))];
        assert_eq!(batch_wait(Some(cutoffs), Duration::ZERO, Duration::ZERO, now), MIN_WAIT);
    }

    #[test]
    fn test_wait_tracks_earliest_cutoff_minus_slack() {
        let now = Instant::now();
        let cutoffs = vec![
            Some(now + Duration::from_secs(100)),
            None,
            Some(now + Duration::from_secs(20)),
        ];
        let wait = batch_wait(Some(cutoffs), Duration::from_secs(60), Duration::from_secs(5), now);
        assert_eq!(wait, Duration::from_secs(15));
    }

    #[test]
    fn test_wait_capped_by_max_wait() {
        let now = Instant::now();
        let cutoffs = vec![Some(now + Duration::from_secs(1_000))];
        let wait = batch_wait(Some(cutoffs), Duration::from_secs(60), Duration::ZERO, now);
        assert_eq!(wait, Duration::from_secs(60));
    }

    #[rstest]
    #[case(Duration::from_secs(10))]
    #[case(Duration::from_secs(20))]
    fn test_overdue_cutoff_collapses_to_min_wait(#[case] slack: Duration) {
        let now = Instant::now();
        let cutoffs = vec![Some(now + Duration::from_secs(10))];
        let wait = batch_wait(Some(cutoffs), Duration::from_secs(60), slack, now);
        assert_eq!(wait, MIN_WAIT);
    }
}
