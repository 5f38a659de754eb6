//! Resume point and batch partitioning of the scan.

/// Block to resume scanning from.
///
/// The highest persisted block is scanned again, since a crash may have interrupted its batch
/// half way; persistence is idempotent so this costs nothing but a query. Without records the
/// scan starts at the earliest known deployment block, and without that at `head`.
pub fn resume_block(max_persisted: Option<u64>, min_deploy: Option<u64>, head: u64) -> u64 {
    match (max_persisted, min_deploy) {
        (Some(persisted), Some(deploy)) => persisted.max(deploy),
        (Some(persisted), None) => persisted,
        (None, Some(deploy)) => deploy,
        (None, None) => head,
    }
}

/// Inclusive block interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    /// First block
    pub from: u64,
    /// Last block
    pub to: u64,
}

impl BlockRange {
    /// Checkpoint once this range is fully processed.
    pub const fn next(&self) -> u64 {
        self.to.saturating_add(1)
    }
}

/// Split `[from, head]` into consecutive ranges of at most `size` blocks.
pub fn batches(from: u64, head: u64, size: u64) -> impl Iterator<Item = BlockRange> {
    let size = size.max(1);
    let mut next = Some(from).filter(|from| *from <= head);
    std::iter::from_fn(move || {
        let from = next?;
        let to = from.saturating_add(size - 1).min(head);
        next = to.checked_add(1).filter(|n| *n <= head);
        Some(BlockRange { from, to })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_prefers_persisted_block() {
        assert_eq!(resume_block(Some(650), Some(100), 700), 650);
        assert_eq!(resume_block(Some(50), Some(100), 700), 100);
        assert_eq!(resume_block(Some(650), None, 700), 650);
    }

    #[test]
    fn resume_falls_back_to_deploy_then_head() {
        assert_eq!(resume_block(None, Some(100), 700), 100);
        assert_eq!(resume_block(None, None, 700), 700);
    }

    #[test]
    fn batches_cover_interval_without_gaps() {
        let ranges: Vec<_> = batches(100, 700, 500).collect();
        assert_eq!(
            ranges,
            [BlockRange { from: 100, to: 599 }, BlockRange { from: 600, to: 700 }]
        );
        assert_eq!(ranges[1].next(), 701);
    }

    #[test]
    fn batches_edge_cases() {
        assert_eq!(batches(701, 700, 500).count(), 0);
        assert_eq!(batches(700, 700, 500).collect::<Vec<_>>(), [BlockRange { from: 700, to: 700 }]);
        assert_eq!(batches(0, 9, 0).count(), 10);
        assert_eq!(
            batches(u64::MAX - 1, u64::MAX, 10).collect::<Vec<_>>(),
            [BlockRange { from: u64::MAX - 1, to: u64::MAX }]
        );
    }

    #[test]
    fn batches_are_monotonic_and_contiguous() {
        for size in [1, 3, 7, 500] {
            let ranges: Vec<_> = batches(10, 100, size).collect();
            assert_eq!(ranges.first().unwrap().from, 10);
            assert_eq!(ranges.last().unwrap().to, 100);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].next(), pair[1].from);
                assert!(pair[0].to - pair[0].from < size);
            }
        }
    }
}
