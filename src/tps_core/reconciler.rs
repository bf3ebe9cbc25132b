//! Merge confirmed and unconfirmed blocks into one set keyed by hash

use super::types::BlockRecord;
use std::collections::HashSet;

/// Union of both sets, deduplicated by block hash.
///
/// If either side is empty the other is returned as-is. Otherwise the result
/// is ordered by `(timestamp, hash)` so the output does not depend on which
/// argument a block came from.
pub fn reconcile(confirmed: Vec<BlockRecord>, unconfirmed: Vec<BlockRecord>) -> Vec<BlockRecord> {
    if unconfirmed.is_empty() {
        return confirmed;
    }
    if confirmed.is_empty() {
        return unconfirmed;
    }

    let mut seen: HashSet<String> = HashSet::with_capacity(confirmed.len() + unconfirmed.len());
    let mut merged: Vec<BlockRecord> = confirmed
        .into_iter()
        .chain(unconfirmed)
        .filter(|block| seen.insert(block.hash.clone()))
        .collect();

    merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.hash.cmp(&b.hash)));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tps_core::types::BlockOrigin;

    fn block(hash: &str, timestamp: i64, tx_count: u64, origin: BlockOrigin) -> BlockRecord {
        BlockRecord {
            hash: hash.to_string(),
            height: timestamp / 4,
            timestamp,
            tx_count,
            origin,
        }
    }

    fn hashes(blocks: &[BlockRecord]) -> HashSet<String> {
        blocks.iter().map(|b| b.hash.clone()).collect()
    }

    #[test]
    fn test_empty_side_returns_other() {
        let unconfirmed = vec![block("h3", 10, 3, BlockOrigin::Unconfirmed)];
        let merged = reconcile(Vec::new(), unconfirmed.clone());
        assert_eq!(merged, unconfirmed);

        let confirmed = vec![block("h1", 10, 5, BlockOrigin::Confirmed)];
        let merged = reconcile(confirmed.clone(), Vec::new());
        assert_eq!(merged, confirmed);
    }

    #[test]
    fn test_same_hash_in_both_sources() {
        let merged = reconcile(
            vec![block("h1", 10, 5, BlockOrigin::Confirmed)],
            vec![block("h1", 10, 5, BlockOrigin::Unconfirmed)],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].hash, "h1");
    }

    #[test]
    fn test_union_is_order_independent() {
        let a = vec![
            block("h1", 10, 5, BlockOrigin::Confirmed),
            block("h2", 14, 7, BlockOrigin::Confirmed),
        ];
        let b = vec![
            block("h2", 14, 7, BlockOrigin::Unconfirmed),
            block("h3", 18, 3, BlockOrigin::Unconfirmed),
        ];

        let ab = reconcile(a.clone(), b.clone());
        let ba = reconcile(b.clone(), a.clone());

        assert_eq!(hashes(&ab), hashes(&ba));
        assert_eq!(ab.len(), 3);
        assert!(ab.len() <= a.len() + b.len());

        let order: Vec<_> = ab.iter().map(|b| b.hash.as_str()).collect();
        assert_eq!(order, vec!["h1", "h2", "h3"]);
    }

    #[test]
    fn test_duplicates_within_one_source_collapse() {
        let merged = reconcile(
            vec![
                block("h1", 10, 5, BlockOrigin::Confirmed),
                block("h1", 10, 5, BlockOrigin::Confirmed),
            ],
            vec![block("h2", 12, 1, BlockOrigin::Unconfirmed)],
        );
        assert_eq!(merged.len(), 2);
    }
}
