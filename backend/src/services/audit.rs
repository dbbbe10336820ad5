use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::Connection;

/// Records sharing one unordered pair, with the one that should survive.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    pub pair: (Uuid, Uuid),
    pub keep: Connection,
    pub discard: Vec<Connection>,
}

/// Group records by unordered pair and report every pair with more than one.
///
/// The survivor is the most advanced status (accepted, then pending, then
/// declined), most recently updated on ties.
pub fn find_duplicate_pairs(records: &[Connection]) -> Vec<DuplicatePair> {
    let mut groups: BTreeMap<(Uuid, Uuid), Vec<Connection>> = BTreeMap::new();
    for record in records {
        groups.entry(record.pair()).or_default().push(record.clone());
    }

    groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .filter_map(|(pair, mut group)| {
            group.sort_by_key(|c| (c.status.rank(), c.updated_at, c.created_at));
            let keep = group.pop()?;
            Some(DuplicatePair { pair, keep, discard: group })
        })
        .collect()
}
