//! Seen-state bookkeeping: which matching items are new, which listings disappeared.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use ngof_core::{Opportunity, SeenDatabase, SeenRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    pub new_items: Vec<Opportunity>,
    pub pruned: usize,
}

/// Insert a snapshot for every item whose id is not yet tracked and return those items.
/// Existing records are never touched.
pub fn record_new(db: &mut SeenDatabase, items: &[Opportunity], now: DateTime<Utc>) -> Vec<Opportunity> {
    let mut new_items = Vec::new();
    for item in items {
        if db.contains(item.id()) {
            continue;
        }
        db.funding
            .insert(item.id().to_string(), SeenRecord::snapshot(item, now));
        new_items.push(item.clone());
    }
    new_items
}

/// Drop every record whose id was not scraped this run. Returns how many were removed.
pub fn prune(db: &mut SeenDatabase, current_ids: &HashSet<String>) -> usize {
    let before = db.funding.len();
    db.funding.retain(|id, _| current_ids.contains(id));
    before - db.funding.len()
}

/// `record_new` followed by `prune`. `current_ids` covers every scraped item, matching or not.
pub fn diff(
    db: &mut SeenDatabase,
    matching: &[Opportunity],
    current_ids: &HashSet<String>,
    now: DateTime<Utc>,
) -> DiffOutcome {
    let new_items = record_new(db, matching, now);
    let pruned = prune(db, current_ids);
    DiffOutcome { new_items, pruned }
}
