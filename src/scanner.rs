//! Finds tweets that are referenced but not held.

use crate::collection::TweetCollection;
use crate::model::compare_ids;
use std::collections::BTreeSet;

/// Ids referenced as a reply parent or quoted tweet but absent from the
/// collection.
pub type MissingReferenceSet = BTreeSet<String>;

/// Scan every tweet's references against the collection.
#[must_use]
pub fn missing_references(collection: &TweetCollection) -> MissingReferenceSet {
    collection
        .iter()
        .flat_map(|tweet| tweet.references())
        .filter(|id| !collection.contains(id))
        .map(String::from)
        .collect()
}

/// Where the missing references stand after a backfill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceDiagnostics {
    /// Ids that were missing before backfill.
    pub initial: MissingReferenceSet,
    /// Of those, how many are now present.
    pub resolved: usize,
    /// Every id still missing, including ones first referenced by backfilled
    /// tweets.
    pub unresolved: MissingReferenceSet,
    /// Unresolved ids that were not in `initial`. These are not chased.
    pub newly_discovered: MissingReferenceSet,
}

impl ReferenceDiagnostics {
    /// Re-scan `collection` and compare with the pre-backfill set.
    #[must_use]
    pub fn after_backfill(initial: MissingReferenceSet, collection: &TweetCollection) -> Self {
        let unresolved = missing_references(collection);
        let resolved = initial.iter().filter(|id| collection.contains(id)).count();
        let newly_discovered = unresolved.difference(&initial).cloned().collect();
        Self {
            initial,
            resolved,
            unresolved,
            newly_discovered,
        }
    }

    /// Unresolved ids in numeric order, for output.
    #[must_use]
    pub fn unresolved_sorted(&self) -> Vec<String> {
        sorted_ids(&self.unresolved)
    }
}

/// Ids in numeric order.
#[must_use]
pub fn sorted_ids(ids: &MissingReferenceSet) -> Vec<String> {
    let mut out: Vec<String> = ids.iter().cloned().collect();
    out.sort_by(|a, b| compare_ids(a, b));
    out
}
