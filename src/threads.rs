//! Conversation thread reconstruction.
//!
//! Tweets are grouped by conversation id. Within a group, a tweet whose reply
//! parent is outside the group is a candidate root, whether that parent lives
//! in another conversation or was never recovered. The earliest candidate
//! (lower id on a tie) becomes the root and every other tweet in the group
//! becomes one of its replies, oldest first. Only a reply cycle leaves a group
//! without a candidate; its tweets are reported as orphans instead.
//!
//! All orderings are total, so the same collection always produces the same
//! output.

use crate::collection::TweetCollection;
use crate::model::{Tweet, chronological, compare_ids};
use itertools::Itertools;
use std::collections::HashSet;

/// A root tweet and the rest of its conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread<'a> {
    pub root: &'a Tweet,
    /// Oldest first.
    pub replies: Vec<&'a Tweet>,
}

/// Result of reconstructing one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconstruction<'a> {
    /// Newest root first.
    pub threads: Vec<Thread<'a>>,
    /// Every tweet, newest first.
    pub flat: Vec<&'a Tweet>,
    /// Tweets of conversations whose replies form a cycle, newest first.
    pub orphans: Vec<&'a Tweet>,
    /// Ids of tweets whose reply parent is not in the collection, in id order.
    pub orphan_reply_ids: Vec<String>,
}

impl Reconstruction<'_> {
    /// Whether `id` replies to a tweet that is not in the collection.
    #[must_use]
    pub fn is_orphan_reply(&self, id: &str) -> bool {
        self.orphan_reply_ids
            .binary_search_by(|probe| compare_ids(probe, id))
            .is_ok()
    }
}

fn newest_first(a: &&Tweet, b: &&Tweet) -> std::cmp::Ordering {
    chronological(b, a)
}

/// Build threads, the flat view, and orphan diagnostics.
#[must_use]
pub fn reconstruct(collection: &TweetCollection) -> Reconstruction<'_> {
    let parent_missing = |tweet: &Tweet| {
        tweet
            .in_reply_to_status_id
            .as_deref()
            .is_some_and(|parent| !collection.contains(parent))
    };

    let mut threads = Vec::new();
    let mut orphans = Vec::new();

    let groups = collection
        .iter()
        .into_group_map_by(|tweet| tweet.conversation_id.as_str());

    for mut members in groups.into_values() {
        members.sort_by(|a, b| chronological(a, b));
        let member_ids: HashSet<&str> = members.iter().map(|t| t.id.as_str()).collect();

        let root_at = members.iter().position(|tweet| {
            tweet
                .in_reply_to_status_id
                .as_deref()
                .is_none_or(|parent| !member_ids.contains(parent))
        });

        match root_at {
            Some(index) => {
                let root = members.remove(index);
                threads.push(Thread {
                    root,
                    replies: members,
                });
            }
            None => orphans.extend(members),
        }
    }

    threads.sort_by(|a, b| newest_first(&a.root, &b.root));
    orphans.sort_by(newest_first);

    let mut flat: Vec<&Tweet> = collection.iter().collect();
    flat.sort_by(newest_first);

    let mut orphan_reply_ids: Vec<String> = collection
        .iter()
        .filter(|&tweet| parent_missing(tweet))
        .map(|tweet| tweet.id.clone())
        .collect();
    orphan_reply_ids.sort_by(|a, b| compare_ids(a, b));

    Reconstruction {
        threads,
        flat,
        orphans,
        orphan_reply_ids,
    }
}
