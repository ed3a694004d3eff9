//! Run-scoped deduplication of listings by (platform, external id).

use crate::models::{Listing, Platform};
use std::collections::HashSet;

/// Keeps the first listing seen for each key and drops the rest.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<(Platform, String)>,
    listings: Vec<Listing>,
    dropped: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the key was already taken
    pub fn insert(&mut self, listing: Listing) -> bool {
        if self.seen.insert((listing.platform, listing.external_id.clone())) {
            self.listings.push(listing);
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    /// Number of listings kept from `batch`
    pub fn extend(&mut self, batch: impl IntoIterator<Item = Listing>) -> usize {
        let mut kept = 0;
        for listing in batch {
            if self.insert(listing) {
                kept += 1;
            }
        }
        kept
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Unique listings in first-seen order
    pub fn into_listings(self) -> Vec<Listing> {
        self.listings
    }
}
