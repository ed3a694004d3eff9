use crate::models::Listing;
use serde::{Deserialize, Serialize};

/// Body of `POST /listings/import`
#[derive(Debug, Serialize)]
pub struct ImportRequest<'a> {
    pub listings: &'a [Listing],
}

/// One listing the catalog refused, with its validation messages
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemError {
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Per-batch result of an import, or the running total over several batches
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImportSummary {
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub errors: Vec<ItemError>,
}

impl ImportSummary {
    pub fn absorb(&mut self, batch: ImportSummary) {
        self.created += batch.created;
        self.updated += batch.updated;
        self.errors.extend(batch.errors);
    }

    pub fn accepted(&self) -> u64 {
        self.created + self.updated
    }
}
