pub mod json_dir;
pub mod sqlite;

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::binder::BinderContext;
use crate::error::Result;
use crate::part::{EnrichedPart, PartKind, RawPart};

pub use json_dir::JsonDirStore;
pub use sqlite::SqliteStore;

/// Where a pass stopped. `context` is only set for the sequential strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub strategy: String,
    pub next_id: u32,
    #[serde(default)]
    pub context: Option<BinderContext>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(strategy: &str, next_id: u32, context: Option<BinderContext>) -> Self {
        Checkpoint {
            strategy: strategy.to_string(),
            next_id,
            context,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub parts: u32,
    pub categorized: u32,
    pub headers: u32,
    pub content: u32,
    pub unbound: u32,
    pub checkpoint: Option<u32>,
}

/// Raw parts in, enriched records out, both addressed by the part's position.
pub trait PartStore {
    /// Number of raw parts; ids run densely from 1 to this value.
    fn part_count(&self) -> Result<u32>;

    fn read_part(&self, id: u32) -> Result<RawPart>;

    fn read_parts(&self, ids: RangeInclusive<u32>) -> Result<Vec<RawPart>> {
        ids.map(|id| self.read_part(id)).collect()
    }

    fn read_categorized(&self, id: u32) -> Result<Option<EnrichedPart>>;

    /// Write the record for `part.id`, replacing any earlier write to the same slot.
    fn write_categorized(&mut self, part: &EnrichedPart) -> Result<()>;

    fn load_checkpoint(&self) -> Result<Option<Checkpoint>>;

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()>;

    fn clear_checkpoint(&mut self) -> Result<()>;

    /// Records whose search form contains `needle`, in id order.
    fn search(&self, needle: &str, limit: usize) -> Result<Vec<EnrichedPart>> {
        let mut hits = Vec::new();
        for id in 1..=self.part_count()? {
            if hits.len() >= limit {
                break;
            }
            if let Some(record) = self.read_categorized(id)? {
                if record.no_tashkeel_content.contains(needle) {
                    hits.push(record);
                }
            }
        }
        Ok(hits)
    }

    fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats {
            parts: self.part_count()?,
            checkpoint: self.load_checkpoint()?.map(|c| c.next_id),
            ..Default::default()
        };
        for id in 1..=stats.parts {
            let Some(record) = self.read_categorized(id)? else {
                continue;
            };
            stats.categorized += 1;
            match record.kind() {
                PartKind::Header => stats.headers += 1,
                PartKind::Content => {
                    stats.content += 1;
                    if record.chapter.is_none() {
                        stats.unbound += 1;
                    }
                }
            }
        }
        Ok(stats)
    }
}
