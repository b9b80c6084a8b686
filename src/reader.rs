use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use crate::error::{CategorizeError, Result};
use crate::part::{Fragment, Part};
use crate::store::PartStore;
use crate::text::Normalizer;

/// Reads parts ahead in chunks and normalizes each chunk in parallel.
/// Callers still receive fragments one id at a time, in the order they ask.
pub struct PartReader<'n> {
    normalizer: &'n Normalizer,
    total: u32,
    chunk_size: u32,
    buffer: BTreeMap<u32, Part>,
}

impl<'n> PartReader<'n> {
    pub fn new(normalizer: &'n Normalizer, total: u32, chunk_size: u32) -> Self {
        PartReader {
            normalizer,
            total,
            chunk_size: chunk_size.max(1),
            buffer: BTreeMap::new(),
        }
    }

    pub fn fetch<S: PartStore + ?Sized>(&mut self, store: &S, id: u32) -> Result<Fragment> {
        if id == 0 || id > self.total {
            return Err(CategorizeError::MissingPart { part: id });
        }
        if !self.buffer.contains_key(&id) {
            self.fill(store, id)?;
        }
        self.buffer
            .remove(&id)
            .map(Fragment::classify)
            .ok_or(CategorizeError::MissingPart { part: id })
    }

    /// Read one part outside the chunk buffer, for lookups behind the current position.
    pub fn fetch_one<S: PartStore + ?Sized>(&self, store: &S, id: u32) -> Result<Fragment> {
        let raw = store.read_part(id)?;
        Ok(Fragment::classify(Part::normalize(raw, self.normalizer)))
    }

    fn fill<S: PartStore + ?Sized>(&mut self, store: &S, from: u32) -> Result<()> {
        let to = from.saturating_add(self.chunk_size - 1).min(self.total);
        let raws = store.read_parts(from..=to)?;
        let normalizer = self.normalizer;
        let parts: Vec<Part> = raws
            .into_par_iter()
            .map(|raw| Part::normalize(raw, normalizer))
            .collect();
        debug!(from, to, "normalized chunk");
        self.buffer.clear();
        self.buffer.extend(parts.into_iter().map(|p| (p.id, p)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::{PartKind, RawPart};
    use crate::store::SqliteStore;
    use crate::text::Diacritics;
    use serde_json::Map;

    fn store(n: u32) -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let parts: Vec<RawPart> = (1..=n)
            .map(|id| RawPart {
                id,
                content: format!("<p>نَص {}</p>", id),
                hadith: if id % 3 == 1 { None } else { Some(id as i64) },
                caption_id: None,
                extra: Map::new(),
            })
            .collect();
        store.import_parts(&parts).unwrap();
        store
    }

    #[test]
    fn yields_parts_in_order_across_chunks() {
        let store = store(10);
        let normalizer = Normalizer::new(Diacritics::embedded().unwrap());
        let mut reader = PartReader::new(&normalizer, 10, 4);
        for id in 1..=10 {
            let fragment = reader.fetch(&store, id).unwrap();
            assert_eq!(fragment.id(), id);
            assert_eq!(fragment.part().no_tashkeel_content, format!(" نص {}", id));
            let expected = if id % 3 == 1 { PartKind::Header } else { PartKind::Content };
            assert_eq!(fragment.kind(), expected);
        }
    }

    #[test]
    fn out_of_range_is_missing() {
        let store = store(3);
        let normalizer = Normalizer::new(Diacritics::embedded().unwrap());
        let mut reader = PartReader::new(&normalizer, 3, 2);
        assert!(matches!(
            reader.fetch(&store, 4).unwrap_err(),
            CategorizeError::MissingPart { part: 4 }
        ));
        assert!(reader.fetch(&store, 0).is_err());
    }

    #[test]
    fn fetch_behind_the_buffer() {
        let store = store(6);
        let normalizer = Normalizer::new(Diacritics::embedded().unwrap());
        let mut reader = PartReader::new(&normalizer, 6, 3);
        reader.fetch(&store, 4).unwrap();
        assert_eq!(reader.fetch_one(&store, 1).unwrap().id(), 1);
        assert_eq!(reader.fetch(&store, 5).unwrap().id(), 5);
    }
}
