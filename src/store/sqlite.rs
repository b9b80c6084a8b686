use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::error::{CategorizeError, Result};
use crate::part::{EnrichedPart, PartKind, RawPart};

use super::{Checkpoint, PartStore, StoreStats};

/// Raw parts and enriched records as rows keyed by part id.
///
/// Record writes accumulate in one transaction that is committed together with
/// the next checkpoint, so a resumed pass never sees records past its checkpoint.
pub struct SqliteStore {
    conn: Connection,
    in_tx: bool,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(SqliteStore { conn, in_tx: false })
    }

    /// Insert or update raw parts in a single transaction.
    pub fn import_parts(&mut self, parts: &[RawPart]) -> Result<usize> {
        self.commit()?;
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO parts (id, raw) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET raw = excluded.raw, imported_at = datetime('now')",
            )?;
            for part in parts {
                count += stmt.execute(params![part.id, serde_json::to_string(part)?])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_tx {
            self.conn.execute_batch("BEGIN")?;
            self.in_tx = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_tx {
            self.conn.execute_batch("COMMIT")?;
            self.in_tx = false;
        }
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS parts (
            id          INTEGER PRIMARY KEY,
            raw         TEXT NOT NULL,
            imported_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS categorized_parts (
            id                  INTEGER PRIMARY KEY REFERENCES parts(id),
            kind                TEXT NOT NULL CHECK(kind IN ('header','content')),
            book_id             INTEGER,
            chapter_id          INTEGER,
            content             TEXT NOT NULL,
            no_tashkeel_content TEXT NOT NULL,
            record              TEXT NOT NULL,
            categorized_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_categorized_book ON categorized_parts(book_id);
        CREATE INDEX IF NOT EXISTS idx_categorized_chapter ON categorized_parts(chapter_id);

        CREATE TABLE IF NOT EXISTS checkpoints (
            id          INTEGER PRIMARY KEY CHECK(id = 1),
            checkpoint  TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Escape LIKE wildcards so the needle matches literally.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl PartStore for SqliteStore {
    fn part_count(&self) -> Result<u32> {
        let n: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM parts", [], |r| r.get(0))?;
        Ok(n)
    }

    fn read_part(&self, id: u32) -> Result<RawPart> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT raw FROM parts WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        let raw = raw.ok_or(CategorizeError::MissingPart { part: id })?;
        RawPart::from_json(id, &raw)
    }

    fn read_parts(&self, ids: std::ops::RangeInclusive<u32>) -> Result<Vec<RawPart>> {
        let (from, to) = (*ids.start(), *ids.end());
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, raw FROM parts WHERE id BETWEEN ?1 AND ?2 ORDER BY id")?;
        let rows = stmt
            .query_map(params![from, to], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut parts = Vec::with_capacity(rows.len());
        let mut expected = from;
        for (id, raw) in rows {
            if id != expected {
                return Err(CategorizeError::MissingPart { part: expected });
            }
            parts.push(RawPart::from_json(id, &raw)?);
            expected += 1;
        }
        if from <= to && expected <= to {
            return Err(CategorizeError::MissingPart { part: expected });
        }
        Ok(parts)
    }

    fn read_categorized(&self, id: u32) -> Result<Option<EnrichedPart>> {
        let record: Option<String> = self
            .conn
            .query_row(
                "SELECT record FROM categorized_parts WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn write_categorized(&mut self, part: &EnrichedPart) -> Result<()> {
        self.begin()?;
        let record = serde_json::to_string(part)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO categorized_parts
             (id, kind, book_id, chapter_id, content, no_tashkeel_content, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        stmt.execute(params![
            part.id,
            part.kind().as_str(),
            part.book.as_ref().map(|b| b.id),
            part.chapter.as_ref().map(|c| c.id),
            part.content,
            part.no_tashkeel_content,
            record,
        ])?;
        Ok(())
    }

    fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT checkpoint FROM checkpoints WHERE id = 1", [], |r| r.get(0))
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.begin()?;
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints (id, checkpoint) VALUES (1, ?1)",
            params![serde_json::to_string(checkpoint)?],
        )?;
        self.commit()
    }

    fn clear_checkpoint(&mut self) -> Result<()> {
        self.begin()?;
        self.conn.execute("DELETE FROM checkpoints", [])?;
        self.commit()
    }

    fn search(&self, needle: &str, limit: usize) -> Result<Vec<EnrichedPart>> {
        let mut stmt = self.conn.prepare(
            "SELECT record FROM categorized_parts
             WHERE no_tashkeel_content LIKE ?1 ESCAPE '\\'
             ORDER BY id LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![like_pattern(needle), limit as i64], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut hits = Vec::with_capacity(rows.len());
        for json in rows {
            hits.push(serde_json::from_str(&json)?);
        }
        Ok(hits)
    }

    fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<u32> { Ok(self.conn.query_row(sql, [], |r| r.get(0))?) };
        Ok(StoreStats {
            parts: self.part_count()?,
            categorized: count("SELECT COUNT(*) FROM categorized_parts")?,
            headers: count("SELECT COUNT(*) FROM categorized_parts WHERE kind = 'header'")?,
            content: count("SELECT COUNT(*) FROM categorized_parts WHERE kind = 'content'")?,
            unbound: count(
                "SELECT COUNT(*) FROM categorized_parts WHERE kind = 'content' AND chapter_id IS NULL",
            )?,
            checkpoint: self.load_checkpoint()?.map(|c| c.next_id),
        })
    }
}

/// Records written after the last checkpoint are discarded; a resumed pass redoes them.
impl Drop for SqliteStore {
    fn drop(&mut self) {
        if self.in_tx {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rolling back uncheckpointed records failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn raw(id: u32, content: &str, hadith: Option<i64>) -> RawPart {
        RawPart {
            id,
            content: content.to_string(),
            hadith,
            caption_id: None,
            extra: Map::new(),
        }
    }

    fn record(id: u32, text: &str, hadith: Option<i64>) -> EnrichedPart {
        EnrichedPart {
            id,
            content: text.to_string(),
            no_tashkeel_content: text.to_string(),
            hadith,
            caption_id: None,
            book: None,
            chapter: None,
            extra: Map::new(),
        }
    }

    fn store_with(parts: &[RawPart]) -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.import_parts(parts).unwrap();
        store
    }

    #[test]
    fn import_and_read() {
        let store = store_with(&[raw(1, "كتاب", None), raw(2, "حديث", Some(1))]);
        assert_eq!(store.part_count().unwrap(), 2);
        assert_eq!(store.read_part(2).unwrap().hadith, Some(1));
        let parts = store.read_parts(1..=2).unwrap();
        assert_eq!(parts.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn reimport_replaces() {
        let mut store = store_with(&[raw(1, "old", None)]);
        store.import_parts(&[raw(1, "new", None)]).unwrap();
        assert_eq!(store.part_count().unwrap(), 1);
        assert_eq!(store.read_part(1).unwrap().content, "new");
    }

    #[test]
    fn reimport_keeps_categorized_records() {
        let mut store = store_with(&[raw(1, "old", None)]);
        store.write_categorized(&record(1, "old", None)).unwrap();
        store.commit().unwrap();
        store.import_parts(&[raw(1, "new", None)]).unwrap();
        assert_eq!(store.read_part(1).unwrap().content, "new");
        assert!(store.read_categorized(1).unwrap().is_some());
    }

    #[test]
    fn gaps_are_reported() {
        let store = store_with(&[raw(1, "a", None), raw(3, "c", None)]);
        assert!(matches!(
            store.read_part(2).unwrap_err(),
            CategorizeError::MissingPart { part: 2 }
        ));
        assert!(matches!(
            store.read_parts(1..=3).unwrap_err(),
            CategorizeError::MissingPart { part: 2 }
        ));
        assert!(matches!(
            store.read_parts(3..=4).unwrap_err(),
            CategorizeError::MissingPart { part: 4 }
        ));
    }

    #[test]
    fn stored_json_with_wrong_id_is_malformed() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute("INSERT INTO parts (id, raw) VALUES (1, ?1)", params![r#"{"id": 2, "content": ""}"#])
            .unwrap();
        assert!(matches!(
            store.read_part(1).unwrap_err(),
            CategorizeError::MalformedInput { part: 1, .. }
        ));
    }

    #[test]
    fn second_write_overwrites_first() {
        let mut store = store_with(&[raw(1, "a", Some(1))]);
        let mut rec = record(1, "a", Some(1));
        store.write_categorized(&rec).unwrap();
        rec.extra.insert("note".into(), json!("second"));
        store.write_categorized(&rec).unwrap();
        let back = store.read_categorized(1).unwrap().unwrap();
        assert_eq!(back.extra.get("note"), Some(&json!("second")));
        assert_eq!(store.stats().unwrap().categorized, 1);
    }

    #[test]
    fn search_matches_literally() {
        let mut store = store_with(&[
            raw(1, "a", Some(1)),
            raw(2, "b", Some(2)),
            raw(3, "c", Some(3)),
        ]);
        store.write_categorized(&record(1, "انما الاعمال بالنيات", Some(1))).unwrap();
        store.write_categorized(&record(2, "بني الاسلام على خمس", Some(2))).unwrap();
        store.write_categorized(&record(3, "100% _sure_", Some(3))).unwrap();

        let hits = store.search("الاعمال", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
        assert_eq!(store.search("%", 10).unwrap().len(), 1);
        assert_eq!(store.search("_", 10).unwrap().len(), 1);
        assert_eq!(store.search("ال", 1).unwrap().len(), 1);
    }

    #[test]
    fn stats_counts_kinds() {
        let mut store = store_with(&[raw(1, "h", None), raw(2, "c", Some(1)), raw(3, "c", Some(2))]);
        store.write_categorized(&record(1, "h", None)).unwrap();
        let mut bound = record(2, "c", Some(1));
        bound.chapter = Some(record(1, "h", None).section(None));
        store.write_categorized(&bound).unwrap();
        store.write_categorized(&record(3, "c", Some(2))).unwrap();
        store.save_checkpoint(&Checkpoint::new("sequential", 4, None)).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(
            stats,
            StoreStats {
                parts: 3,
                categorized: 3,
                headers: 1,
                content: 2,
                unbound: 1,
                checkpoint: Some(4),
            }
        );
    }

    #[test]
    fn records_past_the_checkpoint_are_dropped_with_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hadith.sqlite");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.import_parts(&[raw(1, "a", None), raw(2, "b", Some(1))]).unwrap();
            store.write_categorized(&record(1, "a", None)).unwrap();
            store.save_checkpoint(&Checkpoint::new("sequential", 2, None)).unwrap();
            store.write_categorized(&record(2, "b", Some(1))).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.read_categorized(1).unwrap().is_some());
        assert!(store.read_categorized(2).unwrap().is_none());
        assert_eq!(store.load_checkpoint().unwrap().unwrap().next_id, 2);
    }

    #[test]
    fn uncommitted_writes_are_visible_to_reads() {
        let mut store = store_with(&[raw(1, "h", None)]);
        store.write_categorized(&record(1, "h", None)).unwrap();
        assert!(store.in_tx);
        assert!(store.read_categorized(1).unwrap().is_some());
        store.clear_checkpoint().unwrap();
        assert!(!store.in_tx);
    }
}
