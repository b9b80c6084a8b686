use std::collections::{HashMap, HashSet};

use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::binder::{BinderContext, Resolution};
use crate::error::{CategorizeError, Result};
use crate::nav::{NavEntry, NavIndex};
use crate::part::{EnrichedPart, Fragment, SectionRef};
use crate::reader::PartReader;
use crate::store::{Checkpoint, PartStore};
use crate::text::Normalizer;

/// How content parts find their book and chapter.
pub enum Strategy {
    /// Look parts up in a table of contents keyed by start page.
    Navigation(NavIndex),
    /// Infer book and chapter boundaries from the header parts themselves.
    Sequential,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Navigation(_) => "navigation",
            Strategy::Sequential => "sequential",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub resume: bool,
    pub limit: Option<u32>,
    pub chunk_size: u32,
    pub checkpoint_every: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            resume: false,
            limit: None,
            chunk_size: 500,
            checkpoint_every: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub first_id: u32,
    pub last_id: u32,
    pub total: u32,
    pub headers: u32,
    pub content: u32,
    pub books: u32,
    pub chapters: u32,
    pub double_writes: u32,
    pub finished: bool,
}

impl RunStats {
    pub fn processed(&self) -> u32 {
        self.headers + self.content
    }
}

/// Header records already looked up this run, keyed by start page. The snapshot is
/// rebuilt per lookup since a book and its first chapter may share a page.
struct SectionCache {
    records: HashMap<u32, EnrichedPart>,
}

impl SectionCache {
    fn new() -> Self {
        SectionCache {
            records: HashMap::new(),
        }
    }

    /// Snapshot the record at `entry.page` under the entry's name, reading the written
    /// output when it exists and materializing it from the raw part otherwise.
    fn resolve<S: PartStore + ?Sized>(
        &mut self,
        store: &S,
        reader: &PartReader<'_>,
        entry: &NavEntry,
    ) -> Result<SectionRef> {
        if let Some(record) = self.records.get(&entry.page) {
            return Ok(record.section(Some(entry.name.clone())));
        }
        let record = match store.read_categorized(entry.page)? {
            Some(record) => record,
            None => {
                debug!(page = entry.page, "header not written yet, reading raw part");
                reader.fetch_one(store, entry.page)?.to_record()
            }
        };
        let section = record.section(Some(entry.name.clone()));
        self.records.insert(entry.page, record);
        Ok(section)
    }

    fn forget(&mut self, page: u32) {
        self.records.remove(&page);
    }
}

/// One pass over parts `1..=N` (or from the checkpoint on), writing one record per part.
pub fn run<S: PartStore + ?Sized>(
    store: &mut S,
    normalizer: &Normalizer,
    strategy: &Strategy,
    opts: &RunOptions,
    progress: &ProgressBar,
) -> Result<RunStats> {
    let total = store.part_count()?;

    let checkpoint = if opts.resume {
        store.load_checkpoint()?
    } else {
        store.clear_checkpoint()?;
        None
    };
    let (start, context) = match checkpoint {
        Some(cp) if cp.strategy != strategy.name() => {
            return Err(CategorizeError::CheckpointMismatch {
                expected: strategy.name().to_string(),
                found: cp.strategy,
            });
        }
        Some(cp) => {
            info!(next_id = cp.next_id, saved = %cp.updated_at, "resuming from checkpoint");
            (cp.next_id, cp.context.unwrap_or_default())
        }
        None => (1, BinderContext::new()),
    };

    let end = match opts.limit {
        Some(n) => start.saturating_add(n).saturating_sub(1).min(total),
        None => total,
    };

    let mut stats = RunStats {
        first_id: start,
        last_id: start.saturating_sub(1),
        total,
        ..Default::default()
    };
    if start > end {
        info!(total, start, "nothing to categorize");
        stats.finished = start > total;
        return Ok(stats);
    }

    info!(strategy = strategy.name(), from = start, to = end, total, "categorizing parts");
    progress.set_length(u64::from(end - start + 1));

    let mut reader = PartReader::new(normalizer, total, opts.chunk_size);
    let mut pass = Pass {
        strategy: strategy.name(),
        every: opts.checkpoint_every.max(1),
        stats,
    };

    match strategy {
        Strategy::Sequential => {
            let mut ctx = context;
            let mut books = HashSet::new();
            let mut chapters = HashSet::new();
            for id in start..=end {
                let step = ctx.step(id, total, |i| reader.fetch(&*store, i))?;
                match step.resolution {
                    Resolution::Book(b) => {
                        books.insert(b);
                    }
                    Resolution::Chapter(c) => {
                        chapters.insert(c);
                    }
                    Resolution::Content | Resolution::Continued => {}
                }
                store.write_categorized(&step.fragment.to_record())?;
                pass.done(&step.fragment);
                pass.maybe_checkpoint(store, id, Some(&ctx))?;
                progress.inc(1);
            }
            pass.stats.books = books.len() as u32;
            pass.stats.chapters = chapters.len() as u32;
            pass.finish(store, end, Some(&ctx))?;
        }
        Strategy::Navigation(index) => {
            let mut cache = SectionCache::new();
            let mut books = HashSet::new();
            let mut chapters = HashSet::new();
            for id in start..=end {
                let fragment = match reader.fetch(&*store, id)? {
                    Fragment::Header(header) => Fragment::Header(header),
                    Fragment::Content(mut content) => {
                        let loc = index.locate(id)?;
                        books.insert(loc.book.page);
                        chapters.insert(loc.chapter.page);
                        content.book = Some(cache.resolve(&*store, &reader, loc.book)?);
                        if loc.chapter.page == id {
                            // The chapter title and its first narration share this part:
                            // write the title view first so the chapter snapshot reads it back.
                            store.write_categorized(&Fragment::Content(content.clone()).to_record())?;
                            pass.stats.double_writes += 1;
                            cache.forget(id);
                        }
                        content.chapter = Some(cache.resolve(&*store, &reader, loc.chapter)?);
                        Fragment::Content(content)
                    }
                };
                store.write_categorized(&fragment.to_record())?;
                pass.done(&fragment);
                pass.maybe_checkpoint(store, id, None)?;
                progress.inc(1);
            }
            pass.stats.books = books.len() as u32;
            pass.stats.chapters = chapters.len() as u32;
            pass.finish(store, end, None)?;
        }
    }

    info!(
        processed = pass.stats.processed(),
        headers = pass.stats.headers,
        content = pass.stats.content,
        books = pass.stats.books,
        chapters = pass.stats.chapters,
        "pass complete"
    );
    Ok(pass.stats)
}

struct Pass {
    strategy: &'static str,
    every: u32,
    stats: RunStats,
}

impl Pass {
    fn done(&mut self, fragment: &Fragment) {
        match fragment {
            Fragment::Header(_) => self.stats.headers += 1,
            Fragment::Content(_) => self.stats.content += 1,
        }
        self.stats.last_id = fragment.id();
        debug!(part = fragment.id(), kind = fragment.kind().as_str(), "written");
    }

    fn maybe_checkpoint<S: PartStore + ?Sized>(
        &self,
        store: &mut S,
        id: u32,
        context: Option<&BinderContext>,
    ) -> Result<()> {
        if (id - self.stats.first_id + 1) % self.every == 0 {
            store.save_checkpoint(&Checkpoint::new(self.strategy, id + 1, context.cloned()))?;
        }
        Ok(())
    }

    /// Drop the checkpoint after the last part, otherwise record where to pick up.
    fn finish<S: PartStore + ?Sized>(
        &mut self,
        store: &mut S,
        end: u32,
        context: Option<&BinderContext>,
    ) -> Result<()> {
        if end >= self.stats.total {
            store.clear_checkpoint()?;
            self.stats.finished = true;
        } else {
            store.save_checkpoint(&Checkpoint::new(self.strategy, end + 1, context.cloned()))?;
        }
        Ok(())
    }
}
