use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CategorizeError, Result};
use crate::part::{same_group, Fragment, HeaderFragment, SectionRef};

/// What a single step decided about the part it consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Content part, bound to the current book and chapter.
    Content,
    /// Header whose group continues in the next part; undecided until the group ends.
    Continued,
    /// Header group resolved as a book, identified by its first part.
    Book(u32),
    /// Header group resolved as a chapter, identified by its first part.
    Chapter(u32),
}

#[derive(Debug, Clone)]
pub struct Step {
    pub fragment: Fragment,
    pub resolution: Resolution,
}

/// Running state of a sequential pass, threaded through every step.
///
/// Books and chapters are told apart by what follows a header: another header
/// of a different group means the header opened a book, a content part means
/// it opened a chapter. Everything except the lookahead slot is checkpointed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinderContext {
    pub current_book: Option<SectionRef>,
    pub current_chapter: Option<SectionRef>,
    pub pending_first_part: Option<SectionRef>,
    #[serde(skip)]
    lookahead: Option<Fragment>,
}

impl BinderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume part `id` of `total`. `fetch` is only called for parts not already
    /// sitting in the lookahead slot.
    pub fn step<F>(&mut self, id: u32, total: u32, mut fetch: F) -> Result<Step>
    where
        F: FnMut(u32) -> Result<Fragment>,
    {
        let fragment = match self.lookahead.take() {
            Some(cached) if cached.id() == id => cached,
            _ => fetch(id)?,
        };

        match fragment {
            Fragment::Content(mut content) => {
                if self.current_book.is_none() && self.current_chapter.is_none() {
                    debug!(part = id, "content part before any header");
                }
                content.book = self.current_book.clone();
                content.chapter = self.current_chapter.clone();
                self.pending_first_part = None;
                Ok(Step {
                    fragment: Fragment::Content(content),
                    resolution: Resolution::Content,
                })
            }
            Fragment::Header(header) => {
                let next = if id < total { Some(fetch(id + 1)?) } else { None };
                let resolution = self.resolve_header(&header, next.as_ref());
                self.lookahead = next;
                Ok(Step {
                    fragment: Fragment::Header(header),
                    resolution,
                })
            }
        }
    }

    fn resolve_header(&mut self, header: &HeaderFragment, next: Option<&Fragment>) -> Resolution {
        // The first physical part of a group speaks for the whole group.
        let first = match self.pending_first_part.take() {
            Some(first) if same_group(first.group_key().as_ref(), header.group_key.as_ref()) => first,
            _ => header.section(None),
        };

        match next {
            Some(Fragment::Header(next)) if next.is_continuation_of(header) => {
                if let Some(key) = &header.group_key {
                    debug!(part = header.part.id, group = key.as_str(), first = first.id, "header continues");
                }
                self.pending_first_part = Some(first);
                Resolution::Continued
            }
            Some(Fragment::Header(_)) => {
                let id = first.id;
                debug!(part = header.part.id, book = id, "book header");
                self.current_book = Some(first);
                self.current_chapter = None;
                Resolution::Book(id)
            }
            Some(Fragment::Content(_)) => self.open_chapter(header.part.id, first),
            None => {
                let err = CategorizeError::AmbiguousClassification {
                    part: header.part.id,
                };
                warn!("{}; treating it as a chapter", err);
                self.open_chapter(header.part.id, first)
            }
        }
    }

    fn open_chapter(&mut self, part: u32, first: SectionRef) -> Resolution {
        let id = first.id;
        debug!(part, chapter = id, "chapter header");
        self.current_chapter = Some(first);
        Resolution::Chapter(id)
    }
}
