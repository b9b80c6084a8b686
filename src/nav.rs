use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CategorizeError, Level, Result};

/// One entry of the book's table of contents. `page` is the part id the entry starts at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationNode {
    #[serde(default)]
    pub name: String,
    pub page: u32,
    #[serde(default)]
    pub chapters: Vec<NavigationNode>,
}

/// Navigation files come either as a bare list of books or wrapped in a root node.
#[derive(Deserialize)]
#[serde(untagged)]
enum NavFile {
    Books(Vec<NavigationNode>),
    Root { chapters: Vec<NavigationNode> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    pub name: String,
    pub page: u32,
}

#[derive(Debug, Clone)]
struct BookInterval {
    entry: NavEntry,
    chapters: Vec<NavEntry>,
}

#[derive(Debug, Clone, Copy)]
pub struct Location<'a> {
    pub book: &'a NavEntry,
    pub chapter: &'a NavEntry,
}

/// Books and their chapters, each level sorted by descending start page so the
/// first entry starting at or before a part is the one enclosing it.
#[derive(Debug, Clone)]
pub struct NavIndex {
    books: Vec<BookInterval>,
}

impl NavIndex {
    pub fn build(books: Vec<NavigationNode>) -> NavIndex {
        let mut books: Vec<BookInterval> = books
            .into_iter()
            .map(|book| {
                let mut chapters: Vec<NavEntry> = book
                    .chapters
                    .into_iter()
                    .map(|c| NavEntry {
                        name: c.name,
                        page: c.page,
                    })
                    .collect();
                chapters.sort_by(|a, b| b.page.cmp(&a.page));
                BookInterval {
                    entry: NavEntry {
                        name: book.name,
                        page: book.page,
                    },
                    chapters,
                }
            })
            .collect();
        books.sort_by(|a, b| b.entry.page.cmp(&a.entry.page));
        NavIndex { books }
    }

    pub fn from_json(json: &str) -> Result<NavIndex> {
        let books = match serde_json::from_str::<NavFile>(json)? {
            NavFile::Books(books) => books,
            NavFile::Root { chapters } => chapters,
        };
        Ok(Self::build(books))
    }

    pub fn load(path: &Path) -> Result<NavIndex> {
        let json = std::fs::read_to_string(path)?;
        let index = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            books = index.book_count(),
            chapters = index.chapter_count(),
            "navigation tree loaded"
        );
        Ok(index)
    }

    pub fn book_count(&self) -> usize {
        self.books.len()
    }

    pub fn chapter_count(&self) -> usize {
        self.books.iter().map(|b| b.chapters.len()).sum()
    }

    /// Find the book and chapter enclosing `part_no`.
    pub fn locate(&self, part_no: u32) -> Result<Location<'_>> {
        let book = self
            .books
            .iter()
            .find(|b| b.entry.page <= part_no)
            .ok_or(CategorizeError::NotFound {
                part: part_no,
                level: Level::Book,
            })?;
        let chapter = book
            .chapters
            .iter()
            .find(|c| c.page <= part_no)
            .ok_or(CategorizeError::NotFound {
                part: part_no,
                level: Level::Chapter,
            })?;
        Ok(Location {
            book: &book.entry,
            chapter,
        })
    }
}
