use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::Result;

/// Markup tags, matched lazily so `<b>x</b>` yields two matches. `(?s)` lets a tag span lines.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<.*?>").unwrap());
static QUOTE_ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&quot;").unwrap());
/// List numbering such as `12 - ` at the head of a narration.
static NUMBERING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+ -").unwrap());

const EMBEDDED_DIACRITICS: &str = include_str!("../assets/diacritics.json");

/// The fixed set of marks removed for the search form of a part.
#[derive(Debug, Clone, Default)]
pub struct Diacritics {
    marks: HashSet<char>,
}

impl Diacritics {
    /// Parse a JSON array of strings; every character of every entry is a mark.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<String> = serde_json::from_str(json)?;
        let marks = entries.iter().flat_map(|e| e.chars()).collect();
        Ok(Diacritics { marks })
    }

    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_DIACRITICS)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn contains(&self, c: char) -> bool {
        self.marks.contains(&c)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub clean: String,
    pub stripped: String,
}

/// Holds the diacritics set for the whole run; built once at startup.
#[derive(Debug, Clone)]
pub struct Normalizer {
    diacritics: Diacritics,
}

impl Normalizer {
    pub fn new(diacritics: Diacritics) -> Self {
        debug!(marks = diacritics.len(), "diacritics loaded");
        Normalizer { diacritics }
    }

    pub fn normalize(&self, raw: &str) -> NormalizedText {
        let clean = sanitize(raw);
        let stripped = self.strip_diacritics(&clean);
        NormalizedText { clean, stripped }
    }

    pub fn strip_diacritics(&self, text: &str) -> String {
        text.chars().filter(|c| !self.diacritics.contains(*c)).collect()
    }
}

/// Replace tags, `&quot;` entities and list numbering with a single space each.
pub fn sanitize(raw: &str) -> String {
    let text = TAG_RE.replace_all(raw, " ");
    let text = QUOTE_ENTITY_RE.replace_all(&text, " ");
    let text = NUMBERING_RE.replace_all(&text, " ");
    text.trim_end().to_string()
}
