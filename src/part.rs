use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CategorizeError, Result};
use crate::text::Normalizer;

/// Keys the enriched record owns; a raw part carrying them would serialize them twice.
const RESERVED_KEYS: &[&str] = &["book", "chapter", "noTashkeelContent"];

/// A part exactly as stored upstream. Fields this tool does not know about ride along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPart {
    pub id: u32,
    pub content: String,
    #[serde(default)]
    pub hadith: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawPart {
    /// Parse the record stored at position `id`. The record must agree on its own id.
    pub fn from_json(id: u32, json: &str) -> Result<Self> {
        let raw: RawPart = serde_json::from_str(json)
            .map_err(|e| CategorizeError::malformed(id, e.to_string()))?;
        if raw.id != id {
            return Err(CategorizeError::malformed(
                id,
                format!("record carries id {}", raw.id),
            ));
        }
        Ok(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Header,
    Content,
}

impl PartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartKind::Header => "header",
            PartKind::Content => "content",
        }
    }
}

/// Content iff the hadith marker is present and positive. Null, zero and the
/// negative placeholder all mark a book or chapter title.
pub fn classify(hadith: Option<i64>) -> PartKind {
    match hadith {
        Some(n) if n > 0 => PartKind::Content,
        _ => PartKind::Header,
    }
}

/// Shared `caption_id` of the physical parts that make up one logical header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn from_value(value: &Value) -> Option<GroupKey> {
        match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(GroupKey(s.clone())),
            other => Some(GroupKey(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Two headers belong to the same logical header only when both carry a key and the keys match.
pub fn same_group(a: Option<&GroupKey>, b: Option<&GroupKey>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

/// A part after markup and diacritic normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub id: u32,
    pub content: String,
    pub no_tashkeel_content: String,
    pub hadith: Option<i64>,
    pub caption_id: Option<Value>,
    pub extra: Map<String, Value>,
}

impl Part {
    pub fn normalize(raw: RawPart, normalizer: &Normalizer) -> Part {
        let text = normalizer.normalize(&raw.content);
        let mut extra = raw.extra;
        for key in RESERVED_KEYS {
            extra.remove(*key);
        }
        Part {
            id: raw.id,
            content: text.clean,
            no_tashkeel_content: text.stripped,
            hadith: raw.hadith,
            caption_id: raw.caption_id,
            extra,
        }
    }

    pub fn kind(&self) -> PartKind {
        classify(self.hadith)
    }

    pub fn group_key(&self) -> Option<GroupKey> {
        self.caption_id.as_ref().and_then(GroupKey::from_value)
    }

    fn snapshot(&self, source_name: Option<String>) -> SectionRef {
        SectionRef {
            id: self.id,
            content: self.content.clone(),
            no_tashkeel_content: self.no_tashkeel_content.clone(),
            hadith: self.hadith,
            caption_id: self.caption_id.clone(),
            source_name,
            extra: self.extra.clone(),
        }
    }
}

/// Copy of the header part a content part belongs to, frozen at the time of binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRef {
    pub id: u32,
    pub content: String,
    #[serde(rename = "noTashkeelContent")]
    pub no_tashkeel_content: String,
    #[serde(default)]
    pub hadith: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_id: Option<Value>,
    #[serde(rename = "sourceName", default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SectionRef {
    pub fn group_key(&self) -> Option<GroupKey> {
        self.caption_id.as_ref().and_then(GroupKey::from_value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderFragment {
    pub part: Part,
    pub group_key: Option<GroupKey>,
}

impl HeaderFragment {
    /// True when `self` is a later physical piece of the header `previous` started.
    pub fn is_continuation_of(&self, previous: &HeaderFragment) -> bool {
        same_group(self.group_key.as_ref(), previous.group_key.as_ref())
    }

    pub fn section(&self, source_name: Option<String>) -> SectionRef {
        self.part.snapshot(source_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentFragment {
    pub part: Part,
    pub book: Option<SectionRef>,
    pub chapter: Option<SectionRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Header(HeaderFragment),
    Content(ContentFragment),
}

impl Fragment {
    pub fn classify(part: Part) -> Fragment {
        match part.kind() {
            PartKind::Content => Fragment::Content(ContentFragment {
                part,
                book: None,
                chapter: None,
            }),
            PartKind::Header => {
                let group_key = part.group_key();
                Fragment::Header(HeaderFragment { part, group_key })
            }
        }
    }

    pub fn id(&self) -> u32 {
        self.part().id
    }

    pub fn part(&self) -> &Part {
        match self {
            Fragment::Header(h) => &h.part,
            Fragment::Content(c) => &c.part,
        }
    }

    pub fn kind(&self) -> PartKind {
        match self {
            Fragment::Header(_) => PartKind::Header,
            Fragment::Content(_) => PartKind::Content,
        }
    }

    pub fn to_record(&self) -> EnrichedPart {
        let (book, chapter) = match self {
            Fragment::Header(_) => (None, None),
            Fragment::Content(c) => (c.book.clone(), c.chapter.clone()),
        };
        let part = self.part();
        EnrichedPart {
            id: part.id,
            content: part.content.clone(),
            no_tashkeel_content: part.no_tashkeel_content.clone(),
            hadith: part.hadith,
            caption_id: part.caption_id.clone(),
            book,
            chapter,
            extra: part.extra.clone(),
        }
    }
}

/// The record written for every part: the raw fields, the search form,
/// and for content parts the book and chapter they sit in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPart {
    pub id: u32,
    pub content: String,
    #[serde(rename = "noTashkeelContent")]
    pub no_tashkeel_content: String,
    #[serde(default)]
    pub hadith: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<SectionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<SectionRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EnrichedPart {
    pub fn kind(&self) -> PartKind {
        classify(self.hadith)
    }

    /// Snapshot of this record for use as another part's book or chapter.
    pub fn section(&self, source_name: Option<String>) -> SectionRef {
        SectionRef {
            id: self.id,
            content: self.content.clone(),
            no_tashkeel_content: self.no_tashkeel_content.clone(),
            hadith: self.hadith,
            caption_id: self.caption_id.clone(),
            source_name,
            extra: self.extra.clone(),
        }
    }
}
