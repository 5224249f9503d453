//! Domain types shared by ingestion, both indexes and fusion.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::Path;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str { &self.0 }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self { Self(s.to_string()) }
        }
    };
}

string_id!(
    /// Content-addressed document identity: blake3 of the normalized relative path.
    DocumentId
);
string_id!(
    /// Chunk identity: blake3 of parent id, position and content.
    ChunkId
);

impl DocumentId {
    /// `relative_path` must already use `/` separators.
    pub fn from_relative_path(relative_path: &str) -> Self {
        Self(blake3::hash(relative_path.as_bytes()).to_hex().to_string())
    }
}

impl ChunkId {
    pub fn derive(parent: &DocumentId, position: usize, content: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(parent.as_str().as_bytes());
        hasher.update(&(position as u64).to_le_bytes());
        hasher.update(content.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }
}

/// Dish category, derived from directory names in the source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "荤菜")]
    Meat,
    #[serde(rename = "素菜")]
    Vegetable,
    #[serde(rename = "汤品")]
    Soup,
    #[serde(rename = "甜品")]
    Dessert,
    #[serde(rename = "早餐")]
    Breakfast,
    #[serde(rename = "主食")]
    Staple,
    #[serde(rename = "水产")]
    Aquatic,
    #[serde(rename = "调料")]
    Condiment,
    #[serde(rename = "饮品")]
    Drink,
    #[serde(rename = "其他")]
    Other,
}

/// Path component → category. Scanned in this order; first hit wins.
pub const CATEGORY_MAPPING: [(&str, Category); 9] = [
    ("meat_dish", Category::Meat),
    ("vegetable_dish", Category::Vegetable),
    ("soup", Category::Soup),
    ("dessert", Category::Dessert),
    ("breakfast", Category::Breakfast),
    ("staple", Category::Staple),
    ("aquatic", Category::Aquatic),
    ("condiment", Category::Condiment),
    ("drink", Category::Drink),
];

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Meat,
        Category::Vegetable,
        Category::Soup,
        Category::Dessert,
        Category::Breakfast,
        Category::Staple,
        Category::Aquatic,
        Category::Condiment,
        Category::Drink,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Meat => "荤菜",
            Category::Vegetable => "素菜",
            Category::Soup => "汤品",
            Category::Dessert => "甜品",
            Category::Breakfast => "早餐",
            Category::Staple => "主食",
            Category::Aquatic => "水产",
            Category::Condiment => "调料",
            Category::Drink => "饮品",
            Category::Other => "其他",
        }
    }

    pub fn labels() -> Vec<&'static str> { Self::ALL.iter().map(|c| c.label()).collect() }

    /// Accepts either the display label (`荤菜`) or the directory key (`meat_dish`).
    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label() == s)
            .or_else(|| CATEGORY_MAPPING.iter().find(|(key, _)| *key == s).map(|(_, c)| *c))
    }

    pub fn from_path(path: &Path) -> Self {
        let parts: Vec<&str> = path.components().filter_map(|c| c.as_os_str().to_str()).collect();
        CATEGORY_MAPPING
            .iter()
            .find(|(key, _)| parts.contains(key))
            .map_or(Category::Other, |(_, category)| *category)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

/// The repeated symbol whose run length encodes difficulty.
pub const DIFFICULTY_MARKER: char = '★';

/// Five ordered levels plus `Unknown`, which sorts below all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
    #[serde(rename = "未知")]
    Unknown,
    #[serde(rename = "非常简单")]
    VeryEasy,
    #[serde(rename = "简单")]
    Easy,
    #[serde(rename = "中等")]
    Medium,
    #[serde(rename = "困难")]
    Hard,
    #[serde(rename = "非常困难")]
    VeryHard,
}

impl Difficulty {
    pub const LEVELS: [Difficulty; 5] = [
        Difficulty::VeryEasy,
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::VeryHard,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Unknown => "未知",
            Difficulty::VeryEasy => "非常简单",
            Difficulty::Easy => "简单",
            Difficulty::Medium => "中等",
            Difficulty::Hard => "困难",
            Difficulty::VeryHard => "非常困难",
        }
    }

    pub fn labels() -> Vec<&'static str> { Self::LEVELS.iter().map(|d| d.label()).collect() }

    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::LEVELS.into_iter().chain([Difficulty::Unknown]).find(|d| d.label() == s)
    }

    /// Longest consecutive run of markers, capped at five.
    pub fn from_content(content: &str) -> Self {
        let mut longest = 0usize;
        let mut run = 0usize;
        for ch in content.chars() {
            if ch == DIFFICULTY_MARKER {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }
        Self::from_marker_count(longest)
    }

    pub fn from_marker_count(count: usize) -> Self {
        match count {
            0 => Difficulty::Unknown,
            1 => Difficulty::VeryEasy,
            2 => Difficulty::Easy,
            3 => Difficulty::Medium,
            4 => Difficulty::Hard,
            _ => Difficulty::VeryHard,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    pub category: Category,
    pub name: String,
    pub difficulty: Difficulty,
}

/// A parent document: one ingested source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Metadata copied from the parent plus the chunk's position.
///
/// `final_score` is only ever set on fusion output and is never serialized,
/// so it cannot leak into a persisted index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub category: Category,
    pub name: String,
    pub difficulty: Difficulty,
    pub section: Option<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(skip)]
    pub final_score: Option<f64>,
}

/// A child chunk: the unit that is indexed and retrieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub parent_id: DocumentId,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Dense,
    Lexical,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Dense => "dense",
            SourceKind::Lexical => "lexical",
        })
    }
}

/// One entry of a ranked list. `score` is engine-specific, higher is better.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub rank: usize,
    pub score: f64,
}

/// Ordered query result with 0-based contiguous ranks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedList {
    items: Vec<RankedChunk>,
}

impl RankedList {
    pub fn new() -> Self { Self::default() }

    /// Sort by score descending, chunk id ascending, then keep the first `k`.
    /// NaN scores sort last.
    pub fn from_scored(scored: Vec<(Chunk, f64)>, k: usize) -> Self {
        let mut scored: Vec<(Chunk, f64)> = scored
            .into_iter()
            .map(|(c, s)| (c, if s.is_nan() { f64::NEG_INFINITY } else { s }))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        scored.truncate(k);
        Self::from_ordered(scored)
    }

    /// Assign ranks by position; the input must already be in final order.
    pub fn from_ordered(ordered: Vec<(Chunk, f64)>) -> Self {
        let items = ordered
            .into_iter()
            .enumerate()
            .map(|(rank, (chunk, score))| RankedChunk { chunk, rank, score })
            .collect();
        Self { items }
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, RankedChunk> { self.items.iter() }
    pub fn as_slice(&self) -> &[RankedChunk] { &self.items }
    pub fn get(&self, rank: usize) -> Option<&RankedChunk> { self.items.get(rank) }
    pub fn ids(&self) -> Vec<&ChunkId> { self.items.iter().map(|r| &r.chunk.id).collect() }
    pub fn into_chunks(self) -> Vec<Chunk> { self.items.into_iter().map(|r| r.chunk).collect() }
}

impl IntoIterator for RankedList {
    type Item = RankedChunk;
    type IntoIter = std::vec::IntoIter<RankedChunk>;
    fn into_iter(self) -> Self::IntoIter { self.items.into_iter() }
}

impl<'a> IntoIterator for &'a RankedList {
    type Item = &'a RankedChunk;
    type IntoIter = std::slice::Iter<'a, RankedChunk>;
    fn into_iter(self) -> Self::IntoIter { self.items.iter() }
}
