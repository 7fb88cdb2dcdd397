//! Core data models used throughout DocBot.
//!
//! These types represent the documents, articles, and topic records that flow
//! through the ingestion, fetch, and question-answering pipelines.

use serde::{Deserialize, Serialize};

/// Origin category of a document's content.
///
/// Used instead of runtime type inspection: every normalization path tags
/// its output with exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// General health-topic article.
    Health,
    /// Drug / medication article.
    Drug,
    /// Page extracted from a PDF file.
    Pdf,
}

/// Metadata attached to every [`Document`], populated by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    /// Topic the content belongs to (e.g. `"Diabetes"`). For PDFs this is
    /// the file stem.
    pub topic: String,
    /// Origin category of the content.
    pub kind: SourceKind,
    /// Human-readable source: a filename for PDFs, an article title otherwise.
    pub source: String,
    /// Origin tag: `"pdf"`, `"topic_store"`, or `"medlineplus"`.
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 1-based page number for PDF-derived documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

/// A unit of text with fully populated metadata.
///
/// Produced by the normalizer and immutable afterwards. Chunks are also
/// `Document`s: their content is a window of the parent's content and their
/// metadata is cloned from the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocMetadata,
}

/// A single HTML-stripped article returned by the knowledge fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub full_text: String,
    pub url: String,
}

/// Fetch result for one topic: the general and the drug-focused sub-query.
///
/// Either list (or both) may be empty when the corresponding sub-query
/// failed or matched nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    #[serde(default)]
    pub health_articles: Vec<Article>,
    #[serde(default)]
    pub drug_articles: Vec<Article>,
}

impl TopicRecord {
    pub fn is_empty(&self) -> bool {
        self.health_articles.is_empty() && self.drug_articles.is_empty()
    }
}
