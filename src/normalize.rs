//! Content normalization.
//!
//! Converts heterogeneous raw content into uniform [`Document`]s with fully
//! populated metadata: PDF files (one document per page), topic-store JSON
//! records, and freshly fetched articles. A malformed item is skipped with a
//! warning rather than aborting the batch.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::models::{Article, DocMetadata, Document, SourceKind, TopicRecord};

/// Origin tag for documents loaded from the persisted topic store.
pub const SOURCE_TOPIC_STORE: &str = "topic_store";
/// Origin tag for documents fetched live during a refresh.
pub const SOURCE_MEDLINEPLUS: &str = "medlineplus";

/// Load every `*.pdf` under `dir`, one [`Document`] per page.
///
/// A file that fails extraction is skipped with a warning; the scan
/// continues. Returns an error only if the directory itself is missing.
pub fn pdf_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        anyhow::bail!("PDF directory does not exist: {}", dir.display());
    }

    let mut paths: Vec<_> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    paths.sort();

    let mut documents = Vec::new();

    for path in paths {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.pdf")
            .to_string();
        let topic = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let pages = match pdf_extract::extract_text_by_pages(&path) {
            Ok(pages) => pages,
            Err(e) => {
                eprintln!("warning: skipping {}: {}", path.display(), e);
                continue;
            }
        };

        for (i, page_text) in pages.iter().enumerate() {
            if page_text.trim().is_empty() {
                continue;
            }
            documents.push(Document {
                content: page_text.clone(),
                metadata: DocMetadata {
                    topic: topic.clone(),
                    kind: SourceKind::Pdf,
                    source: file_name.clone(),
                    source_type: "pdf".to_string(),
                    url: None,
                    page: Some(i + 1),
                },
            });
        }
    }

    Ok(documents)
}

/// Load the topic store JSON file (`topic name -> TopicRecord`) and
/// normalize every article it contains.
pub fn topic_store_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topic store: {}", path.display()))?;
    let store: BTreeMap<String, TopicRecord> =
        serde_json::from_str(&content).with_context(|| "Failed to parse topic store JSON")?;

    let mut documents = Vec::new();
    for (topic, record) in &store {
        documents.extend(record_documents(topic, record, SOURCE_TOPIC_STORE));
    }
    Ok(documents)
}

/// Normalize a freshly fetched [`TopicRecord`] during a refresh.
pub fn fetched_documents(topic: &str, record: &TopicRecord) -> Vec<Document> {
    record_documents(topic, record, SOURCE_MEDLINEPLUS)
}

fn record_documents(topic: &str, record: &TopicRecord, source_type: &str) -> Vec<Document> {
    let mut documents = Vec::new();
    documents.extend(articles_to_documents(
        topic,
        &record.health_articles,
        SourceKind::Health,
        source_type,
    ));
    documents.extend(articles_to_documents(
        topic,
        &record.drug_articles,
        SourceKind::Drug,
        source_type,
    ));
    documents
}

/// Convert articles into documents, skipping any without a title or without
/// usable text. The skip is logged, never raised: one malformed article must
/// not abort the batch.
pub fn articles_to_documents(
    topic: &str,
    articles: &[Article],
    kind: SourceKind,
    source_type: &str,
) -> Vec<Document> {
    let mut documents = Vec::new();

    for article in articles {
        let title = article.title.trim();
        let body = if !article.full_text.trim().is_empty() {
            article.full_text.trim()
        } else {
            article.snippet.trim()
        };

        if title.is_empty() || body.is_empty() {
            eprintln!(
                "warning: skipping article without title or text (topic: {})",
                topic
            );
            continue;
        }

        documents.push(Document {
            content: format!("{}\n\n{}", title, body),
            metadata: DocMetadata {
                topic: topic.to_string(),
                kind,
                source: title.to_string(),
                source_type: source_type.to_string(),
                url: Some(article.url.clone()),
                page: None,
            },
        });
    }

    documents
}
