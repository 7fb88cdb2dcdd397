//! Batch topic fetching.
//!
//! Fetches general and drug articles for every configured topic and writes
//! the topic store JSON consumed by ingestion. Per-topic failures degrade to
//! empty records; the batch always completes.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::fetcher::MedlinePlusFetcher;
use crate::models::TopicRecord;

pub async fn run_fetch(config: &Config) -> Result<()> {
    if config.data.topics.is_empty() {
        bail!("no topics configured; add a [data] topics list to the config file");
    }

    let fetcher = MedlinePlusFetcher::new(&config.fetcher)?;
    let store = fetcher.fetch_all(&config.data.topics).await;

    let total_articles: usize = store
        .values()
        .map(|r| r.health_articles.len() + r.drug_articles.len())
        .sum();

    write_topic_store(&config.data.topic_store, &store)?;

    println!("fetch");
    println!("  topics: {}", store.len());
    println!("  articles: {}", total_articles);
    println!("  store: {}", config.data.topic_store.display());
    println!("ok");

    Ok(())
}

/// Serialize the store and rename it into place, so an interrupted fetch
/// never leaves a truncated file that ingestion would fail to parse.
fn write_topic_store(path: &Path, store: &BTreeMap<String, TopicRecord>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(store)?;

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("failed to write topic store: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to write topic store: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;

    #[test]
    fn topic_store_roundtrips_and_leaves_no_tmp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store/topic_article_store.json");

        let mut store = BTreeMap::new();
        store.insert(
            "Diabetes".to_string(),
            TopicRecord {
                health_articles: vec![Article {
                    title: "Diabetes".to_string(),
                    snippet: String::new(),
                    full_text: "Diabetes basics.".to_string(),
                    url: "https://medlineplus.gov/diabetes.html".to_string(),
                }],
                drug_articles: Vec::new(),
            },
        );

        write_topic_store(&path, &store).unwrap();

        assert!(!path.with_extension("tmp").exists());
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, TopicRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, store);
    }
}
