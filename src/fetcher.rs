//! External knowledge fetcher for the MedlinePlus search API.
//!
//! Issues two sub-queries per topic (a general one and a drug-focused one)
//! against the `healthTopics` database and parses the XML response into
//! [`Article`]s. Each sub-query failure degrades to an empty article list;
//! the topic-level result may therefore be empty on both sides. Batch
//! fetches apply a configurable polite delay between topics.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::FetcherConfig;
use crate::models::{Article, TopicRecord};

/// Seam between the QA pipeline and the remote search service.
#[async_trait]
pub trait KnowledgeFetcher: Send + Sync {
    /// Fetch general and drug articles for a topic. Never fails: remote
    /// errors degrade to empty lists.
    async fn fetch_topic(&self, topic: &str) -> TopicRecord;
}

/// HTTP client for the MedlinePlus `wsearch` endpoint.
pub struct MedlinePlusFetcher {
    base_url: String,
    delay: Duration,
    client: reqwest::Client,
}

impl MedlinePlusFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.clone(),
            delay: Duration::from_millis(config.delay_ms),
            client,
        })
    }

    /// Run one search query and parse the result documents.
    ///
    /// Any failure (HTTP status, network, XML) is logged and mapped to an
    /// empty list so one bad sub-query cannot abort a fetch.
    pub async fn fetch_articles(&self, query: &str) -> Vec<Article> {
        match self.fetch_articles_inner(query).await {
            Ok(articles) => articles,
            Err(e) => {
                eprintln!("warning: fetch failed for query {:?}: {}", query, e);
                Vec::new()
            }
        }
    }

    async fn fetch_articles_inner(&self, query: &str) -> Result<Vec<Article>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("db", "healthTopics"), ("term", query)])
            .send()
            .await
            .context("search request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("search returned {}", status);
        }

        let body = response.text().await.context("failed to read search body")?;
        parse_articles(&body)
    }

    /// Fetch every topic in order, sleeping `delay` between topics.
    ///
    /// The delay is a citizenship requirement toward the remote service,
    /// not a correctness one; tests configure it to zero.
    pub async fn fetch_all(&self, topics: &[String]) -> BTreeMap<String, TopicRecord> {
        let mut all = BTreeMap::new();

        for (i, topic) in topics.iter().enumerate() {
            println!("fetching: {}", topic);
            let record = self.fetch_topic(topic).await;
            all.insert(topic.clone(), record);

            if i + 1 < topics.len() && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        all
    }
}

#[async_trait]
impl KnowledgeFetcher for MedlinePlusFetcher {
    async fn fetch_topic(&self, topic: &str) -> TopicRecord {
        let health_query = format!("\"{}\"", topic);
        let drug_query = format!("\"{} medicines\" OR \"{} drugs\"", topic, topic);

        let health_articles = self.fetch_articles(&health_query).await;
        let drug_articles = self.fetch_articles(&drug_query).await;

        TopicRecord {
            health_articles,
            drug_articles,
        }
    }
}

/// Parse a `wsearch` XML response into articles.
///
/// The response carries one `document` element per result with a `url`
/// attribute and `content` children named `title`, `snippet`, and
/// `FullSummary`. Content payloads are escaped HTML; they are stripped to
/// plain text here. Documents missing a title or url are skipped.
pub fn parse_articles(xml: &str) -> Result<Vec<Article>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut articles = Vec::new();
    let mut buf = Vec::new();

    let mut doc_url: Option<String> = None;
    let mut title = String::new();
    let mut snippet = String::new();
    let mut full_text = String::new();
    let mut current_field: Option<Field> = None;

    #[derive(Clone, Copy)]
    enum Field {
        Title,
        Snippet,
        FullSummary,
    }

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"document" => {
                    doc_url = e
                        .try_get_attribute("url")?
                        .map(|a| a.unescape_value())
                        .transpose()?
                        .map(|v| v.into_owned());
                    title.clear();
                    snippet.clear();
                    full_text.clear();
                }
                b"content" => {
                    current_field = match e.try_get_attribute("name")? {
                        Some(a) => match a.unescape_value()?.as_ref() {
                            "title" => Some(Field::Title),
                            "snippet" => Some(Field::Snippet),
                            "FullSummary" => Some(Field::FullSummary),
                            _ => None,
                        },
                        None => None,
                    };
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some(field) = current_field {
                    let text = t.unescape().unwrap_or_default();
                    let target = match field {
                        Field::Title => &mut title,
                        Field::Snippet => &mut snippet,
                        Field::FullSummary => &mut full_text,
                    };
                    if !target.is_empty() {
                        target.push(' ');
                    }
                    target.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"content" => current_field = None,
                b"document" => {
                    let stripped_title = strip_html(&title);
                    if let Some(url) = doc_url.take() {
                        if !stripped_title.is_empty() {
                            articles.push(Article {
                                title: stripped_title,
                                snippet: strip_html(&snippet),
                                full_text: strip_html(&full_text),
                                url,
                            });
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => bail!("failed to parse search response: {}", e),
            _ => {}
        }
        buf.clear();
    }

    Ok(articles)
}

/// Strip HTML markup to plain text.
///
/// Drops `script` and `style` subtrees, removes all other tags, and
/// normalizes whitespace to single spaces. Parsing is lenient (unmatched
/// end tags are tolerated); on an unrecoverable parse error the text
/// collected so far is returned.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let mut reader = Reader::from_str(html);
    reader.config_mut().check_end_names = false;
    reader.config_mut().allow_unmatched_ends = true;

    let mut out = String::new();
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if skip_depth > 0 || matches!(name.as_ref(), b"script" | b"style") {
                    skip_depth += 1;
                }
            }
            Ok(Event::End(_)) => {
                skip_depth = skip_depth.saturating_sub(1);
            }
            Ok(Event::Text(t)) if skip_depth == 0 => {
                let text = t.unescape().unwrap_or_default();
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
