//! Answer pipeline.
//!
//! Orchestrates retrieval and generation, detects the "insufficient context"
//! sentinel, and drives the fetch-extend-retry loop:
//!
//! ```text
//! INITIAL ──answer──────────────────────────────▶ ANSWERED
//!    │ sentinel
//!    ▼
//! NEED_CONTEXT ──no topic──────────────────────▶ TOPIC_NOT_FOUND
//!    │ topic
//!    ▼
//! fetch + normalize + chunk ──zero chunks──────▶ REFRESH_FAILED
//!    │ insert + persist          (or persist failure)
//!    ▼
//! RETRIED ──answer─────────────────────────────▶ ANSWERED
//!    └──sentinel again──────────────────────────▶ NEED_CONTEXT_AGAIN
//! ```
//!
//! The retry is bounded to exactly one: that caps external API fan-out per
//! question and index growth from a single query. Each terminal state other
//! than `ANSWERED` maps to its own fixed apology string, so the UI can tell
//! the cases apart without structured error codes.

use anyhow::Result;

use crate::chunk::chunk_documents;
use crate::config::Config;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::fetcher::KnowledgeFetcher;
use crate::index::VectorIndex;
use crate::llm::GenerationModel;
use crate::models::DocMetadata;
use crate::normalize::fetched_documents;
use crate::topic::extract_topic;

/// Exact string the model is instructed to emit when the retrieved context
/// cannot answer the question. Compared against the trimmed response; no
/// fuzzy matching.
pub const INSUFFICIENT_SENTINEL: &str = "INSUFFICIENT CONTEXT";

/// Apology when no medical topic could be identified in the question.
pub const NO_TOPIC_APOLOGY: &str = "I'm sorry, I couldn't identify the medical topic in your \
     question, so I wasn't able to look up more information. Could you rephrase it?";

/// Apology when the knowledge refresh found nothing to add.
pub const REFRESH_FAILED_APOLOGY: &str =
    "I'm sorry, I couldn't find additional information about that topic.";

/// Apology when the answer is still insufficient after a refresh.
pub const STILL_INSUFFICIENT_APOLOGY: &str = "I'm sorry, even after searching for more \
     information I wasn't able to answer your question.";

/// Terminal state of one question's run through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Answered,
    TopicNotFound,
    RefreshFailed,
    StillInsufficient,
}

/// Final result returned to the caller.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub outcome: Outcome,
    /// Metadata of the chunks behind an answered response; empty otherwise.
    pub sources: Vec<DocMetadata>,
}

impl Answer {
    fn apology(text: &str, outcome: Outcome) -> Self {
        Self {
            text: text.to_string(),
            outcome,
            sources: Vec::new(),
        }
    }
}

enum Attempt {
    Answered {
        text: String,
        sources: Vec<DocMetadata>,
    },
    Insufficient,
}

/// One question's worth of QA machinery.
///
/// Holds references to the collaborators rather than owning them; the index
/// is borrowed mutably because a refresh inserts into it. Callers serving
/// multiple users must serialize construction of pipelines over the same
/// index (the index is the only state that outlives a question).
pub struct QaPipeline<'a> {
    index: &'a mut VectorIndex,
    embedder: &'a dyn EmbeddingProvider,
    model: &'a dyn GenerationModel,
    fetcher: &'a dyn KnowledgeFetcher,
    config: &'a Config,
}

impl<'a> QaPipeline<'a> {
    pub fn new(
        index: &'a mut VectorIndex,
        embedder: &'a dyn EmbeddingProvider,
        model: &'a dyn GenerationModel,
        fetcher: &'a dyn KnowledgeFetcher,
        config: &'a Config,
    ) -> Self {
        Self {
            index,
            embedder,
            model,
            fetcher,
            config,
        }
    }

    /// Answer a question, refreshing the index from the remote knowledge
    /// source at most once.
    pub async fn answer_question(&mut self, question: &str) -> Result<Answer> {
        // First attempt: the common, single-round path.
        if let Attempt::Answered { text, sources } = self.attempt(question).await? {
            return Ok(Answer {
                text,
                outcome: Outcome::Answered,
                sources,
            });
        }

        // NEED_CONTEXT: try to learn what to fetch.
        let Some(topic) = extract_topic(self.model, question).await? else {
            return Ok(Answer::apology(NO_TOPIC_APOLOGY, Outcome::TopicNotFound));
        };

        match self.refresh(&topic).await {
            Ok(true) => {}
            Ok(false) => {
                return Ok(Answer::apology(
                    REFRESH_FAILED_APOLOGY,
                    Outcome::RefreshFailed,
                ));
            }
            Err(e) => {
                // Persist or embed failure: treat the refresh as failed
                // rather than answering from state that would not survive
                // a restart.
                eprintln!("warning: knowledge refresh for {:?} failed: {}", topic, e);
                return Ok(Answer::apology(
                    REFRESH_FAILED_APOLOGY,
                    Outcome::RefreshFailed,
                ));
            }
        }

        // RETRIED: exactly one more attempt against the updated index.
        match self.attempt(question).await? {
            Attempt::Answered { text, sources } => Ok(Answer {
                text,
                outcome: Outcome::Answered,
                sources,
            }),
            Attempt::Insufficient => Ok(Answer::apology(
                STILL_INSUFFICIENT_APOLOGY,
                Outcome::StillInsufficient,
            )),
        }
    }

    /// Retrieve, prompt, and invoke the model once.
    async fn attempt(&self, question: &str) -> Result<Attempt> {
        let query_vec = embed_query(self.embedder, question).await?;
        let hits = self.index.search(&query_vec, self.config.retrieval.top_k);
        let prompt = build_prompt(&hits, question);

        let response = self.model.complete(&prompt).await?;
        let trimmed = response.trim();

        if trimmed == INSUFFICIENT_SENTINEL {
            return Ok(Attempt::Insufficient);
        }

        Ok(Attempt::Answered {
            text: trimmed.to_string(),
            sources: hits.iter().map(|(_, doc)| doc.metadata.clone()).collect(),
        })
    }

    /// Fetch articles for the topic and extend the index.
    ///
    /// Returns `Ok(false)` when the fetch produced zero chunks, in which
    /// case the index is untouched and nothing is persisted.
    async fn refresh(&mut self, topic: &str) -> Result<bool> {
        let record = self.fetcher.fetch_topic(topic).await;
        let documents = fetched_documents(topic, &record);
        let chunks = chunk_documents(
            &documents,
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        );

        if chunks.is_empty() {
            return Ok(false);
        }

        let len_before = self.index.len();
        let inserted = self
            .index
            .insert(chunks, self.embedder, self.config.embedding.batch_size)
            .await?;
        if let Err(e) = self.index.persist(&self.config.index.dir) {
            // Roll the in-memory state back so later questions never answer
            // from chunks that would vanish on restart.
            self.index.truncate(len_before);
            return Err(e.into());
        }

        println!(
            "refreshed index with {} chunks for topic {:?}",
            inserted, topic
        );
        Ok(true)
    }
}

/// Build the answer prompt: retrieved context plus the question, with the
/// instruction to answer only from context or emit the sentinel.
pub fn build_prompt(context: &[(f32, &crate::models::Document)], question: &str) -> String {
    let mut context_block = String::new();
    for (i, (_, doc)) in context.iter().enumerate() {
        if i > 0 {
            context_block.push_str("\n\n");
        }
        context_block.push_str(&doc.content);
    }

    format!(
        "You are a medical assistant. Use the provided context to answer factually.\n\
         - Answer only from the context below.\n\
         - Keep responses clear, concise, and medically accurate.\n\
         - If the context does not contain the answer, reply with exactly {}.\n\n\
         Context:\n{}\n\nQuestion:\n{}\n\nAnswer:",
        INSUFFICIENT_SENTINEL, context_block, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, IndexConfig};
    use crate::index::tests::{hash_embed, HashEmbedder};
    use crate::models::{Article, Document, SourceKind, TopicRecord};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedModel {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(responses: &[&str]) -> Self {
            let mut list: Vec<String> = responses.iter().map(|s| s.to_string()).collect();
            list.reverse();
            Self {
                responses: Mutex::new(list),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationModel for ScriptedModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop()
                .expect("model called more times than scripted"))
        }
    }

    struct StubFetcher {
        record: TopicRecord,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn empty() -> Self {
            Self {
                record: TopicRecord::default(),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_articles(articles: Vec<Article>) -> Self {
            Self {
                record: TopicRecord {
                    health_articles: articles,
                    drug_articles: Vec::new(),
                },
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KnowledgeFetcher for StubFetcher {
        async fn fetch_topic(&self, _topic: &str) -> TopicRecord {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.record.clone()
        }
    }

    fn test_config(index_dir: &Path) -> Config {
        Config {
            index: IndexConfig {
                dir: index_dir.to_path_buf(),
            },
            data: Default::default(),
            chunking: Default::default(),
            retrieval: Default::default(),
            embedding: Default::default(),
            generation: Default::default(),
            fetcher: Default::default(),
            server: Default::default(),
        }
    }

    fn seed_chunk(text: &str) -> Document {
        Document {
            content: text.to_string(),
            metadata: crate::models::DocMetadata {
                topic: "Asthma".to_string(),
                kind: SourceKind::Health,
                source: "seed".to_string(),
                source_type: "topic_store".to_string(),
                url: None,
                page: None,
            },
        }
    }

    async fn seeded_index() -> VectorIndex {
        VectorIndex::build(
            vec![seed_chunk("asthma affects the airways and breathing")],
            &HashEmbedder,
            8,
        )
        .await
        .unwrap()
    }

    fn article(title: &str, text: &str) -> Article {
        Article {
            title: title.to_string(),
            snippet: String::new(),
            full_text: text.to_string(),
            url: "https://medlineplus.gov/diabetes.html".to_string(),
        }
    }

    #[tokio::test]
    async fn answerable_question_is_single_round() {
        // Scenario B: one generation call, zero fetch calls, answer verbatim.
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(dir.path());
        let mut index = seeded_index().await;
        let model = ScriptedModel::new(&["Asthma narrows the airways."]);
        let fetcher = StubFetcher::empty();

        let mut pipeline = QaPipeline::new(&mut index, &HashEmbedder, &model, &fetcher, &config);
        let answer = pipeline.answer_question("What does asthma do?").await.unwrap();

        assert_eq!(answer.outcome, Outcome::Answered);
        assert_eq!(answer.text, "Asthma narrows the airways.");
        assert!(!answer.sources.is_empty());
        assert_eq!(model.calls(), 1);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn empty_fetch_yields_refresh_failed_without_index_mutation() {
        // Scenario A: sentinel, topic found, fetch returns nothing.
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(dir.path());
        let mut index = seeded_index().await;
        let len_before = index.len();
        let model = ScriptedModel::new(&[INSUFFICIENT_SENTINEL, "Diabetes"]);
        let fetcher = StubFetcher::empty();

        let mut pipeline = QaPipeline::new(&mut index, &HashEmbedder, &model, &fetcher, &config);
        let answer = pipeline
            .answer_question("What causes diabetes?")
            .await
            .unwrap();

        assert_eq!(answer.outcome, Outcome::RefreshFailed);
        assert_eq!(answer.text, REFRESH_FAILED_APOLOGY);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(index.len(), len_before);
        // Nothing was persisted.
        assert!(!dir.path().join("vectors.bin").exists());
    }

    #[tokio::test]
    async fn successful_refresh_retries_once_and_answers() {
        // Scenario C: sentinel, fetch succeeds, second attempt answers.
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(dir.path());
        let mut index = seeded_index().await;
        let model = ScriptedModel::new(&[
            INSUFFICIENT_SENTINEL,
            "Diabetes",
            "Diabetes raises blood glucose.",
        ]);
        let fetcher = StubFetcher::with_articles(vec![
            article("Diabetes", "Diabetes is a disease of high blood glucose."),
            article("Diabetes Type 2", "Type 2 diabetes is the most common form."),
        ]);

        let mut pipeline = QaPipeline::new(&mut index, &HashEmbedder, &model, &fetcher, &config);
        let answer = pipeline
            .answer_question("What is diabetes?")
            .await
            .unwrap();

        assert_eq!(answer.outcome, Outcome::Answered);
        assert_eq!(answer.text, "Diabetes raises blood glucose.");
        assert_eq!(model.calls(), 3); // two answer attempts + one extraction
        assert_eq!(fetcher.calls(), 1);
        assert!(index.len() > 1);
        // The refreshed index was persisted.
        assert!(dir.path().join("vectors.bin").exists());
        assert!(dir.path().join("chunks.json").exists());
    }

    #[tokio::test]
    async fn refreshed_chunks_are_retrievable_on_retry() {
        // After the refresh the retry's retrieval must be able to surface
        // the newly inserted chunks.
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(dir.path());
        let mut index = seeded_index().await;
        let model = ScriptedModel::new(&[INSUFFICIENT_SENTINEL, "Diabetes", "answer"]);
        let fetcher = StubFetcher::with_articles(vec![article(
            "Diabetes",
            "diabetes glucose insulin pancreas metabolism",
        )]);

        let mut pipeline = QaPipeline::new(&mut index, &HashEmbedder, &model, &fetcher, &config);
        pipeline
            .answer_question("diabetes glucose insulin")
            .await
            .unwrap();

        let query = hash_embed("diabetes glucose insulin", 16);
        let hits = index.search(&query, 1);
        assert!(hits[0].1.content.contains("diabetes"));
        assert_eq!(hits[0].1.metadata.source_type, "medlineplus");
    }

    #[tokio::test]
    async fn missing_topic_yields_topic_not_found_without_fetch() {
        // Scenario D: sentinel, extractor returns the absence marker.
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(dir.path());
        let mut index = seeded_index().await;
        let model = ScriptedModel::new(&[INSUFFICIENT_SENTINEL, "NONE"]);
        let fetcher = StubFetcher::empty();

        let mut pipeline = QaPipeline::new(&mut index, &HashEmbedder, &model, &fetcher, &config);
        let answer = pipeline
            .answer_question("What is the meaning of life?")
            .await
            .unwrap();

        assert_eq!(answer.outcome, Outcome::TopicNotFound);
        assert_eq!(answer.text, NO_TOPIC_APOLOGY);
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn second_sentinel_yields_still_insufficient() {
        // Scenario E: retry also insufficient; exactly two answer attempts,
        // one fetch-insert cycle.
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(dir.path());
        let mut index = seeded_index().await;
        let model = ScriptedModel::new(&[
            INSUFFICIENT_SENTINEL,
            "Diabetes",
            INSUFFICIENT_SENTINEL,
        ]);
        let fetcher =
            StubFetcher::with_articles(vec![article("Diabetes", "some fetched text")]);

        let mut pipeline = QaPipeline::new(&mut index, &HashEmbedder, &model, &fetcher, &config);
        let answer = pipeline
            .answer_question("An unanswerable question about diabetes")
            .await
            .unwrap();

        assert_eq!(answer.outcome, Outcome::StillInsufficient);
        assert_eq!(answer.text, STILL_INSUFFICIENT_APOLOGY);
        assert_eq!(model.calls(), 3);
        assert_eq!(fetcher.calls(), 1);
        assert!(index.len() > 1);
    }

    #[tokio::test]
    async fn persist_failure_yields_refresh_failed_and_rolls_back() {
        // The index directory is an existing regular file, so persistence
        // fails deterministically after the fetched chunks were inserted.
        let dir = tempfile::TempDir::new().unwrap();
        let not_a_dir = dir.path().join("index");
        std::fs::write(&not_a_dir, b"occupied").unwrap();
        let config = test_config(&not_a_dir);

        let mut index = seeded_index().await;
        let len_before = index.len();
        let model = ScriptedModel::new(&[INSUFFICIENT_SENTINEL, "Diabetes"]);
        let fetcher = StubFetcher::with_articles(vec![article(
            "Diabetes",
            "Diabetes is a disease of high blood glucose.",
        )]);

        let mut pipeline = QaPipeline::new(&mut index, &HashEmbedder, &model, &fetcher, &config);
        let answer = pipeline
            .answer_question("What is diabetes?")
            .await
            .unwrap();

        assert_eq!(answer.outcome, Outcome::RefreshFailed);
        assert_eq!(answer.text, REFRESH_FAILED_APOLOGY);
        // No generation retry after the failed refresh.
        assert_eq!(model.calls(), 2);
        // The unpersisted chunks were rolled back.
        assert_eq!(index.len(), len_before);

        // The same index keeps answering afterwards.
        let model = ScriptedModel::new(&["Asthma narrows the airways."]);
        let fetcher = StubFetcher::empty();
        let mut pipeline = QaPipeline::new(&mut index, &HashEmbedder, &model, &fetcher, &config);
        let answer = pipeline
            .answer_question("What does asthma do?")
            .await
            .unwrap();
        assert_eq!(answer.outcome, Outcome::Answered);
    }

    #[tokio::test]
    async fn sentinel_match_is_exact_after_trim() {
        // A response that merely mentions insufficiency is an answer.
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(dir.path());
        let mut index = seeded_index().await;
        let model = ScriptedModel::new(&["The context is INSUFFICIENT CONTEXT for this."]);
        let fetcher = StubFetcher::empty();

        let mut pipeline = QaPipeline::new(&mut index, &HashEmbedder, &model, &fetcher, &config);
        let answer = pipeline.answer_question("anything").await.unwrap();

        assert_eq!(answer.outcome, Outcome::Answered);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn whitespace_around_sentinel_still_matches() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(dir.path());
        let mut index = seeded_index().await;
        let model = ScriptedModel::new(&["  INSUFFICIENT CONTEXT \n", "NONE"]);
        let fetcher = StubFetcher::empty();

        let mut pipeline = QaPipeline::new(&mut index, &HashEmbedder, &model, &fetcher, &config);
        let answer = pipeline.answer_question("anything").await.unwrap();

        assert_eq!(answer.outcome, Outcome::TopicNotFound);
    }

    #[test]
    fn prompt_contains_context_question_and_sentinel_instruction() {
        let doc = seed_chunk("asthma context text");
        let hits = vec![(0.9f32, &doc)];
        let prompt = build_prompt(&hits, "What is asthma?");
        assert!(prompt.contains("asthma context text"));
        assert!(prompt.contains("What is asthma?"));
        assert!(prompt.contains(INSUFFICIENT_SENTINEL));
    }

    #[test]
    fn apologies_are_pairwise_distinct() {
        assert_ne!(NO_TOPIC_APOLOGY, REFRESH_FAILED_APOLOGY);
        assert_ne!(NO_TOPIC_APOLOGY, STILL_INSUFFICIENT_APOLOGY);
        assert_ne!(REFRESH_FAILED_APOLOGY, STILL_INSUFFICIENT_APOLOGY);
    }
}
