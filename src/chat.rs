//! One-shot and interactive question answering on the terminal.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};

use crate::config::Config;
use crate::embedding::HfEmbeddingProvider;
use crate::fetcher::MedlinePlusFetcher;
use crate::index::VectorIndex;
use crate::llm::HfGenerationModel;
use crate::models::DocMetadata;
use crate::qa::{Answer, Outcome, QaPipeline};

/// Collaborators and index for answering questions from the CLI.
pub struct ChatSession {
    index: VectorIndex,
    embedder: HfEmbeddingProvider,
    model: HfGenerationModel,
    fetcher: MedlinePlusFetcher,
    config: Config,
}

impl ChatSession {
    /// Construct every provider and load the persisted index.
    ///
    /// Fails fast on a missing credential or a missing index so nothing is
    /// half-initialized when the first question arrives.
    pub fn open(config: &Config) -> Result<Self> {
        let embedder = HfEmbeddingProvider::new(&config.embedding)?;
        let model = HfGenerationModel::new(&config.generation)?;
        let fetcher = MedlinePlusFetcher::new(&config.fetcher)?;
        let index = VectorIndex::load(&config.index.dir)
            .with_context(|| "no usable index; run `docbot ingest` first")?;

        Ok(Self {
            index,
            embedder,
            model,
            fetcher,
            config: config.clone(),
        })
    }

    pub async fn answer(&mut self, question: &str) -> Result<Answer> {
        let mut pipeline = QaPipeline::new(
            &mut self.index,
            &self.embedder,
            &self.model,
            &self.fetcher,
            &self.config,
        );
        pipeline.answer_question(question).await
    }
}

/// Answer a single question and print it with its sources.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let mut session = ChatSession::open(config)?;
    let answer = session.answer(question).await?;
    print_answer(&answer);
    Ok(())
}

/// Interactive loop: one question per line, `exit` or `quit` to leave.
pub async fn run_chat(config: &Config) -> Result<()> {
    let mut session = ChatSession::open(config)?;
    let stdin = std::io::stdin();

    loop {
        print!("\nWrite query here: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match session.answer(question).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => eprintln!("error: {:#}", e),
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("\n{}", answer.text);

    if answer.outcome == Outcome::Answered && !answer.sources.is_empty() {
        println!("\nSources used:");
        for source in &answer.sources {
            println!("- {}", format_source(source));
        }
    }
}

fn format_source(meta: &DocMetadata) -> String {
    match (meta.page, meta.url.as_deref()) {
        (Some(page), _) => format!("{}, page {}", meta.source, page),
        (None, Some(url)) => format!("{} ({})", meta.source, url),
        (None, None) => meta.source.clone(),
    }
}
