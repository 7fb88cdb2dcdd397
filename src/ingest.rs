//! Ingestion pipeline orchestration.
//!
//! Coordinates the full build flow: load PDFs and the topic store,
//! normalize, chunk, embed, and persist a fresh vector index. Either input
//! may be absent; ingestion proceeds with whatever is available and fails
//! only when nothing at all was produced.

use anyhow::{Context, Result};

use crate::chunk::chunk_documents;
use crate::config::Config;
use crate::embedding::HfEmbeddingProvider;
use crate::index::{IndexError, VectorIndex};
use crate::normalize;

pub async fn run_ingest(config: &Config) -> Result<()> {
    let embedder = HfEmbeddingProvider::new(&config.embedding)?;

    let mut documents = Vec::new();

    if config.data.pdf_dir.is_dir() {
        let pdf_docs = normalize::pdf_documents(&config.data.pdf_dir)?;
        println!(
            "loaded {} page documents from {}",
            pdf_docs.len(),
            config.data.pdf_dir.display()
        );
        documents.extend(pdf_docs);
    } else {
        println!(
            "no PDF directory at {}, skipping",
            config.data.pdf_dir.display()
        );
    }

    if config.data.topic_store.is_file() {
        let store_docs = normalize::topic_store_documents(&config.data.topic_store)?;
        println!(
            "loaded {} article documents from {}",
            store_docs.len(),
            config.data.topic_store.display()
        );
        documents.extend(store_docs);
    } else {
        println!(
            "no topic store at {}, skipping",
            config.data.topic_store.display()
        );
    }

    let chunks = chunk_documents(
        &documents,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    );
    println!("created {} chunks", chunks.len());

    let index = match VectorIndex::build(chunks, &embedder, config.embedding.batch_size).await {
        Ok(index) => index,
        Err(IndexError::EmptyInput) => {
            // Nothing to embed: leave any existing index untouched.
            println!("no chunks produced, skipping index build");
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to build index"),
    };

    index
        .persist(&config.index.dir)
        .context("failed to persist index")?;

    println!("ingest");
    println!("  documents: {}", documents.len());
    println!("  indexed chunks: {}", index.len());
    println!("  index dir: {}", config.index.dir.display());
    println!("ok");

    Ok(())
}
