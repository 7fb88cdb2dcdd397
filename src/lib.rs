//! # DocBot
//!
//! A retrieval-augmented medical question-answering service.
//!
//! DocBot ingests PDF and JSON medical content into a persisted vector
//! index, retrieves relevant chunks per question, and forwards them to a
//! hosted LLM for answer synthesis. When the retrieved context is judged
//! insufficient, it extracts a topic from the question, fetches fresh
//! articles from the MedlinePlus search API, extends the index, and retries
//! once.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ PDFs / JSON  │──▶│  Normalize    │──▶│ VectorIndex │
//! │ MedlinePlus  │   │ Chunk + Embed │   │ (persisted) │
//! └──────────────┘   └──────────────┘   └──────┬──────┘
//!                                              │ top-k
//!                       ┌───────────────┐      ▼
//!        question ─────▶│  QA pipeline  │◀── chunks
//!                       │ (1 retry max) │──▶ hosted LLM
//!                       └───────┬───────┘
//!                               ▼
//!                     answer or apology
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | PDF / JSON / fetched-article normalization |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persisted vector index |
//! | [`fetcher`] | MedlinePlus knowledge fetcher |
//! | [`llm`] | Generation model abstraction |
//! | [`topic`] | Topic extraction |
//! | [`qa`] | Answer pipeline state machine |
//! | [`ingest`] | Index build command |
//! | [`fetch_cmd`] | Batch topic fetch command |
//! | [`chat`] | Terminal ask / chat commands |
//! | [`server`] | HTTP chat server |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod fetch_cmd;
pub mod fetcher;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod qa;
pub mod server;
pub mod topic;
