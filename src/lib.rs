//! # Blog Harvest
//!
//! An ingestion pipeline for engineering blogs.
//!
//! Blog Harvest pages through the listings of heterogeneous engineering
//! blogs (infinite scroll, numbered pages, "load more" buttons), extracts
//! each post, enriches it with keyphrase tags, a semantic category, and a
//! content embedding, and upserts the result into SQLite keyed by URL.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────┐   ┌────────┐   ┌─────────┐
//! │ Source       │──▶│ Pagination │──▶│ Enricher │──▶│ Writer │──▶│ SQLite  │
//! │ adapters     │   │ controller │   │ tag/cat/ │   │ upsert │   │ articles│
//! │ (registry)   │   │            │   │ embed    │   │ +retry │   │         │
//! └──────────────┘   └────────────┘   └──────────┘   └────────┘   └─────────┘
//!         ▲                                 ▲
//!   page sessions                  classification service
//!   (http / chrome)                (embedding provider + taxonomy)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init                    # create database
//! harvest sources                 # list registered blogs
//! harvest scrape stripe           # scrape one source
//! harvest scrape all --dry-run    # enrich everything, write nothing
//! harvest stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`browser`] | Page-session drivers (HTTP, headless Chrome) |
//! | [`source`] | Source adapter trait and the selector-driven adapter |
//! | [`sources`] | Built-in source registry |
//! | [`pagination`] | Pagination state machine with hard ceilings |
//! | [`normalize`] | URL, text, and date normalization |
//! | [`keyphrase`] | Unigram/bigram keyphrase candidates and ranking |
//! | [`embedding`] | Embedding providers (local, OpenAI, Ollama) |
//! | [`classify`] | Embedding and classification service |
//! | [`enrich`] | Fragment → article enrichment |
//! | [`retry`] | Exponential-backoff retry policy |
//! | [`writer`] | URL-keyed ingestion writer |
//! | [`scrape`] | Per-source and all-source orchestration |
//! | [`sqlite_store`] | SQLite content store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`stats`] | `harvest stats` |
//! | [`export`] | `harvest export` |

pub mod browser;
pub mod classify;
pub mod config;
pub mod db;
pub mod embedding;
pub mod enrich;
pub mod export;
pub mod keyphrase;
pub mod logging;
pub mod migrate;
pub mod normalize;
pub mod pagination;
pub mod retry;
pub mod scrape;
pub mod source;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
pub mod writer;
