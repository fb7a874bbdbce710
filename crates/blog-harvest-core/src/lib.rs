//! # Blog Harvest Core
//!
//! Shared, runtime-agnostic logic for Blog Harvest: article data models,
//! embedding validation and vector helpers, and the content store
//! abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or browser dependencies. The
//! scraping pipeline, the SQLite store, and the CLI live in the
//! `blog-harvest` app crate.

pub mod embedding;
pub mod models;
pub mod store;
