//! Locus core library: intent routing, query synthesis, safe execution,
//! and response shaping over an outlet record store.
//!
//! The main entry point is [`pipeline::Pipeline`], which classifies a
//! question and then either replies conversationally or answers it from a
//! [`store::RecordStore`] through a generated read-only query.

pub mod classify;
pub mod config;
pub mod error;
pub mod execute;
pub mod llm;
pub mod pipeline;
pub mod schema;
pub mod shape;
pub mod store;
pub mod synthesize;
