//! Personal Finance Chatbot backend
//!
//! The core behind a chat-based personal finance assistant:
//! - Rule-based insights (budget split, emergency fund, goal tips)
//! - Progressive income-tax estimation with a versionable bracket table
//! - Persistence for profiles, transactions, and the chat transcript
//! - Transaction CSV ingestion with whole-upload validation
//! - A REST API surface and a pluggable reply generator
//!
//! FLOW: PROFILE → TRANSACTIONS → INSIGHTS → CHAT → TRANSCRIPT

pub mod api;
pub mod chat;
pub mod error;
pub mod ingest;
pub mod insights;
pub mod models;
pub mod nlp;
pub mod store;
pub mod tax;

pub use error::Result;

// Re-export common types
pub use models::*;
