//! Shared domain types for Flowchat.
//!
//! This crate has no business logic: it defines the data shapes exchanged
//! between the orchestration engine (flowchat-core), the external
//! collaborators (flowchat-infra), and the HTTP layer (flowchat-api).

pub mod chunk;
pub mod error;
pub mod llm;
