//! External collaborators for Flowchat: the OpenAI-compatible LLM provider,
//! the data-lookup tools, and the configuration loader.

pub mod config;
pub mod llm;
pub mod tools;
