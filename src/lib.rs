//! Newsbrief: scheduled Bitcoin news digests summarized by a tool-calling model.
//!
//! A small HTTP tool server exposes news and weather lookups, a registry
//! advertises the same tools to a remote chat model, and an hourly pipeline
//! fetches headlines, has the model summarize them and mails the result.

pub mod agent;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod providers;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod tools;
pub mod types;
