//! Unibot LLM crate - OpenAI-compatible chat completion and embedding client.

pub mod client;

pub use client::{ClientSettings, OpenAiClient};
