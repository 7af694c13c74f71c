//! LLM plumbing shared by the generator and reviewer adapters.

mod client;
mod models;
mod parse;
pub mod prompts;

pub use client::{ChatClient, ChatOptions};
pub use models::Model;
pub use parse::{parse_response, truncate_for_prompt};
