//! taskforge: a queue-driven pipeline that generates file changes with an
//! LLM, validates them against the target repository's own build, and
//! iterates on reviewer feedback until the change set passes or its retry
//! budgets run out.

pub mod build;
pub mod change;
pub mod config;
pub mod context;
pub mod generate;
pub mod llm;
pub mod logging;
pub mod patch;
pub mod pipeline;
pub mod report;
pub mod resilient;
pub mod review;
pub mod task;
pub mod util;
pub mod writer;
