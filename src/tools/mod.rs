//! Typed tools that LLMs can call.

mod engine;
mod registry;
mod schema;
mod tool;

pub use engine::ToolEngine;
pub use registry::ToolRegistry;
pub use schema::{tools_to_anthropic_schema, tools_to_openai_schema};
pub use tool::{Tool, ToolCall};

#[cfg(test)]
pub(crate) use tool::fixtures;
