pub mod cli;
pub mod error;
pub mod llms;
pub mod models;
pub mod observability;
pub mod prompts;
pub mod services;
pub mod tools;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::AppError;
pub use llms::{LlmClient, LlmResponse, Message};
pub use models::{Chunk, Config, Metadata, OutputFormat, QueryResult, VectorItem};
pub use observability::{MetricsHook, NoOpMetricsHook, SharedMetricsHook};
pub use prompts::{Prompt, PromptsLibrary};
pub use services::{EmbeddingsClient, TextChunker, VectorStore};
pub use tools::{Tool, ToolCall, ToolEngine, ToolRegistry};
