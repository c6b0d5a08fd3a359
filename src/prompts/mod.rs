//! Versioned prompt files.

mod library;

pub use library::{Prompt, PromptsLibrary};
