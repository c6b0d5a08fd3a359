use std::fmt::Write as FmtWrite;

use serde::Serialize;
use serde_json::json;

use crate::llms::LlmResponse;
use crate::models::{Chunk, OutputFormat, QueryResult};
use crate::observability::MetricSummary;
use crate::prompts::Prompt;
use crate::services::TEXT_KEY;

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_chunks(&self, chunks: &[Chunk]) -> String;
    fn format_embeddings(&self, embeddings: &EmbeddingOutput) -> String;
    fn format_index_stats(&self, stats: &IndexStats) -> String;
    fn format_query_results(&self, results: &QueryOutput) -> String;
    fn format_completion(&self, completion: &CompletionOutput) -> String;
    fn format_deleted(&self, namespace: &str, deleted: u64) -> String;
    fn format_prompt_list(&self, prompts: &[(String, String)]) -> String;
    fn format_prompt(&self, prompt: &Prompt) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingOutput {
    pub backend: String,
    pub model: String,
    pub dimension: usize,
    pub texts: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
pub struct CompletionOutput {
    pub provider: String,
    pub model: String,
    #[serde(flatten)]
    pub response: LlmResponse,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub namespace: String,
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub chunks_created: u64,
    pub items_written: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    pub query: String,
    pub namespace: String,
    pub results: Vec<QueryResult>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_backend: String,
    pub embedding_model: String,
    pub embedding_healthy: bool,
    pub embedding_error: Option<String>,
    pub vector_store_driver: String,
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub namespace: String,
    pub namespace_count: Option<u64>,
    pub metrics: Option<Vec<MetricSummary>>,
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}

fn status_tag(ok: bool, up: &'static str, down: &'static str) -> &'static str {
    if ok { up } else { down }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_chunks(&self, chunks: &[Chunk]) -> String {
        if chunks.is_empty() {
            return "No chunks produced.\n".to_string();
        }

        let mut output = String::new();
        let _ = writeln!(output, "{} chunks\n", chunks.len());
        for chunk in chunks {
            let _ = writeln!(
                output,
                "[{}] {} ({} chars)",
                chunk.chunk_index().unwrap_or_default(),
                chunk.chunk_id,
                chunk.char_len()
            );
            for line in preview(&chunk.text).lines() {
                let _ = writeln!(output, "   {}", line);
            }
            let _ = writeln!(output);
        }
        output
    }

    fn format_embeddings(&self, embeddings: &EmbeddingOutput) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "Model: {} ({}), dimension {}\n",
            embeddings.model, embeddings.backend, embeddings.dimension
        );
        for (text, vector) in embeddings.texts.iter().zip(&embeddings.vectors) {
            let head: Vec<String> = vector.iter().take(5).map(|v| format!("{:.4}", v)).collect();
            let _ = writeln!(output, "{}", preview(text));
            let _ = writeln!(output, "   [{}, ...]", head.join(", "));
        }
        output
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Indexing Complete");
        let _ = writeln!(output, "-----------------");
        let _ = writeln!(output, "Namespace:      {}", stats.namespace);
        let _ = writeln!(output, "Files indexed:  {}", stats.files_indexed);
        let _ = writeln!(output, "Files skipped:  {}", stats.files_skipped);
        let _ = writeln!(output, "Chunks created: {}", stats.chunks_created);
        let _ = writeln!(output, "Items written:  {}", stats.items_written);
        let _ = writeln!(output, "Duration:       {}ms", stats.duration_ms);
        output
    }

    fn format_query_results(&self, results: &QueryOutput) -> String {
        if results.results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        let _ = writeln!(output, "Search results for: \"{}\"", results.query);
        let _ = writeln!(
            output,
            "Found {} results in {}ms (namespace {})\n",
            results.results.len(),
            results.duration_ms,
            results.namespace
        );

        for (i, result) in results.results.iter().enumerate() {
            let _ = writeln!(output, "{}. [Score: {:.3}] {}", i + 1, result.score, result.id);
            let extra: Vec<String> = result
                .metadata
                .iter()
                .filter(|(k, _)| k.as_str() != TEXT_KEY)
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            if !extra.is_empty() {
                let _ = writeln!(output, "   Metadata: {}", extra.join(", "));
            }
            if let Some(text) = result.metadata.get(TEXT_KEY).and_then(|v| v.as_str()) {
                let _ = writeln!(output, "   ---");
                for line in preview(text).lines() {
                    let _ = writeln!(output, "   {}", line);
                }
            }
            let _ = writeln!(output);
        }
        output
    }

    fn format_completion(&self, completion: &CompletionOutput) -> String {
        let response = &completion.response;
        let mut output = String::new();
        if let Some(content) = &response.content {
            let _ = writeln!(output, "{}", content);
        }
        for call in &response.tool_calls {
            let _ = writeln!(
                output,
                "Tool call {}: {}({})",
                call.id,
                call.name,
                serde_json::Value::Object(call.arguments.clone())
            );
        }
        let _ = writeln!(
            output,
            "\n[{} {}] finish: {}, tokens: {} ({} prompt + {} completion), {:.0}ms",
            completion.provider,
            completion.model,
            response.finish_reason,
            response.usage.total_tokens,
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            response.latency_ms
        );
        output
    }

    fn format_deleted(&self, namespace: &str, deleted: u64) -> String {
        format!("Deleted {} items from namespace {}\n", deleted, namespace)
    }

    fn format_prompt_list(&self, prompts: &[(String, String)]) -> String {
        if prompts.is_empty() {
            return "No prompts found.\n".to_string();
        }

        let mut output = String::new();
        let _ = writeln!(output, "Prompts");
        let _ = writeln!(output, "-------");
        for (name, version) in prompts {
            let _ = writeln!(output, "  {} v{}", name, version);
        }
        output
    }

    fn format_prompt(&self, prompt: &Prompt) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "{} v{}", prompt.name, prompt.version);
        if !prompt.description.is_empty() {
            let _ = writeln!(output, "{}", prompt.description);
        }
        if !prompt.inputs.is_empty() {
            let _ = writeln!(output, "\nInputs:");
            for (name, description) in &prompt.inputs {
                let _ = writeln!(output, "  {}: {}", name, description);
            }
        }
        let _ = writeln!(output, "\nTemplate:\n{}", prompt.text());
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Status");
        let _ = writeln!(output, "------");

        let _ = writeln!(
            output,
            "Embeddings:    {} {}",
            status.embedding_backend,
            status_tag(status.embedding_healthy, "[OK]", "[UNAVAILABLE]")
        );
        let _ = writeln!(output, "  Model:       {}", status.embedding_model);
        if let Some(ref error) = status.embedding_error {
            let _ = writeln!(output, "  Error:       {}", error);
        }
        let _ = writeln!(output);

        let _ = writeln!(
            output,
            "Vector Store:  {} {}",
            status.vector_store_driver,
            status_tag(status.vector_store_connected, "[CONNECTED]", "[DISCONNECTED]")
        );
        let _ = writeln!(output, "  URL:         {}", status.vector_store_url);
        if let Some(count) = status.namespace_count {
            let _ = writeln!(output, "  Items:       {} ({})", count, status.namespace);
        }

        if let Some(ref metrics) = status.metrics {
            let _ = writeln!(output, "\nMetrics");
            if metrics.is_empty() {
                let _ = writeln!(output, "  (no events recorded)");
            }
            for m in metrics {
                let _ = writeln!(
                    output,
                    "  {:<28} events={:<6} avg={:.2} max={:.2}",
                    m.name, m.events, m.avg, m.max
                );
            }
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &impl Serialize) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut output = rendered.unwrap_or_else(|e| json!({"error": e.to_string()}).to_string());
        output.push('\n');
        output
    }
}

impl Formatter for JsonFormatter {
    fn format_chunks(&self, chunks: &[Chunk]) -> String {
        self.render(&chunks)
    }

    fn format_embeddings(&self, embeddings: &EmbeddingOutput) -> String {
        self.render(embeddings)
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        self.render(stats)
    }

    fn format_query_results(&self, results: &QueryOutput) -> String {
        self.render(results)
    }

    fn format_completion(&self, completion: &CompletionOutput) -> String {
        self.render(completion)
    }

    fn format_deleted(&self, namespace: &str, deleted: u64) -> String {
        self.render(&json!({"namespace": namespace, "deleted": deleted}))
    }

    fn format_prompt_list(&self, prompts: &[(String, String)]) -> String {
        let prompts: Vec<_> = prompts
            .iter()
            .map(|(name, version)| json!({"name": name, "version": version}))
            .collect();
        self.render(&json!({"prompts": prompts}))
    }

    fn format_prompt(&self, prompt: &Prompt) -> String {
        self.render(prompt)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_message(&self, message: &str) -> String {
        self.render(&json!({"message": message}))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::models::Metadata;

    fn result(id: &str, text: &str) -> QueryResult {
        let mut metadata = Metadata::new();
        metadata.insert(TEXT_KEY.to_string(), text.into());
        metadata.insert("lang".to_string(), "en".into());
        QueryResult {
            id: id.to_string(),
            score: 0.875,
            metadata,
        }
    }

    #[test]
    fn test_text_query_results() {
        let output = TextFormatter.format_query_results(&QueryOutput {
            query: "rust".to_string(),
            namespace: "docs".to_string(),
            results: vec![result("a", "Rust is fast")],
            duration_ms: 12,
        });

        assert!(output.contains("1. [Score: 0.875] a"));
        assert!(output.contains("Metadata: lang=\"en\""));
        assert!(output.contains("   Rust is fast"));
        assert!(!output.contains("text="));
    }

    #[test]
    fn test_text_query_results_empty() {
        let output = TextFormatter.format_query_results(&QueryOutput {
            query: "rust".to_string(),
            namespace: "docs".to_string(),
            results: vec![],
            duration_ms: 1,
        });
        assert_eq!(output, "No results found for: rust\n");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let text = "é".repeat(PREVIEW_CHARS + 5);
        let shown = preview(&text);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_json_output_parses() {
        let formatter = JsonFormatter::new(false);

        let parsed: Value =
            serde_json::from_str(&formatter.format_deleted("docs", 3)).unwrap();
        assert_eq!(parsed, json!({"namespace": "docs", "deleted": 3}));

        let parsed: Value = serde_json::from_str(&formatter.format_prompt_list(&[(
            "qa".to_string(),
            "1.0".to_string(),
        )]))
        .unwrap();
        assert_eq!(parsed["prompts"][0]["version"], "1.0");
    }

    fn completion() -> CompletionOutput {
        use crate::llms::{FinishReason, ToolUse, Usage};

        CompletionOutput {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            response: LlmResponse {
                content: Some("Adding.".to_string()),
                tool_calls: vec![ToolUse {
                    id: "call_1".to_string(),
                    name: "add".to_string(),
                    arguments: json!({"a": 1}).as_object().cloned().unwrap(),
                }],
                finish_reason: FinishReason::ToolCalls,
                usage: Usage {
                    prompt_tokens: 7,
                    completion_tokens: 3,
                    total_tokens: 10,
                },
                latency_ms: 42.0,
            },
        }
    }

    #[test]
    fn test_completion_output() {
        let text = TextFormatter.format_completion(&completion());
        assert!(text.starts_with("Adding.\n"));
        assert!(text.contains("Tool call call_1: add({\"a\":1})"));
        assert!(text.contains("finish: tool_calls, tokens: 10 (7 prompt + 3 completion), 42ms"));

        let parsed: Value =
            serde_json::from_str(&JsonFormatter::new(false).format_completion(&completion()))
                .unwrap();
        assert_eq!(parsed["provider"], "openai");
        assert_eq!(parsed["finish_reason"], "tool_calls");
        assert_eq!(parsed["usage"]["total_tokens"], 10);
    }

    #[test]
    fn test_get_formatter() {
        let text = get_formatter(OutputFormat::Text).format_message("done");
        assert_eq!(text, "done\n");

        let json_out = get_formatter(OutputFormat::Json).format_message("done");
        let parsed: Value = serde_json::from_str(&json_out).unwrap();
        assert_eq!(parsed["message"], "done");
    }
}
