//! Sentence-transformer embeddings computed in-process with ONNX Runtime.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2, Ix3, IxDyn};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams, TruncationStrategy};

use super::EmbeddingsClient;
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::observability::{SharedMetricsHook, elapsed_ms, names, noop_hook};

const BACKEND: &str = "local";
const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

struct LocalModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    normalize: bool,
}

pub struct LocalEmbeddingsClient {
    model: Arc<LocalModel>,
    model_name: String,
    batch_size: usize,
    metrics: SharedMetricsHook,
}

impl LocalEmbeddingsClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_dir = config.model_path.as_deref().ok_or_else(|| {
            EmbeddingError::ConfigError(
                "embedding.model_path is required for the local provider".to_string(),
            )
        })?;
        Self::load(model_dir, config)
    }

    fn load(model_dir: &Path, config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);

        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(EmbeddingError::ModelNotFound(path.display().to_string()));
            }
        }

        let model_bytes =
            std::fs::read(&model_path).map_err(|e| EmbeddingError::ModelError(e.to_string()))?;

        let session = Session::builder()
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?
            .commit_from_memory(&model_bytes)
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        let model_name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_dir.display().to_string());

        tracing::info!(model = %model_name, path = %model_dir.display(), "loaded ONNX embedding model");

        Ok(Self {
            model: Arc::new(LocalModel {
                session: Mutex::new(session),
                tokenizer,
                normalize: config.normalize,
            }),
            model_name,
            batch_size: config.batch_size.max(1) as usize,
            metrics: noop_hook(),
        })
    }

    pub fn with_metrics_hook(mut self, hook: SharedMetricsHook) -> Self {
        self.metrics = hook;
        self
    }

    async fn embed_batch(&self, batch: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let labels = [("backend", BACKEND)];
        let start = Instant::now();
        self.metrics
            .record_gauge(names::EMBEDDINGS_BATCH_SIZE, batch.len() as f64, &labels);

        let model = Arc::clone(&self.model);
        let result = tokio::task::spawn_blocking(move || model.embed(&batch))
            .await
            .map_err(|e| EmbeddingError::ModelError(format!("inference task failed: {}", e)))
            .and_then(|r| r);

        self.metrics
            .record_latency(names::EMBEDDINGS_DURATION, elapsed_ms(start), &labels);
        self.metrics
            .increment(names::EMBEDDINGS_REQUESTS_TOTAL, 1, &labels);
        if result.is_err() {
            self.metrics
                .increment(names::EMBEDDINGS_ERRORS_TOTAL, 1, &labels);
        }
        result
    }
}

impl LocalModel {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;

        let batch_size = encodings.len();
        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut token_type_ids = vec![0i64; batch_size * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let row = i * seq_len;
            for (j, ((&id, &mask), &type_id)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids())
                .enumerate()
            {
                input_ids[row + j] = id as i64;
                attention_mask[row + j] = mask as i64;
                token_type_ids[row + j] = type_id as i64;
            }
        }

        let mask = ArrayView2::from_shape((batch_size, seq_len), attention_mask.as_slice())
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?
            .to_owned();

        let ids_tensor = Tensor::from_array(([batch_size, seq_len], input_ids))
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;
        let mask_tensor = Tensor::from_array(([batch_size, seq_len], attention_mask))
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::ModelError("session lock poisoned".to_string()))?;

        // BERT-style exports take token_type_ids as a third input; others stop at the mask.
        let outputs = if session.inputs.len() > 2 {
            let type_tensor = Tensor::from_array(([batch_size, seq_len], token_type_ids))
                .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;
            session.run(ort::inputs![ids_tensor, mask_tensor, type_tensor])
        } else {
            session.run(ort::inputs![ids_tensor, mask_tensor])
        }
        .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e: ort::Error| EmbeddingError::ModelError(e.to_string()))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let output = ArrayViewD::from_shape(IxDyn(&dims), data)
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;

        let mut vectors = pool(output, mask.view())?;
        if self.normalize {
            vectors.iter_mut().for_each(|v| l2_normalize(v));
        }
        Ok(vectors)
    }
}

/// Mean-pool `[batch, seq, dim]` token embeddings over the attention mask, or pass
/// `[batch, dim]` sentence embeddings through unchanged.
fn pool(output: ArrayViewD<'_, f32>, mask: ArrayView2<'_, i64>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    match output.ndim() {
        3 => {
            let hidden = output
                .into_dimensionality::<Ix3>()
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            Ok(hidden
                .axis_iter(Axis(0))
                .zip(mask.axis_iter(Axis(0)))
                .map(|(tokens, row_mask)| {
                    let mut sum = vec![0.0f32; tokens.shape()[1]];
                    let mut count = 0.0f32;
                    for (token, &m) in tokens.axis_iter(Axis(0)).zip(row_mask.iter()) {
                        if m == 0 {
                            continue;
                        }
                        count += 1.0;
                        for (s, &x) in sum.iter_mut().zip(token.iter()) {
                            *s += x;
                        }
                    }
                    let count = count.max(1e-9);
                    sum.iter().map(|s| s / count).collect()
                })
                .collect())
        }
        2 => {
            let pooled = output
                .into_dimensionality::<Ix2>()
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            Ok(pooled.outer_iter().map(|row| row.to_vec()).collect())
        }
        n => Err(EmbeddingError::ModelError(format!(
            "unexpected output rank {}",
            n
        ))),
    }
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[async_trait]
impl EmbeddingsClient for LocalEmbeddingsClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch.to_vec()).await?);
        }
        tracing::debug!(texts = texts.len(), "embedded texts locally");
        Ok(vectors)
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        self.model
            .session
            .lock()
            .map(|_| ())
            .map_err(|_| EmbeddingError::ModelError("session lock poisoned".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn model(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, Array3};

    use super::*;

    #[test]
    fn test_mean_pool_ignores_padding() {
        // batch=2, seq=3, dim=2; second row has one padding token.
        let hidden = Array3::from_shape_vec(
            (2, 3, 2),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 2.0, 2.0, 4.0, 4.0, 100.0, 100.0],
        )
        .unwrap();
        let mask = Array2::from_shape_vec((2, 3), vec![1, 1, 1, 1, 1, 0]).unwrap();

        let pooled = pool(hidden.view().into_dyn(), mask.view()).unwrap();

        assert_eq!(pooled, vec![vec![3.0, 4.0], vec![3.0, 3.0]]);
    }

    #[test]
    fn test_pool_passes_sentence_embeddings_through() {
        let output = Array2::from_shape_vec((2, 2), vec![0.5, 0.5, 1.0, 0.0]).unwrap();
        let mask = Array2::from_shape_vec((2, 1), vec![1, 1]).unwrap();

        let pooled = pool(output.view().into_dyn(), mask.view()).unwrap();

        assert_eq!(pooled, vec![vec![0.5, 0.5], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_pool_rejects_unexpected_rank() {
        let output = ndarray::Array1::from_vec(vec![1.0f32, 2.0]);
        let mask = Array2::<i64>::zeros((1, 2));
        assert!(pool(output.view().into_dyn(), mask.view()).is_err());
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            model_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let err = LocalEmbeddingsClient::new(&config).err().unwrap();
        match err {
            EmbeddingError::ModelNotFound(path) => assert!(path.ends_with(MODEL_FILE)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
