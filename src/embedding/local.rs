//! Sentence embeddings computed in-process with ONNX Runtime.
//!
//! Expects `model.onnx` and `tokenizer.json` for a 384-dimensional sentence
//! transformer (all-MiniLM-L6-v2 by default) in the configured cache
//! directory. Token vectors are mean-pooled over the attention mask and
//! L2-normalized, so cosine similarity reduces to a dot product.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::{l2_normalize, EmbeddingProvider, LOCAL_EMBEDDING_DIM};
use crate::config::{expand_tilde, EmbeddingConfig};
use crate::error::{RagError, Result};

/// Longest token sequence fed to the model; longer chunks are truncated.
const MAX_TOKENS: usize = 256;

const INTRA_THREADS: usize = 4;

/// Texts per ONNX run. Bounds activation memory during corpus ingestion.
const INFERENCE_BATCH: usize = 32;

pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// The session is only touched while the mutex is held.
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

fn provider_err<E: Display>(what: &str) -> impl Fn(E) -> RagError + '_ {
    move |e| RagError::Provider(format!("{what}: {e}"))
}

fn config_err<E: Display>(what: &str) -> impl Fn(E) -> RagError + '_ {
    move |e| RagError::Config(format!("{what}: {e}"))
}

/// Paths of the model artifacts inside the cache directory.
struct ModelFiles {
    model: PathBuf,
    tokenizer: PathBuf,
}

impl ModelFiles {
    fn locate(config: &EmbeddingConfig) -> Result<Self> {
        let dir = expand_tilde(&config.cache_dir);
        let files = Self {
            model: dir.join("model.onnx"),
            tokenizer: dir.join("tokenizer.json"),
        };
        for path in [&files.model, &files.tokenizer] {
            if !path.is_file() {
                return Err(RagError::Config(format!(
                    "{} is missing; run `ragbase model download` first",
                    path.display()
                )));
            }
        }
        Ok(files)
    }
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let files = ModelFiles::locate(config)?;

        let session = Session::builder()
            .map_err(config_err("creating ONNX session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(config_err("setting graph optimization level"))?
            .with_intra_threads(INTRA_THREADS)
            .map_err(config_err("setting intra-op threads"))?
            .commit_from_file(&files.model)
            .map_err(config_err("loading ONNX model"))?;

        let mut tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(config_err("loading tokenizer"))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(config_err("configuring truncation"))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(
            model = %config.model,
            path = %files.model.display(),
            "local embedding model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }
}

/// Row-major `[batch, seq]` token inputs for one padded batch.
struct BatchInputs {
    batch: usize,
    seq_len: usize,
    ids: Vec<i64>,
    mask: Vec<i64>,
}

impl BatchInputs {
    fn from_encodings(encodings: &[Encoding]) -> Self {
        let batch = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());
        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        for encoding in encodings {
            ids.extend(encoding.get_ids().iter().map(|&id| i64::from(id)));
            mask.extend(encoding.get_attention_mask().iter().map(|&m| i64::from(m)));
        }
        Self {
            batch,
            seq_len,
            ids,
            mask,
        }
    }

    fn shape(&self) -> Vec<i64> {
        vec![self.batch as i64, self.seq_len as i64]
    }
}

/// Run `f` over consecutive slices of at most `size` texts and concatenate the results in order.
fn in_batches<T>(
    texts: &[&str],
    size: usize,
    mut f: impl FnMut(&[&str]) -> Result<Vec<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(size.max(1)) {
        out.extend(f(batch)?);
    }
    Ok(out)
}

/// Average the token vectors of each sequence where `mask` is set.
///
/// `hidden` is laid out `[batch, seq_len, dim]`. A sequence with no unmasked
/// tokens pools to the zero vector.
fn mean_pool(hidden: &[f32], mask: &[i64], batch: usize, seq_len: usize, dim: usize) -> Vec<Vec<f32>> {
    (0..batch)
        .map(|b| {
            let mut pooled = vec![0.0f32; dim];
            let mut tokens = 0usize;
            for s in 0..seq_len {
                if mask[b * seq_len + s] == 0 {
                    continue;
                }
                let row = &hidden[(b * seq_len + s) * dim..][..dim];
                pooled.iter_mut().zip(row).for_each(|(acc, x)| *acc += x);
                tokens += 1;
            }
            if tokens > 0 {
                pooled.iter_mut().for_each(|v| *v /= tokens as f32);
            }
            pooled
        })
        .collect()
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| RagError::Provider("model returned no embedding".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        in_batches(texts, INFERENCE_BATCH, |batch| {
            tracing::debug!(size = batch.len(), "running local inference batch");
            self.run_inference(batch)
        })
    }

    fn dimensions(&self) -> usize {
        LOCAL_EMBEDDING_DIM
    }

    fn name(&self) -> &str {
        "local-neural"
    }
}

impl LocalEmbeddingProvider {
    /// One padded ONNX run over `texts`.
    fn run_inference(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(provider_err("tokenizing batch"))?;
        let inputs = BatchInputs::from_encodings(&encodings);

        let ids = Tensor::from_array((inputs.shape(), inputs.ids.clone().into_boxed_slice()))
            .map_err(provider_err("building input_ids"))?;
        let mask = Tensor::from_array((inputs.shape(), inputs.mask.clone().into_boxed_slice()))
            .map_err(provider_err("building attention_mask"))?;
        // Single-segment input: every token belongs to sentence A.
        let segments = vec![0i64; inputs.batch * inputs.seq_len];
        let segments = Tensor::from_array((inputs.shape(), segments.into_boxed_slice()))
            .map_err(provider_err("building token_type_ids"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::Provider(format!("session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs! {
                "input_ids" => ids,
                "attention_mask" => mask,
                "token_type_ids" => segments,
            })
            .map_err(provider_err("running ONNX inference"))?;

        // Exports disagree on the output name; the first output is the token states.
        let hidden = outputs
            .get("last_hidden_state")
            .or_else(|| outputs.get("token_embeddings"))
            .unwrap_or_else(|| &outputs[0]);
        let (shape, data) = hidden
            .try_extract_tensor::<f32>()
            .map_err(provider_err("reading token states"))?;

        let dims: &[i64] = &shape;
        let expected = [inputs.batch as i64, inputs.seq_len as i64, LOCAL_EMBEDDING_DIM as i64];
        if dims != expected {
            return Err(RagError::Provider(format!(
                "model output shape {dims:?}, expected {expected:?}"
            )));
        }

        let mut pooled = mean_pool(data, &inputs.mask, inputs.batch, inputs.seq_len, LOCAL_EMBEDDING_DIM);
        pooled.iter_mut().for_each(|v| l2_normalize(v));
        Ok(pooled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::search::cosine_similarity;

    #[test]
    fn mean_pool_skips_padding() {
        // batch 2, seq 3, dim 2; second sequence has one padding token
        let hidden = [
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, //
            2.0, 0.0, 4.0, 0.0, 100.0, 100.0,
        ];
        let mask = [1, 1, 1, 1, 1, 0];
        let pooled = mean_pool(&hidden, &mask, 2, 3, 2);
        assert_eq!(pooled, vec![vec![3.0, 4.0], vec![3.0, 0.0]]);
    }

    #[test]
    fn mean_pool_of_fully_masked_sequence_is_zero() {
        let pooled = mean_pool(&[1.0, 1.0], &[0], 1, 1, 2);
        assert_eq!(pooled, vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn in_batches_splits_and_keeps_order() {
        let texts: Vec<String> = (0..70).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let mut sizes = Vec::new();
        let out = in_batches(&refs, INFERENCE_BATCH, |batch| {
            sizes.push(batch.len());
            Ok(batch.iter().map(|t| t.to_string()).collect())
        })
        .unwrap();
        assert_eq!(sizes, vec![32, 32, 6]);
        assert_eq!(out, texts);
    }

    #[test]
    fn in_batches_stops_at_first_error() {
        let mut calls = 0;
        let result: Result<Vec<()>> = in_batches(&["a", "b", "c"], 1, |_| {
            calls += 1;
            Err(RagError::Provider("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
        assert!(in_batches::<()>(&[], 4, |_| unreachable!()).unwrap().is_empty());
    }

    #[test]
    fn missing_model_files_are_a_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = EmbeddingConfig {
            cache_dir: tmp.path().to_string_lossy().into_owned(),
            ..EmbeddingConfig::default()
        };
        let err = ModelFiles::locate(&config).err().unwrap();
        assert!(err.is_config());
        assert!(err.to_string().contains("model.onnx"));
    }

    fn provider() -> LocalEmbeddingProvider {
        let config = EmbeddingConfig {
            cache_dir: crate::config::default_ragbase_dir()
                .join("models")
                .to_string_lossy()
                .into_owned(),
            ..EmbeddingConfig::default()
        };
        LocalEmbeddingProvider::new(&config).unwrap()
    }

    #[test]
    #[ignore] // needs `ragbase model download`; run with `cargo test -- --ignored`
    fn vectors_are_unit_length_and_384_wide() {
        let v = provider().embed("Opening hours are nine to five").unwrap();
        assert_eq!(v.len(), LOCAL_EMBEDDING_DIM);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[test]
    #[ignore]
    fn batched_and_single_embeddings_agree() {
        let provider = provider();
        let texts = ["Where is the parking?", "Returns are accepted within thirty days"];
        let batch = provider.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 2);
        for (text, batched) in texts.iter().zip(&batch) {
            let single = provider.embed(text).unwrap();
            assert!(cosine_similarity(&single, batched).unwrap() > 0.999);
        }
    }

    #[test]
    #[ignore]
    fn paraphrases_score_above_unrelated_text() {
        let provider = provider();
        let a = provider.embed("How do I renew my trade licence?").unwrap();
        let b = provider.embed("Steps for trade licence renewal").unwrap();
        let c = provider.embed("The recipe needs two cups of flour").unwrap();
        let close = cosine_similarity(&a, &b).unwrap();
        let far = cosine_similarity(&a, &c).unwrap();
        assert!(close > far, "close={close} far={far}");
    }
}
