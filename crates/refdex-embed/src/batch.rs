//! Bulk embedding on a bounded worker pool.
//!
//! Each text is one blocking embedding call. At most `workers` calls run at
//! once; results are placed by input position, not completion order. The
//! first failure fails the whole batch.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use refdex_core::error::{Error, Result};
use refdex_core::traits::{DocumentEmbedding, Embedder};

/// Vectors in input order plus the summed token count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchEmbeddings {
    pub vectors: Vec<Vec<f32>>,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub workers: usize,
    pub show_progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { workers: 4, show_progress: false }
    }
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("Generating embeddings");
    pb
}

/// Embeds `texts` for indexing. Every vector is checked against the
/// embedder's configured width.
pub fn embed_documents(embedder: &Arc<dyn Embedder>, texts: &[String], opts: BatchOptions) -> Result<BatchEmbeddings> {
    if texts.is_empty() {
        return Ok(BatchEmbeddings::default());
    }
    let workers = opts.workers.max(1);
    info!(model = embedder.model_id(), texts = texts.len(), workers, "embedding batch");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(workers)
        .build()?;
    let pb = progress_bar(texts.len(), opts.show_progress);

    let embedded: Result<Vec<DocumentEmbedding>> = rt.block_on(async {
        let mut slots: Vec<Option<DocumentEmbedding>> = vec![None; texts.len()];
        let mut tasks = stream::iter(texts.iter().cloned().enumerate())
            .map(|(idx, text)| {
                let embedder = Arc::clone(embedder);
                tokio::task::spawn_blocking(move || (idx, embedder.embed_document(&text)))
            })
            .buffer_unordered(workers);

        while let Some(joined) = tasks.next().await {
            let (idx, result) = joined.map_err(|e| Error::Operation(format!("embedding task failed: {e}")))?;
            slots[idx] = Some(result?);
            pb.inc(1);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| slot.ok_or_else(|| Error::Operation(format!("embedding for text {idx} missing"))))
            .collect()
    });
    let embedded = match embedded {
        Ok(e) => e,
        Err(e) => {
            pb.abandon_with_message("embedding failed");
            return Err(e);
        }
    };
    pb.finish_with_message("done");

    let expected = embedder.dimensions();
    let mut out = BatchEmbeddings { vectors: Vec::with_capacity(embedded.len()), total_tokens: 0 };
    for (idx, e) in embedded.into_iter().enumerate() {
        if e.vector.len() != expected {
            return Err(Error::embedding(
                embedder.model_id(),
                format!("text {idx} produced {} dimensions, expected {expected}", e.vector.len()),
            ));
        }
        out.total_tokens += e.token_count;
        out.vectors.push(e.vector);
    }
    debug!(vectors = out.vectors.len(), tokens = out.total_tokens, "batch embedded");
    Ok(out)
}
