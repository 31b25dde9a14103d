//! Exact inner-product index over L2-normalized rows.
//!
//! Rows are normalized on insert and queries at search time, so the inner
//! product is cosine similarity. Persisted with bincode.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use refdex_core::traits::VectorIndex;

use crate::layout::write_atomic;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimensions: usize,
    /// Row-major, `len() * dimensions` values.
    data: Vec<f32>,
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

impl FlatIndex {
    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dimensions..(i + 1) * self.dimensions]
    }
}

impl VectorIndex for FlatIndex {
    fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions, data: Vec::new() }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.data.len() / self.dimensions
        }
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for (i, v) in vectors.iter().enumerate() {
            ensure!(
                v.len() == self.dimensions,
                "vector {i} has {} dimensions, index expects {}",
                v.len(),
                self.dimensions
            );
        }
        self.data.reserve(vectors.len() * self.dimensions);
        for v in vectors {
            let start = self.data.len();
            self.data.extend_from_slice(v);
            normalize(&mut self.data[start..]);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimensions {
            bail!("query has {} dimensions, index expects {}", query.len(), self.dimensions);
        }
        let mut q = query.to_vec();
        normalize(&mut q);

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, self.row(i).iter().zip(&q).map(|(a, b)| a * b).sum()))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| {
            let mut buf = BufWriter::new(w);
            bincode::serialize_into(&mut buf, self).context("encoding vector index")?;
            buf.flush()?;
            Ok(())
        })
    }

    fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let index: FlatIndex =
            bincode::deserialize_from(BufReader::new(file)).with_context(|| format!("decoding {}", path.display()))?;
        ensure!(
            index.dimensions > 0 && index.data.len() % index.dimensions == 0,
            "{} is truncated or corrupt",
            path.display()
        );
        Ok(index)
    }
}
