//! Exact (flat) vector index over one immutable generation.
//!
//! A generation stores every vector in a single row-major buffer next to the
//! rule records they were computed from. Slot `i` owns
//! `vectors[i * dim..(i + 1) * dim]` and `records[i]`; the two sequences are
//! filled together at construction and never touched again.
//!
//! Search is brute force: squared Euclidean distance against every slot,
//! keeping the best `k` in a bounded max-heap. O(N·D) per query, which is
//! fine for a rule base in the thousands.

use crate::embeddings::{check_batch, EmbeddingProvider};
use crate::otel::{background_span, record_background_metrics, BackgroundJobType};
use crate::types::{Embedding, Result, RetrievalError, RuleRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;
use tracing::Instrument;

/// Where a generation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSource {
    /// Embedded from a rule store snapshot in this process
    Built,
    /// Read back from a persisted snapshot
    Restored,
}

/// Descriptive data about a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    /// When the vectors were computed (kept across restore)
    pub built_at: DateTime<Utc>,
    pub source: GenerationSource,
    pub entries: usize,
    pub dimensions: usize,
}

/// One immutable, internally consistent build of the index.
#[derive(Debug, Clone)]
pub struct IndexGeneration {
    dimensions: usize,
    vectors: Vec<f64>,
    records: Vec<RuleRecord>,
    built_at: DateTime<Utc>,
    source: GenerationSource,
}

/// Search result borrowed from a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<'a> {
    /// Dense position of the entry in its generation
    pub slot: usize,
    pub record: &'a RuleRecord,
    /// Squared Euclidean distance to the query
    pub distance: f64,
}

/// Heap entry ordered by (distance, slot); the heap top is the worst kept hit.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    slot: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

impl IndexGeneration {
    /// Generation with no entries.
    pub fn empty(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: Vec::new(),
            records: Vec::new(),
            built_at: Utc::now(),
            source: GenerationSource::Built,
        }
    }

    /// Assemble a generation from per-record vectors.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Embedding` if the vector count differs from the
    /// record count, any vector is not `dimensions` long, or `dimensions` is
    /// zero while there are records
    pub fn from_parts(
        dimensions: usize,
        vectors: Vec<Embedding>,
        records: Vec<RuleRecord>,
        built_at: DateTime<Utc>,
        source: GenerationSource,
    ) -> Result<Self> {
        if dimensions == 0 && !records.is_empty() {
            return Err(RetrievalError::embedding(
                "zero-dimension vectors cannot be indexed",
            ));
        }
        check_batch(&vectors, records.len(), dimensions)?;

        let mut flat = Vec::with_capacity(records.len() * dimensions);
        for vector in vectors {
            flat.extend(vector);
        }

        Ok(Self {
            dimensions,
            vectors: flat,
            records,
            built_at,
            source,
        })
    }

    /// Embed `records` and build a generation from them.
    ///
    /// Each record contributes `title + " " + description`, embedded in one
    /// batch call in record order. On any failure nothing is returned; there
    /// is no partial generation.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Embedding` if the provider fails or returns a
    /// malformed batch
    pub async fn build(records: Vec<RuleRecord>, embedder: &dyn EmbeddingProvider) -> Result<Self> {
        let dimensions = embedder.dimensions();
        if records.is_empty() {
            return Ok(Self::empty(dimensions));
        }

        let texts: Vec<String> = records.iter().map(RuleRecord::embedding_text).collect();

        let span = background_span(BackgroundJobType::EmbeddingGeneration, embedder.model_name());
        let started = Instant::now();
        let result = embedder.embed_batch(&texts).instrument(span.clone()).await;
        let elapsed = started.elapsed().as_millis() as u64;

        let vectors = match result {
            Ok(vectors) => {
                record_background_metrics(&span, Some(texts.len()), Some(elapsed), "success");
                vectors
            }
            Err(e) => {
                record_background_metrics(&span, Some(texts.len()), Some(elapsed), "failed");
                return Err(e);
            }
        };

        Self::from_parts(dimensions, vectors, records, Utc::now(), GenerationSource::Built)
    }

    /// The `k` entries closest to `query`, ascending by distance.
    ///
    /// Ties are broken by ascending slot, i.e. original record order. An
    /// empty generation or `k == 0` yields an empty result; `k` larger than
    /// the entry count yields every entry.
    ///
    /// # Errors
    ///
    /// Returns `RetrievalError::Embedding` if the generation has entries and
    /// `query` is not `dimensions` long
    pub fn search(&self, query: &[f64], k: usize) -> Result<Vec<SearchHit<'_>>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(RetrievalError::embedding(format!(
                "query vector has dimension {}, index expects {}",
                query.len(),
                self.dimensions
            )));
        }

        let k = k.min(self.len());
        let mut heap = BinaryHeap::with_capacity(k + 1);

        for (slot, row) in self.vectors.chunks_exact(self.dimensions).enumerate() {
            let candidate = Candidate {
                distance: squared_l2(query, row),
                slot,
            };
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| SearchHit {
                slot: c.slot,
                record: &self.records[c.slot],
                distance: c.distance,
            })
            .collect())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` if the generation holds no entries.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Vector dimension.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Records in slot order.
    pub fn records(&self) -> &[RuleRecord] {
        &self.records
    }

    /// Row-major vector buffer, `len() * dimensions()` values.
    pub fn raw_vectors(&self) -> &[f64] {
        &self.vectors
    }

    /// Build timestamp.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Generation metadata.
    pub fn info(&self) -> GenerationInfo {
        GenerationInfo {
            built_at: self.built_at,
            source: self.source,
            entries: self.len(),
            dimensions: self.dimensions,
        }
    }
}

/// Squared Euclidean distance.
fn squared_l2(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
