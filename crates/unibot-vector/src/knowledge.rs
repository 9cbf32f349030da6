//! Knowledge retrieval engine.
//!
//! Turns a table of FAQ rows into embedded chunks, answers free-text
//! questions by retrieving the closest chunks and asking a [`TextGenerator`]
//! to compose an answer grounded in them, and reports a confidence derived
//! from how many chunks survived the similarity threshold.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use unibot_core::config::RetrievalConfig;
use unibot_core::error::{Result, UnibotError};
use unibot_core::generation::TextGenerator;

use crate::chunker::TextSplitter;
use crate::embedding::DynEmbeddingService;
use crate::index::{SearchHit, VectorIndex};

/// Source label attached to every FAQ chunk.
pub const FAQ_SOURCE_LABEL: &str = "FAQ Database";

/// Maximum number of distinct source questions reported per answer.
pub const MAX_SOURCES: usize = 3;

/// Confidence is scaled by this factor so a full retrieval never reads as certain.
const CONFIDENCE_CEILING: f64 = 0.9;

const DEFAULT_TAG: &str = "general";

const NOT_READY_TEXT: &str = "I'm having technical difficulties. Please try again.";

/// Tunables for chunking and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub similarity_threshold: f64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            similarity_threshold: 0.65,
        }
    }
}

impl From<&RetrievalConfig> for RetrievalSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            top_k: config.top_k,
            similarity_threshold: config.similarity_threshold,
        }
    }
}

/// One row of the knowledge base table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRow {
    #[serde(rename = "Question")]
    pub question: String,
    #[serde(rename = "Answer")]
    pub answer: String,
    #[serde(rename = "Category", default)]
    pub category: String,
    #[serde(rename = "Interface", default)]
    pub interface: String,
}

impl KnowledgeRow {
    pub fn new(question: &str, answer: &str, category: &str, interface: &str) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.to_string(),
            category: category.to_string(),
            interface: interface.to_string(),
        }
    }

    /// The text that gets chunked and embedded for this row.
    pub fn document(&self) -> String {
        format!("Question: {}\n\nAnswer: {}", self.question, self.answer)
    }

    fn category_or_default(&self) -> &str {
        non_blank_or_default(&self.category)
    }

    fn interface_or_default(&self) -> &str {
        non_blank_or_default(&self.interface)
    }

    fn is_blank(&self) -> bool {
        self.question.trim().is_empty() && self.answer.trim().is_empty()
    }
}

fn non_blank_or_default(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        DEFAULT_TAG
    } else {
        trimmed
    }
}

/// Read knowledge rows from a CSV file with a header row.
///
/// `Category` and `Interface` columns are optional.
pub fn read_csv(path: &Path) -> Result<Vec<KnowledgeRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: KnowledgeRow = record?;
        rows.push(row);
    }
    Ok(rows)
}

/// A generated answer with its confidence and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeAnswer {
    pub answer: String,
    pub confidence: f64,
    pub sources: Vec<String>,
}

impl KnowledgeAnswer {
    fn fallback(answer: String) -> Self {
        Self {
            answer,
            confidence: 0.0,
            sources: Vec::new(),
        }
    }
}

/// A raw retrieval hit, without generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub content: String,
    pub question: String,
    pub category: String,
    pub interface: String,
    pub score: f64,
}

impl SimilarityHit {
    fn from_search_hit(hit: &SearchHit) -> Self {
        let field = |key: &str| {
            hit.metadata
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            content: field("content"),
            question: field("question"),
            category: field("category"),
            interface: field("interface"),
            score: hit.score,
        }
    }
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub rows: usize,
    pub chunks: usize,
}

/// Retrieval confidence for `surviving` chunks out of a top-`k` query.
///
/// Zero at zero, non-decreasing in `surviving`, capped at 0.9.
pub fn confidence(surviving: usize, k: usize) -> f64 {
    if surviving == 0 || k == 0 {
        return 0.0;
    }
    (surviving as f64 / k as f64).min(1.0) * CONFIDENCE_CEILING
}

/// Render the grounded-answer prompt.
pub fn render_prompt(context: &str, question: &str, salutation: &str) -> String {
    format!(
        "You are an AI assistant for Texila American University, helping students with their queries.\n\n\
         Use the following context to answer the student's question. If you don't find relevant information in the context, politely inform the student.\n\n\
         Context:\n{context}\n\n\
         Student Question: {question}\n\n\
         Instructions:\n\
         - Address the student as \"{salutation}\"\n\
         - Be professional, friendly, and concise\n\
         - Provide accurate information based on the context\n\
         - If unsure, admit it and suggest contacting support\n\
         - Use bullet points for clarity when listing multiple items\n\n\
         Answer:"
    )
}

fn miss_text(salutation: &str) -> String {
    format!(
        "{salutation}, I couldn't find specific information about your query. \
         Could you rephrase or provide more details?"
    )
}

fn error_text(salutation: &str) -> String {
    format!(
        "{salutation}, I encountered an error processing your question. \
         Please try again or contact support."
    )
}

/// Retrieval-augmented answer engine over an FAQ knowledge base.
///
/// Shared across bot workers behind an `Arc`. Queries read the index
/// concurrently; ingestion runs are serialized among themselves and swap
/// the index contents in one step.
pub struct KnowledgeEngine {
    embedder: Arc<dyn DynEmbeddingService>,
    generator: Arc<dyn TextGenerator>,
    index: VectorIndex,
    splitter: TextSplitter,
    settings: RetrievalSettings,
    index_path: Option<PathBuf>,
    ingest_lock: Mutex<()>,
}

impl std::fmt::Debug for KnowledgeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeEngine")
            .field("chunks", &self.index.len())
            .field("settings", &self.settings)
            .field("index_path", &self.index_path)
            .finish()
    }
}

impl KnowledgeEngine {
    pub fn new(
        embedder: Arc<dyn DynEmbeddingService>,
        generator: Arc<dyn TextGenerator>,
        settings: RetrievalSettings,
    ) -> Self {
        let splitter = TextSplitter::new(settings.chunk_size, settings.chunk_overlap);
        Self {
            embedder,
            generator,
            index: VectorIndex::new(),
            splitter,
            settings,
            index_path: None,
            ingest_lock: Mutex::new(()),
        }
    }

    /// Persist the index to `path` after every ingestion.
    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = Some(path.into());
        self
    }

    /// Load the persisted snapshot if one exists.
    ///
    /// Returns the number of chunks loaded; a missing snapshot loads nothing.
    pub fn load_persisted(&self) -> Result<usize> {
        let Some(path) = &self.index_path else {
            return Ok(0);
        };
        if !path.exists() {
            info!(path = %path.display(), "No persisted knowledge index found");
            return Ok(0);
        }
        self.index.load(path)
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Number of chunks currently searchable.
    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_ready(&self) -> bool {
        !self.index.is_empty()
    }

    /// Rebuild the index from `rows`, replacing everything.
    ///
    /// All chunks are embedded before the swap, so a failure leaves the
    /// previous index serving queries.
    pub async fn ingest(&self, rows: &[KnowledgeRow]) -> Result<IngestReport> {
        let _guard = self.ingest_lock.lock().await;

        let batch = self.embed_rows(rows, 0).await?;
        if batch.is_empty() {
            return Err(UnibotError::Retrieval(
                "Knowledge base produced no chunks".to_string(),
            ));
        }
        let report = IngestReport {
            rows: rows.iter().filter(|r| !r.is_blank()).count(),
            chunks: batch.len(),
        };

        if let Some(path) = &self.index_path {
            let staged = VectorIndex::new();
            staged.replace_all(batch.clone())?;
            staged.save(path)?;
        }
        self.index.replace_all(batch)?;

        info!(rows = report.rows, chunks = report.chunks, "Knowledge index rebuilt");
        Ok(report)
    }

    /// Read a CSV knowledge base and rebuild the index from it.
    pub async fn ingest_csv(&self, path: &Path) -> Result<IngestReport> {
        let rows = read_csv(path)?;
        info!(path = %path.display(), rows = rows.len(), "Read knowledge base");
        self.ingest(&rows).await
    }

    /// Append chunks for `rows` to the existing index and re-persist.
    pub async fn add_rows(&self, rows: &[KnowledgeRow]) -> Result<IngestReport> {
        let _guard = self.ingest_lock.lock().await;

        let batch = self.embed_rows(rows, self.index.len()).await?;
        let report = IngestReport {
            rows: rows.iter().filter(|r| !r.is_blank()).count(),
            chunks: batch.len(),
        };
        self.index.insert_batch(batch)?;

        if let Some(path) = &self.index_path {
            self.index.save(path)?;
        }

        info!(rows = report.rows, chunks = report.chunks, "Knowledge rows added");
        Ok(report)
    }

    async fn embed_rows(
        &self,
        rows: &[KnowledgeRow],
        first_chunk_id: usize,
    ) -> Result<Vec<(Uuid, Vec<f32>, serde_json::Value)>> {
        let mut batch = Vec::new();
        let mut chunk_id = first_chunk_id;

        for row in rows.iter().filter(|r| !r.is_blank()) {
            for chunk in self.splitter.split(&row.document()) {
                let embedding = self.embedder.embed_boxed(&chunk).await?;
                let metadata = serde_json::json!({
                    "content": chunk,
                    "question": row.question.trim(),
                    "category": row.category_or_default(),
                    "interface": row.interface_or_default(),
                    "source": FAQ_SOURCE_LABEL,
                    "chunk_id": chunk_id,
                });
                batch.push((Uuid::new_v4(), embedding, metadata));
                chunk_id += 1;
            }
        }

        debug!(chunks = batch.len(), "Embedded knowledge chunks");
        Ok(batch)
    }

    /// Top-`k` hits with the optional interface filter applied after ranking.
    async fn retrieve(
        &self,
        question: &str,
        k: usize,
        interface: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let embedding = self.embedder.embed_boxed(question).await?;
        let hits = self.index.search(&embedding, k)?;
        Ok(hits
            .into_iter()
            .filter(|hit| match interface {
                Some(tag) => hit
                    .metadata
                    .get("interface")
                    .and_then(|v| v.as_str())
                    .is_some_and(|v| v.eq_ignore_ascii_case(tag.trim())),
                None => true,
            })
            .collect())
    }

    /// Raw similarity search without the threshold or generation.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        interface: Option<&str>,
    ) -> Result<Vec<SimilarityHit>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.retrieve(query, k, interface).await?;
        Ok(hits.iter().map(SimilarityHit::from_search_hit).collect())
    }

    /// Answer `question`, addressing the caller as `salutation`.
    ///
    /// Never fails: misses and faults come back as fallback text with zero
    /// confidence.
    pub async fn query(
        &self,
        question: &str,
        salutation: &str,
        interface: Option<&str>,
    ) -> KnowledgeAnswer {
        if self.index.is_empty() {
            error!("Knowledge index is empty; cannot answer queries");
            return KnowledgeAnswer::fallback(NOT_READY_TEXT.to_string());
        }

        match self.answer(question, salutation, interface).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Knowledge query failed");
                KnowledgeAnswer::fallback(error_text(salutation))
            }
        }
    }

    async fn answer(
        &self,
        question: &str,
        salutation: &str,
        interface: Option<&str>,
    ) -> Result<KnowledgeAnswer> {
        let k = self.settings.top_k;
        let surviving: Vec<SearchHit> = self
            .retrieve(question, k, interface)
            .await?
            .into_iter()
            .filter(|hit| hit.score >= self.settings.similarity_threshold)
            .collect();

        if surviving.is_empty() {
            debug!(question, "No knowledge chunk cleared the threshold");
            return Ok(KnowledgeAnswer::fallback(miss_text(salutation)));
        }

        let context = surviving
            .iter()
            .filter_map(|hit| hit.metadata.get("content").and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = render_prompt(&context, question, salutation);
        let answer = self.generator.generate(&prompt).await?;
        if answer.trim().is_empty() {
            return Err(UnibotError::Generation(
                "Generator returned empty text".to_string(),
            ));
        }

        let sources: Vec<String> = surviving
            .iter()
            .filter_map(|hit| hit.metadata.get("question").and_then(|v| v.as_str()))
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .take(MAX_SOURCES)
            .collect();

        let confidence = confidence(surviving.len(), k);
        debug!(surviving = surviving.len(), confidence, "Knowledge answer generated");

        Ok(KnowledgeAnswer {
            answer: answer.trim().to_string(),
            confidence,
            sources,
        })
    }
}
