//! Unibot Vector crate - knowledge retrieval for FAQ answering.
//!
//! Provides a recursive text splitter, an embedding service trait with a
//! deterministic mock, an in-memory cosine-similarity index with JSON
//! snapshots, and the knowledge engine that ties them to a text generator.

pub mod chunker;
pub mod embedding;
pub mod index;
pub mod knowledge;

pub use chunker::TextSplitter;
pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding};
pub use index::{ChunkEntry, SearchHit, VectorIndex};
pub use knowledge::{
    IngestReport, KnowledgeAnswer, KnowledgeEngine, KnowledgeRow, RetrievalSettings,
    SimilarityHit,
};
