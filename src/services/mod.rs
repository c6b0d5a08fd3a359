pub mod batch;
pub mod chunker;
pub mod embedding;
pub mod vector_store;

pub use batch::{TEXT_KEY, process_batch};
pub use chunker::{TextChunker, chunk_text};
pub use embedding::{
    EmbeddingsClient, LocalEmbeddingsClient, OpenAiEmbeddingsClient, SharedEmbeddingsClient,
    create_embeddings_client,
};
pub use vector_store::{
    PgVectorBackend, QdrantBackend, SqliteBackend, VectorStore, create_backend,
};
