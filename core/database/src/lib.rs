//! Sage Chunk Store
//!
//! PostgreSQL persistence for document chunks. The `documents` table itself
//! is owned by the external control plane; this crate only owns the
//! `document_chunks` rows that the ingestion pipeline produces and the
//! query pipeline hydrates.

mod chunks;
mod error;

pub use chunks::{ChunkRow, ChunkStore, NewChunk};
pub use error::{DatabaseError, Result};
