//! Sage gRPC Server
//!
//! The front door of the retrieval-and-generation core: the streaming
//! chat pipeline, document admission and the background ingestion worker,
//! plus the outbound client reporting terminal document status to the
//! control plane.

pub mod broker;
pub mod chat;
pub mod config;
pub mod control_plane;
pub mod error;
pub mod knowledge;
pub mod metadata;
pub mod worker;

/// Generated protobuf types and service stubs.
pub mod pb {
    tonic::include_proto!("sage.v1");
}

pub use config::Settings;
pub use error::{Result, ServerError};
