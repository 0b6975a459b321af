//! Memory types and operations
//!
//! Defines the three entity kinds, importance scoring with lazy decay,
//! and budget-aware retrieval over the progressive disclosure layers.

pub mod importance;
pub mod retrieval;
pub mod types;

pub use retrieval::{RetrievalRequest, RetrievalResult, Retriever};
pub use types::{EntityKind, EpisodeTrace, MemoryEntity, Outcome, ProceduralSkill, SemanticPattern};
