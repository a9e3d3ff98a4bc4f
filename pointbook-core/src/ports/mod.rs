//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external collaborators. The services
//! depend only on these traits, not on concrete implementations.

mod classifier;
mod storage;

pub use classifier::ImageClassifier;
pub use storage::ImageStorage;
