//! parlato — a content-addressed cache for generated avatar artifacts.
//!
//! Speech and video providers are slow, metered, and non-deterministic, so
//! repeated `(owner, text)` requests must never re-invoke them. The cache
//! derives a stable key from the owner namespace and the input text, stores
//! the generated media (plus optional visemes and word timestamps) in a blob
//! store, tracks the record in a metadata store, and keeps the two in sync.
//!
//! The crate is a library only: the HTTP surface, avatar configuration, and
//! the concrete generation providers are external collaborators. They reach
//! the cache through [`application::cache::ArtifactCache`] and
//! [`application::speak::Speaker`].

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
