//! Core domain types and shared logic for the tagindex tag server.
//!
//! This crate defines the data model used across all other crates:
//! - Content digests and their canonical string form
//! - Tag name validation
//! - Application configuration

pub mod config;
pub mod digest;
pub mod error;
pub mod tag;

pub use digest::{Digest, DigestAlgorithm};
pub use error::{Error, Result};
pub use tag::{MAX_TAG_LEN, validate_tag};
