//! # confab-shared
//!
//! Domain model and common utilities for the Confab sync core.
//!
//! This crate holds the types that cross every layer boundary: chats,
//! participants, messages and their status machines, presence and typing
//! records, invite code generation, and the image attachment pipeline.

pub mod constants;
pub mod invite;
pub mod media;
pub mod types;

mod error;

pub use error::MediaError;
pub use types::*;
