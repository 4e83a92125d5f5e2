//! External-interface traits the execution core consumes (§6). Every
//! trait here is specified by behavior, not by library — concrete
//! providers (a specific LLM vendor, a specific blob backend) are out
//! of scope (§1 Non-goals) and live outside this workspace.
//!
//! Grounded on the teacher's `llm` crate and its nested
//! `langgraph-core::llm::traits` module: same "framework provides
//! traits, callers implement for their own backend" shape, generalized
//! from chat-only to every collaborator §6 names.

pub mod ast;
pub mod blob;
pub mod error;
pub mod http;
pub mod ir;
pub mod llm;
pub mod memory;
pub mod schema;
pub mod secret;
pub mod subdiagram;
pub mod template;

pub use error::{Result, ServiceError};
