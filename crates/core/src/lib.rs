//! Domain types for Hunyuan3D image-to-3D generation tasks.
//!
//! Pure logic only: identifiers, generation options and their validation,
//! the task state machine, and the task error taxonomy. Nothing in this
//! crate performs I/O.

pub mod error;
pub mod generation;
pub mod task;
pub mod types;
