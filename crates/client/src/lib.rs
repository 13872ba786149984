//! Hunyuan3D generation service client library.
//!
//! Provides the [`RemoteJobClient`](client::RemoteJobClient) capability
//! trait consumed by the task orchestrator, the typed wire messages of the
//! Hunyuan3D API server, and [`HunyuanApi`](api::HunyuanApi), a `reqwest`
//! implementation of the capability.

pub mod api;
pub mod client;
pub mod messages;

pub use api::HunyuanApi;
pub use client::{ClientError, RemoteJobClient, RemoteStatus};
pub use messages::JobSpec;
