//! Probing - timed JSON-RPC requests against provider endpoints
//!
//! This module is responsible for:
//! - Abstracting the outbound HTTP transport behind [`HttpClient`]
//! - Timing a single `eth_blockNumber` call per endpoint
//! - Classifying transport, HTTP, and JSON-RPC failures into an [`ErrorKind`]
//!
//! [`ErrorKind`]: crate::types::ErrorKind

pub mod client;
pub mod sampler;

pub use client::{HttpClient, HttpReply, ReqwestClient, TransportError};
pub use sampler::{Sampler, classify, probe_body};
