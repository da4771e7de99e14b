//! Asynchronous client gateway for a GRR-style forensics API.
//!
//! # Overview
//! Turns typed intents (search for a client, request an approval, start or
//! cancel a flow, page through results) into versioned HTTP calls and shapes
//! the responses into typed values and result streams.
//!
//! # Design
//! - `ApiEndpoints` is stateless: each operation is split into `build_*`
//!   (produces an `HttpRequest`) and `parse_*` (consumes an `HttpResponse`),
//!   so request and response shaping are testable without a network.
//! - `Transport` is the I/O seam. `ApiService` wraps whatever transport it is
//!   given in `CredentialedTransport`, so every request carries credentials.
//! - `ApiService` sequences the multi-step operations: the flow descriptor
//!   catalog is cached in a `ReplayCache`, flow starts resolve against one
//!   snapshot of it, and batched result reads fan out concurrently.

pub mod cache;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod service;
pub mod transport;
pub mod types;

pub use cache::{CacheState, ReplayCache};
pub use config::ServiceConfig;
pub use endpoints::ApiEndpoints;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use service::{merge_flow_args, ApiService, FlowDescriptors};
pub use transport::{CredentialedTransport, Credentials, ReqwestTransport, Transport};
pub use types::{
    ApiClient, ApiClientApproval, ApiFlow, ApiFlowDescriptor, ApiFlowResult, ApiGrrUser,
    ApiSearchClientResult, ApprovalConfig, ApprovalRequest, FlowResultsParams,
    FlowResultsWithSourceParams, GlobComponentExplanation, JsonObject, SearchQuery,
};
