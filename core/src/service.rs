//! Asynchronous gateway to the forensics API.
//!
//! # Design
//! `ApiService` is the only component that talks to the network. Each
//! operation is `build_*` → `Transport::send` → `parse_*` over
//! `ApiEndpoints`; on top of that this module owns the two multi-step
//! behaviors:
//!
//! - the flow descriptor catalog is fetched through a per-service
//!   `ReplayCache`, so it is requested at most once;
//! - starting a flow takes one snapshot of that catalog, resolves the
//!   descriptor, overlays the caller's arguments on the descriptor's
//!   argument type and submits the result.
//!
//! Batched result reads fan out without a concurrency cap and yield each
//! page with the params that requested it, in completion order.
//!
//! Every request goes through `CredentialedTransport`; there is no
//! constructor that bypasses it. Clones share the transport and the cache.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, Stream};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::cache::{CacheState, ReplayCache};
use crate::config::ServiceConfig;
use crate::endpoints::ApiEndpoints;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{CredentialedTransport, Credentials, ReqwestTransport, Transport};
use crate::types::{
    ApiClient, ApiClientApproval, ApiFlow, ApiFlowDescriptor, ApiFlowResult, ApiGrrUser,
    ApiSearchClientResult, ApprovalConfig, ApprovalRequest, FlowResultsParams,
    FlowResultsWithSourceParams, GlobComponentExplanation, JsonObject, SearchQuery, ANY_TYPE_KEY,
};

/// The flow descriptor catalog as shared between subscribers.
pub type FlowDescriptors = Arc<Vec<ApiFlowDescriptor>>;

/// Client-side gateway to the forensics API.
#[derive(Clone)]
pub struct ApiService {
    endpoints: ApiEndpoints,
    transport: Arc<dyn Transport>,
    flow_descriptors: Arc<ReplayCache<FlowDescriptors>>,
}

impl ApiService {
    /// Build a service over `transport`, attaching `credentials` to every
    /// request.
    pub fn new<T>(config: &ServiceConfig, transport: T, credentials: Credentials) -> Self
    where
        T: Transport + 'static,
    {
        Self {
            endpoints: ApiEndpoints::from_config(config),
            transport: Arc::new(CredentialedTransport::new(transport, credentials)),
            flow_descriptors: Arc::new(ReplayCache::new("flow_descriptors")),
        }
    }

    /// Build a service backed by `ReqwestTransport`.
    pub fn connect(config: &ServiceConfig, credentials: Credentials) -> Result<Self, ApiError> {
        Ok(Self::new(config, ReqwestTransport::new(config)?, credentials))
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = request.method.as_str(), url = %request.url(), "sending request");
        self.transport.send(request).await
    }

    // -----------------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------------

    #[instrument(skip(self, query), fields(query = %query.query))]
    pub async fn search_clients(&self, query: &SearchQuery) -> Result<ApiSearchClientResult, ApiError> {
        let response = self.send(self.endpoints.build_search_clients(query)).await?;
        self.endpoints.parse_search_clients(response)
    }

    #[instrument(skip(self))]
    pub async fn fetch_client(&self, client_id: &str) -> Result<ApiClient, ApiError> {
        let response = self.send(self.endpoints.build_fetch_client(client_id)).await?;
        self.endpoints.parse_fetch_client(response)
    }

    /// Whether the caller currently holds access to the client.
    #[instrument(skip(self))]
    pub async fn verify_client_access(&self, client_id: &str) -> Result<bool, ApiError> {
        let response = self
            .send(self.endpoints.build_verify_client_access(client_id))
            .await?;
        self.endpoints.parse_verify_client_access(response)
    }

    // -----------------------------------------------------------------------
    // Approvals
    // -----------------------------------------------------------------------

    #[instrument(skip(self, request), fields(client_id = %request.client_id))]
    pub async fn request_approval(
        &self,
        request: &ApprovalRequest,
    ) -> Result<ApiClientApproval, ApiError> {
        let response = self
            .send(self.endpoints.build_request_approval(request)?)
            .await?;
        self.endpoints.parse_request_approval(response)
    }

    #[instrument(skip(self))]
    pub async fn fetch_approval_config(&self) -> Result<ApprovalConfig, ApiError> {
        let response = self
            .send(self.endpoints.build_fetch_approval_config())
            .await?;
        self.endpoints.parse_fetch_approval_config(response)
    }

    #[instrument(skip(self))]
    pub async fn list_approvals(&self, client_id: &str) -> Result<Vec<ApiClientApproval>, ApiError> {
        let response = self.send(self.endpoints.build_list_approvals(client_id)).await?;
        self.endpoints.parse_list_approvals(response)
    }

    #[instrument(skip(self))]
    pub async fn fetch_approval(
        &self,
        client_id: &str,
        requestor: &str,
        approval_id: &str,
    ) -> Result<ApiClientApproval, ApiError> {
        let response = self
            .send(
                self.endpoints
                    .build_fetch_approval(client_id, requestor, approval_id),
            )
            .await?;
        self.endpoints.parse_fetch_approval(response)
    }

    #[instrument(skip(self))]
    pub async fn grant_approval(
        &self,
        client_id: &str,
        requestor: &str,
        approval_id: &str,
    ) -> Result<ApiClientApproval, ApiError> {
        let response = self
            .send(
                self.endpoints
                    .build_grant_approval(client_id, requestor, approval_id),
            )
            .await?;
        self.endpoints.parse_grant_approval(response)
    }

    // -----------------------------------------------------------------------
    // Flows
    // -----------------------------------------------------------------------

    /// The flow descriptor catalog. Fetched once per service; concurrent and
    /// later callers share that fetch.
    ///
    /// Must be awaited inside a tokio runtime; outside one this fails with
    /// `ApiError::Internal` instead of fetching.
    pub async fn list_flow_descriptors(&self) -> Result<FlowDescriptors, ApiError> {
        let transport = self.transport.clone();
        let endpoints = self.endpoints.clone();
        self.flow_descriptors
            .get_or_fetch(move || async move {
                let response = transport
                    .send(endpoints.build_list_flow_descriptors())
                    .await?;
                endpoints.parse_list_flow_descriptors(response).map(Arc::new)
            })
            .await
    }

    pub fn flow_descriptors_state(&self) -> CacheState {
        self.flow_descriptors.state()
    }

    #[instrument(skip(self))]
    pub async fn list_flows_for_client(&self, client_id: &str) -> Result<Vec<ApiFlow>, ApiError> {
        let request = self
            .endpoints
            .build_list_flows_for_client(client_id, Utc::now());
        let response = self.send(request).await?;
        self.endpoints.parse_list_flows_for_client(response)
    }

    #[instrument(skip(self, params), fields(flow_id = %params.flow_id, offset = params.offset))]
    pub async fn list_results_for_flow(
        &self,
        client_id: &str,
        params: &FlowResultsParams,
    ) -> Result<Vec<ApiFlowResult>, ApiError> {
        let response = self
            .send(self.endpoints.build_list_results_for_flow(client_id, params))
            .await?;
        self.endpoints.parse_list_results_for_flow(response)
    }

    /// Fetch every page in `params` concurrently.
    ///
    /// The stream yields one item per input in completion order, then ends.
    /// A failed page is yielded as that item's `Err` and does not affect the
    /// other requests.
    pub fn batch_list_results_for_flow(
        &self,
        client_id: &str,
        params: Vec<FlowResultsParams>,
    ) -> impl Stream<Item = Result<FlowResultsWithSourceParams, ApiError>> + Send + 'static {
        debug!(client_id, pages = params.len(), "batch listing flow results");
        params
            .into_iter()
            .map(|params| {
                let service = self.clone();
                let client_id = client_id.to_string();
                async move {
                    let results = service.list_results_for_flow(&client_id, &params).await?;
                    Ok(FlowResultsWithSourceParams { params, results })
                }
            })
            .collect::<FuturesUnordered<_>>()
    }

    /// Start `flow_name` on a client.
    ///
    /// Resolves the descriptor from a single snapshot of the catalog, then
    /// submits `{"@type": <descriptor arg type>, ..flow_args}`. Fails with
    /// `DescriptorNotFound` without submitting anything when the catalog has
    /// no such flow. Submission failures surface as `ApiError::Submission`
    /// carrying the bare server or network message.
    ///
    /// Must be awaited inside a tokio runtime; the catalog fetch is spawned
    /// onto it, and outside one this fails with `ApiError::Internal`.
    #[instrument(skip(self, flow_args))]
    pub async fn start_flow(
        &self,
        client_id: &str,
        flow_name: &str,
        flow_args: JsonObject,
    ) -> Result<ApiFlow, ApiError> {
        let descriptors = self.list_flow_descriptors().await?;
        let descriptor = descriptors
            .iter()
            .find(|descriptor| descriptor.name == flow_name)
            .ok_or_else(|| ApiError::DescriptorNotFound(flow_name.to_string()))?;

        let args = merge_flow_args(descriptor, flow_args);
        let request = self.endpoints.build_start_flow(client_id, flow_name, &args)?;
        let response = self
            .send(request)
            .await
            .map_err(|e| ApiError::Submission(e.user_message()))?;
        self.endpoints.parse_start_flow(response)
    }

    #[instrument(skip(self))]
    pub async fn cancel_flow(&self, client_id: &str, flow_id: &str) -> Result<ApiFlow, ApiError> {
        let response = self
            .send(self.endpoints.build_cancel_flow(client_id, flow_id))
            .await?;
        self.endpoints.parse_cancel_flow(response)
    }

    // -----------------------------------------------------------------------
    // Users and helpers
    // -----------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn fetch_current_user(&self) -> Result<ApiGrrUser, ApiError> {
        let response = self.send(self.endpoints.build_fetch_current_user()).await?;
        self.endpoints.parse_fetch_current_user(response)
    }

    #[instrument(skip(self))]
    pub async fn explain_glob_expression(
        &self,
        client_id: &str,
        glob_expression: &str,
        example_count: u32,
    ) -> Result<Vec<GlobComponentExplanation>, ApiError> {
        let request =
            self.endpoints
                .build_explain_glob_expression(client_id, glob_expression, example_count)?;
        let response = self.send(request).await?;
        self.endpoints.parse_explain_glob_expression(response)
    }
}

/// Overlay `flow_args` on the descriptor's argument type. Caller fields win,
/// including an explicit `@type`.
pub fn merge_flow_args(descriptor: &ApiFlowDescriptor, flow_args: JsonObject) -> JsonObject {
    let mut args = JsonObject::new();
    if let Some(type_url) = descriptor.default_args_type() {
        args.insert(ANY_TYPE_KEY.to_string(), Value::String(type_url.to_string()));
    }
    args.extend(flow_args);
    args
}
