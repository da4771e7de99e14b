//! Stateless request builder and response parser for the forensics API.
//!
//! # Design
//! `ApiEndpoints` holds only the API root URL and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`. Whoever sits in between executes the round-trip, which
//! keeps this layer deterministic and free of I/O.
//!
//! Response shaping rules that live here:
//! - the `)]}'` anti-XSSI prefix is stripped before decoding;
//! - list envelopes are unwrapped to their `items`, and a missing `items` or
//!   `components` field means an empty collection;
//! - an empty approval CC config value means "no default address";
//! - flow submission failures collapse to `ApiError::Submission`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::types::{
    ApiClient, ApiClientApproval, ApiConfigOption, ApiErrorBody, ApiFlow, ApiFlowDescriptor,
    ApiFlowResult, ApiGrrUser, ApiSearchClientResult, ApprovalConfig, ApprovalRequest,
    ApprovalRequestArgs, ApprovalRequestBody, ExplainGlobBody, ExplainGlobResponse,
    FlowResultsParams, GlobComponentExplanation, ItemsEnvelope, JsonObject, SearchQuery,
    StartFlowBody,
};

/// Only flows started within this many days are listed.
// TODO: make the flow list window configurable once the UI exposes paging.
pub const FLOW_LIST_WINDOW_DAYS: i64 = 180;

/// Page size used when listing a client's flows.
pub const FLOW_LIST_PAGE_SIZE: u64 = 100;

const APPROVAL_CC_CONFIG_OPTION: &str = "Email.approval_optional_cc_address";

/// Prefix the server prepends to JSON responses.
const XSSI_PREFIX: &str = ")]}'";

/// Request builder and response parser for every API operation.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    api_root: String,
}

impl ApiEndpoints {
    /// `api_root` is the origin plus API prefix, e.g.
    /// `http://localhost:8000/api/v2`.
    pub fn new(api_root: &str) -> Self {
        Self {
            api_root: api_root.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.api_root())
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_root)
    }

    // -----------------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------------

    pub fn build_search_clients(&self, query: &SearchQuery) -> HttpRequest {
        HttpRequest::get(self.url("/clients"))
            .with_query("query", &query.query)
            .with_optional_query("offset", query.offset)
            .with_optional_query("count", query.count)
    }

    pub fn parse_search_clients(
        &self,
        response: HttpResponse,
    ) -> Result<ApiSearchClientResult, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    pub fn build_fetch_client(&self, client_id: &str) -> HttpRequest {
        HttpRequest::get(self.url(&format!("/clients/{client_id}")))
    }

    pub fn parse_fetch_client(&self, response: HttpResponse) -> Result<ApiClient, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    pub fn build_verify_client_access(&self, client_id: &str) -> HttpRequest {
        HttpRequest::get(self.url(&format!("/clients/{client_id}/access")))
    }

    /// `true` when the caller holds a valid approval for the client.
    pub fn parse_verify_client_access(&self, response: HttpResponse) -> Result<bool, ApiError> {
        match response.status {
            401 | 403 => Ok(false),
            _ => check_status(&response).map(|()| true),
        }
    }

    // -----------------------------------------------------------------------
    // Approvals
    // -----------------------------------------------------------------------

    pub fn build_request_approval(&self, request: &ApprovalRequest) -> Result<HttpRequest, ApiError> {
        let body = ApprovalRequestBody {
            approval: ApprovalRequestArgs {
                reason: &request.reason,
                notified_users: &request.approvers,
                email_cc_addresses: &request.cc,
            },
        };
        Ok(HttpRequest::post_json(
            self.url(&format!("/users/me/approvals/client/{}", request.client_id)),
            encode(&body)?,
        ))
    }

    pub fn parse_request_approval(
        &self,
        response: HttpResponse,
    ) -> Result<ApiClientApproval, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    pub fn build_fetch_approval_config(&self) -> HttpRequest {
        HttpRequest::get(self.url(&format!("/config/{APPROVAL_CC_CONFIG_OPTION}")))
    }

    pub fn parse_fetch_approval_config(
        &self,
        response: HttpResponse,
    ) -> Result<ApprovalConfig, ApiError> {
        check_status(&response)?;
        let option: ApiConfigOption = decode(&response)?;
        let optional_cc_email = option
            .value
            .and_then(|value| value.value)
            .and_then(|value| match value {
                Value::String(address) if !address.is_empty() => Some(address),
                _ => None,
            });
        Ok(ApprovalConfig { optional_cc_email })
    }

    pub fn build_list_approvals(&self, client_id: &str) -> HttpRequest {
        HttpRequest::get(self.url(&format!("/users/me/approvals/client/{client_id}")))
    }

    /// Approvals newest first, in the order the server returned them.
    pub fn parse_list_approvals(
        &self,
        response: HttpResponse,
    ) -> Result<Vec<ApiClientApproval>, ApiError> {
        check_status(&response)?;
        decode_items(&response)
    }

    pub fn build_fetch_approval(
        &self,
        client_id: &str,
        requestor: &str,
        approval_id: &str,
    ) -> HttpRequest {
        HttpRequest::get(self.url(&format!(
            "/users/{requestor}/approvals/client/{client_id}/{approval_id}"
        )))
    }

    pub fn parse_fetch_approval(
        &self,
        response: HttpResponse,
    ) -> Result<ApiClientApproval, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    pub fn build_grant_approval(
        &self,
        client_id: &str,
        requestor: &str,
        approval_id: &str,
    ) -> HttpRequest {
        HttpRequest::post_json(
            self.url(&format!(
                "/users/{requestor}/approvals/client/{client_id}/{approval_id}/actions/grant"
            )),
            "{}".to_string(),
        )
    }

    pub fn parse_grant_approval(
        &self,
        response: HttpResponse,
    ) -> Result<ApiClientApproval, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    // -----------------------------------------------------------------------
    // Flows
    // -----------------------------------------------------------------------

    pub fn build_list_flow_descriptors(&self) -> HttpRequest {
        HttpRequest::get(self.url("/flows/descriptors"))
    }

    pub fn parse_list_flow_descriptors(
        &self,
        response: HttpResponse,
    ) -> Result<Vec<ApiFlowDescriptor>, ApiError> {
        check_status(&response)?;
        decode_items(&response)
    }

    /// Top-level flows started in the last `FLOW_LIST_WINDOW_DAYS` days,
    /// first page only. `now` anchors the window.
    pub fn build_list_flows_for_client(&self, client_id: &str, now: DateTime<Utc>) -> HttpRequest {
        let min_started_at = now - TimeDelta::days(FLOW_LIST_WINDOW_DAYS);
        HttpRequest::get(self.url(&format!("/clients/{client_id}/flows")))
            .with_query("count", FLOW_LIST_PAGE_SIZE)
            .with_query("offset", 0)
            .with_query("min_started_at", min_started_at.timestamp_micros())
            .with_query("top_flows_only", 1)
    }

    pub fn parse_list_flows_for_client(
        &self,
        response: HttpResponse,
    ) -> Result<Vec<ApiFlow>, ApiError> {
        check_status(&response)?;
        decode_items(&response)
    }

    pub fn build_list_results_for_flow(
        &self,
        client_id: &str,
        params: &FlowResultsParams,
    ) -> HttpRequest {
        HttpRequest::get(self.url(&format!(
            "/clients/{client_id}/flows/{}/results",
            params.flow_id
        )))
        .with_query("offset", params.offset)
        .with_query("count", params.count)
        .with_optional_query("with_tag", params.with_tag.as_deref())
        .with_optional_query("with_type", params.with_type.as_deref())
    }

    pub fn parse_list_results_for_flow(
        &self,
        response: HttpResponse,
    ) -> Result<Vec<ApiFlowResult>, ApiError> {
        check_status(&response)?;
        decode_items(&response)
    }

    /// `args` must already carry the `@type` of the flow's argument message.
    pub fn build_start_flow(
        &self,
        client_id: &str,
        flow_name: &str,
        args: &JsonObject,
    ) -> Result<HttpRequest, ApiError> {
        let body = StartFlowBody {
            name: flow_name,
            args,
        };
        Ok(HttpRequest::post_json(
            self.url(&format!("/clients/{client_id}/flows")),
            encode(&body)?,
        ))
    }

    /// Any rejection is reported as `ApiError::Submission` carrying only the
    /// server's message.
    pub fn parse_start_flow(&self, response: HttpResponse) -> Result<ApiFlow, ApiError> {
        if !response.is_success() {
            let message = server_message(&response).unwrap_or_else(|| generic_message(&response));
            return Err(ApiError::Submission(message));
        }
        decode(&response)
    }

    pub fn build_cancel_flow(&self, client_id: &str, flow_id: &str) -> HttpRequest {
        HttpRequest::post_json(
            self.url(&format!("/clients/{client_id}/flows/{flow_id}/actions/cancel")),
            "{}".to_string(),
        )
    }

    pub fn parse_cancel_flow(&self, response: HttpResponse) -> Result<ApiFlow, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    // -----------------------------------------------------------------------
    // Users and helpers
    // -----------------------------------------------------------------------

    pub fn build_fetch_current_user(&self) -> HttpRequest {
        HttpRequest::get(self.url("/users/me"))
    }

    pub fn parse_fetch_current_user(&self, response: HttpResponse) -> Result<ApiGrrUser, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    pub fn build_explain_glob_expression(
        &self,
        client_id: &str,
        glob_expression: &str,
        example_count: u32,
    ) -> Result<HttpRequest, ApiError> {
        let body = ExplainGlobBody {
            glob_expression,
            example_count,
        };
        Ok(HttpRequest::post_json(
            self.url(&format!("/clients/{client_id}/glob-expressions:explain")),
            encode(&body)?,
        ))
    }

    pub fn parse_explain_glob_expression(
        &self,
        response: HttpResponse,
    ) -> Result<Vec<GlobComponentExplanation>, ApiError> {
        check_status(&response)?;
        let explained: ExplainGlobResponse = decode(&response)?;
        Ok(explained.components)
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::Remote {
        status: response.status,
        message: server_message(response).unwrap_or_else(|| generic_message(response)),
    })
}

/// The `message` field of an error body, if the server sent one.
fn server_message(response: &HttpResponse) -> Option<String> {
    serde_json::from_str::<ApiErrorBody>(strip_xssi_prefix(&response.body))
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.is_empty())
}

fn generic_message(response: &HttpResponse) -> String {
    format!("server responded with status {}", response.status)
}

fn strip_xssi_prefix(body: &str) -> &str {
    body.trim_start()
        .strip_prefix(XSSI_PREFIX)
        .unwrap_or(body)
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    let body = strip_xssi_prefix(&response.body);
    // Some action endpoints answer with an empty body.
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(|e| ApiError::Deserialization(e.to_string()))
}

fn decode_items<T: DeserializeOwned>(response: &HttpResponse) -> Result<Vec<T>, ApiError> {
    decode::<ItemsEnvelope<T>>(response).map(|envelope| envelope.items)
}

fn encode<T: Serialize>(body: &T) -> Result<String, ApiError> {
    serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))
}
