//! Request and response shapes for the forensics API.
//!
//! # Design
//! Wire objects are mostly opaque to this crate: each passthrough type names
//! the fields the gateway itself reads and keeps everything else in a
//! flattened JSON map, so new server fields survive a round-trip without a
//! schema change here. Field names follow the API's camelCase JSON mapping.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object. Used for opaque payloads and `google.protobuf.Any` values.
pub type JsonObject = Map<String, Value>;

/// Key carrying the type URL of a `google.protobuf.Any` payload.
pub const ANY_TYPE_KEY: &str = "@type";

/// Free-text client search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub offset: Option<u64>,
    pub count: Option<u64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

/// One page of client search results, passed through as the server sent it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSearchClientResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ApiClient>>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// A managed host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiClient {
    pub client_id: String,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// A request for access to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub client_id: String,
    pub reason: String,
    pub approvers: Vec<String>,
    /// Extra addresses to CC on the notification; empty means none.
    pub cc: Vec<String>,
}

/// Wire body of an approval request.
#[derive(Debug, Serialize)]
pub(crate) struct ApprovalRequestBody<'a> {
    pub approval: ApprovalRequestArgs<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApprovalRequestArgs<'a> {
    pub reason: &'a str,
    pub notified_users: &'a [String],
    pub email_cc_addresses: &'a [String],
}

/// A client approval as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiClientApproval {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requestor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// Approval settings derived from server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalConfig {
    pub optional_cc_email: Option<String>,
}

/// A single server configuration option.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ApiConfigOption {
    #[serde(default)]
    pub value: Option<ApiConfigValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ApiConfigValue {
    #[serde(default)]
    pub value: Option<Value>,
}

/// Schema of a flow type: its name and default arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFlowDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_args: Option<JsonObject>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl ApiFlowDescriptor {
    /// Type URL of the default arguments, e.g.
    /// `type.googleapis.com/grr.CollectFilesByKnownPathArgs`.
    pub fn default_args_type(&self) -> Option<&str> {
        self.default_args
            .as_ref()
            .and_then(|args| args.get(ANY_TYPE_KEY))
            .and_then(Value::as_str)
    }
}

/// A flow running or finished on a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFlow {
    #[serde(default)]
    pub flow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<JsonObject>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// Wire body for starting a flow.
#[derive(Debug, Serialize)]
pub(crate) struct StartFlowBody<'a> {
    pub name: &'a str,
    pub args: &'a JsonObject,
}

/// Selects one page of results of one flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowResultsParams {
    pub flow_id: String,
    pub offset: u64,
    pub count: u64,
    pub with_type: Option<String>,
    pub with_tag: Option<String>,
}

impl FlowResultsParams {
    pub fn new(flow_id: impl Into<String>, offset: u64, count: u64) -> Self {
        Self {
            flow_id: flow_id.into(),
            offset,
            count,
            with_type: None,
            with_tag: None,
        }
    }

    pub fn with_type(mut self, payload_type: impl Into<String>) -> Self {
        self.with_type = Some(payload_type.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.with_tag = Some(tag.into());
        self
    }
}

/// One result produced by a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFlowResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// A page of results together with the params that requested it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowResultsWithSourceParams {
    pub params: FlowResultsParams,
    pub results: Vec<ApiFlowResult>,
}

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGrrUser {
    pub username: String,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// One component of an explained glob expression with example matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobComponentExplanation {
    #[serde(default)]
    pub glob_expression: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExplainGlobBody<'a> {
    pub glob_expression: &'a str,
    pub example_count: u32,
}

/// Envelope shared by the list endpoints. The server omits `items` when the
/// collection is empty.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct ItemsEnvelope<T> {
    #[serde(default)]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExplainGlobResponse {
    #[serde(default)]
    pub components: Vec<GlobComponentExplanation>,
}

/// Body of a server error response.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
