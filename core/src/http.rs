//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The
//! endpoint layer builds `HttpRequest` values and parses `HttpResponse`
//! values without touching the network; a `Transport` implementation is
//! responsible for executing the actual I/O. Query parameters are kept as an
//! ordered list of pairs so request shaping can be asserted on directly, and
//! are only rendered into a URL at the transport boundary.

use url::form_urlencoded;

/// HTTP method for a request. The remote API only needs reads and actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// An HTTP request described as plain data.
///
/// Built by `ApiEndpoints::build_*` methods. `path` is the absolute URL
/// without its query string; `query` holds the query pairs in the order they
/// were added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(path: String) -> Self {
        Self {
            method: HttpMethod::Get,
            path,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A POST carrying a JSON body.
    pub fn post_json(path: String, body: String) -> Self {
        Self {
            method: HttpMethod::Post,
            path,
            query: Vec::new(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        }
    }

    /// Append a query pair.
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Append a query pair only when `value` is present.
    pub fn with_optional_query<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_query(key, value),
            None => self,
        }
    }

    /// Value of the first query pair named `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Full URL with the query string rendered in insertion order.
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{query}", self.path)
    }
}

/// An HTTP response described as plain data.
///
/// Constructed by the transport after executing an `HttpRequest`, then passed
/// to `ApiEndpoints::parse_*` methods. Non-2xx statuses are data here, not
/// errors.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_query_is_path() {
        let req = HttpRequest::get("http://localhost/api/v2/users/me".to_string());
        assert_eq!(req.url(), "http://localhost/api/v2/users/me");
    }

    #[test]
    fn url_encodes_query_in_order() {
        let req = HttpRequest::get("http://localhost/api/v2/clients".to_string())
            .with_query("query", "host:foo bar")
            .with_query("count", 10);
        assert_eq!(
            req.url(),
            "http://localhost/api/v2/clients?query=host%3Afoo+bar&count=10"
        );
    }

    #[test]
    fn optional_query_skips_none() {
        let req = HttpRequest::get("http://x".to_string())
            .with_optional_query("offset", None::<u64>)
            .with_optional_query("count", Some(5u64));
        assert_eq!(req.query, vec![("count".to_string(), "5".to_string())]);
        assert_eq!(req.query_value("count"), Some("5"));
        assert_eq!(req.query_value("offset"), None);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest::post_json("http://x".to_string(), "{}".to_string());
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.method.as_str(), "POST");
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
    }
}
