//! Drive `ApiEndpoints` build/parse pairs over blocking HTTP.
//!
//! # Design
//! Starts the mock server on a random port and executes each built request
//! with ureq, the way a host that owns its own I/O would. Validates that the
//! endpoint layer needs nothing from `ApiService` to work end-to-end.

use flowgate_core::{
    merge_flow_args, ApiEndpoints, ApiError, Credentials, FlowResultsParams, HttpMethod,
    HttpRequest, HttpResponse, JsonObject, SearchQuery, ServiceConfig,
};

/// Execute an `HttpRequest` using ureq and return an `HttpResponse`.
///
/// Disables ureq's automatic status-code-as-error behavior so 4xx/5xx
/// responses are returned as data, letting the endpoint layer interpret them.
fn execute(mut req: HttpRequest) -> HttpResponse {
    Credentials::cookie("session=host").apply(&mut req);

    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent();

    let url = req.url();
    let mut response = match req.method {
        HttpMethod::Get => {
            let mut builder = agent.get(&url);
            for (name, value) in &req.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.call()
        }
        HttpMethod::Post => {
            let mut builder = agent.post(&url);
            for (name, value) in &req.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.send(req.body.unwrap_or_default().as_bytes())
        }
    }
    .expect("HTTP transport error");

    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string().unwrap_or_default();

    HttpResponse {
        status,
        headers: Vec::new(),
        body,
    }
}

#[test]
fn endpoints_over_blocking_http() {
    // Step 1: start mock server on a random port.
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    let endpoints = ApiEndpoints::from_config(&ServiceConfig::new(&format!("http://{addr}")));

    // Step 2: search.
    let req = endpoints.build_search_clients(&SearchQuery {
        query: "example.com".to_string(),
        offset: Some(1),
        count: Some(5),
    });
    let page = endpoints.parse_search_clients(execute(req)).unwrap();
    let clients = page.items.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].client_id, "C.5678");

    // Step 3: unknown client.
    let req = endpoints.build_fetch_client("C.0000");
    let err = endpoints.parse_fetch_client(execute(req)).unwrap_err();
    assert!(matches!(err, ApiError::NotFound));

    // Step 4: resolve a descriptor and start its flow by hand.
    let req = endpoints.build_list_flow_descriptors();
    let descriptors = endpoints.parse_list_flow_descriptors(execute(req)).unwrap();
    let interrogate = descriptors
        .iter()
        .find(|d| d.name == "Interrogate")
        .unwrap();
    let args = merge_flow_args(interrogate, JsonObject::new());
    let req = endpoints.build_start_flow("C.5678", "Interrogate", &args).unwrap();
    let flow = endpoints.parse_start_flow(execute(req)).unwrap();
    assert_eq!(flow.name, "Interrogate");

    // Step 5: first page of results, filtered by type.
    let params = FlowResultsParams::new(flow.flow_id.clone(), 0, 3).with_type("StatEntry");
    let req = endpoints.build_list_results_for_flow("C.5678", &params);
    let results = endpoints.parse_list_results_for_flow(execute(req)).unwrap();
    assert_eq!(results.len(), 3);

    // Step 6: a page filtered to a type the flow never produced is empty.
    let params = FlowResultsParams::new(flow.flow_id.clone(), 0, 3).with_type("Process");
    let req = endpoints.build_list_results_for_flow("C.5678", &params);
    let results = endpoints.parse_list_results_for_flow(execute(req)).unwrap();
    assert!(results.is_empty());

    // Step 7: submission rejected by the server.
    let mut bad = JsonObject::new();
    bad.insert("@type".to_string(), serde_json::json!("type.googleapis.com/Nope"));
    let req = endpoints.build_start_flow("C.5678", "Interrogate", &bad).unwrap();
    let err = endpoints.parse_start_flow(execute(req)).unwrap_err();
    assert_eq!(err, ApiError::Submission("bad args".to_string()));

    // Step 8: cancel.
    let req = endpoints.build_cancel_flow("C.5678", &flow.flow_id);
    let cancelled = endpoints.parse_cancel_flow(execute(req)).unwrap();
    assert_eq!(cancelled.state.as_deref(), Some("ERROR"));
}
