//! Verify build/parse methods against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, expected requests, simulated responses,
//! and expected parse results. Comparing parsed JSON (not raw strings) avoids
//! false negatives from field-ordering differences.

use flowgate_core::{
    merge_flow_args, ApiEndpoints, ApiError, ApiFlowDescriptor, ApiFlowResult, FlowResultsParams,
    HttpMethod, HttpResponse, JsonObject,
};

const API_ROOT: &str = "http://localhost:8000/api/v2";

fn endpoints() -> ApiEndpoints {
    ApiEndpoints::new(API_ROOT)
}

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        other => panic!("unknown method: {other}"),
    }
}

fn simulated(case: &serde_json::Value) -> HttpResponse {
    let sim = &case["simulated_response"];
    HttpResponse::new(
        sim["status"].as_u64().unwrap() as u16,
        sim["body"].as_str().unwrap(),
    )
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[test]
fn list_results_test_vectors() {
    let raw = include_str!("../../test-vectors/list_results.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let e = endpoints();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let client_id = case["client_id"].as_str().unwrap();
        let input = &case["input"];
        let mut params = FlowResultsParams::new(
            input["flow_id"].as_str().unwrap(),
            input["offset"].as_u64().unwrap(),
            input["count"].as_u64().unwrap(),
        );
        if let Some(tag) = input["with_tag"].as_str() {
            params = params.with_tag(tag);
        }
        if let Some(payload_type) = input["with_type"].as_str() {
            params = params.with_type(payload_type);
        }
        let expected_req = &case["expected_request"];

        // Verify build
        let req = e.build_list_results_for_flow(client_id, &params);
        assert_eq!(req.method, parse_method(expected_req["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.path, format!("{API_ROOT}{}", expected_req["path"].as_str().unwrap()), "{name}: path");
        let expected_query: Vec<(String, String)> =
            serde_json::from_value(expected_req["query"].clone()).unwrap();
        assert_eq!(req.query, expected_query, "{name}: query");
        assert!(req.body.is_none(), "{name}: body should be None");

        // Verify parse
        let result = e.parse_list_results_for_flow(simulated(case));
        if let Some(expected_error) = case.get("expected_error") {
            let err = result.unwrap_err();
            match expected_error.as_str().unwrap() {
                "NotFound" => assert!(matches!(err, ApiError::NotFound), "{name}: expected NotFound"),
                other => panic!("{name}: unknown expected_error: {other}"),
            }
        } else {
            let expected: Vec<ApiFlowResult> =
                serde_json::from_value(case["expected_result"].clone()).unwrap();
            assert_eq!(result.unwrap(), expected, "{name}: parsed result");
        }
    }
}

// ---------------------------------------------------------------------------
// Approval config
// ---------------------------------------------------------------------------

#[test]
fn approval_config_test_vectors() {
    let raw = include_str!("../../test-vectors/approval_config.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let e = endpoints();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let result = e.parse_fetch_approval_config(simulated(case));

        if let Some(expected_error) = case.get("expected_error") {
            let expected = ApiError::Remote {
                status: expected_error["status"].as_u64().unwrap() as u16,
                message: expected_error["message"].as_str().unwrap().to_string(),
            };
            assert_eq!(result.unwrap_err(), expected, "{name}: error");
        } else {
            let expected = case["expected_result"].as_str().map(str::to_string);
            assert_eq!(result.unwrap().optional_cc_email, expected, "{name}: parsed result");
        }
    }
}

// ---------------------------------------------------------------------------
// Start flow
// ---------------------------------------------------------------------------

#[test]
fn start_flow_test_vectors() {
    let raw = include_str!("../../test-vectors/start_flow.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let e = endpoints();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let client_id = case["client_id"].as_str().unwrap();
        let descriptor: ApiFlowDescriptor = serde_json::from_value(case["descriptor"].clone()).unwrap();
        let flow_args: JsonObject = serde_json::from_value(case["flow_args"].clone()).unwrap();
        let expected_req = &case["expected_request"];

        // Verify build
        let args = merge_flow_args(&descriptor, flow_args);
        let req = e.build_start_flow(client_id, &descriptor.name, &args).unwrap();
        assert_eq!(req.method, parse_method(expected_req["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.path, format!("{API_ROOT}{}", expected_req["path"].as_str().unwrap()), "{name}: path");
        assert_eq!(
            req.headers,
            vec![("content-type".to_string(), "application/json".to_string())],
            "{name}: headers"
        );
        let req_body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(req_body, expected_req["body"], "{name}: body");

        // Verify parse
        let result = e.parse_start_flow(simulated(case));
        if let Some(expected_error) = case.get("expected_error") {
            let err = result.unwrap_err();
            assert_eq!(
                err,
                ApiError::Submission(expected_error.as_str().unwrap().to_string()),
                "{name}: error"
            );
        } else {
            let flow = result.unwrap();
            assert_eq!(flow.flow_id, case["expected_flow_id"].as_str().unwrap(), "{name}: flow id");
        }
    }
}
