use super::*;
use serde_json::json;

#[test]
fn bearer_header_is_sensitive() {
    let value = bearer_header("A1").unwrap();
    assert_eq!(value.to_str().unwrap(), "Bearer A1");
    assert!(value.is_sensitive());
}

#[test]
fn bearer_header_rejects_newlines() {
    assert!(matches!(bearer_header("A1\nX"), Err(SessionError::InvalidHeader(_))));
}

#[test]
fn bearer_token_reads_back_attached_header() {
    let req = ApiRequest::get("productos/").with_header(AUTHORIZATION, bearer_header("A2").unwrap());
    assert_eq!(req.bearer_token(), Some("A2"));
    assert_eq!(ApiRequest::get("productos/").bearer_token(), None);
}

#[test]
fn new_request_is_not_retried() {
    let req = ApiRequest::post("salidas/", json!({ "cantidad": 1 }));
    assert_eq!(req.method, Method::POST);
    assert!(!req.retried);
    assert!(req.body.is_some());
}

#[test]
fn query_pairs_keep_insertion_order() {
    let req = ApiRequest::get("ingresos-dia/").with_query("fecha", "2024-05-02").with_query("page", "2");
    assert_eq!(req.query_value("fecha"), Some("2024-05-02"));
    assert_eq!(req.query_value("page"), Some("2"));
    assert_eq!(req.query_value("missing"), None);
    assert_eq!(req.query[0].0, "fecha");
}

#[test]
fn json_headers_declare_json_both_ways() {
    let headers = json_headers();
    assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
}

#[test]
fn response_json_decodes_body() {
    let resp = ApiResponse::json_body(StatusCode::OK, &json!({ "access": "A2" }));
    let value: Value = resp.json().unwrap();
    assert_eq!(value["access"], "A2");
}

#[test]
fn response_json_reports_decode_error() {
    let resp = ApiResponse::new(StatusCode::OK, "<html>");
    assert!(matches!(resp.json::<Value>(), Err(SessionError::Decode(_))));
}

#[test]
fn error_for_status_keeps_success() {
    let resp = ApiResponse::new(StatusCode::CREATED, "{}");
    assert!(resp.error_for_status().is_ok());
}

#[test]
fn error_for_status_maps_failure() {
    let resp = ApiResponse::new(StatusCode::BAD_REQUEST, "{\"cantidad\":[\"invalid\"]}");
    match resp.error_for_status() {
        Err(SessionError::Status { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("cantidad"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[test]
fn detail_prefers_detail_field() {
    let resp = ApiResponse::json_body(
        StatusCode::UNAUTHORIZED,
        &json!({ "detail": "No active account found with the given credentials" }),
    );
    assert_eq!(resp.detail().as_deref(), Some("No active account found with the given credentials"));
}

#[test]
fn detail_falls_back_to_error_field() {
    let resp = ApiResponse::json_body(StatusCode::BAD_REQUEST, &json!({ "error": "sin stock" }));
    assert_eq!(resp.detail().as_deref(), Some("sin stock"));
    assert_eq!(ApiResponse::new(StatusCode::BAD_GATEWAY, "oops").detail(), None);
}
