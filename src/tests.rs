use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::response::HttpResponse;
use crate::util::{encode_query, parse_retry_after, truncate_body, RESPONSE_ERR_LIMIT};
use crate::{Error, ErrorCode};

#[test]
fn truncate_body_passes_short_bodies_through() {
    assert_eq!(truncate_body(b"hello"), "hello");
}

#[test]
fn truncate_body_caps_long_bodies() {
    let long = "x".repeat(RESPONSE_ERR_LIMIT + 50);
    let truncated = truncate_body(long.as_bytes());
    assert!(truncated.ends_with("...(truncated)"));
    assert_eq!(
        truncated.chars().count(),
        RESPONSE_ERR_LIMIT + "...(truncated)".chars().count()
    );
}

#[test]
fn truncate_body_is_lossy_on_invalid_utf8() {
    let truncated = truncate_body(&[0x66, 0x6f, 0xff, 0x6f]);
    assert!(truncated.contains('\u{fffd}'));
}

#[test]
fn encode_query_escapes_pairs() {
    let encoded = encode_query(&[
        ("q".to_owned(), "a b".to_owned()),
        ("lang".to_owned(), "en".to_owned()),
    ]);
    assert_eq!(encoded, "q=a+b&lang=en");
}

#[test]
fn parse_retry_after_reads_seconds() {
    let mut headers = HeaderMap::new();
    headers.insert("retry-after", HeaderValue::from_static("7"));
    assert_eq!(
        parse_retry_after(&headers, SystemTime::now()),
        Some(Duration::from_secs(7))
    );
}

#[test]
fn parse_retry_after_reads_http_dates() {
    let now = SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777);
    let mut headers = HeaderMap::new();
    headers.insert(
        "retry-after",
        HeaderValue::from_static("Sun, 06 Nov 1994 08:49:40 GMT"),
    );
    assert_eq!(
        parse_retry_after(&headers, now),
        Some(Duration::from_secs(3))
    );
}

#[test]
fn parse_retry_after_clamps_past_dates_to_zero() {
    let mut headers = HeaderMap::new();
    headers.insert(
        "retry-after",
        HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"),
    );
    assert_eq!(
        parse_retry_after(&headers, SystemTime::now()),
        Some(Duration::ZERO)
    );
}

#[test]
fn parse_retry_after_ignores_garbage() {
    let mut headers = HeaderMap::new();
    headers.insert("retry-after", HeaderValue::from_static("soon"));
    assert_eq!(parse_retry_after(&headers, SystemTime::now()), None);
}

#[test]
fn response_json_decodes_typed_values() {
    let response = HttpResponse::new(
        StatusCode::OK,
        HeaderMap::new(),
        Bytes::from_static(b"{\"request_id\":\"123+\"}"),
    );
    let decoded: HashMap<String, String> = response.json().unwrap();
    assert_eq!(decoded.get("request_id").map(String::as_str), Some("123+"));
}

#[test]
fn response_json_failure_carries_body_excerpt() {
    let response = HttpResponse::new(
        StatusCode::OK,
        HeaderMap::new(),
        Bytes::from_static(b"not json"),
    );
    let error = response.json::<HashMap<String, String>>().unwrap_err();
    match &error {
        Error::Decode { body, .. } => assert_eq!(body, "not json"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(error.code(), ErrorCode::Decode);
}

#[test]
fn expect_success_accepts_2xx() {
    let response = HttpResponse::new(StatusCode::NO_CONTENT, HeaderMap::new(), Bytes::new());
    assert!(response.expect_success().is_ok());
}

#[test]
fn expect_success_reports_status_and_body() {
    let response = HttpResponse::new(
        StatusCode::FORBIDDEN,
        HeaderMap::new(),
        Bytes::from_static(b"denied"),
    );
    let error = response.expect_success().unwrap_err();
    match &error {
        Error::UnexpectedStatus { status, body } => {
            assert_eq!(*status, 403);
            assert_eq!(body, "denied");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(error.status(), Some(403));
}

#[test]
fn request_error_surfaces_wrapped_status() {
    let inner = Error::UnexpectedStatus {
        status: 502,
        body: "bad gateway".to_owned(),
    };
    let wrapped = Error::Request {
        method: http::Method::GET,
        url: "http://localhost/".to_owned(),
        attempts: 5,
        source: Box::new(inner),
    };
    assert_eq!(wrapped.status(), Some(502));
    assert_eq!(wrapped.code(), ErrorCode::Request);
    assert!(wrapped.to_string().contains("5 attempt(s)"));
}

#[test]
fn forced_retry_message_carries_the_status_line() {
    let error = Error::ForcedRetry {
        status: 200,
        body: "one".to_owned(),
    };
    assert_eq!(error.to_string(), "force retried HTTP status 200 OK: [one]");

    let error = Error::ForcedRetry {
        status: 599,
        body: String::new(),
    };
    assert_eq!(error.to_string(), "force retried HTTP status 599: []");
}

#[test]
fn error_codes_are_stable_strings() {
    assert_eq!(ErrorCode::Configuration.as_str(), "configuration");
    assert_eq!(ErrorCode::UnexpectedStatus.as_str(), "unexpected_status");
    assert_eq!(ErrorCode::Canceled.as_str(), "canceled");
}
