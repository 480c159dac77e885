use std::io::Read;
use std::time::{Duration, SystemTime};

use flate2::read::GzDecoder;
use lantern::http::builder::{ByteRange, Resource, build_response, format_http_date, parse_range, without_body};
use lantern::http::parser::parse_http_request;
use lantern::http::request::{Method, Request, Version};
use lantern::http::response::StatusCode;
use lantern::http::writer::serialize_request;

fn get(headers: &[(&str, &str)]) -> Request {
    let mut builder = Request::builder().method(Method::GET).target("index.html");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.build().unwrap()
}

fn found(bytes: &[u8]) -> Resource {
    Resource::Found {
        bytes: bytes.to_vec(),
        media_type: Some("text/html".to_string()),
        modified: None,
    }
}

#[test]
fn test_build_found_plain() {
    let response = build_response(&get(&[]), found(b"<h1>hi</h1>"), false);

    assert_eq!(response.status(), StatusCode::Ok);
    assert_eq!(response.body(), b"<h1>hi</h1>");
    assert_eq!(response.headers().get("Content-Type"), Some("text/html"));
    assert_eq!(response.headers().get("Content-Length"), Some("11"));
    assert_eq!(response.headers().get("Connection"), Some("keep-alive"));
    assert_eq!(response.headers().get("Accept-Ranges"), Some("bytes"));
    assert!(response.headers().get("Date").is_some_and(|d| d.ends_with(" GMT")));
    assert!(!response.is_gzip());
}

#[test]
fn test_build_missing_uses_fallback_page() {
    let resource = Resource::Missing {
        page: b"gone".to_vec(),
    };
    let response = build_response(&get(&[]), resource, false);

    assert_eq!(response.status(), StatusCode::NotFound);
    assert_eq!(response.body(), b"gone");
    assert_eq!(response.headers().get("Content-Type"), None);
    assert_eq!(response.headers().get("Accept-Ranges"), None);
}

#[test]
fn test_build_echoes_request_version() {
    let request = Request::builder()
        .method(Method::GET)
        .target("/")
        .version(Version::HTTP_1_0)
        .build()
        .unwrap();

    let response = build_response(&request, found(b"x"), false);
    assert_eq!(response.version(), Version::HTTP_1_0);
    assert!(response.head().starts_with(b"HTTP/1.0 200 OK\r\n"));
}

#[test]
fn test_build_last_modified() {
    let resource = Resource::Found {
        bytes: b"x".to_vec(),
        media_type: None,
        modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(784111777)),
    };

    let response = build_response(&get(&[]), resource, false);
    assert_eq!(
        response.headers().get("Last-Modified"),
        Some("Sun, 06 Nov 1994 08:49:37 GMT")
    );
}

#[test]
fn test_build_gzip_body_decompresses() {
    let payload = b"hello hello hello hello hello".repeat(10);
    let response = build_response(&get(&[]), found(&payload), true);

    assert!(response.is_gzip());
    assert_eq!(response.headers().get("Content-Encoding"), Some("gzip"));
    assert_eq!(
        response.headers().get("Content-Length"),
        Some(response.body().len().to_string().as_str())
    );

    let mut decoded = Vec::new();
    GzDecoder::new(response.body()).read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, payload);
}

#[test]
fn test_build_gzip_wins_over_range() {
    let response = build_response(&get(&[("Range", "bytes=0-1")]), found(b"abcdef"), true);

    assert_eq!(response.status(), StatusCode::Ok);
    assert!(response.is_gzip());
    assert_eq!(response.headers().get("Content-Range"), None);
}

#[test]
fn test_build_partial_content() {
    let response = build_response(&get(&[("Range", "bytes=2-4")]), found(b"abcdefgh"), false);

    assert_eq!(response.status(), StatusCode::PartialContent);
    assert_eq!(response.body(), b"cde");
    assert_eq!(response.headers().get("Content-Range"), Some("bytes 2-4/8"));
    assert_eq!(response.headers().get("Content-Length"), Some("3"));
}

#[test]
fn test_build_range_not_satisfiable() {
    let response = build_response(&get(&[("Range", "bytes=50-60")]), found(b"abcdefgh"), false);

    assert_eq!(response.status(), StatusCode::RangeNotSatisfiable);
    assert!(response.body().is_empty());
    assert_eq!(response.headers().get("Content-Range"), Some("bytes */8"));
    assert_eq!(response.headers().get("Content-Length"), Some("0"));
}

#[test]
fn test_build_range_ignored_for_missing() {
    let resource = Resource::Missing {
        page: b"nope".to_vec(),
    };
    let response = build_response(&get(&[("Range", "bytes=0-1")]), resource, false);

    assert_eq!(response.status(), StatusCode::NotFound);
    assert_eq!(response.body(), b"nope");
}

#[test]
fn test_build_unknown_range_unit_serves_full_body() {
    let response = build_response(&get(&[("Range", "items=0-1")]), found(b"abc"), false);

    assert_eq!(response.status(), StatusCode::Ok);
    assert_eq!(response.body(), b"abc");
}

#[test]
fn test_without_body_keeps_headers() {
    let full = build_response(&get(&[]), found(b"0123456789"), false);
    let head = without_body(&full);

    assert_eq!(head.status(), StatusCode::Ok);
    assert!(head.body().is_empty());
    assert_eq!(head.headers().get("Content-Length"), Some("10"));
    assert_eq!(head.head(), full.head());
}

#[test]
fn test_parse_range_forms() {
    assert_eq!(
        parse_range("bytes=0-0", 5),
        Some(ByteRange::Satisfiable { start: 0, end: 0 })
    );
    assert_eq!(
        parse_range("bytes=-2", 5),
        Some(ByteRange::Satisfiable { start: 3, end: 4 })
    );
    assert_eq!(
        parse_range("bytes=-10", 5),
        Some(ByteRange::Satisfiable { start: 0, end: 4 })
    );
    assert_eq!(
        parse_range("bytes=1-100", 5),
        Some(ByteRange::Satisfiable { start: 1, end: 4 })
    );
    assert_eq!(
        parse_range("bytes=1-2, 3-4", 5),
        Some(ByteRange::Satisfiable { start: 1, end: 2 })
    );
    assert_eq!(parse_range("bytes=4-2", 5), Some(ByteRange::Unsatisfiable));
    assert_eq!(parse_range("bytes=5-", 5), Some(ByteRange::Unsatisfiable));
    assert_eq!(parse_range("bytes=-0", 5), Some(ByteRange::Unsatisfiable));
    assert_eq!(parse_range("bytes=a-b", 5), None);
    assert_eq!(parse_range("lines=1-2", 5), None);
}

#[test]
fn test_format_http_date() {
    let time = SystemTime::UNIX_EPOCH + Duration::from_secs(784111777);
    assert_eq!(format_http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
}

#[test]
fn test_serialize_request_parses_back() {
    let request = Request::builder()
        .method(Method::POST)
        .target("/a dir/file%.txt")
        .query("k", "v")
        .header("Content-Length", "3")
        .header("Host", "localhost")
        .body(b"abc".to_vec())
        .build()
        .unwrap();

    let wire = serialize_request(&request);
    let (parsed, consumed) = parse_http_request(&wire).unwrap();

    assert_eq!(consumed, wire.len());
    assert_eq!(parsed, request);
}

#[test]
fn test_content_length_matches_body_on_every_path() {
    let payload = b"0123456789abcdef".repeat(8);
    let cases = [
        (get(&[]), false),
        (get(&[]), true),
        (get(&[("Range", "bytes=10-20")]), false),
        (get(&[("Range", "bytes=-5")]), false),
        (get(&[("Range", "bytes=999-")]), false),
    ];

    for (request, gzip) in cases {
        let response = build_response(&request, found(&payload), gzip);
        assert_eq!(
            response.headers().get("Content-Length"),
            Some(response.body().len().to_string().as_str())
        );
    }
}
