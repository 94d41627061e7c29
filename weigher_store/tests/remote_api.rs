//! RemoteApiSink against a one-shot local HTTP responder.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use weigher_store::{RemoteApiSink, StoreError};
use weigher_traits::WeightSink;

struct Captured {
    request_line: String,
    body: String,
}

/// Serve exactly one request with `status` and `body`; hand back what was received.
fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/api/poids", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((k, v)) = line.split_once(':')
                && k.eq_ignore_ascii_case("content-length")
            {
                content_length = v.trim().parse().unwrap();
            }
        }
        let mut buf = vec![0u8; content_length];
        reader.read_exact(&mut buf).unwrap();
        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
        .unwrap();
        stream.flush().unwrap();
        tx.send(Captured {
            request_line: request_line.trim_end().to_string(),
            body: String::from_utf8(buf).unwrap(),
        })
        .unwrap();
    });
    (url, rx)
}

fn sink(url: &str) -> RemoteApiSink {
    RemoteApiSink::new(url, Duration::from_secs(5)).unwrap()
}

#[test]
fn record_posts_the_expected_fields() {
    let (url, rx) = serve_once("200 OK", r#"{"ok":true}"#);
    sink(&url).record(1250, "PC-1", "SITE").unwrap();
    let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(got.request_line.starts_with("POST /api/poids"));
    let v: serde_json::Value = serde_json::from_str(&got.body).unwrap();
    assert_eq!(v["poids"], 1250);
    assert_eq!(v["desktop"], "PC-1");
    assert_eq!(v["company"], "SITE");
}

#[test]
fn non_200_is_a_failure() {
    let (url, _rx) = serve_once("201 Created", "{}");
    let err = sink(&url).post(5, "PC-1", "SITE").unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 201, .. }), "{err}");
}

#[test]
fn latest_reads_valeur_and_sends_filters() {
    let (url, rx) = serve_once("200 OK", r#"{"valeur": 830, "desktop": "PC-1"}"#);
    assert_eq!(sink(&url).latest("PC-1", "SITE").unwrap(), Some(830.0));
    let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(got.request_line.starts_with("GET /api/poids?"));
    assert!(got.request_line.contains("desktop=PC-1"));
    assert!(got.request_line.contains("company=SITE"));
}

#[test]
fn latest_404_is_none() {
    let (url, _rx) = serve_once("404 Not Found", r#"{"message":"none"}"#);
    assert_eq!(sink(&url).fetch_latest("PC-1", "SITE").unwrap(), None);
}

#[test]
fn latest_without_valeur_is_an_error() {
    let (url, _rx) = serve_once("200 OK", r#"{"other": 1}"#);
    assert!(matches!(
        sink(&url).fetch_latest("PC-1", "SITE"),
        Err(StoreError::MissingField("valeur"))
    ));
}

#[test]
fn unreachable_server_is_an_http_error() {
    // bind then drop to get a port with nobody listening
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let s = RemoteApiSink::new(format!("http://{addr}/api/poids"), Duration::from_millis(500)).unwrap();
    assert!(matches!(s.post(1, "a", "b"), Err(StoreError::Http(_))));
}

#[test]
fn latest_record_keeps_the_server_row() {
    let (url, _rx) = serve_once(
        "200 OK",
        r#"{"id": 41, "valeur": "830", "desktop": "PC-7", "company": "SITE", "date": "2026-03-02 08:15:00"}"#,
    );
    let row = sink(&url).latest_record("", "SITE").unwrap().unwrap();
    assert_eq!(row.id, Some(41));
    assert_eq!(row.weight, 830.0);
    assert_eq!(row.source_id, "PC-7");
    assert_eq!(row.group_id, "SITE");
    assert_eq!(row.recorded_at.as_deref(), Some("2026-03-02 08:15:00"));
}
