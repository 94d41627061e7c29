//! Local HTTP API used by desktop tooling on the weighing station.
//!
//! Runs on its own thread with a current-thread tokio runtime. Every sink or
//! port access is blocking and goes through `spawn_blocking`.
//!
//! - `GET  /api/poids?desktop=&company=`: newest row; an absent filter matches any station
//! - `POST /api/poids`: `{"poids": n, "desktop"?, "company"?}`
//! - `POST /api/read-now`: one on-demand capture on the live port
//!
//! Browsers may call it cross-origin only from the company web tools.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use eyre::WrapErr;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use weigher_core::{Identity, OnDemandReader, ScaleError, SharedSink, Shutdown};
use weigher_traits::WeightSink;
use weigher_traits::clock::MonotonicClock;

pub type Reader = OnDemandReader<SharedSink, MonotonicClock>;

#[derive(Clone)]
pub struct ApiState {
    pub sink: SharedSink,
    pub reader: Arc<Reader>,
    pub identity: Identity,
}

type Reply = (StatusCode, Json<Value>);

fn reply(status: StatusCode, body: Value) -> Reply {
    (status, Json(body))
}

fn internal_error() -> Reply {
    reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": "internal error" }),
    )
}

/// Origins containing one of these may call the API from a browser.
const CORS_ORIGINS: &[&str] = &["odmtec", "otchoumouang.github.io"];

fn origin_allowed(origin: &HeaderValue, _parts: &Parts) -> bool {
    origin
        .to_str()
        .is_ok_and(|o| CORS_ORIGINS.iter().any(|marker| o.contains(marker)))
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(origin_allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/poids", get(get_latest).post(post_weight))
        .route("/api/read-now", post(read_now))
        .layer(cors())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    desktop: Option<String>,
    company: Option<String>,
}

/// Whole kilograms render as integers.
fn weight_json(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        json!(v as i64)
    } else {
        json!(v)
    }
}

async fn get_latest(State(st): State<ApiState>, Query(q): Query<LatestQuery>) -> Reply {
    let desktop = q.desktop.unwrap_or_default();
    let company = q.company.unwrap_or_default();
    let sink = Arc::clone(&st.sink);
    match tokio::task::spawn_blocking(move || sink.latest_record(&desktop, &company)).await {
        Ok(Ok(Some(row))) => reply(
            StatusCode::OK,
            json!({
                "id": row.id,
                "valeur": weight_json(row.weight),
                "desktop": row.source_id,
                "company": row.group_id,
                "date": row.recorded_at,
            }),
        ),
        Ok(Ok(None)) => reply(
            StatusCode::NOT_FOUND,
            json!({ "message": "no record matches the given station" }),
        ),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "api: latest lookup failed");
            internal_error()
        }
        Err(e) => {
            tracing::error!(error = %e, "api: latest lookup task failed");
            internal_error()
        }
    }
}

async fn post_weight(State(st): State<ApiState>, body: Bytes) -> Reply {
    let bad_request = || {
        reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": "body must carry a non-negative integer \"poids\"" }),
        )
    };
    let Ok(v) = serde_json::from_slice::<Value>(&body) else {
        return bad_request();
    };
    let Some(poids) = v
        .get("poids")
        .and_then(Value::as_i64)
        .and_then(|p| i32::try_from(p).ok())
        .filter(|p| *p >= 0)
    else {
        return bad_request();
    };
    let field = |name: &str, default: &str| {
        v.get(name)
            .and_then(Value::as_str)
            .map_or_else(|| default.to_owned(), str::to_owned)
    };
    let desktop = field("desktop", &st.identity.source_id);
    let company = field("company", &st.identity.group_id);

    let sink = Arc::clone(&st.sink);
    match tokio::task::spawn_blocking(move || sink.record(poids, &desktop, &company)).await {
        Ok(Ok(())) => {
            tracing::info!(weight = poids, "api: weight recorded");
            reply(
                StatusCode::OK,
                json!({ "message": "value recorded", "poids": poids }),
            )
        }
        Ok(Err(e)) => {
            tracing::error!(weight = poids, error = %e, "api: record failed");
            internal_error()
        }
        Err(e) => {
            tracing::error!(error = %e, "api: record task failed");
            internal_error()
        }
    }
}

async fn read_now(State(st): State<ApiState>) -> Reply {
    let reader = Arc::clone(&st.reader);
    match tokio::task::spawn_blocking(move || reader.read_now()).await {
        Ok(Ok(Some(c))) => reply(
            StatusCode::OK,
            json!({ "poids": c.weight, "recorded": c.recorded }),
        ),
        Ok(Ok(None)) => reply(
            StatusCode::NOT_FOUND,
            json!({ "message": "no stable weight within the timeout" }),
        ),
        Ok(Err(e @ (ScaleError::NotConnected | ScaleError::Transport(_)))) => reply(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": e.to_string() }),
        ),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "api: read-now failed");
            internal_error()
        }
        Err(e) => {
            tracing::error!(error = %e, "api: read-now task failed");
            internal_error()
        }
    }
}

async fn until_shutdown(shutdown: Shutdown) {
    let _ = tokio::task::spawn_blocking(move || shutdown.wait_forever()).await;
    tracing::info!("api: shutting down");
}

/// A running API thread.
pub struct ApiServer {
    addr: SocketAddr,
    thread: JoinHandle<()>,
}

impl ApiServer {
    /// Bind `bind` now and serve on a new thread until `shutdown` fires.
    pub fn spawn(bind: &str, state: ApiState, shutdown: Shutdown) -> eyre::Result<Self> {
        let listener =
            std::net::TcpListener::bind(bind).wrap_err_with(|| format!("bind api on {bind}"))?;
        listener
            .set_nonblocking(true)
            .wrap_err("set api listener non-blocking")?;
        let addr = listener.local_addr().wrap_err("api listener address")?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .wrap_err("build api runtime")?;

        let thread = std::thread::Builder::new()
            .name("api".into())
            .spawn(move || {
                let app = router(state);
                let served = runtime.block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener)?;
                    tracing::info!(%addr, "api: listening");
                    axum::serve(listener, app)
                        .with_graceful_shutdown(until_shutdown(shutdown))
                        .await
                });
                if let Err(e) = served {
                    tracing::error!(error = %e, "api: server stopped");
                }
            })
            .wrap_err("spawning api thread")?;
        Ok(Self { addr, thread })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to finish; trigger its shutdown signal first.
    pub fn join(self) {
        if self.thread.join().is_err() {
            tracing::warn!("api thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use weigher_core::mocks::{MemorySink, ScriptedPort, Step};
    use weigher_core::{AcquisitionCfg, PortSlot};

    struct Harness {
        server: Option<ApiServer>,
        shutdown: Shutdown,
        sink: MemorySink,
        slot: Arc<PortSlot>,
    }

    impl Harness {
        fn new() -> Self {
            let sink = MemorySink::new();
            let shared: SharedSink = Arc::new(sink.clone());
            let identity = Identity {
                source_id: "PC-1".into(),
                group_id: "SITE".into(),
            };
            let slot = Arc::new(PortSlot::new());
            let shutdown = Shutdown::new();
            let reader = Arc::new(OnDemandReader::new(
                Arc::clone(&slot),
                Arc::clone(&shared),
                &AcquisitionCfg::new(identity.clone()),
                MonotonicClock::new(),
                shutdown.clone(),
            ));
            let server = ApiServer::spawn(
                "127.0.0.1:0",
                ApiState {
                    sink: shared,
                    reader,
                    identity,
                },
                shutdown.clone(),
            )
            .unwrap();
            Self {
                server: Some(server),
                shutdown,
                sink,
                slot,
            }
        }

        /// Status, lowercased response head and raw body.
        fn send(
            &self,
            method: &str,
            path: &str,
            headers: &[(&str, &str)],
            body: Option<&str>,
        ) -> (u16, String, String) {
            let addr = self.server.as_ref().unwrap().local_addr();
            let mut s = TcpStream::connect(addr).unwrap();
            let body = body.unwrap_or("");
            let extra: String = headers.iter().map(|(k, v)| format!("{k}: {v}\r\n")).collect();
            write!(
                s,
                "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\n{extra}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            let mut raw = String::new();
            s.read_to_string(&mut raw).unwrap();
            let status: u16 = raw.split_whitespace().nth(1).unwrap().parse().unwrap();
            let (head, payload) = raw.split_once("\r\n\r\n").unwrap_or((&raw, ""));
            (status, head.to_ascii_lowercase(), payload.to_owned())
        }

        fn call(&self, method: &str, path: &str, body: Option<&str>) -> (u16, Value) {
            let (status, _, payload) = self.send(method, path, &[], body);
            (status, serde_json::from_str(&payload).unwrap_or(Value::Null))
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.shutdown.trigger();
            if let Some(s) = self.server.take() {
                s.join();
            }
        }
    }

    #[test]
    fn latest_without_filters_matches_any_station() {
        let h = Harness::new();
        assert_eq!(h.call("GET", "/api/poids", None).0, 404);
        h.sink.record(1250, "PC-1", "SITE").unwrap();
        h.sink.record(90, "PC-2", "OTHER").unwrap();

        let (status, v) = h.call("GET", "/api/poids", None);
        assert_eq!(status, 200);
        assert_eq!(v["id"], 2);
        assert_eq!(v["valeur"], 90);
        assert_eq!(v["desktop"], "PC-2");
        assert_eq!(v["company"], "OTHER");
        assert!(v.get("date").is_some());

        let (status, v) = h.call("GET", "/api/poids?desktop=PC-1", None);
        assert_eq!(status, 200);
        assert_eq!(v["id"], 1);
        assert_eq!(v["valeur"], 1250);
        let (status, v) = h.call("GET", "/api/poids?company=SITE", None);
        assert_eq!(status, 200);
        assert_eq!(v["desktop"], "PC-1");
        assert_eq!(h.call("GET", "/api/poids?desktop=PC-9", None).0, 404);
        assert_eq!(h.call("GET", "/api/poids?desktop=PC-2&company=SITE", None).0, 404);
    }

    #[test]
    fn latest_lookup_failure_is_500() {
        let h = Harness::new();
        h.sink.fail_latest(true);
        assert_eq!(h.call("GET", "/api/poids", None).0, 500);
    }

    #[test]
    fn preflight_from_company_origin_is_allowed() {
        let h = Harness::new();
        for origin in ["https://otchoumouang.github.io", "https://app.odmtec.com"] {
            let (status, head, _) = h.send(
                "OPTIONS",
                "/api/poids",
                &[
                    ("Origin", origin),
                    ("Access-Control-Request-Method", "POST"),
                    ("Access-Control-Request-Headers", "content-type"),
                ],
                None,
            );
            assert_eq!(status, 200, "{origin}");
            assert!(
                head.contains(&format!("access-control-allow-origin: {origin}")),
                "{head}"
            );
            assert!(head.contains("access-control-allow-methods"), "{head}");
        }
    }

    #[test]
    fn foreign_origin_gets_no_cors_headers() {
        let h = Harness::new();
        h.sink.record(5, "PC-1", "SITE").unwrap();
        let (status, head, _) = h.send(
            "GET",
            "/api/poids",
            &[("Origin", "https://evil.example")],
            None,
        );
        assert_eq!(status, 200);
        assert!(!head.contains("access-control-allow-origin"), "{head}");

        let (_, head, _) = h.send(
            "GET",
            "/api/poids",
            &[("Origin", "https://otchoumouang.github.io")],
            None,
        );
        assert!(head.contains("access-control-allow-origin: https://otchoumouang.github.io"));
    }

    #[test]
    fn post_records_with_defaults() {
        let h = Harness::new();
        let (status, v) = h.call("POST", "/api/poids", Some(r#"{"poids": 12}"#));
        assert_eq!(status, 200);
        assert_eq!(v["poids"], 12);
        let (status, _) = h.call(
            "POST",
            "/api/poids",
            Some(r#"{"poids": 7, "desktop": "PC-2", "company": "X"}"#),
        );
        assert_eq!(status, 200);
        let recs = h.sink.records();
        assert_eq!(recs.len(), 2);
        assert_eq!((recs[0].source_id.as_str(), recs[0].group_id.as_str()), ("PC-1", "SITE"));
        assert_eq!((recs[1].source_id.as_str(), recs[1].group_id.as_str()), ("PC-2", "X"));
    }

    #[test]
    fn post_rejects_bad_bodies() {
        let h = Harness::new();
        for body in [
            "{}",
            r#"{"poids": -1}"#,
            r#"{"poids": 3.5}"#,
            r#"{"poids": "12"}"#,
            "not json",
        ] {
            assert_eq!(h.call("POST", "/api/poids", Some(body)).0, 400, "{body}");
        }
        assert!(h.sink.records().is_empty());
    }

    #[test]
    fn post_sink_failure_is_500() {
        let h = Harness::new();
        h.sink.fail_records(true);
        assert_eq!(h.call("POST", "/api/poids", Some(r#"{"poids": 1}"#)).0, 500);
    }

    #[test]
    fn read_now_without_scale_is_503() {
        let h = Harness::new();
        assert_eq!(h.call("POST", "/api/read-now", None).0, 503);
    }

    #[test]
    fn read_now_captures_from_the_live_port() {
        let h = Harness::new();
        h.slot.install(Box::new(ScriptedPort::new(
            "COM1",
            vec![Step::Data(b"ww     12kg".repeat(3))],
        )));
        let (status, v) = h.call("POST", "/api/read-now", None);
        assert_eq!(status, 200);
        assert_eq!(v["poids"], 12);
        assert_eq!(v["recorded"], true);
        assert_eq!(h.sink.weights(), vec![12]);
    }
}
