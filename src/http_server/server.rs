//! # Dev Server
//!
//! Serves discovered functions over HTTP. Every request is routed, turned
//! into a canonical event and run through the hot transform pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router as AxumRouter;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::config::HttpServerConfig;
use super::router::{RouteMatch, Router};
use crate::functions::{
    FunctionError, FunctionResult, HandlerResponse, HttpError, HttpErrorKind, HttpMethod,
};
use crate::observability::Event;
use crate::runtime::HotTransformPipeline;

/// Shared by all request handlers
pub struct DevState {
    pub router: Router,
    pub pipeline: HotTransformPipeline,
    pub body_limit: usize,
}

/// Local HTTP server for functions
pub struct HttpServer {
    config: HttpServerConfig,
    state: Arc<DevState>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, router: Router, pipeline: HotTransformPipeline) -> Self {
        let state = Arc::new(DevState {
            router,
            pipeline,
            body_limit: config.body_limit,
        });
        Self { config, state }
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Every path goes to the fallback handler
    pub fn router(&self) -> AxumRouter {
        AxumRouter::new()
            .fallback(handle)
            .with_state(self.state.clone())
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Bind and serve until the process ends
    pub async fn start(self) -> FunctionResult<()> {
        let listener = TcpListener::bind(self.socket_addr()).await.map_err(|e| {
            FunctionError::Config(format!("cannot listen on {}: {}", self.socket_addr(), e))
        })?;
        let addr = listener.local_addr()?;

        info!(
            event = %Event::Serving,
            addr = %addr,
            functions = self.state.router.functions().len(),
        );
        if !self.config.is_loopback() {
            warn!(
                event = %Event::Serving,
                host = %self.config.host,
                "dev server is reachable from other machines"
            );
        }

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn handle(State(state): State<Arc<DevState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let routed = match parts.method.as_str().parse::<HttpMethod>() {
        Ok(method) => state.router.route(method, &path),
        Err(_) => {
            let allow = state.router.allowed_methods(&path);
            if allow.is_empty() {
                RouteMatch::NotFound
            } else {
                RouteMatch::MethodNotAllowed { allow }
            }
        }
    };

    let (descriptor, params) = match routed {
        RouteMatch::Matched { descriptor, params } => (descriptor, params),
        rejected => {
            info!(
                event = %Event::RequestRejected,
                method = %parts.method,
                path = %path,
                status = rejected.status_code().unwrap_or(404),
            );
            return rejection(&rejected);
        }
    };

    debug!(event = %Event::RequestRouted, function = %descriptor.name, path = %path);

    let query: BTreeMap<String, String> = Query::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or_default();

    let body = match to_bytes(body, state.body_limit).await {
        Ok(bytes) => parse_body(&bytes),
        Err(e) => {
            return plain(StatusCode::PAYLOAD_TOO_LARGE, &e.to_string(), None);
        }
    };

    let event = json!({
        "queryStringParameters": query,
        "pathParameters": params,
        "headers": header_map(&parts.headers),
        "body": body,
    });

    match state.pipeline.invoke(descriptor, &event).await {
        Ok(response) => into_http(response),
        Err(e) => {
            error!(
                event = %Event::InvocationFailed,
                function = %descriptor.name,
                error = %e,
            );
            into_http(
                e.http_error()
                    .with_data(json!({ "function": descriptor.name }))
                    .with_header("Access-Control-Allow-Origin", "*")
                    .into_response(),
            )
        }
    }
}

/// JSON when it parses, the raw text otherwise, `null` when empty
pub fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

fn rejection(routed: &RouteMatch<'_>) -> Response {
    let kind = match routed {
        RouteMatch::MethodNotAllowed { .. } => HttpErrorKind::MethodNotAllowed,
        _ => HttpErrorKind::NotFound,
    };
    let error = HttpError::new(kind);
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::NOT_FOUND);
    plain(status, &error.message, routed.allow_header())
}

fn plain(status: StatusCode, message: &str, allow: Option<String>) -> Response {
    let mut response = (status, message.to_string()).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let Some(allow) = allow.and_then(|a| HeaderValue::from_str(&a).ok()) {
        response.headers_mut().insert(header::ALLOW, allow);
    }
    response
}

/// Handler response to HTTP; `Content-Type` defaults to JSON
fn into_http(handler: HandlerResponse) -> Response {
    let status =
        StatusCode::from_u16(handler.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let needs_content_type = !handler.has_header("content-type");

    let mut response = Response::new(Body::from(handler.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    if needs_content_type {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    for (name, value) in handler.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            debug!(header = %name, "dropping invalid response header");
            continue;
        };
        headers.insert(name, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::PassthroughCompiler;
    use crate::codegen::CodeGenerator;
    use crate::functions::{FunctionDescriptor, FunctionResult};
    use crate::runtime::{Invocation, ModuleRuntime};
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Answers with the event it received, or fails on `/a/fail/b`
    struct EchoRuntime;

    #[async_trait]
    impl ModuleRuntime for EchoRuntime {
        async fn invoke(&self, invocation: Invocation<'_>) -> FunctionResult<HandlerResponse> {
            if invocation.event["pathParameters"]["id"] == "fail" {
                return Err(FunctionError::Internal("interpreter vanished".into()));
            }
            Ok(HandlerResponse::new(200, invocation.event.to_string())
                .with_header("Access-Control-Allow-Origin", "*"))
        }
    }

    fn server(temp: &TempDir) -> HttpServer {
        server_with(temp, HttpServerConfig::default())
    }

    fn server_with(temp: &TempDir, config: HttpServerConfig) -> HttpServer {
        let dir = temp.path().join("get-b");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.js"), "export default () => ({})").unwrap();

        let router = Router::new(vec![
            FunctionDescriptor::new("get-b", &dir).with_route(HttpMethod::Get, "/a/{id}/b"),
            FunctionDescriptor::new("post-b", &dir).with_route(HttpMethod::Put, "/a/{id}/b"),
        ]);
        let pipeline = HotTransformPipeline::new(
            CodeGenerator::new(temp.path()),
            Arc::new(PassthroughCompiler),
            Arc::new(EchoRuntime),
            "dev",
            &["prod".to_string()],
        );
        HttpServer::new(config, router, pipeline)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_builds_canonical_event() {
        let temp = TempDir::new().unwrap();
        let app = server(&temp).router();

        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/a/42/b?verbose=1")
            .header("x-trace", "abc")
            .body(Body::from(r#"{"n":1}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );

        let event = body_json(response).await;
        assert_eq!(event["pathParameters"]["id"], "42");
        assert_eq!(event["queryStringParameters"]["verbose"], "1");
        assert_eq!(event["headers"]["x-trace"], "abc");
        assert_eq!(event["body"]["n"], 1);
    }

    #[tokio::test]
    async fn test_uncontained_failure_is_json_error() {
        let temp = TempDir::new().unwrap();
        let app = server(&temp).router();

        let request = axum::http::Request::builder()
            .uri("/a/fail/b")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = body_json(response).await;
        assert_eq!(body["statusCode"], 500);
        assert_eq!(body["data"]["function"], "get-b");
        assert!(body["errorMessage"]
            .as_str()
            .unwrap()
            .contains("interpreter vanished"));
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let temp = TempDir::new().unwrap();
        let app = server(&temp).router();

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/a/42/b")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET, PUT");
    }

    #[tokio::test]
    async fn test_not_found() {
        let temp = TempDir::new().unwrap();
        let app = server(&temp).router();

        let request = axum::http::Request::builder()
            .uri("/a/42/b/c")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Not found");
    }

    #[tokio::test]
    async fn test_body_over_limit() {
        let temp = TempDir::new().unwrap();
        let app = server_with(&temp, HttpServerConfig::default().with_body_limit(4)).router();

        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/a/42/b")
            .body(Body::from("too large"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(b"{\"a\":1}"), json!({ "a": 1 }));
        assert_eq!(parse_body(b"plain text"), json!("plain text"));
    }
}
