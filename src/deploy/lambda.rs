//! # AWS Lambda Platform
//!
//! [`Platform`] over the Lambda 2015-03-31 REST API. Requests are signed with
//! Signature Version 4; packages travel base64 encoded inside JSON bodies.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::trace;

use super::platform::{
    Platform, PlatformError, PlatformResult, RemoteFunctionConfig, RemoteFunctionState,
};
use crate::functions::{FunctionError, FunctionResult};

const API_VERSION: &str = "2015-03-31";
const SERVICE: &str = "lambda";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

type HmacSha256 = Hmac<Sha256>;

/// AWS access keys
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Configured keys, falling back to `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
    pub fn resolve(
        access_key_id: Option<&str>,
        secret_access_key: Option<&str>,
    ) -> FunctionResult<Self> {
        let access_key_id = access_key_id
            .map(str::to_string)
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
            .ok_or_else(|| FunctionError::Config("AWS access key not found".into()))?;

        let secret_access_key = secret_access_key
            .map(str::to_string)
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
            .ok_or_else(|| FunctionError::Config("AWS secret key not found".into()))?;

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }
}

/// Lambda REST client
#[derive(Debug, Clone)]
pub struct LambdaPlatform {
    client: reqwest::Client,
    region: String,
    endpoint: Url,
    credentials: Credentials,
}

impl LambdaPlatform {
    pub fn new(region: &str, credentials: Credentials) -> FunctionResult<Self> {
        let endpoint = format!("https://lambda.{}.amazonaws.com", region);
        Self::with_endpoint(region, credentials, &endpoint)
    }

    /// Client against a custom endpoint
    pub fn with_endpoint(
        region: &str,
        credentials: Credentials,
        endpoint: &str,
    ) -> FunctionResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| FunctionError::Config(format!("invalid endpoint {}: {}", endpoint, e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            region: region.to_string(),
            endpoint,
            credentials,
        })
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> PlatformResult<Value> {
        let mut url = self
            .endpoint
            .join(&format!("/{}{}", API_VERSION, path))
            .map_err(|e| PlatformError::Remote(format!("invalid request path: {}", e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let payload = body.map(|b| b.to_string()).unwrap_or_default();
        let signed = sign(
            &SigningInput {
                method: method.as_str(),
                host: &host_header(&url),
                path: url.path(),
                query: &canonical_query(query),
                payload: payload.as_bytes(),
                region: &self.region,
            },
            &self.credentials,
            Utc::now(),
        );

        trace!(method = %method, url = %url, "lambda request");

        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", signed.authorization)
            .header("X-Amz-Date", signed.amz_date)
            .header("Content-Type", "application/json");
        if let Some(token) = &self.credentials.session_token {
            request = request.header("X-Amz-Security-Token", token);
        }
        if !payload.is_empty() {
            request = request.body(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::Remote(format!("Lambda request failed: {}", e)))?;

        let status = response.status();
        let error_type = response
            .headers()
            .get("x-amzn-ErrorType")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| PlatformError::Remote(format!("invalid Lambda response: {}", e)));
        }

        Err(api_error(status, error_type.as_deref(), &text))
    }
}

fn api_error(status: StatusCode, error_type: Option<&str>, body: &str) -> PlatformError {
    let parsed: Option<ApiError> = serde_json::from_str(body).ok();
    let kind = error_type
        .map(|t| t.split(':').next().unwrap_or(t).to_string())
        .or_else(|| parsed.as_ref().and_then(|e| e.kind.clone()))
        .unwrap_or_else(|| status.to_string());
    let message = parsed
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string());

    if status == StatusCode::NOT_FOUND || kind == "ResourceNotFoundException" {
        PlatformError::NotFound(message)
    } else {
        PlatformError::Remote(format!("{}: {}", kind, message))
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "Type", alias = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FunctionConfiguration {
    code_sha256: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    last_update_status: Option<String>,
}

impl From<FunctionConfiguration> for RemoteFunctionState {
    fn from(config: FunctionConfiguration) -> Self {
        Self {
            update_in_progress: config.last_update_status.as_deref() == Some("InProgress"),
            content_hash: config.code_sha256,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AliasConfiguration {
    function_version: String,
}

fn parse<T: for<'de> Deserialize<'de>>(value: Value) -> PlatformResult<T> {
    serde_json::from_value(value)
        .map_err(|e| PlatformError::Remote(format!("unexpected Lambda response: {}", e)))
}

fn published_version(value: Value) -> PlatformResult<String> {
    parse::<FunctionConfiguration>(value)?
        .version
        .ok_or_else(|| PlatformError::Remote("Lambda response carries no version".into()))
}

/// Body fields shared by CreateFunction and UpdateFunctionConfiguration
fn configuration_body(config: &RemoteFunctionConfig) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("Handler".into(), json!(config.handler));
    body.insert("Role".into(), json!(config.role));
    body.insert("MemorySize".into(), json!(config.memory_mb));
    body.insert("Timeout".into(), json!(config.timeout_secs));
    body.insert("Runtime".into(), json!(config.runtime));
    if let Some(target) = &config.dead_letter_target {
        body.insert("DeadLetterConfig".into(), json!({ "TargetArn": target }));
    }
    body.insert(
        "Environment".into(),
        json!({ "Variables": config.environment }),
    );
    body
}

#[async_trait]
impl Platform for LambdaPlatform {
    async fn get_function_config(&self, name: &str) -> PlatformResult<RemoteFunctionState> {
        let value = self
            .call(Method::GET, &format!("/functions/{}/configuration", name), &[], None)
            .await?;
        Ok(parse::<FunctionConfiguration>(value)?.into())
    }

    async fn create_function(
        &self,
        name: &str,
        package: &[u8],
        config: &RemoteFunctionConfig,
    ) -> PlatformResult<String> {
        let mut body = configuration_body(config);
        body.insert("FunctionName".into(), json!(name));
        body.insert("Code".into(), json!({ "ZipFile": STANDARD.encode(package) }));
        body.insert("Publish".into(), json!(true));
        if !config.tags.is_empty() {
            body.insert("Tags".into(), json!(config.tags));
        }

        let value = self
            .call(Method::POST, "/functions", &[], Some(Value::Object(body)))
            .await?;
        published_version(value)
    }

    async fn check_code(&self, name: &str, package: &[u8]) -> PlatformResult<String> {
        let body = json!({ "ZipFile": STANDARD.encode(package), "DryRun": true });
        let value = self
            .call(Method::PUT, &format!("/functions/{}/code", name), &[], Some(body))
            .await?;
        Ok(parse::<FunctionConfiguration>(value)?.code_sha256)
    }

    async fn publish_code(&self, name: &str, package: &[u8]) -> PlatformResult<String> {
        let body = json!({ "ZipFile": STANDARD.encode(package), "Publish": true });
        let value = self
            .call(Method::PUT, &format!("/functions/{}/code", name), &[], Some(body))
            .await?;
        published_version(value)
    }

    async fn update_config(&self, name: &str, config: &RemoteFunctionConfig) -> PlatformResult<()> {
        let body = Value::Object(configuration_body(config));
        self.call(
            Method::PUT,
            &format!("/functions/{}/configuration", name),
            &[],
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn get_alias(&self, name: &str, alias: &str) -> PlatformResult<String> {
        let value = self
            .call(Method::GET, &format!("/functions/{}/aliases/{}", name, alias), &[], None)
            .await?;
        Ok(parse::<AliasConfiguration>(value)?.function_version)
    }

    async fn create_alias(&self, name: &str, alias: &str, version: &str) -> PlatformResult<()> {
        let body = json!({ "Name": alias, "FunctionVersion": version });
        self.call(Method::POST, &format!("/functions/{}/aliases", name), &[], Some(body))
            .await?;
        Ok(())
    }

    async fn update_alias(&self, name: &str, alias: &str, version: &str) -> PlatformResult<()> {
        let body = json!({ "FunctionVersion": version });
        self.call(
            Method::PUT,
            &format!("/functions/{}/aliases/{}", name, alias),
            &[],
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn delete_version(&self, name: &str, version: &str) -> PlatformResult<()> {
        self.call(
            Method::DELETE,
            &format!("/functions/{}", name),
            &[("Qualifier", version)],
            None,
        )
        .await?;
        Ok(())
    }
}

/// Request parts covered by the signature
#[derive(Debug)]
struct SigningInput<'a> {
    method: &'a str,
    host: &'a str,
    path: &'a str,
    query: &'a str,
    payload: &'a [u8],
    region: &'a str,
}

#[derive(Debug, PartialEq, Eq)]
struct SignedRequest {
    authorization: String,
    amz_date: String,
}

fn sign(input: &SigningInput<'_>, credentials: &Credentials, now: DateTime<Utc>) -> SignedRequest {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers = BTreeMap::new();
    headers.insert("host", input.host.to_string());
    headers.insert("x-amz-date", amz_date.clone());
    if let Some(token) = &credentials.session_token {
        headers.insert("x-amz-security-token", token.clone());
    }

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();
    let signed_headers = headers.keys().copied().collect::<Vec<_>>().join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        input.method,
        input.path,
        input.query,
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(input.payload))
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, input.region, SERVICE);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        credential_scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, input.region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

    SignedRequest {
        authorization: format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, credentials.access_key_id, credential_scope, signed_headers, signature
        ),
        amz_date,
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn canonical_query(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn uri_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            other => format!("%{:02X}", other),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credentials() -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
            session_token: None,
        }
    }

    fn input<'a>(payload: &'a [u8]) -> SigningInput<'a> {
        SigningInput {
            method: "GET",
            host: "lambda.us-east-1.amazonaws.com",
            path: "/2015-03-31/functions/app-ping/configuration",
            query: "",
            payload,
            region: "us-east-1",
        }
    }

    #[test]
    fn test_signature_shape() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let signed = sign(&input(b""), &credentials(), now);

        assert_eq!(signed.amz_date, "20240102T030405Z");
        assert!(signed.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240102/us-east-1/lambda/aws4_request, SignedHeaders=host;x-amz-date, Signature="
        ));
        let signature = signed.authorization.rsplit('=').next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_signature_covers_payload() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let a = sign(&input(b"{}"), &credentials(), now);
        let b = sign(&input(b"{}"), &credentials(), now);
        let c = sign(&input(b"{\"x\":1}"), &credentials(), now);
        assert_eq!(a, b);
        assert_ne!(a.authorization, c.authorization);
    }

    #[test]
    fn test_session_token_is_signed() {
        let mut creds = credentials();
        creds.session_token = Some("token".into());
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let signed = sign(&input(b""), &creds, now);
        assert!(signed
            .authorization
            .contains("SignedHeaders=host;x-amz-date;x-amz-security-token"));
    }

    #[test]
    fn test_canonical_query() {
        assert_eq!(canonical_query(&[("Qualifier", "3")]), "Qualifier=3");
        assert_eq!(canonical_query(&[("b", "x y"), ("a", "1")]), "a=1&b=x%20y");
    }

    #[test]
    fn test_not_found_mapping() {
        let err = api_error(
            StatusCode::NOT_FOUND,
            Some("ResourceNotFoundException:http://internal.amazon.com/coral/"),
            r#"{"Type":"User","Message":"Function not found: arn:aws:lambda:us-east-1:1:function:app-ping"}"#,
        );
        match err {
            PlatformError::NotFound(message) => assert!(message.starts_with("Function not found")),
            other => panic!("unexpected: {other:?}"),
        }

        let err = api_error(
            StatusCode::FORBIDDEN,
            Some("AccessDeniedException"),
            r#"{"Message":"denied"}"#,
        );
        assert_eq!(err.to_string(), "AccessDeniedException: denied");
    }

    #[test]
    fn test_configuration_body() {
        let config = RemoteFunctionConfig {
            memory_mb: 1536,
            timeout_secs: 15,
            role: "arn:aws:iam::123456789012:role/lambda".into(),
            runtime: "nodejs20.x".into(),
            handler: "index.handler".into(),
            dead_letter_target: Some("arn:aws:sqs:us-east-1:123456789012:dlq".into()),
            environment: BTreeMap::from([("A".to_string(), "1".to_string())]),
            tags: BTreeMap::new(),
        };
        let body = Value::Object(configuration_body(&config));
        assert_eq!(body["MemorySize"], 1536);
        assert_eq!(body["Environment"]["Variables"]["A"], "1");
        assert_eq!(
            body["DeadLetterConfig"]["TargetArn"],
            "arn:aws:sqs:us-east-1:123456789012:dlq"
        );
        assert!(body.get("Tags").is_none());
    }

    #[test]
    fn test_update_status() {
        let state: RemoteFunctionState = parse::<FunctionConfiguration>(json!({
            "CodeSha256": "abc=",
            "LastUpdateStatus": "InProgress",
        }))
        .unwrap()
        .into();
        assert!(state.update_in_progress);

        let state: RemoteFunctionState =
            parse::<FunctionConfiguration>(json!({ "CodeSha256": "abc=", "LastUpdateStatus": "Successful" }))
                .unwrap()
                .into();
        assert!(!state.update_in_progress);
        assert_eq!(state.content_hash, "abc=");
    }
}
