//! MythTV Services API client
//!
//! Thin reqwest wrapper around `http://<host>:<port>/<Service>/<Method>`.
//! Write endpoints are gated behind `--wrmi`; without it every mutating
//! call is a dry run that aborts the operation. Supports HTTP digest
//! access authentication (RFC 2617, MD5/qop=auth) for protected backends.
//!
//! Failures come in two classes: a `Warning` means the backend rejected
//! the specific operation (duplicate name, bad field, dry run) and the
//! current operation aborts; everything else is fatal for the invocation.
//! There is no retry logic.

use std::collections::HashMap;

use md5::{Digest, Md5};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend rejected this operation; abort it, nothing to roll back.
    #[error("backend rejected request: {0}")]
    Warning(String),

    /// Transport-level failure (connect, TLS, read).
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// Unexpected HTTP status outside the warning class.
    #[error("fatal API error: HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    /// The response parsed but did not have the documented wrapper shape.
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("digest authentication failed: {0}")]
    Auth(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone)]
pub struct DigestCredentials {
    pub user: String,
    pub password: String,
}

/// Connection to one backend's Services API.
pub struct BackendClient {
    http: reqwest::Client,
    base: String,
    digest: Option<DigestCredentials>,
    wrmi: bool,
}

impl BackendClient {
    pub fn new(host: &str, port: u16, digest: Option<DigestCredentials>, wrmi: bool) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{host}:{port}"),
            digest,
            wrmi,
        }
    }

    /// Read-only GET; `query` pairs are appended to the endpoint URL.
    pub async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> ApiResult<Value> {
        self.send(Method::GET, endpoint, query, None).await
    }

    /// Mutating GET (e.g. `Dvr/StopRecording`); subject to the wrmi gate.
    pub async fn get_mut(&self, endpoint: &str, query: &[(&str, String)]) -> ApiResult<Value> {
        self.check_wrmi(endpoint)?;
        self.send(Method::GET, endpoint, query, None).await
    }

    /// Mutating POST with form-encoded postdata; subject to the wrmi gate.
    pub async fn post(&self, endpoint: &str, form: &[(String, String)]) -> ApiResult<Value> {
        self.check_wrmi(endpoint)?;
        self.send(Method::POST, endpoint, &[], Some(form)).await
    }

    /// `Myth/GetHostName` ping; returns the backend's hostname.
    pub async fn check_alive(&self) -> ApiResult<String> {
        let resp = self.get("Myth/GetHostName", &[]).await?;
        expect_string(&resp)
    }

    fn check_wrmi(&self, endpoint: &str) -> ApiResult<()> {
        if self.wrmi {
            return Ok(());
        }
        info!("dry run: --wrmi not set, {endpoint} not sent");
        Err(ApiError::Warning(format!(
            "--wrmi not set, refusing to modify the backend via {endpoint}"
        )))
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        form: Option<&[(String, String)]>,
    ) -> ApiResult<Value> {
        let url = format!("{}/{}", self.base, endpoint);
        debug!("{method} {url}");

        let request = self.build(method.clone(), &url, query, form, None)?;
        let request_uri = request_uri(request.url());
        let response = self.http.execute(request).await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            let creds = self.digest.as_ref().ok_or_else(|| {
                ApiError::Auth(format!("{endpoint} requires a digest (use --digest)"))
            })?;
            let challenge = response
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
                .ok_or_else(|| ApiError::Auth("401 without WWW-Authenticate".into()))?;
            let authorization =
                digest_authorization(creds, method.as_str(), &request_uri, &challenge)?;
            let retry = self.build(method, &url, query, form, Some(authorization))?;
            self.http.execute(retry).await?
        } else {
            response
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Auth(format!("digest rejected for {endpoint}")));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Warning(format!(
                "{endpoint}: HTTP {status}: {}",
                body.trim()
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http { status, body });
        }

        let value = response.json::<Value>().await?;
        Ok(value)
    }

    fn build(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        form: Option<&[(String, String)]>,
        authorization: Option<String>,
    ) -> ApiResult<reqwest::Request> {
        let mut builder = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(form) = form {
            builder = builder.form(form);
        }
        if let Some(authorization) = authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, authorization);
        }
        Ok(builder.build()?)
    }
}

/// The request-URI the digest hashes: the path plus the query string
/// exactly as the request sends it.
fn request_uri(url: &reqwest::Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_owned(),
    }
}

/// Parse the backend's `{"bool": "0"|"1"}` wrapper.
pub fn expect_bool(resp: &Value) -> ApiResult<bool> {
    match resp.get("bool").and_then(Value::as_str) {
        Some(s) => parse_flag(s)
            .ok_or_else(|| ApiError::UnexpectedShape(format!("not a boolean string: {s:?}"))),
        None => Err(shape_error("bool", resp)),
    }
}

/// Parse the backend's `{"int": "<n>"}` wrapper.
pub fn expect_int(resp: &Value) -> ApiResult<i64> {
    match resp.get("int").and_then(Value::as_str) {
        Some(s) => s
            .parse()
            .map_err(|_| ApiError::UnexpectedShape(format!("not an integer string: {s:?}"))),
        None => Err(shape_error("int", resp)),
    }
}

/// Parse the backend's `{"uint": "<n>"}` wrapper.
pub fn expect_uint(resp: &Value) -> ApiResult<u32> {
    match resp.get("uint").and_then(Value::as_str) {
        Some(s) => s
            .parse()
            .map_err(|_| ApiError::UnexpectedShape(format!("not an unsigned string: {s:?}"))),
        None => Err(shape_error("uint", resp)),
    }
}

/// Parse the backend's `{"String": "<s>"}` wrapper.
pub fn expect_string(resp: &Value) -> ApiResult<String> {
    match resp.get("String").and_then(Value::as_str) {
        Some(s) => Ok(s.to_owned()),
        None => Err(shape_error("String", resp)),
    }
}

fn shape_error(key: &str, resp: &Value) -> ApiError {
    ApiError::UnexpectedShape(format!("expected a {key:?} wrapper, got {resp}"))
}

/// The backend spells booleans several ways depending on the endpoint.
pub fn parse_flag(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Some(true),
        "no" | "false" | "f" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn parse_challenge(header: &str) -> Option<HashMap<String, String>> {
    let params = header.strip_prefix("Digest ")?;
    let mut fields = HashMap::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after_eq) = rest.split_once('=')?;
        let after_eq = after_eq.trim_start();
        // Quoted values may contain commas (qop="auth,auth-int")
        let (value, remainder) = if let Some(stripped) = after_eq.strip_prefix('"') {
            let end = stripped.find('"')?;
            (&stripped[..end], &stripped[end + 1..])
        } else {
            match after_eq.find(',') {
                Some(pos) => (&after_eq[..pos], &after_eq[pos..]),
                None => (after_eq, ""),
            }
        };
        fields.insert(key.trim().to_owned(), value.trim().to_owned());
        rest = remainder.trim_start().trim_start_matches(',').trim_start();
    }
    Some(fields)
}

/// Build an `Authorization` header for an RFC 2617 MD5 digest challenge.
fn digest_authorization(
    creds: &DigestCredentials,
    method: &str,
    uri: &str,
    challenge: &str,
) -> ApiResult<String> {
    let cnonce = format!("{:016x}", rand::random::<u64>());
    digest_authorization_with(creds, method, uri, challenge, "00000001", &cnonce)
}

fn digest_authorization_with(
    creds: &DigestCredentials,
    method: &str,
    uri: &str,
    challenge: &str,
    nc: &str,
    cnonce: &str,
) -> ApiResult<String> {
    let fields = parse_challenge(challenge)
        .ok_or_else(|| ApiError::Auth(format!("unparsable challenge: {challenge:?}")))?;
    let realm = fields
        .get("realm")
        .ok_or_else(|| ApiError::Auth("challenge missing realm".into()))?;
    let nonce = fields
        .get("nonce")
        .ok_or_else(|| ApiError::Auth("challenge missing nonce".into()))?;
    let qop = fields.get("qop").map(String::as_str);
    if let Some(qop) = qop {
        if !qop.split(',').any(|q| q.trim() == "auth") {
            warn!("unsupported digest qop {qop:?}, attempting qop=auth");
        }
    }

    let ha1 = md5_hex(&format!("{}:{}:{}", creds.user, realm, creds.password));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    let response = match qop {
        Some(_) => md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}")),
        None => md5_hex(&format!("{ha1}:{nonce}:{ha2}")),
    };

    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
        creds.user, realm, nonce, uri, response
    );
    if qop.is_some() {
        header.push_str(&format!(", qop=auth, nc={nc}, cnonce=\"{cnonce}\""));
    }
    if let Some(opaque) = fields.get("opaque") {
        header.push_str(&format!(", opaque=\"{opaque}\""));
    }
    Ok(header)
}

#[cfg(test)]
pub(crate) mod test_support {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    pub(crate) fn json_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    /// Serve one canned response per expected request on a loopback port,
    /// returning the captured raw request texts when done.
    pub(crate) async fn stub_backend(
        responses: Vec<String>,
    ) -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let mut captured = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if request_complete(&buf) {
                        break;
                    }
                }
                captured.push(String::from_utf8_lossy(&buf).into_owned());
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
            captured
        });
        (port, handle)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(end) => end,
            None => return false,
        };
        let headers = String::from_utf8_lossy(&buf[..end]);
        let body_len = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);
        buf.len() >= end + 4 + body_len
    }
}
