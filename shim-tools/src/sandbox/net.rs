//! Network access over hyper and rustls.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;
use webpki_roots::TLS_SERVER_ROOTS;

use super::{AccessError, AccessResult};

type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl HttpRequest {
    /// Creates a request with an empty body.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Creates a request from its parts rather than a full URL.
    ///
    /// `scheme` defaults to `http`, the port is omitted when `None`, and
    /// `path` defaults to `/`.
    #[must_use]
    pub fn to_host(
        method: impl Into<String>,
        scheme: Option<&str>,
        host: &str,
        port: Option<u16>,
        path: Option<&str>,
    ) -> Self {
        let scheme = scheme.unwrap_or("http").trim_end_matches(':');
        let path = path.unwrap_or("/");
        let url = match port {
            Some(port) => format!("{scheme}://{host}:{port}{path}"),
            None => format!("{scheme}://{host}{path}"),
        };
        Self::new(method, url)
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and content type.
    #[must_use]
    pub fn with_json(self, body: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    /// Method, upper-cased as reported in violation messages.
    #[must_use]
    pub fn method(&self) -> String {
        self.method.to_ascii_uppercase()
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request headers in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Response to an [`HttpRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl HttpResponse {
    /// Status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers with valid UTF-8 values.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body deserialised from JSON.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Descriptor used when guarding raw socket connections.
#[must_use]
pub fn socket_descriptor(host: &str, port: u16) -> String {
    format!("socket://{host}:{port}")
}

/// Network operations available to tool code.
#[async_trait]
pub trait NetworkDialer: Send + Sync {
    /// Sends an HTTP or HTTPS request and buffers the response.
    ///
    /// # Errors
    ///
    /// Returns a violation when network access is denied, or the transport
    /// error.
    async fn request(&self, request: HttpRequest) -> AccessResult<HttpResponse>;

    /// Sends a `GET` request.
    ///
    /// # Errors
    ///
    /// See [`NetworkDialer::request`].
    async fn get(&self, url: &str) -> AccessResult<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }

    /// Opens a raw TCP connection.
    ///
    /// # Errors
    ///
    /// Returns a violation when network access is denied, or the connect
    /// error.
    async fn connect(&self, host: &str, port: u16) -> AccessResult<TcpStream>;

    /// Opens a TLS connection verified against the bundled web roots.
    ///
    /// # Errors
    ///
    /// Returns a violation when network access is denied, or the connect or
    /// handshake error.
    async fn connect_tls(&self, host: &str, port: u16) -> AccessResult<TlsStream<TcpStream>>;
}

/// Unguarded network access.
#[derive(Clone)]
pub struct NativeNet {
    client: HyperClient,
    tls: Arc<ClientConfig>,
}

impl std::fmt::Debug for NativeNet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeNet").finish_non_exhaustive()
    }
}

impl Default for NativeNet {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeNet {
    /// Builds an HTTPS-capable client trusting the webpki roots.
    #[must_use]
    pub fn new() -> Self {
        let tls = Arc::new(tls_config());
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let connector = HttpsConnector::from((http, Arc::clone(&tls)));

        Self {
            client: Client::builder().build::<_, Body>(connector),
            tls,
        }
    }
}

fn tls_config() -> ClientConfig {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

#[async_trait]
impl NetworkDialer for NativeNet {
    async fn request(&self, request: HttpRequest) -> AccessResult<HttpResponse> {
        let method = Method::from_bytes(request.method().as_bytes())
            .map_err(|_| AccessError::invalid(format!("unsupported method `{}`", request.method)))?;

        let mut builder = Request::builder().method(method).uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let outbound = builder
            .body(Body::from(request.body.clone()))
            .map_err(|err| AccessError::invalid(err.to_string()))?;

        debug!(url = %request.url, method = %request.method(), "sending http request");
        let response = self.client.request(outbound).await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();
        let body = hyper::body::to_bytes(response.into_body()).await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn connect(&self, host: &str, port: u16) -> AccessResult<TcpStream> {
        Ok(TcpStream::connect((host, port)).await?)
    }

    async fn connect_tls(&self, host: &str, port: u16) -> AccessResult<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(host)
            .map_err(|_| AccessError::invalid(format!("invalid server name `{host}`")))?;
        let tcp = TcpStream::connect((host, port)).await?;
        let stream = TlsConnector::from(Arc::clone(&self.tls))
            .connect(server_name, tcp)
            .await?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_from_parts_builds_url() {
        let request = HttpRequest::to_host("post", Some("https:"), "api.example.com", Some(8443), Some("/v1"));
        assert_eq!(request.url(), "https://api.example.com:8443/v1");
        assert_eq!(request.method(), "POST");

        let request = HttpRequest::to_host("GET", None, "example.com", None, None);
        assert_eq!(request.url(), "http://example.com/");
    }

    #[test]
    fn json_body_sets_content_type() {
        let request = HttpRequest::new("PUT", "http://localhost/")
            .with_json(&serde_json::json!({ "a": 1 }));
        assert_eq!(request.headers(), [("content-type".to_owned(), "application/json".to_owned())]);
        assert_eq!(request.body().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn socket_descriptor_format() {
        assert_eq!(socket_descriptor("db.internal", 5432), "socket://db.internal:5432");
    }

    #[tokio::test]
    async fn native_connect_reaches_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        NativeNet::new().connect("127.0.0.1", port).await.unwrap();
        accept.await.unwrap().unwrap();
    }
}
