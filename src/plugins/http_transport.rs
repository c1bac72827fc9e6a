//! HTTP Transport - uploads artifacts to Maven-layout HTTP repositories
//!
//! Each payload is `PUT` to `{endpoint}/{path}`. Responses are classified so
//! the publisher knows what may be retried:
//!
//! | Response                         | Outcome            |
//! |----------------------------------|--------------------|
//! | 2xx                              | `Accepted`         |
//! | 408, 429, 5xx                    | `TransientFailure` |
//! | other 4xx / 3xx                  | `Rejected`         |
//! | timeout, connect or reset error  | `TransientFailure` |

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use std::time::Duration;

use crate::core::error::ReleaseError;
use crate::core::hash::parse_checksum_sidecar;
use crate::core::traits::{Credential, Payload, Transport, UploadOutcome};

/// Default per-request timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Transport for HTTP(S) repositories
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ReleaseError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("artifact-publisher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReleaseError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Full URL of a repository path
    pub fn url(endpoint: &str, path: &str) -> String {
        format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Basic auth when a username is configured, bearer token otherwise
    fn apply_auth(request: RequestBuilder, credential: Option<&Credential>) -> RequestBuilder {
        match credential {
            Some(Credential {
                username: Some(user),
                secret,
            }) => request.basic_auth(user, Some(secret.expose_secret())),
            Some(Credential {
                username: None,
                secret,
            }) => request.bearer_auth(secret.expose_secret()),
            None => request,
        }
    }

    pub fn classify_status(status: StatusCode) -> UploadOutcome {
        if status.is_success() {
            UploadOutcome::Accepted
        } else if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            UploadOutcome::TransientFailure(format!("HTTP {}", status))
        } else {
            UploadOutcome::Rejected(format!("HTTP {}", status))
        }
    }

    fn classify_error(error: &reqwest::Error) -> UploadOutcome {
        if error.is_builder() {
            UploadOutcome::Rejected(format!("invalid request: {}", error))
        } else {
            // timeouts, refused or reset connections, truncated bodies
            UploadOutcome::TransientFailure(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn upload(
        &self,
        endpoint: &str,
        payload: &Payload,
        credential: Option<&Credential>,
    ) -> UploadOutcome {
        let url = Self::url(endpoint, &payload.path);
        let request = Self::apply_auth(self.client.put(&url), credential).body(payload.bytes.clone());

        match request.send().await {
            Ok(response) => {
                let outcome = Self::classify_status(response.status());
                tracing::debug!(%url, status = %response.status(), "upload response");
                outcome
            }
            Err(e) => Self::classify_error(&e),
        }
    }

    async fn remote_checksum(
        &self,
        endpoint: &str,
        path: &str,
        credential: Option<&Credential>,
    ) -> Result<Option<String>, ReleaseError> {
        let url = format!("{}.sha256", Self::url(endpoint, path));
        let response = Self::apply_auth(self.client.get(&url), credential)
            .send()
            .await
            .map_err(|e| ReleaseError::TransientFailure {
                target: endpoint.to_string(),
                message: format!("checksum request to {} failed: {}", url, e),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::classify_status(status).into_result(endpoint)?;

        let body = response.text().await.map_err(|e| ReleaseError::TransientFailure {
            target: endpoint.to_string(),
            message: format!("failed to read {}: {}", url, e),
        })?;
        Ok(parse_checksum_sidecar(&body))
    }

    async fn exists(
        &self,
        endpoint: &str,
        path: &str,
        credential: Option<&Credential>,
    ) -> Result<bool, ReleaseError> {
        let url = Self::url(endpoint, path);
        let response = Self::apply_auth(self.client.head(&url), credential)
            .send()
            .await
            .map_err(|e| ReleaseError::TransientFailure {
                target: endpoint.to_string(),
                message: format!("HEAD {} failed: {}", url, e),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::classify_status(status).into_result(endpoint)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Read one request, returning its head once the body has arrived
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];

        let head_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&request[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        while request.len() < head_end + content_length {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
        }
        head
    }

    async fn respond(socket: &mut TcpStream, status_line: &str, body: &str) {
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    }

    /// Serve a single request with the given status line, returning the raw request head
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let head = read_request(&mut socket).await;
            respond(&mut socket, status_line, body).await;
            head
        });

        (endpoint, handle)
    }

    /// Deploy-only repository: reads are refused, `PUT`s accepted
    ///
    /// Serves `requests` requests and returns their request lines.
    async fn serve_deploy_only(requests: usize) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut lines = Vec::new();
            for _ in 0..requests {
                let (mut socket, _) = listener.accept().await.unwrap();
                let head = read_request(&mut socket).await;
                let line = head.lines().next().unwrap_or_default().to_string();
                if line.starts_with("PUT ") {
                    respond(&mut socket, "201 Created", "").await;
                } else {
                    respond(&mut socket, "405 Method Not Allowed", "").await;
                }
                lines.push(line);
            }
            lines
        });

        (endpoint, handle)
    }

    fn payload() -> Payload {
        Payload {
            path: "io/example/core/1.0.0/core-1.0.0.jar".to_string(),
            bytes: b"jar".to_vec(),
        }
    }

    #[test]
    fn test_url_joining() {
        assert_eq!(
            HttpTransport::url("https://repo.example.com/releases/", "/io/x/1.0/x-1.0.jar"),
            "https://repo.example.com/releases/io/x/1.0/x-1.0.jar"
        );
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(HttpTransport::classify_status(StatusCode::CREATED), UploadOutcome::Accepted);
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::SERVICE_UNAVAILABLE),
            UploadOutcome::TransientFailure(_)
        ));
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::TOO_MANY_REQUESTS),
            UploadOutcome::TransientFailure(_)
        ));
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::REQUEST_TIMEOUT),
            UploadOutcome::TransientFailure(_)
        ));
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::UNAUTHORIZED),
            UploadOutcome::Rejected(_)
        ));
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::CONFLICT),
            UploadOutcome::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_upload_put_with_basic_auth() {
        let (endpoint, server) = serve_once("201 Created", "").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let credential = Credential {
            username: Some("deployer".to_string()),
            secret: SecretString::from("pw".to_string()),
        };

        let outcome = transport.upload(&endpoint, &payload(), Some(&credential)).await;
        assert_eq!(outcome, UploadOutcome::Accepted);

        let head = server.await.unwrap();
        assert!(head.starts_with("PUT /io/example/core/1.0.0/core-1.0.0.jar HTTP/1.1"));
        // base64("deployer:pw")
        assert!(head.contains("ZGVwbG95ZXI6cHc="));
    }

    #[tokio::test]
    async fn test_upload_server_error_is_transient() {
        let (endpoint, server) = serve_once("503 Service Unavailable", "").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let outcome = transport.upload(&endpoint, &payload(), None).await;
        assert!(matches!(outcome, UploadOutcome::TransientFailure(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let outcome = transport.upload(&endpoint, &payload(), None).await;
        assert!(matches!(outcome, UploadOutcome::TransientFailure(_)));
    }

    #[tokio::test]
    async fn test_remote_checksum_reads_sidecar() {
        let (endpoint, server) = serve_once("200 OK", "ABC123  core-1.0.0.jar").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let checksum = transport
            .remote_checksum(&endpoint, &payload().path, None)
            .await
            .unwrap();
        assert_eq!(checksum.as_deref(), Some("abc123"));

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /io/example/core/1.0.0/core-1.0.0.jar.sha256 "));
    }

    #[tokio::test]
    async fn test_remote_checksum_not_found() {
        let (endpoint, server) = serve_once("404 Not Found", "").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let checksum = transport
            .remote_checksum(&endpoint, &payload().path, None)
            .await
            .unwrap();
        assert!(checksum.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_exists_uses_head() {
        let (endpoint, server) = serve_once("200 OK", "").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let path = format!("{}.asc", payload().path);
        assert!(transport.exists(&endpoint, &path, None).await.unwrap());

        let head = server.await.unwrap();
        assert!(head.starts_with("HEAD /io/example/core/1.0.0/core-1.0.0.jar.asc "));
    }

    #[tokio::test]
    async fn test_refused_checksum_read_is_rejected() {
        let (endpoint, server) = serve_once("405 Method Not Allowed", "").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let err = transport
            .remote_checksum(&endpoint, &payload().path, None)
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_to_deploy_only_repository() {
        use crate::core::hash::sha256_hex;
        use crate::core::model::{
            Artifact, Classifier, ContentHandle, Module, ModuleKind, PublishTarget, SigningResult,
        };
        use crate::orchestration::{PublishOptions, RepositoryPublisher};

        // checksum GET, payload PUT, sidecar PUT, verification GET
        let (endpoint, server) = serve_deploy_only(4).await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let artifact = Artifact {
            classifier: Classifier::Primary,
            extension: "jar".to_string(),
            file_name: "core-1.0.0.jar".to_string(),
            content: ContentHandle::from_bytes(b"jar".to_vec()),
            content_hash: sha256_hex(b"jar"),
            size: 3,
        };
        let module = Module {
            name: "core".to_string(),
            version: "1.0.0".to_string(),
            group: "io.example".to_string(),
            kind: ModuleKind::Library,
            artifacts: vec![artifact.clone()],
        };
        let group = vec![(artifact, SigningResult::skipped("core-1.0.0.jar"))];
        let target = PublishTarget::new("staging", &endpoint);

        let outcome = RepositoryPublisher::new(PublishOptions::default())
            .publish(&module, &group, &target, &transport, None)
            .await;

        assert!(outcome.is_success(), "{:?}", outcome.failure);
        assert_eq!(outcome.uploaded, 1);
        let lines = server.await.unwrap();
        let puts: Vec<&String> = lines.iter().filter(|line| line.starts_with("PUT ")).collect();
        assert_eq!(puts.len(), 2);
    }
}
