//! HTTP implementation of the portal navigator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use url::Url;

use super::listing::parse_listing;
use super::{DownloadTarget, FormMethod, Listing, NavigatorError, PortalNavigator};
use crate::config::PortalConfig;

/// Portal navigator backed by a cookie-keeping HTTP client.
///
/// The portal's download forms are plain HTML forms, so submitting their
/// hidden fields reproduces what a browser would send.
pub struct HttpPortalNavigator {
    client: Client,
    listing_url: Url,
    timeout: Duration,
}

impl HttpPortalNavigator {
    pub fn new(config: &PortalConfig) -> Result<Self, NavigatorError> {
        let listing_url = Url::parse(&config.base_url).map_err(|e| {
            NavigatorError::Request(format!("invalid base url '{}': {}", config.base_url, e))
        })?;

        let timeout = Duration::from_secs(config.timeout_secs);

        // No overall client timeout: downloads are bounded by the download manager
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| NavigatorError::Request(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            listing_url,
            timeout,
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, NavigatorError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(NavigatorError::Http {
            status,
            body: body.chars().take(200).collect::<String>(),
        })
    }
}

/// Encode hidden fields as an `application/x-www-form-urlencoded` body.
pub fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

const PDF_MAGIC: &[u8] = b"%PDF";

/// Check the start of an undeclared body for the PDF signature.
fn sniff_pdf(head: &[u8]) -> Result<(), NavigatorError> {
    if head.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let preview = String::from_utf8_lossy(&head[..head.len().min(200)]).to_string();
    Err(NavigatorError::NotPdf(preview))
}

fn is_pdf_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("application/pdf") || content_type.contains("application/octet-stream")
}

#[async_trait]
impl PortalNavigator for HttpPortalNavigator {
    fn name(&self) -> &str {
        "http"
    }

    async fn discover(&self, max_count: usize) -> Result<Vec<Listing>, NavigatorError> {
        info!(url = %self.listing_url, max_count, "Fetching publication listing");

        let response = self
            .client
            .get(self.listing_url.clone())
            .timeout(self.timeout)
            .send()
            .await?;
        let body = Self::check_status(response).await?.text().await?;

        let listings = parse_listing(&body, &self.listing_url, max_count)?;
        info!(count = listings.len(), "Discovered publications");
        Ok(listings)
    }

    async fn submit_form(
        &self,
        target: &DownloadTarget,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, NavigatorError> {
        let request = match target.method {
            FormMethod::Post => self
                .client
                .post(&target.action_url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(encode_form(&target.fields)),
            FormMethod::Get => {
                let mut url = Url::parse(&target.action_url)
                    .map_err(|e| NavigatorError::Request(e.to_string()))?;
                url.query_pairs_mut()
                    .extend_pairs(target.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                self.client.get(url)
            }
        };

        debug!(identity = %target.identity(), url = %target.action_url, "Submitting download form");
        let mut response = Self::check_status(request.send().await?).await?;

        let declared_pdf = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(is_pdf_content_type)
            .unwrap_or(false);

        // Undeclared bodies are held back until the signature can be checked
        let mut verified = declared_pdf;
        let mut head: Vec<u8> = Vec::new();
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            if !verified {
                head.extend_from_slice(&chunk);
                if head.len() < PDF_MAGIC.len() {
                    continue;
                }
                sniff_pdf(&head)?;
                verified = true;
                sink.write_all(&head).await?;
                written += head.len() as u64;
                head.clear();
                continue;
            }
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        if !head.is_empty() {
            sniff_pdf(&head)?;
        }
        sink.flush().await?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use axum::body::{Body, Bytes};
    use axum::http::{header, StatusCode};
    use axum::response::Response;
    use axum::routing::post;
    use axum::Router;

    fn config(base_url: &str) -> PortalConfig {
        PortalConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            user_agent: "test".to_string(),
        }
    }

    #[test]
    fn test_encode_form() {
        let fields = vec![
            ("FileName".to_string(), r"D:\Journal\Class 1-34.pdf".to_string()),
            ("token".to_string(), "a&b=c".to_string()),
        ];
        assert_eq!(
            encode_form(&fields),
            "FileName=D%3A%5CJournal%5CClass%201-34.pdf&token=a%26b%3Dc"
        );
        assert_eq!(encode_form(&[]), "");
    }

    #[test]
    fn test_pdf_content_types() {
        assert!(is_pdf_content_type("application/pdf"));
        assert!(is_pdf_content_type("Application/PDF; charset=binary"));
        assert!(is_pdf_content_type("application/octet-stream"));
        assert!(!is_pdf_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn test_sniff_pdf() {
        assert!(sniff_pdf(b"%PDF-1.7\n").is_ok());
        assert!(matches!(
            sniff_pdf(b"<html>Session expired</html>"),
            Err(NavigatorError::NotPdf(preview)) if preview.starts_with("<html>")
        ));
        assert!(matches!(sniff_pdf(b"%P"), Err(NavigatorError::NotPdf(_))));
    }

    /// Serve a fixed set of form endpoints on a random local port.
    async fn spawn_portal() -> String {
        let app = Router::new()
            .route(
                "/error",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database offline") }),
            )
            .route(
                "/html",
                post(|| async {
                    (
                        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                        "<html>Session expired</html>",
                    )
                }),
            )
            .route(
                "/bare",
                post(|| async { Response::new(Body::from("%PDF-1.4 bare journal")) }),
            )
            .route(
                "/split",
                post(|| async {
                    let chunks = vec![
                        Ok::<_, std::io::Error>(Bytes::from_static(b"%P")),
                        Ok(Bytes::from_static(b"DF-1.4 split journal")),
                    ];
                    Response::new(Body::from_stream(futures::stream::iter(chunks)))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn submit(base: &str, path: &str) -> (Result<u64, NavigatorError>, Vec<u8>) {
        let navigator = HttpPortalNavigator::new(&config(base)).unwrap();
        let mut target = fixtures::target("2237", "1-34");
        target.action_url = format!("{}{}", base, path);

        let mut sink: Vec<u8> = Vec::new();
        let result = navigator.submit_form(&target, &mut sink).await;
        (result, sink)
    }

    #[tokio::test]
    async fn test_submit_form_error_status() {
        let base = spawn_portal().await;
        let (result, sink) = submit(&base, "/error").await;
        match result {
            Err(NavigatorError::Http { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "database offline");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_submit_form_html_is_not_pdf() {
        let base = spawn_portal().await;
        let (result, sink) = submit(&base, "/html").await;
        assert!(matches!(result, Err(NavigatorError::NotPdf(_))));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_submit_form_sniffs_undeclared_pdf() {
        let base = spawn_portal().await;
        let (result, sink) = submit(&base, "/bare").await;
        assert_eq!(result.unwrap(), 21);
        assert_eq!(sink, b"%PDF-1.4 bare journal");
    }

    #[tokio::test]
    async fn test_submit_form_short_first_chunk() {
        let base = spawn_portal().await;
        let (result, sink) = submit(&base, "/split").await;
        assert_eq!(result.unwrap(), 22);
        assert_eq!(sink, b"%PDF-1.4 split journal");
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        assert!(matches!(
            HttpPortalNavigator::new(&config("not a url")),
            Err(NavigatorError::Request(_))
        ));
        assert!(HttpPortalNavigator::new(&config("https://portal.example/list")).is_ok());
    }

    #[tokio::test]
    async fn test_discover_unreachable_portal_fails() {
        // Port 9 (discard) on localhost is not expected to accept connections
        let navigator = HttpPortalNavigator::new(&config("http://127.0.0.1:9/journals")).unwrap();
        let result = navigator.discover(1).await;
        assert!(matches!(
            result,
            Err(NavigatorError::Connection(_))
                | Err(NavigatorError::Request(_))
                | Err(NavigatorError::Timeout)
        ));
    }
}
