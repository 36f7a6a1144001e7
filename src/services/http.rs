//! HTTP bindings for the Detect and Convert endpoints.
//!
//! ## Wire format
//!
//! ```text
//! GET  {detect_path}?filename=report.docx
//!      → {"detected": "docx", "targets": ["pdf"], "error": null}
//!
//! POST {convert_path}   multipart/form-data
//!      file=<bytes>  target=pdf  csrfmiddlewaretoken=<token>
//!      X-CSRFToken: <token>
//!      → 200 <bytes>  Content-Disposition: attachment; filename="report.pdf"
//!      → 4xx/5xx {"error": "...", "limit_exceeded": true}
//! ```
//!
//! ## Upload progress
//!
//! The file part is streamed in `upload_chunk_size` chunks through
//! [`ProgressBody`], which reports bytes handed to the transport and signals
//! completion when the body is exhausted. The total is always known because
//! the whole file is held in memory.

use crate::config::ClientConfig;
use crate::error::{FileconvError, ServiceError};
use crate::services::{
    ConvertReply, ConvertRequest, ConvertService, DetectService, Detection, UploadProgress,
};
use async_trait::async_trait;
use futures::Stream;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the cookie the server uses to hand out its anti-forgery token.
const CSRF_COOKIE: &str = "csrftoken";

/// Detect + Convert over HTTP with a shared client and cookie jar.
pub struct HttpServices {
    client: reqwest::Client,
    jar: Arc<Jar>,
    detect_url: Url,
    convert_url: Url,
    csrf_token: Option<String>,
    detect_timeout: Duration,
    convert_timeout: Duration,
    chunk_size: usize,
}

impl HttpServices {
    /// Build the bindings from a validated [`ClientConfig`].
    pub fn new(config: &ClientConfig) -> Result<Self, FileconvError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| FileconvError::HttpClient(e.to_string()))?;

        let detect_url = parse_url(&config.detect_url())?;
        let convert_url = parse_url(&config.convert_url())?;

        Ok(Self {
            client,
            jar,
            detect_url,
            convert_url,
            csrf_token: config.csrf_token.clone(),
            detect_timeout: Duration::from_secs(config.detect_timeout_secs),
            convert_timeout: Duration::from_secs(config.convert_timeout_secs),
            chunk_size: config.upload_chunk_size,
        })
    }

    /// Configured token, else the one the server set as a cookie.
    fn csrf_token(&self) -> Option<String> {
        if let Some(ref token) = self.csrf_token {
            return Some(token.clone());
        }
        let header = self.jar.cookies(&self.convert_url)?;
        let header = header.to_str().ok()?;
        cookie_value(header, CSRF_COOKIE)
    }
}

fn parse_url(s: &str) -> Result<Url, FileconvError> {
    Url::parse(s).map_err(|e| FileconvError::InvalidConfig(format!("invalid URL '{s}': {e}")))
}

#[async_trait]
impl DetectService for HttpServices {
    async fn detect(&self, filename: &str) -> Result<Detection, ServiceError> {
        debug!("Detecting format of '{}'", filename);

        let response = self
            .client
            .get(self.detect_url.clone())
            .query(&[("filename", filename)])
            .timeout(self.detect_timeout)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(network_error)?;
        decode_detection(status, &body)
    }
}

#[async_trait]
impl ConvertService for HttpServices {
    async fn convert(
        &self,
        request: ConvertRequest,
        progress: Arc<dyn UploadProgress>,
    ) -> Result<ConvertReply, ServiceError> {
        let token = self.csrf_token().unwrap_or_else(|| {
            warn!("No CSRF token configured or received; the server may reject the upload");
            String::new()
        });

        let total = request.file.len() as u64;
        info!(
            "Uploading '{}' ({} bytes) for conversion to {}",
            request.file.name(),
            total,
            request.target
        );

        let body = ProgressBody::new(request.file.shared_bytes(), self.chunk_size, progress);
        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(request.file.name().to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ServiceError::Network {
                reason: format!("invalid multipart part: {e}"),
            })?;

        let form = Form::new()
            .text("target", request.target.clone())
            .text("csrfmiddlewaretoken", token.clone())
            .part("file", part);

        let mut builder = self
            .client
            .post(self.convert_url.clone())
            .multipart(form)
            .timeout(self.convert_timeout);
        if !token.is_empty() {
            builder = builder.header("X-CSRFToken", token);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(network_error)?;

        if status.is_client_error() || status.is_server_error() {
            return Err(decode_failure(status.as_u16(), &bytes));
        }

        debug!("Conversion returned {} bytes (HTTP {})", bytes.len(), status);
        Ok(ConvertReply {
            bytes: bytes.to_vec(),
            content_disposition,
        })
    }
}

fn network_error(e: reqwest::Error) -> ServiceError {
    let reason = if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    ServiceError::Network { reason }
}

/// Decode a Detect response body. The endpoint answers JSON on both success
/// and failure, so the status only matters when the body is not JSON.
pub(crate) fn decode_detection(status: u16, body: &[u8]) -> Result<Detection, ServiceError> {
    serde_json::from_slice::<Detection>(body).map_err(|e| {
        if status >= 400 {
            ServiceError::Rejected {
                status,
                message: None,
                limit_exceeded: false,
            }
        } else {
            ServiceError::Malformed {
                detail: e.to_string(),
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct FailureBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    limit_exceeded: Option<bool>,
}

/// Decode a Convert failure body. An undecodable body still yields a
/// rejection, just without a message.
pub(crate) fn decode_failure(status: u16, body: &[u8]) -> ServiceError {
    match serde_json::from_slice::<FailureBody>(body) {
        Ok(failure) => ServiceError::Rejected {
            status,
            message: failure.error,
            limit_exceeded: failure.limit_exceeded.unwrap_or(false),
        },
        Err(e) => {
            debug!("Undecodable failure body (HTTP {}): {}", status, e);
            ServiceError::Rejected {
                status,
                message: None,
                limit_exceeded: false,
            }
        }
    }
}

/// Extract one cookie from a `Cookie:` header value.
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Chunked request body that reports upload progress as it is consumed.
pub(crate) struct ProgressBody {
    data: Arc<[u8]>,
    offset: usize,
    chunk_size: usize,
    progress: Arc<dyn UploadProgress>,
    finished: bool,
}

impl ProgressBody {
    pub(crate) fn new(data: Arc<[u8]>, chunk_size: usize, progress: Arc<dyn UploadProgress>) -> Self {
        Self {
            data,
            offset: 0,
            chunk_size: chunk_size.max(1),
            progress,
            finished: false,
        }
    }
}

impl Stream for ProgressBody {
    type Item = Result<Vec<u8>, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let total = self.data.len();
        if self.offset < total {
            let end = (self.offset + self.chunk_size).min(total);
            let chunk = self.data[self.offset..end].to_vec();
            self.offset = end;
            self.progress.on_progress(end as u64, Some(total as u64));
            return Poll::Ready(Some(Ok(chunk)));
        }
        if !self.finished {
            self.finished = true;
            self.progress.on_complete();
        }
        Poll::Ready(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        reports: Mutex<Vec<(u64, Option<u64>)>>,
        completions: Mutex<usize>,
    }

    impl UploadProgress for Recorder {
        fn on_progress(&self, sent: u64, total: Option<u64>) {
            self.reports.lock().unwrap().push((sent, total));
        }

        fn on_complete(&self) {
            *self.completions.lock().unwrap() += 1;
        }
    }

    #[test]
    fn progress_body_reports_each_chunk_then_completes_once() {
        let recorder = Arc::new(Recorder::default());
        let data: Arc<[u8]> = Arc::from(vec![7u8; 10]);
        let mut body = ProgressBody::new(data, 4, recorder.clone() as Arc<dyn UploadProgress>);

        let chunks: Vec<Vec<u8>> = tokio_test::block_on(async {
            let mut out = Vec::new();
            while let Some(chunk) = body.next().await {
                out.push(chunk.unwrap());
            }
            // Polling past the end must not complete twice.
            assert!(body.next().await.is_none());
            out
        });

        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(
            *recorder.reports.lock().unwrap(),
            vec![(4, Some(10)), (8, Some(10)), (10, Some(10))]
        );
        assert_eq!(*recorder.completions.lock().unwrap(), 1);
    }

    #[test]
    fn empty_body_completes_immediately() {
        let recorder = Arc::new(Recorder::default());
        let mut body = ProgressBody::new(
            Arc::from(Vec::<u8>::new()),
            1024,
            recorder.clone() as Arc<dyn UploadProgress>,
        );
        assert!(tokio_test::block_on(body.next()).is_none());
        assert!(recorder.reports.lock().unwrap().is_empty());
        assert_eq!(*recorder.completions.lock().unwrap(), 1);
    }

    #[test]
    fn failure_body_with_limit_flag() {
        let err = decode_failure(
            400,
            br#"{"error": "Monthly quota used up", "limit_exceeded": true}"#,
        );
        assert_eq!(
            err,
            ServiceError::Rejected {
                status: 400,
                message: Some("Monthly quota used up".into()),
                limit_exceeded: true,
            }
        );
    }

    #[test]
    fn failure_body_without_flag_or_json() {
        assert_eq!(
            decode_failure(400, br#"{"error": "Conversion from bmp to pdf is not supported"}"#),
            ServiceError::Rejected {
                status: 400,
                message: Some("Conversion from bmp to pdf is not supported".into()),
                limit_exceeded: false,
            }
        );
        assert_eq!(
            decode_failure(502, b"<html>Bad Gateway</html>"),
            ServiceError::Rejected {
                status: 502,
                message: None,
                limit_exceeded: false,
            }
        );
        assert_eq!(
            decode_failure(400, br#"{"error": "x", "limit_exceeded": null}"#),
            ServiceError::Rejected {
                status: 400,
                message: Some("x".into()),
                limit_exceeded: false,
            }
        );
    }

    #[test]
    fn detection_body_decoding() {
        let ok = decode_detection(200, br#"{"detected": "jpg", "targets": ["png", "webp"], "error": null}"#)
            .unwrap();
        assert_eq!(ok, Detection::found("jpg", vec!["png".into(), "webp".into()]));

        let rejected = decode_detection(400, br#"{"error": "No filename given"}"#).unwrap();
        assert_eq!(rejected.error.as_deref(), Some("No filename given"));

        assert!(matches!(
            decode_detection(200, b"not json"),
            Err(ServiceError::Malformed { .. })
        ));
        assert!(matches!(
            decode_detection(500, b"oops"),
            Err(ServiceError::Rejected { status: 500, .. })
        ));
    }

    #[test]
    fn csrf_cookie_lookup() {
        assert_eq!(
            cookie_value("sessionid=abc; csrftoken=tok123", CSRF_COOKIE),
            Some("tok123".to_string())
        );
        assert_eq!(cookie_value("sessionid=abc", CSRF_COOKIE), None);
    }

    #[test]
    fn configured_token_wins_over_cookie() {
        let config = ClientConfig::builder().csrf_token("from-page").build().unwrap();
        let services = HttpServices::new(&config).unwrap();
        assert_eq!(services.csrf_token().as_deref(), Some("from-page"));
    }

    #[test]
    fn token_read_from_cookie_jar() {
        let config = ClientConfig::builder()
            .base_url("http://converter.test")
            .build()
            .unwrap();
        let services = HttpServices::new(&config).unwrap();
        assert_eq!(services.csrf_token(), None);

        let url = Url::parse("http://converter.test/api/detect/").unwrap();
        services.jar.add_cookie_str("csrftoken=jar-token; Path=/", &url);
        assert_eq!(services.csrf_token().as_deref(), Some("jar-token"));
    }
}
