// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Image sources feeding the slideshow.
//!
//! Either a remote image service answering each GET with a new image, or a
//! local directory cycled in name order.

use std::path::{Path, PathBuf};

use ambience_core::{SourceConfig, SourceKind};
use thiserror::Error;

/// Response header carrying the image metadata string.
pub const METADATA_HEADER: &str = "x-ambience-metadata";

/// Response header carrying the standalone QR payload.
pub const QR_HEADER: &str = "x-ambience-qr";

/// One image as delivered by a source.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    /// Free-form metadata, usually a JSON object.
    pub metadata: Option<String>,
    /// Standalone QR payload, only when requested from the service.
    pub qr: Option<Vec<u8>>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Invalid image service URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image service returned status {status}")]
    Status { status: u16 },

    #[error("Image source returned an empty image")]
    EmptyImage,

    #[error("No image files in {path}")]
    EmptyDirectory { path: PathBuf },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configured image source.
pub enum ImageSource {
    Http(HttpSource),
    Directory(DirectorySource),
}

impl ImageSource {
    pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
        match &config.kind {
            SourceKind::Http { url } => Ok(Self::Http(HttpSource::new(url, config)?)),
            SourceKind::Directory { path } => Ok(Self::Directory(DirectorySource::new(path))),
        }
    }

    /// Fetch the next slide.
    pub async fn next_image(&mut self) -> Result<FetchedImage, SourceError> {
        let image = match self {
            Self::Http(source) => source.next_image().await?,
            Self::Directory(source) => source.next_image().await?,
        };
        if image.bytes.is_empty() {
            return Err(SourceError::EmptyImage);
        }
        Ok(image)
    }
}

/// Remote image service.
pub struct HttpSource {
    client: reqwest::Client,
    url: reqwest::Url,
    request_metadata: bool,
    request_standalone_qr: bool,
}

impl HttpSource {
    pub fn new(url: &str, config: &SourceConfig) -> Result<Self, SourceError> {
        let params = [
            ("width", config.target_width.to_string()),
            ("height", config.target_height.to_string()),
            ("client_id", config.client_id.clone()),
            ("metadata", config.request_metadata.to_string()),
            ("embed_qr", config.embed_qr.to_string()),
            ("standalone_qr", config.request_standalone_qr.to_string()),
        ];
        let url = reqwest::Url::parse_with_params(url, &params).map_err(|e| SourceError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            request_metadata: config.request_metadata,
            request_standalone_qr: config.request_standalone_qr,
        })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    async fn next_image(&mut self) -> Result<FetchedImage, SourceError> {
        let response = self.client.get(self.url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
            });
        }

        let headers = response.headers();
        let metadata = if self.request_metadata {
            headers
                .get(METADATA_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        } else {
            None
        };
        let qr = if self.request_standalone_qr {
            headers
                .get(QR_HEADER)
                .map(|v| v.as_bytes().to_vec())
                .filter(|qr| !qr.is_empty())
        } else {
            None
        };

        let bytes = response.bytes().await?.to_vec();
        Ok(FetchedImage { bytes, metadata, qr })
    }
}

/// Local directory slideshow.
pub struct DirectorySource {
    dir: PathBuf,
    /// Index of the next slide. The listing is re-read every time, so files
    /// may be added or removed while running.
    cursor: usize,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cursor: 0,
        }
    }

    async fn next_image(&mut self) -> Result<FetchedImage, SourceError> {
        let files = list_files(&self.dir)?;
        if files.is_empty() {
            return Err(SourceError::EmptyDirectory {
                path: self.dir.clone(),
            });
        }

        let path = &files[self.cursor % files.len()];
        self.cursor = self.cursor.wrapping_add(1);

        let bytes = tokio::fs::read(path).await.map_err(|e| SourceError::Io {
            path: path.clone(),
            source: e,
        })?;
        let metadata = serde_json::json!({ "local_path": path.display().to_string() }).to_string();

        Ok(FetchedImage {
            bytes,
            metadata: Some(metadata),
            qr: None,
        })
    }
}

/// Regular, non-hidden files of `dir`, sorted by name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SourceError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .collect();
    files.sort();
    Ok(files)
}

/// Short description of image metadata for the log.
///
/// JSON metadata is reduced to its `local_path`; anything else is returned
/// as is.
pub fn describe_metadata(metadata: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(metadata) {
        Ok(value) => match value.get("local_path").and_then(|v| v.as_str()) {
            Some(path) => path.to_string(),
            None => format!("unknown file {}", metadata),
        },
        Err(_) => metadata.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_config(kind: SourceKind) -> SourceConfig {
        SourceConfig {
            kind,
            client_id: "ambience_test".to_string(),
            target_width: 640,
            target_height: 480,
            embed_qr: false,
            request_standalone_qr: true,
            request_metadata: true,
        }
    }

    #[tokio::test]
    async fn test_directory_source_cycles_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"second").unwrap();
        std::fs::write(dir.path().join("a.png"), b"first").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"skip").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let config = source_config(SourceKind::Directory {
            path: dir.path().to_path_buf(),
        });
        let mut source = ImageSource::from_config(&config).unwrap();

        let first = source.next_image().await.unwrap();
        assert_eq!(first.bytes, b"first");
        assert!(describe_metadata(first.metadata.as_deref().unwrap()).ends_with("a.png"));

        assert_eq!(source.next_image().await.unwrap().bytes, b"second");
        assert_eq!(source.next_image().await.unwrap().bytes, b"first");
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = DirectorySource::new(dir.path());
        assert!(matches!(
            source.next_image().await,
            Err(SourceError::EmptyDirectory { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zero.png"), b"").unwrap();
        let mut source = ImageSource::Directory(DirectorySource::new(dir.path()));
        assert!(matches!(source.next_image().await, Err(SourceError::EmptyImage)));
    }

    #[test]
    fn test_http_url_carries_request_parameters() {
        let config = source_config(SourceKind::Http {
            url: "http://bati.casa:5000/next".to_string(),
        });
        let source = HttpSource::new("http://bati.casa:5000/next", &config).unwrap();
        let query = source.url().query().unwrap();
        assert!(query.contains("width=640"));
        assert!(query.contains("height=480"));
        assert!(query.contains("client_id=ambience_test"));
        assert!(query.contains("embed_qr=false"));
        assert!(query.contains("standalone_qr=true"));
    }

    /// Serve one canned HTTP response and hand back the request line.
    async fn serve_once(response: Vec<u8>) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/next", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(&response).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).lines().next().unwrap_or_default().to_string()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_http_source_reads_metadata_and_qr() {
        let body = b"\x89PNG\r\n\x1a\nimage";
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}: {{\"local_path\": \"/a.png\"}}\r\n{}: https://bati.casa/p/42\r\nConnection: close\r\n\r\n",
            body.len(),
            METADATA_HEADER,
            QR_HEADER,
        )
        .into_bytes();
        response.extend_from_slice(body);

        let (url, server) = serve_once(response).await;
        let config = source_config(SourceKind::Http { url: url.clone() });
        let mut source = ImageSource::from_config(&config).unwrap();

        let image = source.next_image().await.unwrap();
        assert_eq!(image.bytes, body);
        assert_eq!(describe_metadata(image.metadata.as_deref().unwrap()), "/a.png");
        assert_eq!(image.qr.as_deref(), Some(&b"https://bati.casa/p/42"[..]));

        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /next?"));
        assert!(request_line.contains("standalone_qr=true"));
    }

    #[tokio::test]
    async fn test_http_source_ignores_unrequested_qr() {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: 3\r\n{}: payload\r\nConnection: close\r\n\r\njpg",
            QR_HEADER
        )
        .into_bytes();

        let (url, server) = serve_once(response).await;
        let mut config = source_config(SourceKind::Http { url: url.clone() });
        config.request_standalone_qr = false;
        let mut source = ImageSource::from_config(&config).unwrap();

        let image = source.next_image().await.unwrap();
        assert_eq!(image.bytes, b"jpg");
        assert!(image.qr.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let response = b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec();
        let (url, server) = serve_once(response).await;
        let config = source_config(SourceKind::Http { url: url.clone() });
        let mut source = ImageSource::from_config(&config).unwrap();

        assert!(matches!(
            source.next_image().await,
            Err(SourceError::Status { status: 503 })
        ));
        server.await.unwrap();
    }

    #[test]
    fn test_http_invalid_url() {
        let config = source_config(SourceKind::Http {
            url: "not a url".to_string(),
        });
        assert!(matches!(
            ImageSource::from_config(&config),
            Err(SourceError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_describe_metadata() {
        assert_eq!(describe_metadata(r#"{"local_path": "/photos/x.jpg"}"#), "/photos/x.jpg");
        assert_eq!(describe_metadata(r#"{"albumname": "trip"}"#), r#"unknown file {"albumname": "trip"}"#);
        assert_eq!(describe_metadata("plain text"), "plain text");
    }
}
