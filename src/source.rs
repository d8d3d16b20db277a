use futures_util::StreamExt;

use crate::error::{Result, ViewerError};
use crate::util::expand_tilde;

/// Where a piece of generated content lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentSource {
    File(String),
    Url(url::Url),
}

impl ContentSource {
    /// `http(s)://` inputs are fetched, everything else is treated as a path.
    pub fn parse(input: &str) -> Self {
        match url::Url::parse(input) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Self::Url(url),
            _ => Self::File(expand_tilde(input)),
        }
    }

    /// Read the markup, refusing anything larger than `max_bytes`.
    pub async fn load(&self, max_bytes: u64) -> Result<String> {
        match self {
            Self::File(path) => {
                let size = tokio::fs::metadata(path).await?.len();
                if size > max_bytes {
                    return Err(ViewerError::ContentTooLarge {
                        size,
                        limit: max_bytes,
                    });
                }
                Ok(tokio::fs::read_to_string(path).await?)
            }
            Self::Url(url) => fetch(url, max_bytes).await,
        }
    }
}

async fn fetch(url: &url::Url, max_bytes: u64) -> Result<String> {
    let client = reqwest::Client::new();
    let response = client
        .get(url.as_str())
        .header("User-Agent", concat!("isoview/", env!("CARGO_PKG_VERSION")))
        .header("Accept", "text/html, */*")
        .send()
        .await?
        .error_for_status()?;

    if let Some(size) = response.content_length() {
        if size > max_bytes {
            return Err(ViewerError::ContentTooLarge {
                size,
                limit: max_bytes,
            });
        }
    }

    // The declared length can be missing or wrong, so count while streaming too.
    let mut body: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let size = (body.len() + chunk.len()) as u64;
        if size > max_bytes {
            return Err(ViewerError::ContentTooLarge {
                size,
                limit: max_bytes,
            });
        }
        body.extend_from_slice(&chunk);
    }

    log::debug!("fetched {} bytes from {url}", body.len());
    Ok(String::from_utf8_lossy(&body).into_owned())
}
