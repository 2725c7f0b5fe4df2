//! Truth-set download.
//!
//! Each file is streamed into `<name>.part` next to its destination and
//! renamed once complete, so an interrupted download never leaves a
//! truncated file under the final name.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::error::{SzError, SzResult, TransportError};

/// Downloads files from a common URL prefix.
#[derive(Debug, Clone)]
pub struct TruthSetDownloader {
    client: reqwest::Client,
    url_prefix: String,
}

fn download_err(url: &str, message: impl Into<String>) -> SzError {
    TransportError::Download {
        url: url.to_string(),
        message: message.into(),
    }
    .into()
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

impl TruthSetDownloader {
    /// Builds a client with the given connect and whole-request timeouts.
    pub fn new(url_prefix: impl Into<String>, connect_timeout: Duration, timeout: Duration) -> SzResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| SzError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, url_prefix))
    }

    /// Reuses an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, url_prefix: impl Into<String>) -> Self {
        let mut url_prefix = url_prefix.into();
        if !url_prefix.ends_with('/') {
            url_prefix.push('/');
        }
        Self { client, url_prefix }
    }

    /// URL a file name is fetched from.
    #[must_use]
    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}{file_name}", self.url_prefix)
    }

    /// Downloads `file_name` into `dir`, returning the final path.
    pub async fn download(&self, file_name: &str, dir: &Path) -> SzResult<PathBuf> {
        let url = self.url_for(file_name);
        let dest = dir.join(file_name);
        let part = part_path(&dest);

        tracing::info!(url = %url, path = %dest.display(), "downloading");
        if let Err(err) = self.fetch_into(&url, &part).await {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %part.display(), error = %cleanup, "failed to remove partial download");
                }
            }
            return Err(err);
        }
        tokio::fs::rename(&part, &dest)
            .await
            .map_err(|e| TransportError::io(&dest, e))?;
        Ok(dest)
    }

    /// Downloads every file in order into `dir`.
    pub async fn download_all<S: AsRef<str>>(&self, file_names: &[S], dir: &Path) -> SzResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| TransportError::io(dir, e))?;
        let mut paths = Vec::with_capacity(file_names.len());
        for name in file_names {
            paths.push(self.download(name.as_ref(), dir).await?);
        }
        Ok(paths)
    }

    async fn fetch_into(&self, url: &str, part: &Path) -> SzResult<()> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_err(url, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(download_err(url, format!("HTTP {}", status.as_u16())));
        }

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| TransportError::io(part, e))?;
        let mut written = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| download_err(url, e.to_string()))?
        {
            written += chunk.len();
            file.write_all(&chunk).await.map_err(|e| TransportError::io(part, e))?;
        }
        file.flush().await.map_err(|e| TransportError::io(part, e))?;
        tracing::debug!(url, bytes = written, "download complete");
        Ok(())
    }
}
