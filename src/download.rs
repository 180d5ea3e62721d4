//! Weights downloading with progress reporting
//!
//! Checkpoints are streamed to a `.part` file next to their final location,
//! optionally verified against a SHA-256 digest, then renamed into place so a
//! cache entry is never observed half-written.

use crate::cache::WeightsCache;
use crate::error::{InpaintError, Result};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }

    fn create() -> Self {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            Self::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            Self::NoOp
        }
    }
}

/// Downloader placing checkpoints into a [`WeightsCache`]
#[derive(Debug)]
pub struct WeightsDownloader {
    client: Client,
    cache: WeightsCache,
}

impl WeightsDownloader {
    /// Create a downloader for the default cache location
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize the weights cache
    pub fn new() -> Result<Self> {
        Self::with_cache(WeightsCache::new()?)
    }

    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: WeightsCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| InpaintError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client, cache })
    }

    /// Return the cached path for `url`, downloading it first if needed
    ///
    /// # Errors
    /// - Network errors or non-success HTTP status
    /// - File system errors while writing the checkpoint
    /// - Digest mismatch when `expected_sha256` is given
    pub async fn ensure_weights(
        &self,
        url: &str,
        expected_sha256: Option<&str>,
        show_progress: bool,
    ) -> Result<PathBuf> {
        let final_path = self.cache.checkpoint_path(url);
        if self.cache.is_cached(url) {
            log::info!("Using cached weights: {}", final_path.display());
            return Ok(final_path);
        }

        log::info!("Downloading weights from: {}", url);
        let temp_path =
            final_path.with_file_name(format!("{}.part", WeightsCache::url_to_file_name(url)));

        let progress = show_progress.then(ProgressIndicator::create);
        if let Some(pb) = &progress {
            pb.set_message(format!("Downloading {}", WeightsCache::url_to_file_name(url)));
        }

        let outcome = match self.download_file(url, &temp_path, progress.as_ref()).await {
            Ok(()) => Self::verify_file_integrity(&temp_path, expected_sha256).and_then(|valid| {
                if valid {
                    Ok(())
                } else {
                    Err(InpaintError::model(format!(
                        "Checksum mismatch for weights downloaded from {url}"
                    )))
                }
            }),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                fs::rename(&temp_path, &final_path).map_err(|e| {
                    InpaintError::file_io_error("move downloaded weights to cache", &final_path, &e)
                })?;
                if let Some(pb) = progress {
                    pb.finish_with_message(format!("Downloaded {}", final_path.display()));
                }
                log::info!("Saved weights to {}", final_path.display());
                Ok(final_path)
            },
            Err(e) => {
                if temp_path.exists() {
                    if let Err(cleanup_err) = fs::remove_file(&temp_path) {
                        log::warn!("Failed to remove partial download: {}", cleanup_err);
                    }
                }
                if let Some(pb) = progress {
                    pb.finish_with_message("Download failed".to_string());
                }
                Err(e)
            },
        }
    }

    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| InpaintError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(InpaintError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP status {}", response.status()),
            ));
        }

        let total_size = response.content_length();
        if let (Some(pb), Some(total)) = (progress, total_size) {
            pb.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| InpaintError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];
        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| InpaintError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| InpaintError::file_io_error("write to file", local_path, &e))?;
            downloaded += bytes_read as u64;

            if let Some(pb) = progress {
                if total_size.is_some() {
                    pb.set_position(downloaded);
                } else {
                    pb.set_message(format!("Downloaded {:.1} MB", downloaded as f64 / 1_048_576.0));
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| InpaintError::file_io_error("flush file", local_path, &e))?;

        if downloaded == 0 {
            return Err(InpaintError::network_error(
                format!("Failed to download {url}"),
                "empty response body",
            ));
        }

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(())
    }

    /// Compare a file's SHA-256 digest with `expected_hash`
    ///
    /// Returns `true` when no digest is given.
    ///
    /// # Errors
    /// - Failed to read the file
    pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        let contents = fs::read(file_path).map_err(|e| {
            InpaintError::file_io_error("read file for verification", file_path, &e)
        })?;
        let actual = format!("{:x}", Sha256::digest(&contents));

        if actual.eq_ignore_ascii_case(expected) {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                file_path.display(),
                expected,
                actual
            );
            Ok(false)
        }
    }

    #[must_use]
    pub fn cache(&self) -> &WeightsCache {
        &self.cache
    }
}
