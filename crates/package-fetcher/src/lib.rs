//! Downloads a package into a staging directory and verifies its SHA-256
//! against the hash advertised in the Omaha manifest. The hash is
//! recomputed from the bytes actually written to disk, not the in-flight
//! stream, so verification reflects what will be extracted.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server returned status {status} for {url}")]
    BadStatus { url: String, status: u16 },
    #[error("I/O error staging download at {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "SHA-256 verification failed for {name}: expected {expected}, got {actual}"
    )]
    VerificationFailed {
        name: String,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Clone)]
pub struct ExpectedPackage<'a> {
    pub name: &'a str,
    pub sha256_hex: &'a str,
}

/// Download `download_url` into `into_dir/{expected.name}`, then verify the
/// downloaded bytes match `expected.sha256_hex` (case-insensitive hex
/// compare). Returns the path to the verified file.
pub async fn fetch_and_verify(
    client: &reqwest::Client,
    download_url: &str,
    into_dir: &Path,
    expected: ExpectedPackage<'_>,
) -> Result<PathBuf, FetchError> {
    let downloaded_path = into_dir.join(expected.name);

    let response = client
        .get(download_url)
        .send()
        .await
        .map_err(|source| FetchError::FetchFailed {
            url: download_url.to_owned(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(FetchError::BadStatus {
            url: download_url.to_owned(),
            status: response.status().as_u16(),
        });
    }

    {
        let mut file =
            tokio::fs::File::create(&downloaded_path)
                .await
                .map_err(|source| FetchError::IoError {
                    path: downloaded_path.clone(),
                    source,
                })?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| FetchError::FetchFailed {
                url: download_url.to_owned(),
                source,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|source| FetchError::IoError {
                    path: downloaded_path.clone(),
                    source,
                })?;
        }
        file.flush().await.map_err(|source| FetchError::IoError {
            path: downloaded_path.clone(),
            source,
        })?;
    }

    debug!(path = %downloaded_path.display(), "download complete, verifying hash");
    verify_on_disk(&downloaded_path, expected.name, expected.sha256_hex).await?;
    Ok(downloaded_path)
}

async fn verify_on_disk(path: &Path, name: &str, expected_hex: &str) -> Result<(), FetchError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| FetchError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
    let actual = hex::encode(Sha256::digest(&bytes));
    if !actual.eq_ignore_ascii_case(expected_hex) {
        warn!(name, expected = expected_hex, actual = %actual, "hash mismatch");
        return Err(FetchError::VerificationFailed {
            name: name.to_owned(),
            expected: expected_hex.to_owned(),
            actual,
        });
    }
    Ok(())
}
