//! Drives one end-to-end update attempt: poll every configured manifest,
//! fetch and verify the winning candidates, clone-and-extract each over
//! the current version, and report whether anything was installed.
//!
//! Transactional: any failure once staging begins for a candidate removes
//! that candidate's new-version directory before returning, so the
//! on-disk state is exactly as it was before the attempt.

use std::path::{Path, PathBuf};

use omaha_codec::{decode_response, encode_update_check, OmahaManifest, ResponseOutcome};
use package_fetcher::ExpectedPackage;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct UpdateManifest {
    pub app_id: String,
    pub endpoint: String,
}

/// Everything the engine needs to poll and stage updates. Deliberately
/// leaner than the full `Target`/`Config` the embedding program holds —
/// the engine has no business knowing the executable name or args, only
/// the supervisor does.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub client_id: String,
    pub channel: String,
    pub versions_root: PathBuf,
    pub manifests: Vec<UpdateManifest>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("version store error: {0}")]
    Store(#[from] version_store::StoreError),
    #[error("extraction failed: {0}")]
    Extract(#[from] archive_extractor::ExtractError),
}

/// An error polling or decoding one manifest's Omaha exchange. Transient
/// by design — logged and the manifest is skipped for this tick, the
/// next tick tries again.
#[derive(Debug, Error)]
enum PollError {
    #[error("failed to encode update-check request: {0}")]
    Encode(#[source] omaha_codec::CodecError),
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server at {endpoint} returned status {status}")]
    BadStatus { endpoint: String, status: u16 },
    #[error("failed to parse response from {endpoint}: {0}")]
    Decode {
        endpoint: String,
        #[source]
        source: omaha_codec::CodecError,
    },
}

async fn poll_manifest(
    client: &reqwest::Client,
    manifest: &UpdateManifest,
    channel: &str,
    client_id: &str,
    current_version: &str,
) -> Result<ResponseOutcome, PollError> {
    let body = encode_update_check(&manifest.app_id, channel, client_id, current_version)
        .map_err(PollError::Encode)?;

    let response = client
        .post(&manifest.endpoint)
        .header("Content-Type", "application/xml")
        .body(body)
        .send()
        .await
        .map_err(|source| PollError::Transport {
            endpoint: manifest.endpoint.clone(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(PollError::BadStatus {
            endpoint: manifest.endpoint.clone(),
            status: response.status().as_u16(),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|source| PollError::Transport {
            endpoint: manifest.endpoint.clone(),
            source,
        })?;

    decode_response(&bytes).map_err(|source| PollError::Decode {
        endpoint: manifest.endpoint.clone(),
        source,
    })
}

/// Run one engine tick: poll every manifest, install every advertised
/// candidate that verifies, and report whether anything was installed.
pub async fn apply_updates(client: &reqwest::Client, config: &EngineConfig) -> Result<bool, EngineError> {
    let versions_root: &Path = &config.versions_root;
    let current = version_store::latest_version(versions_root)?;
    let current_version_str = current.clone().unwrap_or_default();

    let mut candidates: Vec<OmahaManifest> = Vec::new();
    for manifest in &config.manifests {
        match poll_manifest(
            client,
            manifest,
            &config.channel,
            &config.client_id,
            &current_version_str,
        )
        .await
        {
            Ok(ResponseOutcome::Update(m)) => candidates.push(m),
            Ok(ResponseOutcome::NoUpdate) => {
                debug!(app_id = %manifest.app_id, "no update available");
            }
            Ok(ResponseOutcome::AppError(status)) => {
                warn!(app_id = %manifest.app_id, status, "server reported app error");
            }
            Ok(ResponseOutcome::UpdateCheckError(status)) => {
                warn!(app_id = %manifest.app_id, status, "server reported update-check error");
            }
            Err(e) => {
                warn!(app_id = %manifest.app_id, error = %e, "update-check poll failed, skipping this tick");
            }
        }
    }

    if candidates.is_empty() {
        return Ok(false);
    }

    let temp = version_store::stage_temp(versions_root)?;

    for candidate in &candidates {
        let expected = ExpectedPackage {
            name: &candidate.package.name,
            sha256_hex: &candidate.package.sha256_hex,
        };
        let downloaded = match package_fetcher::fetch_and_verify(
            client,
            &candidate.download_url,
            &temp,
            expected,
        )
        .await
        {
            Ok(path) => path,
            Err(e) => {
                warn!(version = %candidate.version, error = %e, "candidate rejected, skipping");
                continue;
            }
        };

        let new_version_dir = version_store::version_path(versions_root, &candidate.version);
        if let Err(e) = version_store::clone_version(versions_root, current.as_deref(), &candidate.version) {
            version_store::discard(&new_version_dir);
            return Err(e.into());
        }

        if let Err(e) = archive_extractor::extract_gzip_tar(&downloaded, &new_version_dir) {
            version_store::discard(&new_version_dir);
            return Err(e.into());
        }

        info!(version = %candidate.version, "candidate installed");
    }

    version_store::discard(&temp);
    Ok(true)
}
