//! Encoding and decoding for the Omaha update-check subset used by the
//! update engine. No I/O happens here — callers own the HTTP exchange.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode update-check request: {0}")]
    MalformedRequest(#[from] quick_xml::SeError),
    #[error("failed to parse Omaha response: {0}")]
    MalformedResponse(#[source] quick_xml::DeError),
    #[error("Omaha response missing required field: {0}")]
    MissingField(&'static str),
}

pub mod event {
    pub const UPDATE_CHECK: &str = "1";
    pub const DOWNLOAD: &str = "2";
    pub const INSTALL: &str = "3";
    pub const ROLLBACK: &str = "4";
    pub const PING: &str = "800";

    pub const RESULT_UNKNOWN: &str = "0";
    pub const RESULT_NO_UPDATE: &str = "1";
    pub const RESULT_AVAILABLE: &str = "2";
    pub const RESULT_SUCCESS: &str = "3";
    pub const RESULT_SUCCESS_RESTARTED: &str = "4";
    pub const RESULT_ERROR: &str = "5";
    pub const RESULT_CANCELLED: &str = "6";
    pub const RESULT_STARTED: &str = "7";
}

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename = "request")]
struct RequestXml {
    #[serde(rename = "@protocol")]
    protocol: &'static str,
    app: AppRequestXml,
}

#[derive(Debug, Serialize)]
struct AppRequestXml {
    #[serde(rename = "@appid")]
    appid: String,
    #[serde(rename = "@track")]
    track: String,
    #[serde(rename = "@bootid")]
    bootid: String,
    #[serde(rename = "@version")]
    version: String,
    event: EventXml,
}

#[derive(Debug, Serialize)]
struct EventXml {
    #[serde(rename = "@eventtype")]
    eventtype: &'static str,
    #[serde(rename = "@eventresult")]
    eventresult: &'static str,
}

/// Serialize an update-check request. Encoding cannot fail for valid
/// UTF-8 inputs, but the fallible `quick_xml` path is surfaced anyway
/// so a future caller passing attacker-controlled strings isn't
/// surprised by a panic.
pub fn encode_update_check(
    app_id: &str,
    channel: &str,
    client_id: &str,
    current_version: &str,
) -> Result<Vec<u8>, CodecError> {
    let request = RequestXml {
        protocol: "3",
        app: AppRequestXml {
            appid: app_id.to_owned(),
            track: channel.to_owned(),
            bootid: client_id.to_owned(),
            version: current_version.to_owned(),
            event: EventXml {
                eventtype: event::UPDATE_CHECK,
                eventresult: event::RESULT_STARTED,
            },
        },
    };
    let body = quick_xml::se::to_string(&request)?;
    Ok(format!(r#"<?xml version="1.0" encoding="UTF-8"?>{body}"#).into_bytes())
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResponseXml {
    app: AppResponseXml,
}

#[derive(Debug, Deserialize)]
struct AppResponseXml {
    #[serde(rename = "@status")]
    status: String,
    updatecheck: Option<UpdateCheckXml>,
}

#[derive(Debug, Deserialize)]
struct UpdateCheckXml {
    #[serde(rename = "@status")]
    status: String,
    manifest: Option<ManifestXml>,
}

#[derive(Debug, Deserialize)]
struct ManifestXml {
    #[serde(rename = "@version")]
    version: String,
    #[serde(rename = "@trace")]
    trace: Option<String>,
    url: UrlXml,
    package: PackageXml,
}

#[derive(Debug, Deserialize)]
struct UrlXml {
    #[serde(rename = "@codebase")]
    codebase: String,
}

#[derive(Debug, Deserialize)]
struct PackageXml {
    #[serde(rename = "@hash")]
    hash: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@size")]
    size: u64,
}

// ---------------------------------------------------------------------------
// Public response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub name: String,
    pub sha256_hex: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmahaManifest {
    pub version: String,
    pub trace_id: Option<String>,
    pub download_url: String,
    pub package: PackageDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    NoUpdate,
    Update(OmahaManifest),
    AppError(String),
    UpdateCheckError(String),
}

/// Parse an Omaha response body into a typed outcome.
///
/// Decision rules (spec): `app.status != "ok"` -> `AppError`;
/// `updatecheck.status == "noupdate"` -> `NoUpdate`;
/// `updatecheck.status == "ok"` -> `Update`; anything else ->
/// `UpdateCheckError`.
pub fn decode_response(bytes: &[u8]) -> Result<ResponseOutcome, CodecError> {
    let text = String::from_utf8_lossy(bytes);
    let response: ResponseXml =
        quick_xml::de::from_str(&text).map_err(CodecError::MalformedResponse)?;

    if response.app.status != "ok" {
        return Ok(ResponseOutcome::AppError(response.app.status));
    }

    let updatecheck = response
        .app
        .updatecheck
        .ok_or(CodecError::MissingField("updatecheck"))?;

    match updatecheck.status.as_str() {
        "noupdate" => Ok(ResponseOutcome::NoUpdate),
        "ok" => {
            let manifest = updatecheck
                .manifest
                .ok_or(CodecError::MissingField("manifest"))?;
            Ok(ResponseOutcome::Update(OmahaManifest {
                version: manifest.version,
                trace_id: manifest.trace,
                download_url: manifest.url.codebase,
                package: PackageDescriptor {
                    name: manifest.package.name,
                    sha256_hex: manifest.package.hash,
                    size_bytes: manifest.package.size,
                },
            }))
        }
        other => Ok(ResponseOutcome::UpdateCheckError(other.to_owned())),
    }
}
