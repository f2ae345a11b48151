use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{multipart, Client};
use thiserror::Error;

use crate::vial::{decode_processed_image, parse_process_response, LoadedImage};

pub const PROCESS_IMAGE_ENDPOINT: &str = "process_image";
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", server_error_message(.status))]
    Server { status: u16 },

    #[error("There was a problem with the upload: {0}")]
    Transport(String),
}

fn server_error_message(status: &u16) -> &'static str {
    if *status == 500 {
        "The image processing service failed, try again."
    } else {
        "Server returned an error, check image file and try again."
    }
}

fn transport_error(err: anyhow::Error) -> UploadError {
    UploadError::Transport(format!("{err:#}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Uploading(RequestToken),
}

/// What a worker thread sends back when an upload finishes.
#[derive(Debug)]
pub struct UploadReply {
    pub token: RequestToken,
    pub result: Result<LoadedImage, UploadError>,
}

/// Tracks the single upload in flight; replies carrying an older token are dropped.
#[derive(Debug)]
pub struct UploadController {
    phase: UploadPhase,
    issued: u64,
}

impl Default for UploadController {
    fn default() -> Self {
        Self {
            phase: UploadPhase::Idle,
            issued: 0,
        }
    }
}

impl UploadController {
    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self.phase(), UploadPhase::Uploading(_))
    }

    pub fn begin(&mut self, file: Option<&Path>) -> Result<RequestToken, UploadError> {
        let path = file.ok_or_else(|| {
            UploadError::Validation("Please select an image file.".to_string())
        })?;
        validate_image_file(path)?;

        self.issued = self.issued.saturating_add(1);
        let token = RequestToken(self.issued);
        if let UploadPhase::Uploading(previous) = self.phase {
            log::warn!("Upload {:?} superseded by {:?}", previous, token);
        }
        self.phase = UploadPhase::Uploading(token);
        log::info!("Uploading {} as request {:?}", path.display(), token);
        Ok(token)
    }

    /// Returns the outcome if `token` is the upload in flight, `None` for stale replies.
    pub fn finish(
        &mut self,
        token: RequestToken,
        result: Result<LoadedImage, UploadError>,
    ) -> Option<Result<LoadedImage, UploadError>> {
        if self.phase != UploadPhase::Uploading(token) {
            log::debug!("Ignoring stale reply for request {:?}", token);
            return None;
        }
        self.phase = UploadPhase::Idle;
        Some(result)
    }

    /// Forgets the upload in flight so its reply is treated as stale.
    pub fn abandon(&mut self) {
        self.phase = UploadPhase::Idle;
    }
}

fn validate_image_file(path: &Path) -> Result<(), UploadError> {
    if path.as_os_str().is_empty() {
        return Err(UploadError::Validation(
            "Please select an image file.".to_string(),
        ));
    }
    let metadata = fs::metadata(path).map_err(|err| {
        UploadError::Validation(format!("Could not read {}: {err}", path.display()))
    })?;
    if !metadata.is_file() || metadata.len() == 0 {
        return Err(UploadError::Validation(format!(
            "{} is not a non-empty image file.",
            path.display()
        )));
    }
    Ok(())
}

pub fn process_image_url(server_url: &str) -> String {
    let base = server_url.trim().trim_end_matches('/');
    format!("{base}/{PROCESS_IMAGE_ENDPOINT}")
}

/// Posts `path` to the processing service and decodes the returned image.
///
/// Runs to completion on the calling thread, including PNG decoding, so the
/// caller only ever sees a fully decoded raster.
pub fn upload_image(server_url: &str, path: &Path) -> Result<LoadedImage, UploadError> {
    let client = build_http_client().map_err(transport_error)?;
    let url = process_image_url(server_url);

    let form = multipart::Form::new()
        .file(IMAGE_FIELD, path)
        .with_context(|| format!("Could not attach {}", path.display()))
        .map_err(transport_error)?;

    let response = client
        .post(&url)
        .multipart(form)
        .send()
        .with_context(|| format!("Request to {url} failed"))
        .map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
        log::warn!("{url} answered {status}");
        return Err(UploadError::Server {
            status: status.as_u16(),
        });
    }

    let body = response
        .bytes()
        .with_context(|| format!("Could not read response from {url}"))
        .map_err(transport_error)?;
    let processed = parse_process_response(&body).map_err(transport_error)?;
    decode_processed_image(processed).map_err(transport_error)
}

pub fn upload_reply(server_url: &str, path: PathBuf, token: RequestToken) -> UploadReply {
    let result = upload_image(server_url, &path);
    if let Err(err) = &result {
        log::warn!("Upload of {} failed: {err}", path.display());
    }
    UploadReply { token, result }
}

fn build_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
        .context("Could not initialize HTTP client")
}
