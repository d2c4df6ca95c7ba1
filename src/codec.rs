// src/codec.rs
use base64::{Engine, engine::general_purpose};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::errors::Result;

/// File name offered for the downloaded mask volume.
pub const ARTIFACT_FILENAME: &str = "liver_segmentation.nii.gz";
pub const ARTIFACT_MIME_TYPE: &str = "application/octet-stream";

/// A decoded binary file ready to be handed to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Destination that presents a decoded artifact to the user.
///
/// `offer` takes the artifact by value: the bytes live only for the duration
/// of the call.
pub trait ArtifactSink {
    type Receipt;

    fn offer(&self, artifact: Artifact) -> Result<Self::Receipt>;
}

/// Returns the base64 portion of a payload that may carry a `data:` URI prefix.
pub fn strip_data_uri(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

pub fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    let cleaned: String = strip_data_uri(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(general_purpose::STANDARD.decode(cleaned)?)
}

pub fn decode_artifact(payload: &str, suggested_filename: &str, mime_type: &str) -> Result<Artifact> {
    let bytes = decode_payload(payload)?;
    debug!("Decoded artifact {} ({} bytes)", suggested_filename, bytes.len());
    Ok(Artifact {
        filename: suggested_filename.to_string(),
        mime_type: mime_type.to_string(),
        bytes,
    })
}

/// Decodes `payload` and offers the result to `sink` exactly once.
pub fn decode_and_offer<S: ArtifactSink>(
    payload: &str,
    suggested_filename: &str,
    mime_type: &str,
    sink: &S,
) -> Result<S::Receipt> {
    let artifact = decode_artifact(payload, suggested_filename, mime_type)?;
    sink.offer(artifact)
}

/// Saves artifacts into a directory, never overwriting an existing file.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn available_path(&self, filename: &str) -> PathBuf {
        let candidate = self.dir.join(filename);
        if !candidate.exists() {
            return candidate;
        }
        // Split at the first dot so compound extensions like .nii.gz stay intact.
        let (stem, ext) = match filename.find('.') {
            Some(idx) if idx > 0 => filename.split_at(idx),
            _ => (filename, ""),
        };
        (1..)
            .map(|n| self.dir.join(format!("{} ({}){}", stem, n, ext)))
            .find(|path| !path.exists())
            .unwrap_or(candidate)
    }
}

impl ArtifactSink for DirectorySink {
    type Receipt = PathBuf;

    fn offer(&self, artifact: Artifact) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.available_path(&artifact.filename);
        std::fs::write(&path, &artifact.bytes)?;
        info!(
            "Saved {} ({} bytes, {}) to {}",
            artifact.filename,
            artifact.bytes.len(),
            artifact.mime_type,
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SegError;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        offered: RefCell<Vec<Artifact>>,
    }

    impl ArtifactSink for RecordingSink {
        type Receipt = usize;

        fn offer(&self, artifact: Artifact) -> Result<usize> {
            let len = artifact.bytes.len();
            self.offered.borrow_mut().push(artifact);
            Ok(len)
        }
    }

    #[test]
    fn round_trip_offers_original_bytes_once() {
        let original: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let encoded = general_purpose::STANDARD.encode(&original);
        let sink = RecordingSink::default();

        let len = decode_and_offer(&encoded, ARTIFACT_FILENAME, ARTIFACT_MIME_TYPE, &sink).unwrap();

        assert_eq!(len, 1024);
        let offered = sink.offered.borrow();
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].bytes, original);
        assert_eq!(offered[0].filename, ARTIFACT_FILENAME);
        assert_eq!(offered[0].mime_type, ARTIFACT_MIME_TYPE);
    }

    #[test]
    fn data_uri_prefix_is_stripped() {
        let payload = format!(
            "data:application/gzip;base64,{}",
            general_purpose::STANDARD.encode(b"mask")
        );
        assert_eq!(decode_payload(&payload).unwrap(), b"mask");
    }

    #[test]
    fn invalid_base64_is_surfaced() {
        let sink = RecordingSink::default();
        let err = decode_and_offer("not base64!!", ARTIFACT_FILENAME, ARTIFACT_MIME_TYPE, &sink)
            .unwrap_err();
        assert!(matches!(err, SegError::Decode(_)));
        assert!(sink.offered.borrow().is_empty());
    }
}
