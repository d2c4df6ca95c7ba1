// src/models.rs
use crate::errors::{FailureKind, Result, SegError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// MRI acquisition protocol the service model was trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Modality {
    #[default]
    T1,
    T2,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::T1 => "T1",
            Modality::T2 => "T2",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = SegError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "T1" => Ok(Modality::T1),
            "T2" => Ok(Modality::T2),
            other => Err(SegError::Validation(format!(
                "unknown modality '{}', expected T1 or T2",
                other
            ))),
        }
    }
}

const ACCEPTED_EXTENSIONS: [&str; 2] = [".nii.gz", ".nii"];

/// A NIfTI volume chosen by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    name: String,
    bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let lower = name.to_ascii_lowercase();
        if !ACCEPTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            return Err(SegError::Validation(format!(
                "'{}' is not a NIfTI volume (.nii or .nii.gz)",
                name
            )));
        }
        if bytes.is_empty() {
            return Err(SegError::Validation(format!("'{}' is empty", name)));
        }
        Ok(Self { name, bytes })
    }

    /// Reads a volume from disk, keeping only the file name for the upload.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SegError::Validation(format!("invalid file path: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Self::new(name, bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.name, self.bytes)
    }
}

/// One segmentation submission. Built fresh for every call and moved into the submitter.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: Option<SelectedFile>,
    pub modality: Modality,
    pub slice_index: Option<u32>,
}

impl UploadRequest {
    pub fn new(file: Option<SelectedFile>, modality: Modality) -> Self {
        Self { file, modality, slice_index: None }
    }

    pub fn with_slice_index(mut self, slice_index: u32) -> Self {
        self.slice_index = Some(slice_index);
        self
    }
}

/// Statistics as they arrive on the wire, before invariants are checked.
#[derive(Deserialize)]
struct RawStatistics {
    volume_shape: Vec<u64>,
    liver_voxels: u64,
    total_voxels: u64,
    #[serde(default)]
    liver_percentage: Option<f64>,
    slice_index: u32,
    total_slices: u32,
    modality: String,
    liver_volume_ml: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStatistics")]
pub struct Statistics {
    pub volume_shape: [u64; 3],
    pub liver_voxels: u64,
    pub total_voxels: u64,
    pub liver_percentage: f64,
    pub slice_index: u32,
    pub total_slices: u32,
    pub modality: String,
    pub liver_volume_ml: f64,
}

impl TryFrom<RawStatistics> for Statistics {
    type Error = String;

    fn try_from(raw: RawStatistics) -> std::result::Result<Self, Self::Error> {
        let volume_shape: [u64; 3] = raw
            .volume_shape
            .as_slice()
            .try_into()
            .map_err(|_| format!("volume_shape must have 3 dimensions, got {}", raw.volume_shape.len()))?;
        if volume_shape.contains(&0) {
            return Err("volume_shape dimensions must be positive".to_string());
        }
        if raw.total_voxels == 0 {
            return Err("total_voxels must be positive".to_string());
        }
        if raw.liver_voxels > raw.total_voxels {
            return Err(format!(
                "liver_voxels ({}) exceeds total_voxels ({})",
                raw.liver_voxels, raw.total_voxels
            ));
        }
        if raw.total_slices == 0 || raw.slice_index >= raw.total_slices {
            return Err(format!(
                "slice_index {} is outside of {} slices",
                raw.slice_index, raw.total_slices
            ));
        }
        if !(raw.liver_volume_ml >= 0.0) {
            return Err("liver_volume_ml must be non-negative".to_string());
        }

        let liver_percentage = match raw.liver_percentage {
            Some(p) if (0.0..=100.0).contains(&p) => p,
            Some(p) => return Err(format!("liver_percentage {} is outside [0, 100]", p)),
            None => raw.liver_voxels as f64 * 100.0 / raw.total_voxels as f64,
        };

        Ok(Statistics {
            volume_shape,
            liver_voxels: raw.liver_voxels,
            total_voxels: raw.total_voxels,
            liver_percentage,
            slice_index: raw.slice_index,
            total_slices: raw.total_slices,
            modality: raw.modality,
            liver_volume_ml: raw.liver_volume_ml,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphologyMeasurement {
    pub connected_components: u32,
    pub largest_component_ratio: f64,
    pub fragmentation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub liver_volume_ml: f64,
    pub liver_percentage: f64,
    pub volume_shape: Vec<u64>,
    pub morphology: MorphologyMeasurement,
}

/// Severity grade assigned by the report generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Normal,
    Mild,
    Moderate,
    Other(String),
}

impl Severity {
    /// Display tone used to color the severity badge.
    pub fn tone(&self) -> &'static str {
        match self {
            Severity::Normal => "success",
            Severity::Mild => "warning",
            Severity::Moderate => "error",
            Severity::Other(_) => "default",
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Severity::Normal => "normal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Other(s) => s,
        }
    }
}

impl From<String> for Severity {
    fn from(s: String) -> Self {
        match s.as_str() {
            "normal" => Severity::Normal,
            "mild" => Severity::Mild,
            "moderate" => Severity::Moderate,
            _ => Severity::Other(s),
        }
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_string()
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalReport {
    pub patient_id: String,
    pub study_date: String,
    pub modality: String,
    pub findings: Vec<String>,
    pub measurements: Measurements,
    pub impression: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub severity: Severity,
    pub disclaimer: String,
}

/// The payload of a successful segmentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentationResult {
    /// Overlay rendering as a `data:` URI.
    pub overlay_image: String,
    /// Base64 mask volume, when the service returned one.
    pub segmentation_artifact: Option<String>,
    pub statistics: Statistics,
    pub medical_report: Option<MedicalReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// The single value produced by one completed submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentationOutcome {
    Success(SegmentationResult),
    Failure(Failure),
}

impl SegmentationOutcome {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        SegmentationOutcome::Failure(Failure { kind, message: message.into() })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SegmentationOutcome::Success(_))
    }

    pub fn result(&self) -> Option<&SegmentationResult> {
        match self {
            SegmentationOutcome::Success(result) => Some(result),
            SegmentationOutcome::Failure(_) => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            SegmentationOutcome::Success(_) => None,
            SegmentationOutcome::Failure(failure) => Some(&failure.message),
        }
    }
}

/// Liveness and capability probe answer from the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub device: String,
    pub model_t1_loaded: bool,
    pub model_t2_loaded: bool,
}

impl HealthStatus {
    pub fn model_loaded(&self, modality: Modality) -> bool {
        match modality {
            Modality::T1 => self.model_t1_loaded,
            Modality::T2 => self.model_t2_loaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stats_json() -> serde_json::Value {
        json!({
            "volume_shape": [256, 256, 80],
            "liver_voxels": 50000,
            "total_voxels": 2000000,
            "slice_index": 40,
            "total_slices": 80,
            "modality": "T1",
            "liver_volume_ml": 1520.5
        })
    }

    #[test]
    fn modality_parses_case_insensitively() {
        assert_eq!("t2".parse::<Modality>().unwrap(), Modality::T2);
        assert_eq!(" T1 ".parse::<Modality>().unwrap(), Modality::T1);
        assert!("T3".parse::<Modality>().is_err());
    }

    #[test]
    fn selected_file_accepts_nifti_only() {
        assert!(SelectedFile::new("scan.nii.gz", vec![1]).is_ok());
        assert!(SelectedFile::new("SCAN.NII", vec![1]).is_ok());
        assert!(SelectedFile::new("scan.dcm", vec![1]).is_err());
        assert!(SelectedFile::new("scan.nii", Vec::new()).is_err());
    }

    #[test]
    fn liver_percentage_is_computed_when_missing() {
        let stats: Statistics = serde_json::from_value(stats_json()).unwrap();
        assert_eq!(stats.liver_percentage, 2.5);
        assert_eq!(stats.volume_shape, [256, 256, 80]);
    }

    #[test]
    fn statistics_reject_broken_invariants() {
        let mut value = stats_json();
        value["liver_voxels"] = json!(3000000);
        assert!(serde_json::from_value::<Statistics>(value).is_err());

        let mut value = stats_json();
        value["slice_index"] = json!(80);
        assert!(serde_json::from_value::<Statistics>(value).is_err());

        let mut value = stats_json();
        value["volume_shape"] = json!([256, 256]);
        assert!(serde_json::from_value::<Statistics>(value).is_err());
    }

    #[test]
    fn severity_maps_unknown_grades_to_other() {
        let severity: Severity = serde_json::from_value(json!("severe")).unwrap();
        assert_eq!(severity, Severity::Other("severe".to_string()));
        assert_eq!(severity.tone(), "default");
        assert_eq!(Severity::Mild.tone(), "warning");
        assert_eq!(serde_json::to_value(Severity::Normal).unwrap(), json!("normal"));
    }

    #[test]
    fn health_reports_loaded_models() {
        let health = HealthStatus {
            status: "healthy".to_string(),
            device: "cuda".to_string(),
            model_t1_loaded: true,
            model_t2_loaded: false,
        };
        assert!(health.model_loaded(Modality::T1));
        assert!(!health.model_loaded(Modality::T2));
    }
}
