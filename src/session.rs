// src/session.rs

//! Client-visible session state: which volume is selected, what the last
//! submission produced, and whether its report has been revealed.
//!
//! `Session` holds the synchronous transitions. `SessionHandle` drives a
//! session from async code: it only holds the lock while transitioning, never
//! across the network call, so a new file can be selected while a submission
//! is still pending.

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::client::{NO_FILE_SELECTED, SegmentationApi};
use crate::codec::{self, ARTIFACT_FILENAME, ARTIFACT_MIME_TYPE, ArtifactSink};
use crate::errors::{FailureKind, SegError, bound_message};
use crate::models::{
    MedicalReport, Modality, SegmentationOutcome, SelectedFile, Severity, Statistics, UploadRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Submitting => "submitting",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{}", NO_FILE_SELECTED)]
    NoFileSelected,

    #[error("a submission is already in flight for this session")]
    AlreadySubmitting,

    #[error("no successful segmentation result is available")]
    NotSucceeded,

    #[error("the segmentation result has no downloadable artifact")]
    NoArtifact,

    #[error(transparent)]
    Failed(#[from] SegError),
}

impl SessionError {
    /// Failure category for errors that stem from the volume or the artifact
    /// rather than from the order of transitions.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            SessionError::NoFileSelected | SessionError::Failed(SegError::Validation(_)) => {
                Some(FailureKind::Validation)
            }
            SessionError::Failed(SegError::Decode(_)) => Some(FailureKind::Decode),
            _ => None,
        }
    }
}

/// Identifies one submission and the file selection it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionTicket {
    pub submission: u64,
    pub selection: u64,
}

#[derive(Debug)]
pub struct Submission {
    pub ticket: SubmissionTicket,
    pub request: UploadRequest,
}

#[derive(Debug, Default)]
pub struct Session {
    selection: u64,
    submissions: u64,
    file: Option<SelectedFile>,
    modality: Modality,
    slice_index: Option<u32>,
    outcome: Option<SegmentationOutcome>,
    completed_at: Option<DateTime<Utc>>,
    report_revealed: bool,
    in_flight: Option<SubmissionTicket>,
    submitting: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.submitting {
            return SessionState::Submitting;
        }
        match &self.outcome {
            None => SessionState::Idle,
            Some(outcome) if outcome.is_success() => SessionState::Succeeded,
            Some(_) => SessionState::Failed,
        }
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn slice_index(&self) -> Option<u32> {
        self.slice_index
    }

    pub fn outcome(&self) -> Option<&SegmentationOutcome> {
        self.outcome.as_ref()
    }

    pub fn report_revealed(&self) -> bool {
        self.report_revealed
    }

    /// True while any submission of this session, current or superseded, is pending.
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Records a new volume and discards everything derived from the previous one.
    pub fn select_file(&mut self, file: SelectedFile) -> u64 {
        self.selection += 1;
        debug!("Selected {} (selection {})", file.name(), self.selection);
        self.file = Some(file);
        self.outcome = None;
        self.completed_at = None;
        self.report_revealed = false;
        self.submitting = false;
        self.selection
    }

    pub fn set_options(&mut self, modality: Modality, slice_index: Option<u32>) -> Result<(), SessionError> {
        if self.in_flight() {
            return Err(SessionError::AlreadySubmitting);
        }
        self.modality = modality;
        self.slice_index = slice_index;
        Ok(())
    }

    /// Moves to `Submitting` and hands out the request to send.
    pub fn begin_submit(&mut self) -> Result<Submission, SessionError> {
        if self.in_flight() {
            return Err(SessionError::AlreadySubmitting);
        }
        let file = self.file.clone().ok_or(SessionError::NoFileSelected)?;

        self.submissions += 1;
        let ticket = SubmissionTicket {
            submission: self.submissions,
            selection: self.selection,
        };
        self.in_flight = Some(ticket);
        self.submitting = true;
        self.outcome = None;
        self.completed_at = None;
        self.report_revealed = false;

        Ok(Submission {
            ticket,
            request: UploadRequest {
                file: Some(file),
                modality: self.modality,
                slice_index: self.slice_index,
            },
        })
    }

    /// Applies a finished submission. Returns false when the outcome belonged to a
    /// superseded selection and was dropped.
    pub fn complete_submit(&mut self, ticket: SubmissionTicket, outcome: SegmentationOutcome) -> bool {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
        if ticket.selection != self.selection {
            info!(
                "Discarding outcome of submission {} for superseded selection {}",
                ticket.submission, ticket.selection
            );
            return false;
        }
        self.submitting = false;
        self.outcome = Some(outcome);
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn reveal_report(&mut self) -> Result<(), SessionError> {
        if self.state() != SessionState::Succeeded {
            return Err(SessionError::NotSucceeded);
        }
        self.report_revealed = true;
        Ok(())
    }

    /// Decodes the artifact of the current result and offers it to `sink`.
    pub fn request_download<S: ArtifactSink>(&self, sink: &S) -> Result<S::Receipt, SessionError> {
        if self.state() != SessionState::Succeeded {
            return Err(SessionError::NotSucceeded);
        }
        let payload = self
            .outcome
            .as_ref()
            .and_then(|o| o.result())
            .and_then(|r| r.segmentation_artifact.as_deref())
            .ok_or(SessionError::NoArtifact)?;
        Ok(codec::decode_and_offer(payload, ARTIFACT_FILENAME, ARTIFACT_MIME_TYPE, sink)?)
    }

    pub fn view(&self) -> SessionView {
        let result = self.outcome.as_ref().and_then(|o| o.result());
        let report = result.and_then(|r| r.medical_report.as_ref());
        SessionView {
            state: self.state(),
            file_name: self.file.as_ref().map(|f| f.name().to_string()),
            modality: self.modality,
            slice_index: self.slice_index,
            in_flight: self.in_flight(),
            report_revealed: self.report_revealed,
            overlay_image: result.map(|r| r.overlay_image.clone()),
            statistics: result.map(|r| r.statistics.clone()),
            has_artifact: result.is_some_and(|r| r.segmentation_artifact.is_some()),
            report_preview: report.map(ReportPreview::from),
            report: report.filter(|_| self.report_revealed).cloned(),
            error: self
                .outcome
                .as_ref()
                .and_then(|o| o.failure_message())
                .map(str::to_string),
            completed_at: self.completed_at,
        }
    }
}

/// What the display surface shows about a report before it is revealed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPreview {
    pub severity: Severity,
    pub tone: &'static str,
    pub study_date: String,
    pub modality: String,
}

impl From<&MedicalReport> for ReportPreview {
    fn from(report: &MedicalReport) -> Self {
        Self {
            severity: report.severity.clone(),
            tone: report.severity.tone(),
            study_date: report.study_date.clone(),
            modality: report.modality.clone(),
        }
    }
}

/// Serializable snapshot of a session for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub state: SessionState,
    pub file_name: Option<String>,
    pub modality: Modality,
    pub slice_index: Option<u32>,
    pub in_flight: bool,
    pub report_revealed: bool,
    pub overlay_image: Option<String>,
    pub statistics: Option<Statistics>,
    pub has_artifact: bool,
    pub report_preview: Option<ReportPreview>,
    pub report: Option<MedicalReport>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Shared, async driver for one session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    session: Arc<Mutex<Session>>,
    api: Arc<dyn SegmentationApi>,
}

impl SessionHandle {
    pub fn new(api: Arc<dyn SegmentationApi>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session: Arc::new(Mutex::new(Session::new())),
            api,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn select_file(&self, file: SelectedFile) -> SessionView {
        let mut session = self.session.lock().await;
        session.select_file(file);
        session.view()
    }

    pub async fn set_options(&self, modality: Modality, slice_index: Option<u32>) -> Result<SessionView, SessionError> {
        let mut session = self.session.lock().await;
        session.set_options(modality, slice_index)?;
        Ok(session.view())
    }

    /// Runs one submission to completion and returns the resulting view.
    ///
    /// The network call and the state update run on their own task, so the
    /// submission finishes and clears the in-flight mark even if the caller
    /// stops waiting. If another file was selected meanwhile, the outcome is
    /// dropped and the view reflects the newer selection.
    pub async fn submit(&self) -> Result<SessionView, SessionError> {
        let Submission { ticket, request } = self.session.lock().await.begin_submit()?;
        info!("Session {} submission {} started", self.id, ticket.submission);

        let id = self.id;
        let api = self.api.clone();
        let session = self.session.clone();
        let task = tokio::spawn(async move {
            let outcome = api.submit(request).await;
            let mut session = session.lock().await;
            if session.complete_submit(ticket, outcome) {
                info!("Session {} is now {}", id, session.state());
            }
            session.view()
        });

        match task.await {
            Ok(view) => Ok(view),
            Err(e) => {
                error!("Session {} submission {} aborted: {}", self.id, ticket.submission, e);
                let mut session = self.session.lock().await;
                session.complete_submit(
                    ticket,
                    SegmentationOutcome::failure(FailureKind::Transport, bound_message(&e.to_string())),
                );
                Ok(session.view())
            }
        }
    }

    pub async fn reveal_report(&self) -> Result<SessionView, SessionError> {
        let mut session = self.session.lock().await;
        session.reveal_report()?;
        Ok(session.view())
    }

    pub async fn request_download<S: ArtifactSink>(&self, sink: &S) -> Result<S::Receipt, SessionError> {
        self.session.lock().await.request_download(sink)
    }

    pub async fn view(&self) -> SessionView {
        self.session.lock().await.view()
    }
}
