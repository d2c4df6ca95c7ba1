// src/runner.rs
use futures::future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::client::SegmentationApi;
use crate::codec::DirectorySink;
use crate::models::{Modality, SelectedFile};
use crate::session::{SessionError, SessionHandle, SessionState, SessionView};

/// One volume to segment from the command line.
#[derive(Debug, Clone)]
pub struct SegmentJob {
    pub path: PathBuf,
    pub modality: Modality,
    pub slice_index: Option<u32>,
    pub reveal_report: bool,
    pub download: bool,
}

#[derive(Debug)]
pub struct JobReport {
    pub path: PathBuf,
    pub view: SessionView,
    pub saved_to: Option<PathBuf>,
    pub latency_ms: u64,
}

/// Runs a single volume through its own session.
pub async fn run_job(
    api: Arc<dyn SegmentationApi>,
    job: &SegmentJob,
    sink: &DirectorySink,
) -> Result<JobReport, SessionError> {
    let start = Instant::now();
    let handle = SessionHandle::new(api);

    let file = SelectedFile::from_path(&job.path).await?;
    handle.select_file(file).await;
    handle.set_options(job.modality, job.slice_index).await?;

    println!("📡 Segmenting {} ({})", job.path.display(), job.modality);
    let mut view = handle.submit().await?;

    let mut saved_to = None;
    if view.state == SessionState::Succeeded {
        if job.reveal_report && view.report_preview.is_some() {
            view = handle.reveal_report().await?;
        }
        if job.download && view.has_artifact {
            saved_to = Some(handle.request_download(sink).await?);
        }
    }

    Ok(JobReport {
        path: job.path.clone(),
        view,
        saved_to,
        latency_ms: start.elapsed().as_millis() as u64,
    })
}

/// Runs several volumes concurrently, one session each.
pub async fn run_batch(
    api: Arc<dyn SegmentationApi>,
    jobs: &[SegmentJob],
    sink: &DirectorySink,
) -> Vec<Result<JobReport, SessionError>> {
    let batch_start = Instant::now();

    let futures: Vec<_> = jobs
        .iter()
        .map(|job| run_job(api.clone(), job, sink))
        .collect();
    let results = future::join_all(futures).await;

    let batch_total_ms = batch_start.elapsed().as_millis() as u64;
    log::info!("Batch of {} volumes completed in {}ms", jobs.len(), batch_total_ms);

    results
}

/// Prints a human readable summary of one job.
pub fn print_report(report: &JobReport) {
    let separator = "=".repeat(60);
    let view = &report.view;

    println!("\n{}", separator);
    println!("🩻 {} ({}ms)", report.path.display(), report.latency_ms);
    println!("{}", separator);

    match view.state {
        SessionState::Succeeded => println!("✅ Segmentation succeeded"),
        SessionState::Failed => println!(
            "❌ Segmentation failed: {}",
            view.error.as_deref().unwrap_or("unknown error")
        ),
        state => println!("ℹ️  Session is {}", state),
    }

    if let Some(stats) = &view.statistics {
        println!("   Liver volume:     {} ml", stats.liver_volume_ml);
        println!("   Liver percentage: {:.2}%", stats.liver_percentage);
        println!("   Liver voxels:     {} of {}", stats.liver_voxels, stats.total_voxels);
        println!(
            "   Volume shape:     {}",
            stats
                .volume_shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(" × ")
        );
        println!("   Slice:            {} / {}", stats.slice_index + 1, stats.total_slices);
        println!("   Modality:         {}", stats.modality);
    }

    if let Some(preview) = &view.report_preview {
        println!(
            "\n📋 Medical report: {} | Study date: {} | Modality: {}",
            preview.severity.as_str().to_uppercase(),
            preview.study_date,
            preview.modality
        );
    }

    if let Some(report) = &view.report {
        println!("\nFindings:");
        for finding in &report.findings {
            println!("  • {}", finding);
        }
        let m = &report.measurements;
        println!("\nMeasurements:");
        println!("  Liver volume: {} ml", m.liver_volume_ml);
        println!("  Liver percentage: {}%", m.liver_percentage);
        println!("  Fragmentation: {}", m.morphology.fragmentation);
        println!("  Connected components: {}", m.morphology.connected_components);
        println!(
            "  Largest component ratio: {:.1}%",
            m.morphology.largest_component_ratio * 100.0
        );
        println!("\nImpression:\n  {}", report.impression);
        if !report.recommendations.is_empty() {
            println!("\nRecommendations:");
            for rec in &report.recommendations {
                println!("  • {}", rec);
            }
        }
        println!("\n⚠️  {}", report.disclaimer);
    }

    if let Some(path) = &report.saved_to {
        println!("\n💾 Segmentation saved to {}", path.display());
    }
    println!("\n{}\n", separator);
}
