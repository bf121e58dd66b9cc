//! Job dependency planning for an imported batch
//!
//! Per file: metadata extraction first (EXIFTOOL), then the extractors that
//! need its output. Per location: aggregate jobs chained behind the batch's
//! last EXIFTOOL job, with the stats/packaging jobs behind GPS enrichment.

use crate::config::LocationInfo;
use crate::jobs::{JobPriority, JobQueueKind, JobRecord};
use crate::pipeline::{FinalizedFile, MediaType};
use serde_json::json;
use uuid::Uuid;

fn new_job(
    queue: JobQueueKind,
    priority: JobPriority,
    payload: serde_json::Value,
    depends_on: Option<&str>,
) -> JobRecord {
    JobRecord {
        job_id: Uuid::new_v4().to_string(),
        queue,
        priority,
        payload,
        depends_on: depends_on.map(String::from),
    }
}

/// Plan the downstream jobs for the files a finalize pass inserted.
///
/// Only files with a `db_record_id` get jobs. Returns an empty plan when
/// nothing was inserted (no per-location jobs without at least one
/// EXIFTOOL parent).
pub fn plan_jobs(
    files: &[FinalizedFile],
    location: &LocationInfo,
    import_id: &str,
) -> Vec<JobRecord> {
    let mut jobs = Vec::new();
    let mut last_exiftool: Option<String> = None;
    let mut has_images = false;
    let mut has_docs = false;

    for file in files.iter().filter(|f| f.db_record_id.is_some()) {
        let media_type = file.scanned().media_type;
        let payload = json!({
            "hash": file.validated.hash(),
            "media_type": media_type,
            "archive_path": file.validated.copied.archive_path,
            "locid": location.locid,
            "import_id": import_id,
        });

        let exiftool = new_job(JobQueueKind::Exiftool, JobPriority::High, payload.clone(), None);
        let exiftool_id = exiftool.job_id.clone();
        jobs.push(exiftool);

        match media_type {
            MediaType::Image => {
                has_images = true;
                jobs.push(new_job(
                    JobQueueKind::Thumbnail,
                    JobPriority::Normal,
                    payload.clone(),
                    Some(&exiftool_id),
                ));
                jobs.push(new_job(
                    JobQueueKind::ImageTagging,
                    JobPriority::Background,
                    payload.clone(),
                    Some(&exiftool_id),
                ));
            }
            MediaType::Video => {
                jobs.push(new_job(
                    JobQueueKind::Ffprobe,
                    JobPriority::High,
                    payload.clone(),
                    Some(&exiftool_id),
                ));
                jobs.push(new_job(
                    JobQueueKind::Thumbnail,
                    JobPriority::Normal,
                    payload.clone(),
                    Some(&exiftool_id),
                ));
                jobs.push(new_job(
                    JobQueueKind::VideoProxy,
                    JobPriority::Low,
                    payload.clone(),
                    None,
                ));
            }
            MediaType::Document => has_docs = true,
            MediaType::Map | MediaType::Unknown => {}
        }

        last_exiftool = Some(exiftool_id);
    }

    if let Some(exiftool_id) = last_exiftool {
        let loc_payload = json!({
            "locid": location.locid,
            "import_id": import_id,
        });

        let gps = new_job(
            JobQueueKind::GpsEnrichment,
            JobPriority::Normal,
            loc_payload.clone(),
            Some(&exiftool_id),
        );
        let gps_job_id = gps.job_id.clone();
        jobs.push(gps);

        jobs.push(new_job(
            JobQueueKind::LivePhoto,
            JobPriority::Normal,
            loc_payload.clone(),
            Some(&exiftool_id),
        ));

        if has_docs {
            jobs.push(new_job(
                JobQueueKind::SrtTelemetry,
                JobPriority::Normal,
                loc_payload.clone(),
                Some(&exiftool_id),
            ));
        }

        let gps_id = Some(gps_job_id.as_str());
        jobs.push(new_job(
            JobQueueKind::LocationStats,
            JobPriority::Background,
            loc_payload.clone(),
            gps_id,
        ));
        jobs.push(new_job(
            JobQueueKind::Bagit,
            JobPriority::Background,
            loc_payload.clone(),
            gps_id,
        ));
        if has_images {
            jobs.push(new_job(
                JobQueueKind::LocationTagAggregation,
                JobPriority::Background,
                loc_payload,
                gps_id,
            ));
        }
    }

    jobs
}
