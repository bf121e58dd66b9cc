//! Downstream job planning
//!
//! The finalizer enqueues typed job records for the background runners
//! (metadata extraction, thumbnailing, tagging). The core only plans and
//! enqueues; execution is a separate subsystem. A job depends on at most
//! one parent and must not start until that parent has succeeded.

mod plan;

pub use plan::*;

use serde::{Deserialize, Serialize};

/// Queue a job is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobQueueKind {
    /// Per-file metadata extraction; everything else chains behind it
    Exiftool,
    /// Per-video stream probing
    Ffprobe,
    /// Per-image/video preview generation
    Thumbnail,
    /// Per-video playback proxy transcode
    VideoProxy,
    /// Per-image ML tagging
    ImageTagging,
    /// Per-location GPS backfill from extracted metadata
    GpsEnrichment,
    /// Per-location RAW+JPEG / Live Photo pairing
    LivePhoto,
    /// Per-location SRT telemetry parsing (when docs were imported)
    SrtTelemetry,
    /// Per-location statistics refresh
    LocationStats,
    /// Per-location BagIt packaging
    Bagit,
    /// Per-location tag rollup (when images were imported)
    LocationTagAggregation,
}

impl JobQueueKind {
    /// Stable queue name stored in the job row
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exiftool => "EXIFTOOL",
            Self::Ffprobe => "FFPROBE",
            Self::Thumbnail => "THUMBNAIL",
            Self::VideoProxy => "VIDEO_PROXY",
            Self::ImageTagging => "IMAGE_TAGGING",
            Self::GpsEnrichment => "GPS_ENRICHMENT",
            Self::LivePhoto => "LIVE_PHOTO",
            Self::SrtTelemetry => "SRT_TELEMETRY",
            Self::LocationStats => "LOCATION_STATS",
            Self::Bagit => "BAGIT",
            Self::LocationTagAggregation => "LOCATION_TAG_AGGREGATION",
        }
    }

    /// Parse the stored queue name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EXIFTOOL" => Some(Self::Exiftool),
            "FFPROBE" => Some(Self::Ffprobe),
            "THUMBNAIL" => Some(Self::Thumbnail),
            "VIDEO_PROXY" => Some(Self::VideoProxy),
            "IMAGE_TAGGING" => Some(Self::ImageTagging),
            "GPS_ENRICHMENT" => Some(Self::GpsEnrichment),
            "LIVE_PHOTO" => Some(Self::LivePhoto),
            "SRT_TELEMETRY" => Some(Self::SrtTelemetry),
            "LOCATION_STATS" => Some(Self::LocationStats),
            "BAGIT" => Some(Self::Bagit),
            "LOCATION_TAG_AGGREGATION" => Some(Self::LocationTagAggregation),
            _ => None,
        }
    }
}

/// Scheduling priority, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobPriority {
    /// Run before anything else (metadata extraction)
    High,
    /// Default tier
    Normal,
    /// Run when the high tiers drain (transcodes)
    Low,
    /// Idle-time work (tagging, packaging, stats)
    Background,
}

impl JobPriority {
    /// Stable priority name stored in the job row
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
            Self::Background => "BACKGROUND",
        }
    }

    /// Parse the stored priority name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HIGH" => Some(Self::High),
            "NORMAL" => Some(Self::Normal),
            "LOW" => Some(Self::Low),
            "BACKGROUND" => Some(Self::Background),
            _ => None,
        }
    }
}

/// One enqueued job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Opaque identifier, also the dependency handle
    pub job_id: String,
    /// Queue the runner picks this job from
    pub queue: JobQueueKind,
    /// Scheduling tier
    pub priority: JobPriority,
    /// Runner-specific arguments
    pub payload: serde_json::Value,
    /// Parent job that must succeed before this one starts
    pub depends_on: Option<String>,
}
