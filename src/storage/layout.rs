//! Content-addressed archive layout
//!
//! The archive path of a file is a pure function of the location, media
//! type, content hash, and extension:
//!
//! ```text
//! <archive>/locations/<STATE>/<LOCID>/data/org-<type>/<hash><ext>
//! <archive>/locations/<STATE>/<LOCID>/data/sloc-<SUBID>/org-<type>/<hash><ext>
//! ```
//!
//! `<STATE>` is the uppercase two-letter state code or `XX`, `<hash>` is a
//! truncated BLAKE3 digest, and `<ext>` includes the leading dot.

use crate::config::LocationInfo;
use crate::pipeline::MediaType;
use std::path::{Path, PathBuf};

/// Length of a content hash in hex characters.
///
/// Truncating BLAKE3 to 16 hex characters (64 bits) keeps addresses short
/// for paths and UI. The birthday bound puts collisions around 2^32 files,
/// comfortably above any personal archive; embedders who expect more than
/// ~10^9 files should widen addresses using the full digest from
/// [`crate::pipeline::file_digest`].
pub const HASH_HEX_LEN: usize = 16;

/// The `<STATE>` path segment for a location
fn state_segment(location: &LocationInfo) -> String {
    match location.address_state.as_deref() {
        Some(state) if state.len() == 2 => state.to_uppercase(),
        _ => "XX".to_string(),
    }
}

/// Directory that holds every archived file of one media type at a location
pub fn archive_media_dir(
    archive_base: &Path,
    location: &LocationInfo,
    media_type: MediaType,
) -> PathBuf {
    let mut dir = archive_base
        .join("locations")
        .join(state_segment(location))
        .join(&location.locid)
        .join("data");

    if let Some(subid) = &location.subid {
        dir = dir.join(format!("sloc-{subid}"));
    }

    dir.join(format!("org-{}", media_type.org_code()))
}

/// Full archive path for one file.
///
/// `extension` includes the leading dot (or is empty for extensionless
/// files); `hash` must already be truncated to [`HASH_HEX_LEN`].
pub fn archive_file_path(
    archive_base: &Path,
    location: &LocationInfo,
    media_type: MediaType,
    hash: &str,
    extension: &str,
) -> PathBuf {
    archive_media_dir(archive_base, location, media_type).join(format!("{hash}{extension}"))
}
