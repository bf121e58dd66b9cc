//! Orphan maintenance sweep
//!
//! Best-effort cleanup paths (the post-copy duplicate sweep, crashes between
//! copy and finalize) can leave archive files with no database row. This
//! sweep reports them; deleting is the embedder's decision.

use crate::db::{self, DbPool};
use crate::error::Result;
use crate::pipeline::MediaType;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// List archive files whose content hash has no row in the matching media
/// table.
///
/// Temp files (dot-prefixed) and files outside `org-*` directories are
/// ignored. Unreadable directory entries are skipped with a warning.
pub fn find_orphans(archive_base: &Path, pool: &DbPool) -> Result<Vec<PathBuf>> {
    let root = archive_base.join("locations");
    let mut orphans = Vec::new();

    if !root.exists() {
        return Ok(orphans);
    }

    let conn = pool.get()?;

    for entry in WalkDir::new(&root) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("orphan sweep: unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            continue;
        }

        let Some(media_type) = parent_media_type(entry.path()) else {
            continue;
        };

        let hash: String = name.chars().take_while(|c| *c != '.').collect();
        if hash.len() != crate::storage::HASH_HEX_LEN
            || !hash.chars().all(|c| c.is_ascii_hexdigit())
        {
            continue;
        }

        if !db::hash_exists(&conn, media_type, &hash)? {
            orphans.push(entry.path().to_path_buf());
        }
    }

    Ok(orphans)
}

/// Media type from the enclosing `org-<type>` directory, if any
fn parent_media_type(path: &Path) -> Option<MediaType> {
    let dir_name = path.parent()?.file_name()?.to_string_lossy();
    let code = dir_name.strip_prefix("org-")?;
    MediaType::from_org_code(code)
}
