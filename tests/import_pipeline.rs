//! Whole-pipeline scenarios: fresh imports, duplicates, inline hashing,
//! corruption rollback, lock contention, cancellation, and resume.

use mediavault::config::{ImportConfig, ImportOptions, ImportUser, LocationInfo};
use mediavault::db::{
    self, init_schema, open_pool, queued_jobs, DbPool, ImportSession, SessionStore, StageColumn,
};
use mediavault::jobs::JobQueueKind;
use mediavault::pipeline::{
    self, content_hash, hash_bytes, CopierOptions, FinalizerOptions, ImportEngine, MediaType,
    SessionStatus, StageContext, ValidatorOptions,
};
use mediavault::progress::{ProgressCallback, ProgressTracker};
use mediavault::storage::{archive_file_path, find_orphans};
use mediavault::system::HardwareProfile;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const GIB: u64 = 1024 * 1024 * 1024;

struct Fixture {
    _dir: TempDir,
    source_dir: PathBuf,
    archive_base: PathBuf,
    pool: DbPool,
    config: ImportConfig,
}

fn fixture() -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = TempDir::new().unwrap();
    let pool = open_pool(&dir.path().join("mediavault.sqlite")).unwrap();
    init_schema(&pool.get().unwrap()).unwrap();

    let source_dir = dir.path().join("source");
    std::fs::create_dir_all(&source_dir).unwrap();
    let archive_base = dir.path().join("archive");

    let config = ImportConfig::new(&archive_base, pool.clone())
        .with_hardware(HardwareProfile::from_resources(4, 16 * GIB));

    Fixture {
        _dir: dir,
        source_dir,
        archive_base,
        pool,
        config,
    }
}

fn location() -> LocationInfo {
    LocationInfo::new("aaaaaaaaaaaaaaaa", Some("NY"))
}

fn options() -> ImportOptions {
    ImportOptions::new(location(), ImportUser::new("importer-1"))
}

fn write_source(fixture: &Fixture, name: &str, contents: &[u8]) -> PathBuf {
    let path = fixture.source_dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn stage_ctx() -> StageContext {
    StageContext::new(Arc::new(ProgressTracker::new("stage-test", None)), Vec::new())
}

fn local_copier_options(fixture: &Fixture) -> CopierOptions {
    CopierOptions {
        archive_base: fixture.archive_base.clone(),
        location: location(),
        workers: 2,
        buffer_size: 64 * 1024,
        operation_delay: Duration::ZERO,
        network: false,
    }
}

fn archived_file_count(archive_base: &Path) -> usize {
    walkdir::WalkDir::new(archive_base)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

#[test]
fn local_single_image_import() {
    let fixture = fixture();
    let contents = vec![0xC3u8; 4 * 1024];
    let source = write_source(&fixture, "a.jpg", &contents);
    let hash = hash_bytes(&contents);

    let engine = ImportEngine::new(fixture.config.clone());
    let result = engine.import(&[source.clone()], &options());

    assert_eq!(result.status, SessionStatus::Completed, "{:?}", result.error);
    assert!(result.is_success());

    let scan = result.scan_result.as_ref().unwrap();
    assert_eq!(scan.total_files, 1);
    assert_eq!(scan.total_bytes, contents.len() as u64);

    let hash_result = result.hash_result.as_ref().unwrap();
    assert_eq!(hash_result.total_hashed, 1);
    assert_eq!(hash_result.total_duplicates, 0);

    let copy = result.copy_result.as_ref().unwrap();
    assert_eq!(copy.total_copied, 1);
    assert_eq!(copy.total_bytes, contents.len() as u64);

    let validation = result.validation_result.as_ref().unwrap();
    assert_eq!(validation.total_valid, 1);
    assert_eq!(validation.total_rolled_back, 0);

    let finalization = result.finalization_result.as_ref().unwrap();
    assert_eq!(finalization.total_finalized, 1);
    assert!(finalization.import_record_id.is_some());

    // Layout purity and integrity: the file sits at the computed content
    // address and its bytes re-hash to the recorded hash.
    let expected_path = archive_file_path(
        &fixture.archive_base,
        &location(),
        MediaType::Image,
        &hash,
        ".jpg",
    );
    assert!(expected_path.exists());
    assert_eq!(content_hash(&expected_path).unwrap(), hash);

    let conn = fixture.pool.get().unwrap();
    assert_eq!(db::media_row_count(&conn, MediaType::Image).unwrap(), 1);
    let (img_count, auth_imp): (i64, String) = conn
        .query_row(
            "SELECT img_count, auth_imp FROM imports",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(img_count, 1);
    assert_eq!(auth_imp, "importer-1");

    // Per-file jobs plus the five location aggregates.
    let jobs = queued_jobs(&conn).unwrap();
    let kinds: Vec<JobQueueKind> = jobs.iter().map(|j| j.queue).collect();
    assert_eq!(jobs.len(), 8);
    for expected in [
        JobQueueKind::Exiftool,
        JobQueueKind::Thumbnail,
        JobQueueKind::ImageTagging,
        JobQueueKind::GpsEnrichment,
        JobQueueKind::LivePhoto,
        JobQueueKind::LocationStats,
        JobQueueKind::Bagit,
        JobQueueKind::LocationTagAggregation,
    ] {
        assert!(kinds.contains(&expected), "missing {expected:?}");
    }

    // No phantom rows in either direction.
    assert!(find_orphans(&fixture.archive_base, &fixture.pool)
        .unwrap()
        .is_empty());

    let session = SessionStore::new(fixture.pool.clone())
        .load(&result.session_id)
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(!session.can_resume);
    assert_eq!(session.last_step, 5);
}

#[test]
fn reimport_of_known_content_is_a_duplicate() {
    let fixture = fixture();
    let contents = b"the same four megabytes".to_vec();
    let source = write_source(&fixture, "a.jpg", &contents);

    let engine = ImportEngine::new(fixture.config.clone());
    let first = engine.import(&[source.clone()], &options());
    assert!(first.is_success());

    let second = engine.import(&[source], &options());
    assert!(second.is_success());

    let hash_result = second.hash_result.as_ref().unwrap();
    assert_eq!(hash_result.total_duplicates, 1);
    assert_eq!(
        hash_result.files[0].duplicate_in.as_deref(),
        Some("imgs")
    );
    assert_eq!(
        second
            .finalization_result
            .as_ref()
            .unwrap()
            .total_finalized,
        0
    );

    let conn = fixture.pool.get().unwrap();
    assert_eq!(db::media_row_count(&conn, MediaType::Image).unwrap(), 1);
    assert_eq!(archived_file_count(&fixture.archive_base), 1);
    // The empty second batch plans no jobs.
    assert_eq!(queued_jobs(&conn).unwrap().len(), 8);
}

#[test]
fn inline_hash_mode_hashes_while_copying() {
    let fixture = fixture();
    let contents = vec![0x7Eu8; 2 * 1024 * 1024];
    let source = write_source(&fixture, "b.jpg", &contents);

    let engine = ImportEngine::new(fixture.config.clone());
    let mut opts = options();
    opts.force_inline_hash = true;

    let result = engine.import(&[source], &opts);
    assert!(result.is_success(), "{:?}", result.error);

    // The hash stage was skipped entirely.
    let hash_result = result.hash_result.as_ref().unwrap();
    assert_eq!(hash_result.total_hashed, 0);
    assert!(hash_result.files[0].hash.is_none());

    // The copier filled the hash at EOF and the archived bytes agree.
    let copied = &result.copy_result.as_ref().unwrap().files[0];
    let hash = copied.hashed.hash.as_deref().unwrap();
    assert_eq!(hash, hash_bytes(&contents));
    let archive_path = copied.archive_path.as_ref().unwrap();
    assert_eq!(content_hash(archive_path).unwrap(), hash);

    assert_eq!(
        result
            .finalization_result
            .as_ref()
            .unwrap()
            .total_finalized,
        1
    );
}

#[test]
fn post_copy_sweep_drops_inline_duplicates() {
    let fixture = fixture();
    let contents = b"network duplicate bytes".to_vec();
    let source = write_source(&fixture, "c.jpg", &contents);

    let engine = ImportEngine::new(fixture.config.clone());
    let first = engine.import(&[source.clone()], &options());
    assert!(first.is_success());

    let mut opts = options();
    opts.force_inline_hash = true;
    let second = engine.import(&[source], &opts);
    assert!(second.is_success(), "{:?}", second.error);

    let copied = &second.copy_result.as_ref().unwrap().files[0];
    assert!(copied.hashed.is_duplicate);
    assert_eq!(copied.hashed.duplicate_in.as_deref(), Some("imgs"));
    assert_eq!(
        second
            .finalization_result
            .as_ref()
            .unwrap()
            .total_finalized,
        0
    );

    // The re-copied file was swept away; the original archive file stays.
    let conn = fixture.pool.get().unwrap();
    assert_eq!(db::media_row_count(&conn, MediaType::Image).unwrap(), 1);
    assert_eq!(archived_file_count(&fixture.archive_base), 1);
}

#[test]
fn corruption_between_copy_and_validate_rolls_back() {
    let fixture = fixture();
    let contents = b"bytes that will be flipped".to_vec();
    let source = write_source(&fixture, "d.jpg", &contents);
    let ctx = stage_ctx();

    let scan = pipeline::scan(&[source], &fixture.archive_base, &ctx).unwrap();
    let hashed = pipeline::hash_files(scan.files, &fixture.pool, 2, &ctx).unwrap();
    let copied =
        pipeline::copy_files(hashed.files, &local_copier_options(&fixture), &ctx).unwrap();

    let archive_path = copied.files[0].archive_path.clone().unwrap();
    let mut bytes = std::fs::read(&archive_path).unwrap();
    bytes[0] ^= 0xFF;
    std::fs::write(&archive_path, &bytes).unwrap();

    let validation = pipeline::validate_files(
        copied.files,
        &ValidatorOptions {
            workers: 2,
            auto_rollback: true,
            network: false,
        },
        &ctx,
    )
    .unwrap();

    assert_eq!(validation.total_invalid, 1);
    assert_eq!(validation.total_rolled_back, 1);
    assert!(!archive_path.exists());

    let finalization = pipeline::finalize_files(
        validation.files,
        &fixture.pool,
        &FinalizerOptions {
            location: location(),
            user: ImportUser::new("importer-1"),
            notes: None,
        },
        &ctx,
    )
    .unwrap();

    assert_eq!(finalization.total_finalized, 0);
    let conn = fixture.pool.get().unwrap();
    assert_eq!(db::media_row_count(&conn, MediaType::Image).unwrap(), 0);
}

#[test]
fn concurrent_imports_of_one_location_have_a_single_winner() {
    let fixture = fixture();
    let source = write_source(&fixture, "e.jpg", b"contended bytes");

    // Both engines share the same lock table and database.
    let winner = ImportEngine::new(fixture.config.clone());
    let loser = ImportEngine::new(fixture.config.clone());

    let (entered_tx, entered_rx) = crossbeam::channel::bounded::<()>(1);
    let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(1);
    let release_slot = Mutex::new(Some(release_rx));

    // Hold the winner inside the pipeline until the loser has tried.
    let callback: ProgressCallback = Arc::new(move |snapshot| {
        if snapshot.step == 1 {
            if let Some(rx) = release_slot.lock().unwrap().take() {
                let _ = entered_tx.send(());
                let _ = rx.recv();
            }
        }
    });

    let winner_options = options().with_progress(callback);
    let winner_source = source.clone();
    let winner_thread =
        std::thread::spawn(move || winner.import(&[winner_source], &winner_options));

    entered_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("winner never entered the pipeline");

    let loser_result = loser.import(&[source], &options());
    assert_eq!(loser_result.status, SessionStatus::Failed);
    let error = loser_result.error.unwrap().to_lowercase();
    assert!(error.contains("already being imported"), "{error}");
    assert!(loser_result.scan_result.is_none());

    release_tx.send(()).unwrap();
    let winner_result = winner_thread.join().unwrap();
    assert_eq!(winner_result.status, SessionStatus::Completed);

    // The loser left nothing behind.
    let conn = fixture.pool.get().unwrap();
    let sessions: i64 = conn
        .query_row("SELECT COUNT(*) FROM import_sessions", [], |row| row.get(0))
        .unwrap();
    assert_eq!(sessions, 1);
    assert_eq!(db::media_row_count(&conn, MediaType::Image).unwrap(), 1);
    assert_eq!(archived_file_count(&fixture.archive_base), 1);
}

#[test]
fn cancellation_during_copy_leaves_no_half_state() {
    let fixture = fixture();
    let source = write_source(&fixture, "f.jpg", &vec![0x11u8; 256 * 1024]);

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_in_callback = Arc::clone(&cancel);
    let callback: ProgressCallback = Arc::new(move |snapshot| {
        if snapshot.step == 3 {
            cancel_in_callback.store(true, Ordering::SeqCst);
        }
    });

    let engine = ImportEngine::new(fixture.config.clone());
    let opts = options().with_progress(callback).with_cancel(cancel);
    let result = engine.import(&[source], &opts);

    assert_eq!(result.status, SessionStatus::Cancelled);
    assert!(result.finalization_result.is_none());

    // Either both archive file and DB row exist or neither does; a
    // cancelled import produces neither.
    let conn = fixture.pool.get().unwrap();
    assert_eq!(db::media_row_count(&conn, MediaType::Image).unwrap(), 0);
    assert_eq!(archived_file_count(&fixture.archive_base), 0);

    let session = SessionStore::new(fixture.pool.clone())
        .load(&result.session_id)
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(!session.can_resume);
}

#[test]
fn resume_after_crash_at_step_three_finishes_the_import() {
    let fixture = fixture();
    let contents = b"bytes persisted before the crash".to_vec();
    let source = write_source(&fixture, "g.jpg", &contents);
    let hash = hash_bytes(&contents);

    // Drive the first three stages by hand, checkpointing like the
    // orchestrator does, then "crash".
    let session_id = "11111111-2222-3333-4444-555555555555";
    let store = SessionStore::new(fixture.pool.clone());
    store
        .create(&ImportSession::new(
            session_id,
            &location().locid,
            &[source.clone()],
        ))
        .unwrap();

    let ctx = stage_ctx();
    let scan = pipeline::scan(&[source.clone()], &fixture.archive_base, &ctx).unwrap();
    store
        .save_stage(session_id, StageColumn::Scan, &scan, 1)
        .unwrap();
    let hashed = pipeline::hash_files(scan.files.clone(), &fixture.pool, 2, &ctx).unwrap();
    store
        .save_stage(session_id, StageColumn::Hash, &hashed, 2)
        .unwrap();
    let copied =
        pipeline::copy_files(hashed.files.clone(), &local_copier_options(&fixture), &ctx).unwrap();
    store
        .save_stage(session_id, StageColumn::Copy, &copied, 3)
        .unwrap();

    // The source disappearing proves resume never re-runs scan/hash/copy.
    std::fs::remove_file(&source).unwrap();

    let engine = ImportEngine::new(fixture.config.clone());
    let result = engine.resume(session_id, &options());

    assert_eq!(result.status, SessionStatus::Completed, "{:?}", result.error);
    assert_eq!(
        result
            .finalization_result
            .as_ref()
            .unwrap()
            .total_finalized,
        1
    );

    let expected_path = archive_file_path(
        &fixture.archive_base,
        &location(),
        MediaType::Image,
        &hash,
        ".jpg",
    );
    assert!(expected_path.exists());
    assert_eq!(content_hash(&expected_path).unwrap(), hash);

    let conn = fixture.pool.get().unwrap();
    assert_eq!(db::media_row_count(&conn, MediaType::Image).unwrap(), 1);

    let session = store.load(session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(!session.can_resume);
}

#[test]
fn resume_rejects_unknown_and_terminal_sessions() {
    let fixture = fixture();
    let engine = ImportEngine::new(fixture.config.clone());

    let missing = engine.resume("no-such-session", &options());
    assert_eq!(missing.status, SessionStatus::Failed);
    assert!(missing.error.unwrap().contains("Session not found"));

    let source = write_source(&fixture, "h.jpg", b"terminal");
    let done = engine.import(&[source], &options());
    assert!(done.is_success());

    let again = engine.resume(&done.session_id, &options());
    assert_eq!(again.status, SessionStatus::Failed);
    assert!(again.error.unwrap().contains("cannot be resumed"));
}

#[test]
fn progress_reaches_completion_through_weighted_stages() {
    let fixture = fixture();
    let source = write_source(&fixture, "i.jpg", &vec![0x42u8; 8 * 1024]);

    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    let callback: ProgressCallback = Arc::new(move |snapshot| {
        sink.lock().unwrap().push(snapshot);
    });

    let engine = ImportEngine::new(fixture.config.clone());
    let result = engine.import(&[source], &options().with_progress(callback));
    assert!(result.is_success());

    let snapshots = snapshots.lock().unwrap();
    assert!(!snapshots.is_empty());

    // Steps advance monotonically through all five stages.
    let steps: Vec<u8> = snapshots.iter().map(|s| s.step).collect();
    assert!(steps.windows(2).all(|w| w[0] <= w[1]));
    assert!(steps.contains(&1) && steps.contains(&5));

    let last = snapshots.last().unwrap();
    assert_eq!(last.status, SessionStatus::Completed);
    assert_eq!(last.total_steps, 5);
    assert!((last.percent - 100.0).abs() < 0.01);
}

#[test]
fn mixed_media_batch_lands_in_per_type_directories() {
    let fixture = fixture();
    write_source(&fixture, "shot.jpg", b"image bytes");
    write_source(&fixture, "clip.mov", b"video bytes");
    write_source(&fixture, "telemetry.srt", b"1\n00:00 --> 00:01\n");
    write_source(&fixture, "track.gpx", b"<gpx/>");
    write_source(&fixture, "skipme.xyz", b"unknown type");

    let engine = ImportEngine::new(fixture.config.clone());
    let result = engine.import(&[fixture.source_dir.clone()], &options());
    assert!(result.is_success(), "{:?}", result.error);

    let scan = result.scan_result.as_ref().unwrap();
    assert_eq!(scan.total_files, 4, "unknown extension is dropped at scan");

    let finalization = result.finalization_result.as_ref().unwrap();
    assert_eq!(finalization.total_finalized, 4);

    let conn = fixture.pool.get().unwrap();
    for media in MediaType::ARCHIVED {
        assert_eq!(db::media_row_count(&conn, media).unwrap(), 1);
    }

    let data_dir = fixture
        .archive_base
        .join("locations/NY/aaaaaaaaaaaaaaaa/data");
    for dir in ["org-img", "org-vid", "org-doc", "org-map"] {
        assert_eq!(
            std::fs::read_dir(data_dir.join(dir)).unwrap().count(),
            1,
            "{dir}"
        );
    }

    // Docs present: the SRT telemetry aggregate is planned.
    let jobs = queued_jobs(&conn).unwrap();
    assert!(jobs.iter().any(|j| j.queue == JobQueueKind::SrtTelemetry));
}
