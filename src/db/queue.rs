//! Job queue table access
//!
//! The finalizer inserts planned jobs here after the media transaction
//! commits. Runners poll this table; the core never updates job status.

use crate::error::Result;
use crate::jobs::{JobPriority, JobQueueKind, JobRecord};
use chrono::Utc;
use rusqlite::{params, Connection};

/// Insert a batch of planned jobs in one transaction
pub fn enqueue_jobs(conn: &mut Connection, jobs: &[JobRecord]) -> Result<u64> {
    let tx = conn.transaction()?;
    let created_at = Utc::now().to_rfc3339();
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO job_queue (job_id, queue, priority, payload, depends_on, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
        )?;
        for job in jobs {
            stmt.execute(params![
                job.job_id,
                job.queue.as_str(),
                job.priority.as_str(),
                job.payload.to_string(),
                job.depends_on,
                created_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(jobs.len() as u64)
}

/// Load every queued job in insertion order (test and maintenance helper)
pub fn queued_jobs(conn: &Connection) -> Result<Vec<JobRecord>> {
    let mut stmt = conn.prepare(
        "SELECT job_id, queue, priority, payload, depends_on FROM job_queue ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        let queue: String = row.get(1)?;
        let priority: String = row.get(2)?;
        let payload: String = row.get(3)?;
        Ok((
            row.get::<_, String>(0)?,
            queue,
            priority,
            payload,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut jobs = Vec::new();
    for row in rows {
        let (job_id, queue, priority, payload, depends_on) = row?;
        let (Some(queue), Some(priority)) =
            (JobQueueKind::parse(&queue), JobPriority::parse(&priority))
        else {
            tracing::warn!(%job_id, "skipping job row with unknown queue or priority");
            continue;
        };
        jobs.push(JobRecord {
            job_id,
            queue,
            priority,
            payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
            depends_on,
        });
    }
    Ok(jobs)
}
