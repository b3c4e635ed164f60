//! Multi-connection tests: every thread opens its own `Database` on the same
//! file, the same way separate worker processes would.

use reviewq::{Database, JobId, StoreError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;

fn seeded_db(jobs: usize) -> anyhow::Result<(tempfile::TempDir, PathBuf)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("queue.db");
    let db = Database::open_at(&path)?;
    let repo = db.repo_repo().get_or_create("/work/app")?;
    for i in 0..jobs {
        db.job_repo().enqueue(repo.id, None, &format!("ref-{i}"), "codex")?;
    }
    Ok((dir, path))
}

/// Claim once, retrying only on the transient busy error.
fn claim_once(db: &Database, worker: &str) -> Result<Option<JobId>, StoreError> {
    loop {
        match db.job_repo().claim(worker) {
            Ok(job) => return Ok(job.map(|j| j.id)),
            Err(err) if err.is_retryable() => thread::yield_now(),
            Err(err) => return Err(err),
        }
    }
}

fn spawn_workers<F>(path: &Path, workers: usize, work: F) -> Vec<Vec<Option<JobId>>>
where
    F: Fn(&Database, &str) -> Vec<Option<JobId>> + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(workers));
    let work = Arc::new(work);
    let handles: Vec<_> = (0..workers)
        .map(|n| {
            let path = path.to_path_buf();
            let barrier = barrier.clone();
            let work = work.clone();
            thread::spawn(move || {
                let db = Database::open_at(&path).expect("open worker database");
                barrier.wait();
                (*work)(&db, &format!("worker-{n}"))
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|h| h.join().expect("worker thread panicked"))
        .collect()
}

#[test]
fn test_each_job_claimed_by_exactly_one_caller() -> anyhow::Result<()> {
    const JOBS: usize = 8;
    const WORKERS: usize = 12;
    let (_dir, path) = seeded_db(JOBS)?;

    let results = spawn_workers(&path, WORKERS, |db, worker| {
        vec![claim_once(db, worker).expect("claim")]
    });

    let outcomes: Vec<_> = results.into_iter().flatten().collect();
    let claimed: Vec<JobId> = outcomes.iter().flatten().copied().collect();
    let unique: HashSet<_> = claimed.iter().copied().collect();

    assert_eq!(claimed.len(), JOBS);
    assert_eq!(unique.len(), JOBS);
    assert_eq!(outcomes.iter().filter(|o| o.is_none()).count(), WORKERS - JOBS);

    let db = Database::open_at(&path)?;
    let counts = db.job_repo().counts()?;
    assert_eq!(counts.running, JOBS as u64);
    assert_eq!(counts.queued, 0);
    Ok(())
}

#[test]
fn test_draining_workers_never_share_a_job() -> anyhow::Result<()> {
    const JOBS: usize = 60;
    const WORKERS: usize = 6;
    let (_dir, path) = seeded_db(JOBS)?;

    let results = spawn_workers(&path, WORKERS, |db, worker| {
        let mut mine = Vec::new();
        while let Some(id) = claim_once(db, worker).expect("claim") {
            db.job_repo()
                .complete(id, "codex", "prompt", worker)
                .expect("complete claimed job");
            mine.push(Some(id));
        }
        mine
    });

    let claimed: Vec<JobId> = results.into_iter().flatten().flatten().collect();
    let unique: HashSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), JOBS);
    assert_eq!(unique.len(), JOBS);

    let db = Database::open_at(&path)?;
    let counts = db.job_repo().counts()?;
    assert_eq!(counts.done, JOBS as u64);
    assert_eq!(counts.total(), JOBS as u64);
    for id in claimed {
        let review = db.review_repo().find_by_job_id(id)?.expect("one review per job");
        let job = db.job_repo().find_by_id(id)?.expect("job");
        assert_eq!(job.worker_id.as_deref(), Some(review.output.as_str()));
    }
    Ok(())
}

#[test]
fn test_concurrent_get_or_create_converges() -> anyhow::Result<()> {
    let (_dir, path) = seeded_db(0)?;
    const WORKERS: usize = 8;

    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let path = path.clone();
            let barrier = barrier.clone();
            thread::spawn(move || -> Result<(i64, i64), StoreError> {
                let db = Database::open_at(&path)?;
                barrier.wait();
                loop {
                    let attempt = db.repo_repo().get_or_create("/work/shared").and_then(|repo| {
                        db.commit_repo()
                            .get_or_create(repo.id, "feedface", "A", "S", chrono::Utc::now())
                            .map(|commit| (repo.id, commit.id))
                    });
                    match attempt {
                        Err(err) if err.is_retryable() => thread::yield_now(),
                        other => return other,
                    }
                }
            })
        })
        .collect();

    let ids: HashSet<(i64, i64)> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect::<Result<_, _>>()?;
    assert_eq!(ids.len(), 1);
    Ok(())
}
