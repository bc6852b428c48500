//! Multi-pass wipe execution.
//!
//! A [`WipeEngine`] runs one [`WipeJob`] to completion on the calling
//! thread. Within a pass, files are overwritten in parallel on a bounded
//! rayon pool; passes themselves are strictly sequential. After the
//! configured passes a zero-fill pass always runs, followed by optional
//! verification and deletion.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::control::{JobControl, JobState, WipeHandle};
use crate::methods::WipeMethod;
use crate::overwrite::{fill_buffer, overwrite_file, Overwrite};
use crate::target::WipeTarget;
use crate::verify::verify_with_block_size;
use securevault_common::{Error, JobId, NoProgress, Result, WipeSettings};

/// Receives pass-level progress from a running wipe.
pub trait WipeObserver: Send + Sync {
    /// Called once before the first pass of a directory or volume wipe.
    fn on_estimate(&self, _total_bytes: u64, _total_passes: usize, _file_count: usize) {}

    /// Called after each configured pass with its 1-based index.
    fn on_pass(&self, _pass: usize, _total_passes: usize) {}
}

impl WipeObserver for NoProgress {}

/// Adapts a closure to [`WipeObserver::on_pass`].
pub struct PassObserver<F>(pub F);

impl<F> WipeObserver for PassObserver<F>
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_pass(&self, pass: usize, total_passes: usize) {
        (self.0)(pass, total_passes)
    }
}

/// A wipe request.
#[derive(Debug, Clone)]
pub struct WipeJob {
    pub id: JobId,
    pub target: WipeTarget,
    pub method: WipeMethod,
    /// Unlink files and remove directories once overwritten.
    pub delete_after: bool,
    /// Read every file back after the final zero pass.
    pub verify: bool,
}

impl WipeJob {
    /// Create a job that deletes the target afterwards and does not verify.
    pub fn new(target: WipeTarget, method: WipeMethod) -> Self {
        Self {
            id: JobId::new(),
            target,
            method,
            delete_after: true,
            verify: false,
        }
    }

    pub fn with_delete_after(mut self, delete_after: bool) -> Self {
        self.delete_after = delete_after;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

/// How a job ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WipeOutcome {
    Completed,
    Cancelled,
}

/// Summary of a finished job.
#[derive(Debug, Clone)]
pub struct WipeReport {
    pub job_id: JobId,
    pub outcome: WipeOutcome,
    pub files: usize,
    pub bytes: u64,
    /// Configured passes that finished (the final zero pass is not counted).
    pub passes_completed: usize,
    pub pass_durations: Vec<Duration>,
    pub verified: bool,
    /// Whether the target path itself is gone. A directory holding skipped
    /// entries survives with only those entries left.
    pub deleted: bool,
}

/// Executes a single wipe job.
pub struct WipeEngine {
    job: WipeJob,
    settings: WipeSettings,
    control: Arc<JobControl>,
}

impl WipeEngine {
    /// Create an engine for `job` and a handle to control it.
    pub fn new(job: WipeJob, settings: WipeSettings) -> (Self, WipeHandle) {
        let control = Arc::new(JobControl::new());
        let handle = WipeHandle::new(control.clone());
        let engine = Self {
            job,
            settings,
            control,
        };
        (engine, handle)
    }

    /// The job this engine runs.
    pub fn job(&self) -> &WipeJob {
        &self.job
    }

    /// Another handle to this engine's job.
    pub fn handle(&self) -> WipeHandle {
        WipeHandle::new(self.control.clone())
    }

    /// Run the job to completion, cancellation or failure.
    ///
    /// Blocks the calling thread. Pause and cancel requests from a
    /// [`WipeHandle`] take effect between buffer writes.
    ///
    /// # Postconditions
    /// - `Completed`: every file was overwritten with each pass pattern and
    ///   then zeros; verified and deleted if requested
    /// - `Cancelled`: nothing was deleted; files hold partially written data
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the job already ran
    /// - `Error::FailedVerification` if a file did not read back as zeros
    /// - I/O errors during overwrite or deletion (the job is marked failed)
    pub fn run(&self, observer: &dyn WipeObserver) -> Result<WipeReport> {
        if self.control.state() != JobState::Pending {
            return Err(Error::InvalidInput(format!(
                "Wipe job {} has already run",
                self.job.id.short()
            )));
        }
        self.control.set_state(JobState::Running);

        let result = self.execute(observer);
        match &result {
            Ok(report) => {
                let state = match report.outcome {
                    WipeOutcome::Completed => JobState::Completed,
                    WipeOutcome::Cancelled => JobState::Cancelled,
                };
                self.control.set_state(state);
                info!(
                    "Wipe {} {}: {} files, {} bytes",
                    self.job.id.short(),
                    state,
                    report.files,
                    report.bytes
                );
            }
            Err(e) => {
                self.control.set_state(JobState::Failed);
                error!("Wipe {} failed: {}", self.job.id.short(), e);
            }
        }
        result
    }

    fn execute(&self, observer: &dyn WipeObserver) -> Result<WipeReport> {
        let target = &self.job.target;
        let method = &self.job.method;
        let files = target.files();
        let total_passes = method.passes();
        let total_bytes = target.total_bytes()?;

        info!(
            "Wipe {} started: {} with {} ({} files, {} bytes)",
            self.job.id.short(),
            target.root().display(),
            method.name(),
            files.len(),
            total_bytes
        );

        let mut report = WipeReport {
            job_id: self.job.id.clone(),
            outcome: WipeOutcome::Cancelled,
            files: files.len(),
            bytes: total_bytes,
            passes_completed: 0,
            pass_durations: Vec::with_capacity(total_passes),
            verified: false,
            deleted: false,
        };

        if target.is_multi_file() {
            observer.on_estimate(total_bytes, total_passes, files.len());
        }

        let pool = self.build_pool()?;
        let buffer_size = self.settings.buffer_size.max(1);

        for pass in 0..total_passes {
            if !self.control.checkpoint() {
                return Ok(report);
            }

            let started = Instant::now();
            let buffer = fill_buffer(method.pattern_for(pass), buffer_size);
            if !self.run_pass(&pool, files, &buffer)? {
                return Ok(report);
            }

            let elapsed = started.elapsed();
            debug!(
                "Wipe {} pass {}/{} finished in {:?}",
                self.job.id.short(),
                pass + 1,
                total_passes,
                elapsed
            );
            report.pass_durations.push(elapsed);
            report.passes_completed = pass + 1;
            observer.on_pass(pass + 1, total_passes);
        }

        if !self.control.checkpoint() {
            return Ok(report);
        }
        let zeros = fill_buffer(&[0x00], buffer_size);
        if !self.run_pass(&pool, files, &zeros)? {
            return Ok(report);
        }
        debug!("Wipe {} final zero pass finished", self.job.id.short());

        if self.job.verify {
            for path in files {
                verify_with_block_size(path, 0x00, self.settings.verify_block_size)?;
            }
            report.verified = true;
        }

        // Past this point a cancel request is refused.
        if !self.control.commit() {
            return Ok(report);
        }

        if self.job.delete_after {
            if target.is_deletable() {
                self.delete()?;
                report.deleted = !target.root().exists();
            } else {
                warn!(
                    "Volume {} is never deleted; journal artifacts were overwritten in place",
                    target.root().display()
                );
            }
        }

        report.outcome = WipeOutcome::Completed;
        Ok(report)
    }

    fn build_pool(&self) -> Result<ThreadPool> {
        let workers = self
            .settings
            .effective_workers()
            .min(self.job.target.files().len().max(1));
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("wipe-worker-{}", index))
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to start wipe workers: {}", e)))
    }

    /// Overwrite every file with `buffer`. Returns `false` if cancellation
    /// interrupted any file.
    fn run_pass(&self, pool: &ThreadPool, files: &[PathBuf], buffer: &[u8]) -> Result<bool> {
        let control = self.control.as_ref();
        let results = pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    overwrite_file(path, buffer, control).map_err(|e| {
                        error!("Overwriting {} failed: {}", path.display(), e);
                        e
                    })
                })
                .collect::<Result<Vec<Overwrite>>>()
        })?;

        Ok(results
            .iter()
            .all(|outcome| matches!(outcome, Overwrite::Complete(_))))
    }

    fn delete(&self) -> Result<()> {
        match &self.job.target {
            WipeTarget::File(path) => fs::remove_file(path)?,
            WipeTarget::Directory {
                files, links, dirs, ..
            } => {
                for path in files.iter().chain(links) {
                    fs::remove_file(path)?;
                }
                for dir in dirs {
                    fs::remove_dir(dir)?;
                }
            }
            WipeTarget::Volume { .. } => {}
        }
        debug!("Wipe {} removed target entries", self.job.id.short());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::thread;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        estimates: Mutex<Vec<(u64, usize, usize)>>,
        passes: Mutex<Vec<(usize, usize)>>,
    }

    impl WipeObserver for Recorder {
        fn on_estimate(&self, total_bytes: u64, total_passes: usize, file_count: usize) {
            self.estimates
                .lock()
                .push((total_bytes, total_passes, file_count));
        }

        fn on_pass(&self, pass: usize, total_passes: usize) {
            self.passes.lock().push((pass, total_passes));
        }
    }

    fn small_settings() -> WipeSettings {
        WipeSettings {
            buffer_size: 1024,
            workers: 2,
            verify_block_size: 512,
        }
    }

    #[test]
    fn test_file_wipe_leaves_zeros() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret.txt");
        fs::write(&path, vec![0x5Au8; 5000]).unwrap();

        let job = WipeJob::new(
            WipeTarget::resolve(&path).unwrap(),
            WipeMethod::find("DoD 5220.22-M (3 Passes)").unwrap(),
        )
        .with_delete_after(false)
        .with_verify(true);
        let (engine, handle) = WipeEngine::new(job, small_settings());

        let recorder = Recorder::default();
        let report = engine.run(&recorder).unwrap();

        assert_eq!(report.outcome, WipeOutcome::Completed);
        assert_eq!(report.passes_completed, 3);
        assert_eq!(report.pass_durations.len(), 3);
        assert!(report.verified);
        assert!(!report.deleted);
        assert_eq!(handle.state(), JobState::Completed);
        assert_eq!(fs::read(&path).unwrap(), vec![0u8; 5000]);

        assert_eq!(*recorder.passes.lock(), vec![(1, 3), (2, 3), (3, 3)]);
        assert!(recorder.estimates.lock().is_empty());
    }

    #[test]
    fn test_directory_zero_fill_deletes_everything() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("a"), vec![1u8; 3000]).unwrap();
        fs::write(root.join("b"), vec![2u8; 10]).unwrap();
        fs::write(root.join("nested/c"), vec![3u8; 2048]).unwrap();

        let job = WipeJob::new(WipeTarget::resolve(&root).unwrap(), WipeMethod::zero_fill());
        let (engine, _handle) = WipeEngine::new(job, small_settings());

        let recorder = Recorder::default();
        let report = engine.run(&recorder).unwrap();

        assert_eq!(report.outcome, WipeOutcome::Completed);
        assert!(report.deleted);
        assert!(!root.exists());
        assert_eq!(*recorder.estimates.lock(), vec![(5058, 1, 3)]);
        assert_eq!(*recorder.passes.lock(), vec![(1, 1)]);
    }

    #[test]
    fn test_cancel_before_run_keeps_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keep.bin");
        fs::write(&path, vec![0x77u8; 100]).unwrap();

        let job = WipeJob::new(WipeTarget::resolve(&path).unwrap(), WipeMethod::zero_fill());
        let (engine, handle) = WipeEngine::new(job, small_settings());
        assert!(handle.cancel());

        let report = engine.run(&NoProgress).unwrap();
        assert_eq!(report.outcome, WipeOutcome::Cancelled);
        assert_eq!(report.passes_completed, 0);
        assert_eq!(handle.state(), JobState::Cancelled);
        assert_eq!(fs::read(&path).unwrap(), vec![0x77u8; 100]);
    }

    #[test]
    fn test_cancel_between_passes_skips_deletion() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.bin");
        fs::write(&path, vec![0x77u8; 100]).unwrap();

        let job = WipeJob::new(
            WipeTarget::resolve(&path).unwrap(),
            WipeMethod::find("Brigadier (5 Passes)").unwrap(),
        );
        let (engine, handle) = WipeEngine::new(job, small_settings());

        let observer = PassObserver(move |pass: usize, _total: usize| {
            if pass == 2 {
                handle.cancel();
            }
        });
        let report = engine.run(&observer).unwrap();

        assert_eq!(report.outcome, WipeOutcome::Cancelled);
        assert_eq!(report.passes_completed, 2);
        assert!(!report.deleted);
        // Second Brigadier pass wrote 0xFF and no zero pass followed.
        assert_eq!(fs::read(&path).unwrap(), vec![0xFFu8; 100]);
    }

    #[test]
    fn test_pause_then_resume_completes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paused.bin");
        fs::write(&path, vec![0x42u8; 4096]).unwrap();

        let job = WipeJob::new(WipeTarget::resolve(&path).unwrap(), WipeMethod::zero_fill())
            .with_delete_after(false);
        let (engine, handle) = WipeEngine::new(job, small_settings());
        assert!(handle.pause());

        let worker = thread::spawn(move || engine.run(&NoProgress));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(handle.state(), JobState::Paused);
        assert_eq!(fs::read(&path).unwrap(), vec![0x42u8; 4096]);

        assert!(handle.resume());
        let report = worker.join().unwrap().unwrap();
        assert_eq!(report.outcome, WipeOutcome::Completed);
        assert_eq!(fs::read(&path).unwrap(), vec![0u8; 4096]);
    }

    #[test]
    fn test_volume_is_never_deleted() {
        let dir = TempDir::new().unwrap();
        let journal = dir.path().join(".journal");
        fs::write(&journal, vec![0xEEu8; 777]).unwrap();

        let target = WipeTarget::Volume {
            root: dir.path().to_path_buf(),
            files: vec![journal.clone()],
        };
        let job = WipeJob::new(target, WipeMethod::zero_fill());
        let (engine, _handle) = WipeEngine::new(job, small_settings());

        let recorder = Recorder::default();
        let report = engine.run(&recorder).unwrap();

        assert_eq!(report.outcome, WipeOutcome::Completed);
        assert!(!report.deleted);
        assert_eq!(fs::read(&journal).unwrap(), vec![0u8; 777]);
        assert_eq!(*recorder.estimates.lock(), vec![(777, 1, 1)]);
    }

    #[test]
    fn test_retained_root_is_not_reported_deleted() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("stick");
        fs::create_dir_all(root.join("lost+found")).unwrap();
        fs::write(root.join("notes.txt"), vec![9u8; 64]).unwrap();

        let job = WipeJob::new(WipeTarget::resolve(&root).unwrap(), WipeMethod::zero_fill());
        let (engine, _handle) = WipeEngine::new(job, small_settings());
        let report = engine.run(&NoProgress).unwrap();

        assert_eq!(report.outcome, WipeOutcome::Completed);
        assert!(!report.deleted);
        assert!(!root.join("notes.txt").exists());
        assert!(root.join("lost+found").exists());
    }

    #[test]
    fn test_accepted_cancel_never_deletes() {
        for _ in 0..20 {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("race.bin");
            fs::write(&path, vec![0x33u8; 2048]).unwrap();

            let job = WipeJob::new(WipeTarget::resolve(&path).unwrap(), WipeMethod::zero_fill());
            let (engine, handle) = WipeEngine::new(job, small_settings());

            let canceller = thread::spawn(move || {
                while handle.state() == JobState::Pending {
                    thread::yield_now();
                }
                loop {
                    if handle.cancel() {
                        return true;
                    }
                    if handle.state().is_terminal() {
                        return false;
                    }
                    thread::yield_now();
                }
            });

            let report = engine.run(&NoProgress).unwrap();
            let accepted = canceller.join().unwrap();

            if accepted {
                assert_eq!(report.outcome, WipeOutcome::Cancelled);
                assert!(!report.deleted);
                assert!(path.exists());
            } else {
                assert_eq!(report.outcome, WipeOutcome::Completed);
                assert!(report.deleted);
                assert!(!path.exists());
            }
        }
    }

    #[test]
    fn test_run_twice_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("once.bin");
        fs::write(&path, b"x").unwrap();

        let job = WipeJob::new(WipeTarget::resolve(&path).unwrap(), WipeMethod::zero_fill())
            .with_delete_after(false);
        let (engine, _handle) = WipeEngine::new(job, small_settings());

        engine.run(&NoProgress).unwrap();
        assert!(matches!(
            engine.run(&NoProgress),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_missing_file_fails_job() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vanishing.bin");
        fs::write(&path, b"x").unwrap();

        let job = WipeJob::new(WipeTarget::resolve(&path).unwrap(), WipeMethod::zero_fill());
        fs::remove_file(&path).unwrap();
        let (engine, handle) = WipeEngine::new(job, small_settings());

        assert!(engine.run(&NoProgress).is_err());
        assert_eq!(handle.state(), JobState::Failed);
    }
}
