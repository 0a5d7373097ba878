use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sysinfo::{Pid, System};
use tokio::sync::Notify;

use crate::errors::{AppError, AppResult};

/// PID lock guarding the schedule against a second scheduler process.
/// Removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

/// Lock file path for a schedule document: `schedule.json` -> `schedule.lock`.
pub fn lock_path_for(schedule_file: &Path) -> PathBuf {
    schedule_file.with_extension("lock")
}

/// Take the lock, or fail when a live process already holds it.
pub fn acquire(lock_file: &Path) -> AppResult<InstanceLock> {
    if lock_file.exists() {
        if let Some(pid) = read_pid(lock_file) {
            if pid != std::process::id() && is_our_process(pid) {
                return Err(AppError::Config(format!(
                    "Another scheduler is already running (PID: {}, lock: {})",
                    pid,
                    lock_file.display()
                )));
            }
        }

        // Lock exists but the process is dead - clean it up
        log::info!("Removing stale lock file {}", lock_file.display());
        let _ = fs::remove_file(lock_file);
    }

    if let Some(parent) = lock_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let current_pid = std::process::id();
    fs::write(lock_file, current_pid.to_string())?;
    log::info!("Created lock file with PID: {}", current_pid);

    Ok(InstanceLock {
        path: lock_file.to_path_buf(),
    })
}

fn read_pid(lock_file: &Path) -> Option<u32> {
    fs::read_to_string(lock_file).ok()?.trim().parse::<u32>().ok()
}

fn is_our_process(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes();

    match system.process(Pid::from(pid as usize)) {
        Some(process) => {
            let process_name = process.name().to_lowercase();
            process_name.contains("story-publisher") || process_name.contains("story_publisher")
        }
        None => false,
    }
}

fn remove_lock_file(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Failed to remove lock file: {}", e);
        } else {
            log::info!("Cleaned up lock file");
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        remove_lock_file(&self.path);
    }
}

/// First Ctrl+C asks the scheduler loop to stop at its next suspension
/// point; a second one removes the lock and exits immediately.
pub fn register_shutdown_handler(lock_file: PathBuf, shutdown: Arc<Notify>) -> AppResult<()> {
    let requested = AtomicBool::new(false);

    ctrlc::set_handler(move || {
        if requested.swap(true, Ordering::SeqCst) {
            log::warn!("Second interrupt, exiting now");
            remove_lock_file(&lock_file);
            std::process::exit(130);
        }
        log::info!("Received Ctrl+C, stopping after the current task...");
        shutdown.notify_one();
    })
    .map_err(|e| AppError::Internal(format!("Error setting Ctrl-C handler: {}", e)))
}
