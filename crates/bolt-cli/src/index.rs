use bolt_core::{repository::RepoIndexer, BoltResult};
use bolt_utils::{lock::FileLock, path::resolve_path};
use nu_ansi_term::Color::{Blue, Green};
use tracing::{debug, info};

use crate::utils::Colored;

pub fn update_index(repo: &str, force_full: bool) -> BoltResult<()> {
    let repo_dir = resolve_path(repo)?;

    let lock = match FileLock::try_acquire_for_dir(&repo_dir)? {
        Some(lock) => lock,
        None => {
            info!(
                "waiting for another indexer to finish with {}",
                repo_dir.display()
            );
            FileLock::acquire_for_dir(&repo_dir)?
        }
    };
    debug!("holding {}", lock.path().display());

    let index = RepoIndexer::new(&repo_dir)
        .force_full(force_full)
        .update_package_index()?;

    if index.is_empty() {
        info!("{} contains no packages", Colored(Blue, repo_dir.display()));
    } else {
        info!(
            "{} {} records in {}",
            Colored(Green, "indexed"),
            index.len(),
            Colored(Blue, repo_dir.display())
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn test_update_waits_for_held_lock() {
        let repo = tempfile::tempdir().unwrap();
        let repo_path = repo.path().to_string_lossy().into_owned();
        let held = FileLock::acquire_for_dir(repo.path()).unwrap();

        let handle = thread::spawn(move || update_index(&repo_path, false).is_ok());

        thread::sleep(Duration::from_millis(100));
        assert!(!handle.is_finished());
        drop(held);

        assert!(handle.join().unwrap());
        assert!(!repo.path().join("Packages.gz").exists());
    }
}
