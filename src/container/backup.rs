use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{RuntimeError, RuntimeResult};

/// A finished data-directory archive
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// `<identifier>_<timestamp>.tar.gz`, millisecond resolution.
pub fn archive_name(identifier: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.tar.gz", identifier, at.format("%Y%m%dT%H%M%S%3fZ"))
}

/// Archive `data_dir` into `backups_root`. The archive's entries are
/// relative to `data_dir`.
pub async fn create_backup(data_dir: &Path, backups_root: &Path, identifier: &str) -> RuntimeResult<BackupInfo> {
    let data_dir = data_dir.to_path_buf();
    let backups_root = backups_root.to_path_buf();
    let identifier = identifier.to_string();

    tokio::task::spawn_blocking(move || write_archive(&data_dir, &backups_root, &identifier))
        .await
        .map_err(|e| RuntimeError::Backup(format!("backup task failed: {}", e)))?
}

fn write_archive(data_dir: &Path, backups_root: &Path, identifier: &str) -> RuntimeResult<BackupInfo> {
    if !data_dir.is_dir() {
        return Err(RuntimeError::Backup(format!(
            "data directory {} does not exist",
            data_dir.display()
        )));
    }
    fs::create_dir_all(backups_root)?;

    let created_at = Utc::now();
    let path = backups_root.join(archive_name(identifier, created_at));
    // create_new: never overwrite an existing archive
    let file = fs::OpenOptions::new().write(true).create_new(true).open(&path)?;

    let result = (|| -> RuntimeResult<()> {
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        builder.append_dir_all(".", data_dir)?;
        builder.into_inner()?.finish()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&path);
        return Err(e);
    }

    let size_bytes = fs::metadata(&path)?.len();
    info!("Backed up {} to {} ({} bytes)", identifier, path.display(), size_bytes);

    Ok(BackupInfo {
        path,
        size_bytes,
        created_at,
    })
}
