//! Instruction document persistence: backups and atomic writes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::domain::errors::{DomainError, DomainResult};
use crate::infrastructure::fs::{read_optional, write_atomic};
use crate::services::template_composer::WritePlan;

/// Current instruction document, if any.
pub fn read(path: &Path) -> DomainResult<Option<String>> {
    read_optional(path).map_err(|e| DomainError::io(path, e))
}

/// `<file>.<YYYYmmdd-HHMMSS>.bak`, with a counter if that name is taken.
pub fn backup_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = now.format("%Y%m%d-%H%M%S");

    let mut candidate = path.with_file_name(format!("{file_name}.{stamp}.bak"));
    let mut counter = 1;
    while candidate.exists() {
        counter += 1;
        candidate = path.with_file_name(format!("{file_name}.{stamp}-{counter}.bak"));
    }
    candidate
}

/// Carry out a write plan. A legacy document is copied to a backup first;
/// the backup path is returned.
pub fn write(path: &Path, plan: &WritePlan, now: DateTime<Utc>) -> DomainResult<Option<PathBuf>> {
    let backup = if plan.needs_backup() {
        match read(path)? {
            Some(original) => {
                let backup = backup_path(path, now);
                write_atomic(&backup, original.as_bytes())
                    .map_err(|e| DomainError::io(&backup, e))?;
                tracing::info!(
                    path = %path.display(),
                    backup = %backup.display(),
                    "backed up unmanaged instruction document before replacing it"
                );
                Some(backup)
            }
            None => None,
        }
    } else {
        None
    };

    write_atomic(path, plan.document().as_bytes()).map_err(|e| DomainError::io(path, e))?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_backup_path_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CLAUDE.md");
        assert_eq!(
            backup_path(&path, fixed_time()),
            dir.path().join("CLAUDE.md.20240305-140709.bak")
        );

        std::fs::write(dir.path().join("CLAUDE.md.20240305-140709.bak"), "x").unwrap();
        assert_eq!(
            backup_path(&path, fixed_time()),
            dir.path().join("CLAUDE.md.20240305-140709-2.bak")
        );
    }

    #[test]
    fn test_legacy_write_backs_up_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CLAUDE.md");
        std::fs::write(&path, "hand written\n").unwrap();

        let plan = WritePlan::MigrateLegacy {
            document: "managed\n".to_string(),
        };
        let backup = write(&path, &plan, fixed_time()).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "hand written\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "managed\n");
    }

    #[test]
    fn test_fresh_write_has_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/CLAUDE.md");
        let plan = WritePlan::Fresh {
            document: "doc\n".to_string(),
        };
        assert!(write(&path, &plan, fixed_time()).unwrap().is_none());
        assert_eq!(read(&path).unwrap().as_deref(), Some("doc\n"));
    }
}
