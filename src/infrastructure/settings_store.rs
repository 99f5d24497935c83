//! Settings document persistence.

use std::path::Path;

use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::SettingsDocument;
use crate::infrastructure::fs::{read_optional, write_atomic};
use crate::services::settings_composer::{self, KeyPath};

/// Load the settings document. Missing or blank files are empty documents;
/// anything unparsable is [`DomainError::CorruptState`].
pub fn load(path: &Path) -> DomainResult<SettingsDocument> {
    let Some(contents) = read_optional(path).map_err(|e| DomainError::io(path, e))? else {
        return Ok(SettingsDocument::default());
    };
    if contents.trim().is_empty() {
        return Ok(SettingsDocument::default());
    }

    let value: Value = serde_json::from_str(&contents).map_err(|e| DomainError::corrupt(path, e))?;
    if !value.is_object() {
        return Err(DomainError::corrupt(path, "top-level value must be an object"));
    }
    SettingsDocument::from_value(value).map_err(|e| DomainError::corrupt(path, e))
}

/// Write `document` merged against what is on disk now, with every path in
/// `drop_keys` forced absent. Returns what was written.
pub fn save(
    path: &Path,
    document: &SettingsDocument,
    drop_keys: &[KeyPath],
) -> DomainResult<SettingsDocument> {
    let on_disk = load(path)?;
    let mut merged = settings_composer::merge(document, &on_disk);
    settings_composer::remove_keys(&mut merged, drop_keys);

    let json = merged.to_pretty_string()?;
    write_atomic(path, json.as_bytes()).map_err(|e| DomainError::io(path, e))?;
    tracing::debug!(path = %path.display(), dropped = drop_keys.len(), "settings saved");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> SettingsDocument {
        SettingsDocument::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_or_blank_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert!(load(&path).unwrap().is_empty());
        std::fs::write(&path, "\n").unwrap();
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(load(&path).unwrap_err(), DomainError::CorruptState { .. }));
        std::fs::write(&path, "{oops").unwrap();
        assert!(matches!(load(&path).unwrap_err(), DomainError::CorruptState { .. }));
    }

    #[test]
    fn test_save_merges_with_disk_and_drops_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".claude/settings.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"model": "opus", "env": {"FOO": "stale", "KEEP": "1"}, "userKey": true}"#,
        )
        .unwrap();

        let document = doc(json!({"model": "haiku", "env": {"BAR": "2"}}));
        let written = save(&path, &document, &[KeyPath::parse("env.FOO")]).unwrap();

        let expected = json!({"model": "haiku", "env": {"BAR": "2", "KEEP": "1"}, "userKey": true});
        assert_eq!(written.to_value().unwrap(), expected);
        let on_disk: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, expected);
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("}\n"));
    }

    #[test]
    fn test_round_trip_preserves_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let raw = json!({
            "statusLine": {"type": "command", "command": "s.sh"},
            "n": [1, {"a": null}]
        });
        std::fs::write(&path, raw.to_string()).unwrap();

        let loaded = load(&path).unwrap();
        save(&path, &loaded, &[]).unwrap();
        assert_eq!(load(&path).unwrap().to_value().unwrap(), raw);
    }
}
