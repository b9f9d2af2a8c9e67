use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::cache::token::RefreshParams;

/// One token as it is stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub token_type: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub refresh_parameters: RefreshParams,
    #[serde(default)]
    pub usage_count: i64,
}

/// Whole backup file. Fully replaced on every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    #[serde(default)]
    pub tokens: HashMap<String, BackupEntry>,
    pub backup_time: DateTime<Utc>,
}

impl BackupSnapshot {
    pub fn new(backup_time: DateTime<Utc>) -> Self {
        Self { tokens: HashMap::new(), backup_time }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Writes `<path>.tmp` then renames it over `path`, so readers never see a partial file.
pub async fn write_atomic(path: &Path, snapshot: &BackupSnapshot) -> Result<()> {
    let content = serde_json::to_string_pretty(snapshot)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create backup dir {}", parent.display()))?;
    }

    let tmp = temp_path(path);
    fs::write(&tmp, content.as_bytes())
        .await
        .with_context(|| format!("write {}", tmp.display()))?;

    // tokens are credentials: owner only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }

    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Reads a backup; a missing file is `Ok(None)`.
pub async fn read(path: &Path) -> Result<Option<BackupSnapshot>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let snapshot = serde_json::from_str(&content)
        .with_context(|| format!("parse backup {}", path.display()))?;
    Ok(Some(snapshot))
}
