//! ケースフォルダの保持ポリシー
//!
//! 保存期間・保持件数を超えた古いケースフォルダを削除する。
//! どちらも未設定なら何もしない。

use super::CASE_PREFIX;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// 保存日数（更新日時基準）
    pub max_age_days: Option<u64>,
    /// 保持するフォルダ数の上限
    pub max_folders: Option<usize>,
}

impl RetentionPolicy {
    pub fn is_enabled(&self) -> bool {
        self.max_age_days.is_some() || self.max_folders.is_some()
    }
}

struct CaseEntry {
    path: PathBuf,
    modified: SystemTime,
}

/// ケースフォルダ一覧（直下のみ、古い順）
fn list_case_folders(case_dir: &Path) -> Vec<CaseEntry> {
    let mut entries: Vec<CaseEntry> = WalkDir::new(case_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| e.file_name().to_string_lossy().starts_with(CASE_PREFIX))
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some(CaseEntry { path: e.into_path(), modified })
        })
        .collect();

    // 同時刻はフォルダ名（タイムスタンプ入り）で並べる
    entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    entries
}

/// 削除対象の一覧を計算（削除はしない）
pub fn plan_prune(case_dir: &Path, policy: &RetentionPolicy, now: SystemTime) -> Vec<PathBuf> {
    plan_prune_keeping(case_dir, policy, now, None)
}

/// `keep` は最新として件数に数え、削除対象にはしない
fn plan_prune_keeping(
    case_dir: &Path,
    policy: &RetentionPolicy,
    now: SystemTime,
    keep: Option<&Path>,
) -> Vec<PathBuf> {
    if !policy.is_enabled() || !case_dir.is_dir() {
        return Vec::new();
    }

    let mut entries = list_case_folders(case_dir);
    if let Some(pos) = entries.iter().position(|e| Some(e.path.as_path()) == keep) {
        let kept_entry = entries.remove(pos);
        entries.push(kept_entry);
    }

    let mut expired = Vec::new();
    let mut kept = Vec::new();

    for entry in entries {
        let protected = Some(entry.path.as_path()) == keep;
        let too_old = !protected
            && policy.max_age_days.is_some_and(|days| {
                let max_age = Duration::from_secs(days * SECONDS_PER_DAY);
                now.duration_since(entry.modified).map(|age| age > max_age).unwrap_or(false)
            });
        if too_old {
            expired.push(entry.path);
        } else {
            kept.push(entry.path);
        }
    }

    if let Some(max) = policy.max_folders {
        // keep は末尾なので件数超過分には入らない
        let excess = kept.len().saturating_sub(max.max(usize::from(keep.is_some())));
        expired.extend(kept.drain(..excess));
    }

    expired
}

/// ポリシーに従ってケースフォルダを削除し、削除したパスを返す
///
/// `keep` に指定したフォルダ（作成直後のケースなど）は削除しない。
pub fn prune_case_studies(
    case_dir: &Path,
    policy: &RetentionPolicy,
    now: SystemTime,
    keep: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    let targets = plan_prune_keeping(case_dir, policy, now, keep);
    for path in &targets {
        std::fs::remove_dir_all(path)?;
        tracing::info!(path = %path.display(), "ケースフォルダを削除");
    }
    Ok(targets)
}
