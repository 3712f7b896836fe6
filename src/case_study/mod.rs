//! ケーススタディフォルダ管理モジュール
//!
//! 照合ごとに `case_study_<画像1>_vs_<画像2>_<YYYYMMDD_HHMMSS>` を作成し、
//! 入力画像のコピーと `similarity_score.json` を保存する。

pub mod retention;

pub use retention::{prune_case_studies, plan_prune, RetentionPolicy};

use crate::error::{Result, SignVerifyError};
use chrono::{DateTime, Local};
use sign_verify_common::CaseReport;
use std::path::{Path, PathBuf};

pub const CASE_PREFIX: &str = "case_study_";
pub const REPORT_FILE_NAME: &str = "similarity_score.json";
pub const DIAGRAM_FILE_NAME: &str = "matches.png";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// ケースフォルダ
#[derive(Debug, Clone)]
pub struct CaseStudy {
    pub path: PathBuf,
}

impl CaseStudy {
    /// フォルダを新規作成（同名があれば `_2`, `_3`, ... を付与）
    pub fn create(case_dir: &Path, image1: &Path, image2: &Path, now: DateTime<Local>) -> Result<Self> {
        std::fs::create_dir_all(case_dir)?;

        let base = folder_name(image1, image2, now);
        let mut path = case_dir.join(&base);
        let mut attempt = 1;

        loop {
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    path = case_dir.join(format!("{}_{}", base, attempt));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// 入力画像をファイル名そのままでコピー
    pub fn archive_image(&self, image: &Path) -> Result<PathBuf> {
        let file_name = image
            .file_name()
            .ok_or_else(|| SignVerifyError::FileNotFound(image.display().to_string()))?;
        let dest = self.path.join(file_name);
        std::fs::copy(image, &dest)?;
        Ok(dest)
    }

    pub fn write_report(&self, report: &CaseReport) -> Result<PathBuf> {
        let path = self.report_path();
        report.save(&path)?;
        Ok(path)
    }

    pub fn report_path(&self) -> PathBuf {
        self.path.join(REPORT_FILE_NAME)
    }

    pub fn diagram_path(&self) -> PathBuf {
        self.path.join(DIAGRAM_FILE_NAME)
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// 拡張子を除いたファイル名
fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn folder_name(image1: &Path, image2: &Path, now: DateTime<Local>) -> String {
    format!(
        "{}{}_vs_{}_{}",
        CASE_PREFIX,
        base_name(image1),
        base_name(image2),
        now.format(TIMESTAMP_FORMAT)
    )
}

/// ケースフォルダ名の検証（パス区切り・親参照を拒否）
pub fn validate_folder_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || !name.starts_with(CASE_PREFIX);
    if invalid {
        return Err(SignVerifyError::InvalidCaseStudyName(name.to_string()));
    }
    Ok(())
}

/// 保存済みレポートを読み込み
pub fn load_report(case_dir: &Path, name: &str) -> Result<CaseReport> {
    validate_folder_name(name)?;

    let path = case_dir.join(name).join(REPORT_FILE_NAME);
    if !path.is_file() {
        return Err(SignVerifyError::CaseStudyNotFound(name.to_string()));
    }
    Ok(CaseReport::load(&path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sign_verify_common::Verdict;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_folder_name_format() {
        let name = folder_name(Path::new("uploads/1992.png"), Path::new("a/b/ref.sig.jpeg"), fixed_time());
        assert_eq!(name, "case_study_1992_vs_ref.sig_20240305_140709");
    }

    #[test]
    fn test_create_is_unique() {
        let dir = std::env::temp_dir().join(format!("sign-verify-case-unique-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();

        let a = CaseStudy::create(&dir, Path::new("x.png"), Path::new("y.png"), fixed_time()).unwrap();
        let b = CaseStudy::create(&dir, Path::new("x.png"), Path::new("y.png"), fixed_time()).unwrap();

        assert_ne!(a.path, b.path);
        assert!(b.name().ends_with("_2"));
        assert!(a.path.is_dir() && b.path.is_dir());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validate_folder_name() {
        assert!(validate_folder_name("case_study_a_vs_b_20240101_000000").is_ok());
        assert!(validate_folder_name("../etc").is_err());
        assert!(validate_folder_name("case_study_../x").is_err());
        assert!(validate_folder_name("other").is_err());
        assert!(validate_folder_name("").is_err());
    }

    #[test]
    fn test_load_report_not_found() {
        let dir = std::env::temp_dir().join(format!("sign-verify-case-missing-{}", std::process::id()));
        let err = load_report(&dir, "case_study_none").unwrap_err();
        assert!(matches!(err, SignVerifyError::CaseStudyNotFound(_)));
    }

    #[test]
    fn test_write_and_load_report() {
        let dir = std::env::temp_dir().join(format!("sign-verify-case-report-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();

        let case = CaseStudy::create(&dir, Path::new("a.png"), Path::new("b.png"), fixed_time()).unwrap();
        case.write_report(&CaseReport::new(Verdict::Match, 0.5)).unwrap();

        let report = load_report(&dir, &case.name()).unwrap();
        assert_eq!(report.match_result, Verdict::Match);
        assert_eq!(report.similarity_score_percentage, "50.00%");

        std::fs::remove_dir_all(&dir).ok();
    }
}
