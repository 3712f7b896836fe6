//! 照合結果の型定義
//!
//! サーバとクライアントで共有される型:
//! - Verdict: 照合判定
//! - VerifyResponse / ErrorResponse: `POST /verify_signatures` のレスポンス
//! - CaseReport: ケースフォルダ内の `similarity_score.json`

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// 照合判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Signatures are likely a match.")]
    Match,
    #[serde(rename = "Signatures are not a match.")]
    NoMatch,
}

impl Verdict {
    /// スコアが閾値を超えれば一致（閾値ちょうどは不一致）
    pub fn from_score(similarity_score: f64, threshold: f64) -> Self {
        if similarity_score > threshold {
            Verdict::Match
        } else {
            Verdict::NoMatch
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Verdict::Match => "Signatures are likely a match.",
            Verdict::NoMatch => "Signatures are not a match.",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// 照合APIの成功レスポンス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub match_result: Verdict,
    pub similarity_score: f64,
    pub data_folder: String,
}

/// エラーレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// ケースフォルダに保存するレポート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    #[serde(rename = "Match result")]
    pub match_result: Verdict,

    #[serde(rename = "Similarity Score")]
    pub similarity_score: f64,

    /// 例: "12.50%"
    #[serde(rename = "Similarity Score Percentage")]
    pub similarity_score_percentage: String,
}

impl CaseReport {
    pub fn new(match_result: Verdict, similarity_score: f64) -> Self {
        Self {
            match_result,
            similarity_score,
            similarity_score_percentage: format_percentage(similarity_score),
        }
    }

    /// レポートを読み込み
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::read(path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::format(path, e))
    }

    /// レポートを保存
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::write(path, e))?;
        serde_json::to_writer(BufWriter::new(file), self).map_err(|e| Error::format(path, e))
    }
}

/// スコア(0-1)をパーセント表記（小数2桁）に変換
pub fn format_percentage(similarity_score: f64) -> String {
    format!("{:.2}%", similarity_score * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_threshold_is_exclusive() {
        assert_eq!(Verdict::from_score(0.11, 0.1), Verdict::Match);
        assert_eq!(Verdict::from_score(0.1, 0.1), Verdict::NoMatch);
        assert_eq!(Verdict::from_score(0.0, 0.1), Verdict::NoMatch);
    }

    #[test]
    fn test_verdict_serializes_as_message() {
        let json = serde_json::to_string(&Verdict::Match).unwrap();
        assert_eq!(json, "\"Signatures are likely a match.\"");

        let parsed: Verdict = serde_json::from_str("\"Signatures are not a match.\"").unwrap();
        assert_eq!(parsed, Verdict::NoMatch);
        assert_eq!(parsed.to_string(), parsed.message());
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(0.0), "0.00%");
        assert_eq!(format_percentage(1.0), "100.00%");
        assert_eq!(format_percentage(0.123456), "12.35%");
    }

    #[test]
    fn test_case_report_keys() {
        let report = CaseReport::new(Verdict::Match, 0.25);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["Match result"], "Signatures are likely a match.");
        assert_eq!(value["Similarity Score"], 0.25);
        assert_eq!(value["Similarity Score Percentage"], "25.00%");
    }

    #[test]
    fn test_case_report_save_and_load() {
        let path = std::env::temp_dir().join(format!("sign-verify-report-{}.json", std::process::id()));
        let report = CaseReport::new(Verdict::NoMatch, 0.05);
        report.save(&path).unwrap();

        let loaded = CaseReport::load(&path).unwrap();
        assert_eq!(loaded, report);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_case_report_load_errors() {
        let missing = Path::new("/nonexistent/similarity_score.json");
        assert!(matches!(CaseReport::load(missing), Err(Error::Read { .. })));

        let path = std::env::temp_dir().join(format!("sign-verify-broken-{}.json", std::process::id()));
        std::fs::write(&path, "{\"Match result\": 1}").unwrap();
        let err = CaseReport::load(&path).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
        assert_eq!(err.path(), path.as_path());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_verify_response_field_names() {
        let response = VerifyResponse {
            match_result: Verdict::NoMatch,
            similarity_score: 0.0,
            data_folder: "case_studies/x".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("match_result").is_some());
        assert!(value.get("similarity_score").is_some());
        assert!(value.get("data_folder").is_some());
    }
}
