//! 署名照合モジュール
//!
//! 2枚の画像をグレースケールで読み込み、SIFT記述子の比率テスト通過率から
//! 類似度を計算して判定する。結果はケースフォルダに保存する。

use crate::case_study::{self, CaseStudy, RetentionPolicy};
use crate::config::Config;
use crate::draw;
use crate::error::{Result, SignVerifyError};
use crate::features::{self, SiftConfig, SiftFeatures};
use crate::matcher::{self, MatchSummary};
use chrono::Local;
use image::{GrayImage, ImageReader, Limits, RgbImage};
use sign_verify_common::{CaseReport, Verdict, VerifyResponse};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// 照合パラメータ
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub ratio_threshold: f32,
    pub match_threshold: f64,
    pub case_dir: PathBuf,
    pub save_match_diagram: bool,
    /// デコードを許す幅・高さの上限（px）
    pub max_image_dimension: u32,
    pub retention: RetentionPolicy,
    pub sift: SiftConfig,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for VerifyOptions {
    fn from(config: &Config) -> Self {
        Self {
            ratio_threshold: config.ratio_threshold,
            match_threshold: config.match_threshold,
            case_dir: config.case_dir.clone(),
            save_match_diagram: config.save_match_diagram,
            max_image_dimension: config.max_image_dimension,
            retention: config.retention.clone(),
            sift: SiftConfig {
                max_keypoints: config.max_keypoints,
                ..SiftConfig::default()
            },
        }
    }
}

/// 照合結果
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub verdict: Verdict,
    pub similarity_score: f64,
    pub case_folder: PathBuf,
}

impl MatchResult {
    pub fn data_folder(&self) -> String {
        self.case_folder.display().to_string()
    }

    pub fn to_response(&self) -> VerifyResponse {
        VerifyResponse {
            match_result: self.verdict,
            similarity_score: self.similarity_score,
            data_folder: self.data_folder(),
        }
    }
}

/// 2枚の画像の特徴量と照合結果
#[derive(Debug, Clone)]
pub struct Comparison {
    pub features1: SiftFeatures,
    pub features2: SiftFeatures,
    pub summary: MatchSummary,
}

/// 画像をグレースケールで読み込み
///
/// 幅・高さが `max_dimension` を超える画像はピクセルを展開する前に拒否する。
pub fn load_grayscale(path: &Path, max_dimension: u32) -> Result<GrayImage> {
    if !path.is_file() {
        return Err(SignVerifyError::FileNotFound(path.display().to_string()));
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);

    // 拡張子ではなく中身から形式を判定
    let decode = || -> std::result::Result<GrayImage, image::ImageError> {
        let mut reader = ImageReader::open(path)?.with_guessed_format()?;
        reader.limits(limits);
        Ok(reader.decode()?.to_luma8())
    };
    decode().map_err(|e| SignVerifyError::ImageDecode {
        file: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        message: e.to_string(),
    })
}

/// マッチ図の保存。失敗しても照合結果は返す
fn save_diagram_or_warn(path: &Path, canvas: &RgbImage) -> bool {
    match draw::save_match_diagram(path, canvas) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "マッチ図の保存に失敗");
            false
        }
    }
}

/// 特徴抽出（2枚並列）→ k=2近傍探索 → 比率テスト
pub fn compare_images(image1: &GrayImage, image2: &GrayImage, ratio: f32, sift: &SiftConfig) -> Comparison {
    let (features1, features2) = rayon::join(
        || features::detect_and_compute(image1, sift),
        || features::detect_and_compute(image2, sift),
    );
    let summary = matcher::match_descriptors(&features1.descriptors, &features2.descriptors, ratio);

    Comparison { features1, features2, summary }
}

/// 署名画像を照合し、ケースフォルダに保存
pub fn verify_signatures(image1: &Path, image2: &Path, options: &VerifyOptions) -> Result<MatchResult> {
    let img1 = load_grayscale(image1, options.max_image_dimension)?;
    let img2 = load_grayscale(image2, options.max_image_dimension)?;

    let comparison = compare_images(&img1, &img2, options.ratio_threshold, &options.sift);
    let similarity_score = comparison.summary.similarity_score;
    let verdict = Verdict::from_score(similarity_score, options.match_threshold);

    debug!(
        keypoints1 = comparison.features1.len(),
        keypoints2 = comparison.features2.len(),
        good = comparison.summary.good_matches.len(),
        total = comparison.summary.total,
        "特徴点照合完了"
    );

    // 描画はフォルダ作成前に済ませる
    let diagram = options.save_match_diagram.then(|| {
        draw::render_matches(
            &img1,
            &comparison.features1.keypoints,
            &img2,
            &comparison.features2.keypoints,
            &comparison.summary.good_matches,
        )
    });

    let case = CaseStudy::create(&options.case_dir, image1, image2, Local::now())?;
    case.archive_image(image1)?;
    case.archive_image(image2)?;
    case.write_report(&CaseReport::new(verdict, similarity_score))?;

    if let Some(canvas) = &diagram {
        save_diagram_or_warn(&case.diagram_path(), canvas);
    }

    info!(
        folder = %case.path.display(),
        score = similarity_score,
        verdict = %verdict,
        "照合結果を保存"
    );

    if options.retention.is_enabled() {
        // 保持ポリシーの失敗は照合結果に影響させない
        if let Err(e) = case_study::prune_case_studies(
            &options.case_dir,
            &options.retention,
            SystemTime::now(),
            Some(&case.path),
        ) {
            warn!(error = %e, "ケースフォルダの整理に失敗");
        }
    }

    Ok(MatchResult {
        verdict,
        similarity_score,
        case_folder: case.path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_options_from_config() {
        let config = Config {
            ratio_threshold: 0.6,
            match_threshold: 0.3,
            max_keypoints: Some(100),
            ..Default::default()
        };
        let options = VerifyOptions::from(&config);

        assert_eq!(options.ratio_threshold, 0.6);
        assert_eq!(options.match_threshold, 0.3);
        assert_eq!(options.sift.max_keypoints, Some(100));
        assert_eq!(options.sift.num_intervals, 3);
        assert_eq!(options.max_image_dimension, 1600);
    }

    #[test]
    fn test_load_grayscale_missing_file() {
        let err = load_grayscale(Path::new("/nonexistent/sig.png"), 1600).unwrap_err();
        assert!(matches!(err, SignVerifyError::FileNotFound(_)));
    }

    #[test]
    fn test_load_grayscale_corrupt_file() {
        let path = std::env::temp_dir().join(format!("sign-verify-corrupt-{}.png", std::process::id()));
        std::fs::write(&path, b"not a png").unwrap();

        let err = load_grayscale(&path, 1600).unwrap_err();
        assert!(matches!(err, SignVerifyError::ImageDecode { .. }));
        // サーバ側のディレクトリはメッセージに出さない
        assert!(!err.to_string().contains(&std::env::temp_dir().display().to_string()));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_grayscale_rejects_oversized_image() {
        let path = std::env::temp_dir().join(format!("sign-verify-wide-{}.png", std::process::id()));
        GrayImage::from_pixel(64, 16, Luma([255])).save(&path).unwrap();

        let err = load_grayscale(&path, 32).unwrap_err();
        assert!(matches!(err, SignVerifyError::ImageDecode { .. }));
        assert_eq!(load_grayscale(&path, 64).unwrap().dimensions(), (64, 16));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_diagram_failure_is_not_fatal() {
        let canvas = RgbImage::new(4, 4);
        assert!(!save_diagram_or_warn(Path::new("/nonexistent/dir/matches.png"), &canvas));
    }

    #[test]
    fn test_compare_blank_images() {
        let blank = GrayImage::from_pixel(48, 48, Luma([255]));
        let comparison = compare_images(&blank, &blank, 0.75, &SiftConfig::default());

        assert_eq!(comparison.summary.total, 0);
        assert_eq!(comparison.summary.similarity_score, 0.0);
    }

    #[test]
    fn test_match_result_response() {
        let result = MatchResult {
            verdict: Verdict::Match,
            similarity_score: 0.4,
            case_folder: PathBuf::from("case_studies").join("case_study_a_vs_b_20240101_000000"),
        };
        let response = result.to_response();
        assert_eq!(response.match_result, Verdict::Match);
        assert!(response.data_folder.ends_with("case_study_a_vs_b_20240101_000000"));
    }
}
