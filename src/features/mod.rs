//! SIFT特徴点抽出モジュール
//!
//! DoG(Difference of Gaussians)スケールスペースから極値を検出し、
//! 主方向の割り当てと128次元記述子の計算を行う。
//! パラメータはLoweの論文・OpenCVの既定値に合わせている。

mod descriptor;
mod keypoint;
mod scale_space;

pub use descriptor::{Descriptor, DESCRIPTOR_LEN};
pub use keypoint::KeyPoint;

use image::GrayImage;
use rayon::prelude::*;
use scale_space::Pyramid;

/// SIFTパラメータ
#[derive(Debug, Clone)]
pub struct SiftConfig {
    /// ベース画像のぼかし量
    pub sigma: f32,
    /// オクターブあたりの分割数
    pub num_intervals: usize,
    /// 入力画像が元々持っているとみなすぼかし量
    pub assumed_blur: f32,
    pub contrast_threshold: f32,
    /// 主曲率比の上限（エッジ上の点を除外）
    pub edge_threshold: f32,
    pub image_border_width: usize,
    /// 応答の強い順に残す上限（Noneは無制限）
    pub max_keypoints: Option<usize>,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            sigma: 1.6,
            num_intervals: 3,
            assumed_blur: 0.5,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            image_border_width: 5,
            max_keypoints: None,
        }
    }
}

/// 特徴点と記述子（同じ添字で対応）
#[derive(Debug, Clone, Default)]
pub struct SiftFeatures {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Vec<Descriptor>,
}

impl SiftFeatures {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// 特徴点検出と記述子計算
pub fn detect_and_compute(image: &GrayImage, config: &SiftConfig) -> SiftFeatures {
    if image.width() == 0 || image.height() == 0 {
        return SiftFeatures::default();
    }

    let pyramid = Pyramid::build(image, config);
    let mut keypoints = pyramid.find_keypoints(config);

    keypoint::remove_duplicates(&mut keypoints);
    if let Some(limit) = config.max_keypoints {
        keypoint::retain_best(&mut keypoints, limit);
    }

    let descriptors = keypoints
        .par_iter()
        .map(|kp| descriptor::compute(pyramid.gaussian(kp.octave, kp.layer), kp))
        .collect();

    SiftFeatures { keypoints, descriptors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    fn blob_image() -> GrayImage {
        let mut img = GrayImage::from_pixel(96, 96, Luma([255]));
        draw_filled_circle_mut(&mut img, (30, 30), 6, Luma([20]));
        draw_filled_circle_mut(&mut img, (66, 40), 9, Luma([90]));
        draw_filled_rect_mut(&mut img, Rect::at(20, 60).of_size(14, 8), Luma([0]));
        draw_filled_rect_mut(&mut img, Rect::at(58, 66).of_size(7, 17), Luma([140]));
        img
    }

    #[test]
    fn test_uniform_image_has_no_keypoints() {
        let img = GrayImage::from_pixel(64, 64, Luma([128]));
        let features = detect_and_compute(&img, &SiftConfig::default());
        assert!(features.is_empty());
        assert!(features.descriptors.is_empty());
    }

    #[test]
    fn test_empty_image() {
        let img = GrayImage::new(0, 0);
        let features = detect_and_compute(&img, &SiftConfig::default());
        assert!(features.is_empty());
    }

    #[test]
    fn test_blobs_produce_keypoints_inside_image() {
        let img = blob_image();
        let features = detect_and_compute(&img, &SiftConfig::default());

        assert!(!features.is_empty(), "特徴点が検出されない");
        assert_eq!(features.keypoints.len(), features.descriptors.len());

        for kp in &features.keypoints {
            assert!(kp.x >= 0.0 && kp.x < img.width() as f32, "x範囲外: {:?}", kp);
            assert!(kp.y >= 0.0 && kp.y < img.height() as f32, "y範囲外: {:?}", kp);
            assert!(kp.sigma > 0.0);
            assert!((0.0..360.0).contains(&kp.angle), "角度範囲外: {}", kp.angle);
        }
    }

    #[test]
    fn test_descriptor_values_are_saturated() {
        let features = detect_and_compute(&blob_image(), &SiftConfig::default());

        for d in &features.descriptors {
            assert!(d.as_slice().iter().all(|v| v.is_finite() && (0.0..=255.0).contains(v)));
        }
    }

    #[test]
    fn test_detection_is_deterministic() {
        let img = blob_image();
        let a = detect_and_compute(&img, &SiftConfig::default());
        let b = detect_and_compute(&img, &SiftConfig::default());

        assert_eq!(a.keypoints, b.keypoints);
        assert_eq!(a.descriptors, b.descriptors);
    }

    #[test]
    fn test_max_keypoints_limit() {
        let config = SiftConfig {
            max_keypoints: Some(2),
            ..Default::default()
        };
        let features = detect_and_compute(&blob_image(), &config);
        assert!(features.len() <= 2);
        assert_eq!(features.keypoints.len(), features.descriptors.len());
    }
}
