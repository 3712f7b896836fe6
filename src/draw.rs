//! マッチ図の描画
//!
//! 2枚のグレースケール画像を横に並べ、比率テストを通過した対応を線で結ぶ。

use crate::error::Result;
use crate::features::KeyPoint;
use crate::matcher::DescriptorMatch;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use std::path::Path;

const PALETTE: [[u8; 3]; 6] = [
    [230, 25, 75],
    [60, 180, 75],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
];

/// 対応線を描いた比較画像を生成
pub fn render_matches(
    image1: &GrayImage,
    keypoints1: &[KeyPoint],
    image2: &GrayImage,
    keypoints2: &[KeyPoint],
    matches: &[DescriptorMatch],
) -> RgbImage {
    let offset = image1.width();
    let width = image1.width() + image2.width();
    let height = image1.height().max(image2.height());

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for (x, y, p) in image1.enumerate_pixels() {
        canvas.put_pixel(x, y, Rgb([p[0]; 3]));
    }
    for (x, y, p) in image2.enumerate_pixels() {
        canvas.put_pixel(x + offset, y, Rgb([p[0]; 3]));
    }

    for (i, m) in matches.iter().enumerate() {
        let (Some(a), Some(b)) = (keypoints1.get(m.query_idx), keypoints2.get(m.train_idx)) else {
            continue;
        };
        let color = Rgb(PALETTE[i % PALETTE.len()]);
        let start = (a.x, a.y);
        let end = (b.x + offset as f32, b.y);

        draw_line_segment_mut(&mut canvas, start, end, color);
        draw_hollow_circle_mut(&mut canvas, (start.0 as i32, start.1 as i32), radius(a), color);
        draw_hollow_circle_mut(&mut canvas, (end.0 as i32, end.1 as i32), radius(b), color);
    }

    canvas
}

fn radius(kp: &KeyPoint) -> i32 {
    (kp.sigma.round() as i32).max(2)
}

/// マッチ図をPNGで保存
pub fn save_match_diagram(path: &Path, canvas: &RgbImage) -> Result<()> {
    canvas.save(path)?;
    Ok(())
}
