//! テスト用の合成署名画像

#![allow(dead_code)]

use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;
use std::path::{Path, PathBuf};

/// 大きさ・濃さの異なる図形を不規則に配置した画像
///
/// 同じ見た目の部分がないので、同一画像どうしの照合では
/// ほとんどの特徴点が比率テストを通過する。
pub fn signature_image() -> GrayImage {
    let mut img = GrayImage::from_pixel(160, 120, Luma([255]));

    draw_filled_circle_mut(&mut img, (32, 30), 9, Luma([20]));
    draw_filled_circle_mut(&mut img, (118, 84), 5, Luma([90]));
    draw_filled_circle_mut(&mut img, (70, 95), 13, Luma([150]));
    // 対称性のない多角形
    let quad = [Point::new(88, 18), Point::new(113, 22), Point::new(104, 31), Point::new(91, 28)];
    draw_polygon_mut(&mut img, &quad, Luma([60]));
    let tri = [Point::new(20, 70), Point::new(31, 77), Point::new(23, 98)];
    draw_polygon_mut(&mut img, &tri, Luma([120]));

    // 筆跡風の線
    for (i, offset) in [0.0f32, 1.0, 2.0].iter().enumerate() {
        let shade = Luma([40 + 30 * i as u8]);
        draw_line_segment_mut(&mut img, (45.0, 55.0 + offset), (140.0, 40.0 + offset * 2.0), shade);
    }
    draw_line_segment_mut(&mut img, (130.0, 100.0), (150.0, 70.0), Luma([0]));

    img
}

/// 線形合同法による擬似乱数ノイズ（seedごとに独立）
pub fn noise_image(seed: u32) -> GrayImage {
    let mut state = seed;
    GrayImage::from_fn(160, 120, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        Luma([(state >> 24) as u8])
    })
}

/// 何も書かれていない白紙
pub fn blank_image() -> GrayImage {
    GrayImage::from_pixel(160, 120, Luma([255]))
}

/// PNGで保存してパスを返す
pub fn write_png(dir: &Path, name: &str, img: &GrayImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).expect("PNG保存失敗");
    path
}

/// PNGのバイト列
pub fn png_bytes(img: &GrayImage) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).expect("PNGエンコード失敗");
    buf.into_inner()
}
