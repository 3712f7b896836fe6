use super::keypoint::KeyPoint;
use super::scale_space::FloatImage;

/// 空間方向の分割数（4x4セル）
const DESCR_WIDTH: usize = 4;
/// セルあたりの方向ビン数
const DESCR_HIST_BINS: usize = 8;
/// セル幅（スケールに対する倍率）
const DESCR_SCL_FCTR: f32 = 3.0;
/// 正規化後のクリップ値
const DESCR_MAG_THR: f32 = 0.2;
const DESCR_INT_FCTR: f32 = 512.0;

pub const DESCRIPTOR_LEN: usize = DESCR_WIDTH * DESCR_WIDTH * DESCR_HIST_BINS;

/// 128次元のSIFT記述子
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor(pub [f32; DESCRIPTOR_LEN]);

impl Descriptor {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn distance_squared(&self, other: &Descriptor) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    /// ユークリッド距離
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

/// 特徴点周辺の勾配を主方向基準で4x4x8のヒストグラムに集計
pub(crate) fn compute(image: &FloatImage, kp: &KeyPoint) -> Descriptor {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let d = DESCR_WIDTH as f32;
    let n = DESCR_HIST_BINS as i32;

    let scale = kp.octave_scale();
    let cx = (kp.x / scale).round() as i32;
    let cy = (kp.y / scale).round() as i32;
    let sigma = kp.sigma / scale;

    let mut orientation = 360.0 - kp.angle;
    if (orientation - 360.0).abs() < f32::EPSILON * 360.0 {
        orientation = 0.0;
    }
    let (sin_t, cos_t) = orientation.to_radians().sin_cos();
    let bins_per_degree = n as f32 / 360.0;
    let exp_scale = -1.0 / (d * d * 0.5);
    let hist_width = DESCR_SCL_FCTR * sigma;

    let diagonal = ((width * width + height * height) as f32).sqrt() as i32;
    let radius = ((hist_width * std::f32::consts::SQRT_2 * (d + 1.0) * 0.5).round() as i32).min(diagonal);
    let cos_t = cos_t / hist_width;
    let sin_t = sin_t / hist_width;

    let mut hist = [0.0f32; DESCRIPTOR_LEN];

    for i in -radius..=radius {
        for j in -radius..=radius {
            let c_rot = j as f32 * cos_t - i as f32 * sin_t;
            let r_rot = j as f32 * sin_t + i as f32 * cos_t;
            let rbin = r_rot + d / 2.0 - 0.5;
            let cbin = c_rot + d / 2.0 - 0.5;

            if rbin <= -1.0 || rbin >= d || cbin <= -1.0 || cbin >= d {
                continue;
            }

            let r = cy + i;
            let c = cx + j;
            if r <= 0 || r >= height - 1 || c <= 0 || c >= width - 1 {
                continue;
            }

            let dx = image.get_pixel((c + 1) as u32, r as u32)[0] - image.get_pixel((c - 1) as u32, r as u32)[0];
            let dy = image.get_pixel(c as u32, (r - 1) as u32)[0] - image.get_pixel(c as u32, (r + 1) as u32)[0];
            let weight = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
            let magnitude = (dx * dx + dy * dy).sqrt() * weight;
            let obin = (dy.atan2(dx).to_degrees() - orientation) * bins_per_degree;

            accumulate(&mut hist, rbin, cbin, obin, magnitude);
        }
    }

    finalize(hist)
}

/// 3軸の線形補間でヒストグラムへ加算
fn accumulate(hist: &mut [f32; DESCRIPTOR_LEN], rbin: f32, cbin: f32, obin: f32, magnitude: f32) {
    let n = DESCR_HIST_BINS as i32;
    let w = DESCR_WIDTH as i32;

    let r0 = rbin.floor();
    let c0 = cbin.floor();
    let o0 = obin.floor();
    let (dr, dc, d_o) = (rbin - r0, cbin - c0, obin - o0);
    let (r0, c0) = (r0 as i32, c0 as i32);
    let o0 = (o0 as i32).rem_euclid(n);

    for (ri, wr) in [(r0, 1.0 - dr), (r0 + 1, dr)] {
        if ri < 0 || ri >= w {
            continue;
        }
        for (ci, wc) in [(c0, 1.0 - dc), (c0 + 1, dc)] {
            if ci < 0 || ci >= w {
                continue;
            }
            for (oi, wo) in [(o0, 1.0 - d_o), ((o0 + 1) % n, d_o)] {
                let index = ((ri * w + ci) * n + oi) as usize;
                hist[index] += magnitude * wr * wc * wo;
            }
        }
    }
}

/// 正規化 → 0.2でクリップ → 再正規化 → 0-255に量子化
fn finalize(mut hist: [f32; DESCRIPTOR_LEN]) -> Descriptor {
    let norm = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
    let threshold = norm * DESCR_MAG_THR;
    for v in hist.iter_mut() {
        *v = v.min(threshold);
    }

    let norm = hist.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
    let factor = DESCR_INT_FCTR / norm;
    for v in hist.iter_mut() {
        *v = (*v * factor).round().clamp(0.0, 255.0);
    }

    Descriptor(hist)
}
