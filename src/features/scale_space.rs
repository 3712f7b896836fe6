//! ガウシアンピラミッドとDoG極値検出

use super::keypoint::KeyPoint;
use super::SiftConfig;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use rayon::prelude::*;

pub(crate) type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// サブピクセル補間の最大反復回数
const MAX_INTERP_STEPS: usize = 5;
/// 方向ヒストグラムのビン数
const ORI_HIST_BINS: usize = 36;
/// 方向ヒストグラムの窓幅（スケールに対する倍率）
const ORI_SIG_FCTR: f32 = 1.5;
const ORI_RADIUS: f32 = 3.0 * ORI_SIG_FCTR;
/// 主方向とみなすピーク比
const ORI_PEAK_RATIO: f32 = 0.8;

pub(crate) struct Octave {
    pub gaussians: Vec<FloatImage>,
    pub dogs: Vec<FloatImage>,
}

pub(crate) struct Pyramid {
    octaves: Vec<Octave>,
}

impl Pyramid {
    pub fn build(image: &GrayImage, config: &SiftConfig) -> Self {
        let base = base_image(image, config);
        let num_octaves = octave_count(base.width(), base.height());
        let sigmas = gaussian_sigmas(config.sigma, config.num_intervals);

        let mut octaves = Vec::with_capacity(num_octaves);
        let mut current = base;

        for _ in 0..num_octaves {
            let mut gaussians = Vec::with_capacity(sigmas.len());
            gaussians.push(current);
            for &sigma in &sigmas[1..] {
                let blurred = gaussian_blur_f32(&gaussians[gaussians.len() - 1], sigma);
                gaussians.push(blurred);
            }

            let dogs = gaussians
                .windows(2)
                .map(|pair| subtract(&pair[1], &pair[0]))
                .collect();

            // 2σに達した画像を間引いて次のオクターブの起点にする
            current = downsample(&gaussians[config.num_intervals]);
            octaves.push(Octave { gaussians, dogs });
        }

        Self { octaves }
    }

    pub fn gaussian(&self, octave: usize, layer: usize) -> &FloatImage {
        &self.octaves[octave].gaussians[layer]
    }

    /// 全オクターブから特徴点を検出（方向割り当て済み）
    pub fn find_keypoints(&self, config: &SiftConfig) -> Vec<KeyPoint> {
        self.octaves
            .par_iter()
            .enumerate()
            .flat_map_iter(|(index, octave)| octave_keypoints(index, octave, config))
            .collect()
    }
}

fn base_image(image: &GrayImage, config: &SiftConfig) -> FloatImage {
    let float = FloatImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[0] as f32 / 255.0])
    });
    let upsampled = imageops::resize(&float, image.width() * 2, image.height() * 2, FilterType::Triangle);

    let sigma_diff = (config.sigma.powi(2) - (2.0 * config.assumed_blur).powi(2))
        .max(0.01)
        .sqrt();
    gaussian_blur_f32(&upsampled, sigma_diff)
}

fn octave_count(width: u32, height: u32) -> usize {
    let min_side = width.min(height).max(1) as f32;
    (min_side.log2().floor() as i32 - 2).max(1) as usize
}

/// 各段で追加するぼかし量（インクリメンタル）
fn gaussian_sigmas(sigma: f32, intervals: usize) -> Vec<f32> {
    let count = intervals + 3;
    let k = 2f32.powf(1.0 / intervals as f32);
    let mut sigmas = vec![sigma; count];
    for (i, s) in sigmas.iter_mut().enumerate().skip(1) {
        let previous = sigma * k.powi(i as i32 - 1);
        let total = previous * k;
        *s = (total * total - previous * previous).sqrt();
    }
    sigmas
}

fn subtract(later: &FloatImage, earlier: &FloatImage) -> FloatImage {
    let mut out = later.clone();
    for (o, e) in out.iter_mut().zip(earlier.as_raw().iter()) {
        *o -= e;
    }
    out
}

fn downsample(image: &FloatImage) -> FloatImage {
    let width = (image.width() / 2).max(1);
    let height = (image.height() / 2).max(1);
    FloatImage::from_fn(width, height, |x, y| *image.get_pixel(2 * x, 2 * y))
}

#[inline]
fn at(image: &FloatImage, x: i32, y: i32) -> f32 {
    image.get_pixel(x as u32, y as u32)[0]
}

fn octave_keypoints(index: usize, octave: &Octave, config: &SiftConfig) -> Vec<KeyPoint> {
    let threshold = 0.5 * config.contrast_threshold / config.num_intervals as f32;
    let border = config.image_border_width as i32;
    let width = octave.dogs[0].width() as i32;
    let height = octave.dogs[0].height() as i32;

    let mut keypoints = Vec::new();

    for layer in 1..octave.dogs.len() - 1 {
        for y in border..height - border {
            for x in border..width - border {
                let value = at(&octave.dogs[layer], x, y);
                if value.abs() <= threshold || !is_extremum(&octave.dogs, layer, x, y, value) {
                    continue;
                }
                if let Some(kp) = localize(index, octave, layer, x, y, config) {
                    keypoints.extend(assign_orientations(octave, kp));
                }
            }
        }
    }

    keypoints
}

fn is_extremum(dogs: &[FloatImage], layer: usize, x: i32, y: i32, value: f32) -> bool {
    for dogs_layer in &dogs[layer - 1..=layer + 1] {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let neighbor = at(dogs_layer, x + dx, y + dy);
                if value > 0.0 && neighbor > value {
                    return false;
                }
                if value < 0.0 && neighbor < value {
                    return false;
                }
            }
        }
    }
    true
}

/// DoGの3x3x3近傍（微分計算用）
struct DogSample<'a> {
    dogs: &'a [FloatImage],
    layer: usize,
    x: i32,
    y: i32,
}

impl DogSample<'_> {
    fn at(&self, dl: i32, dx: i32, dy: i32) -> f64 {
        let layer = (self.layer as i32 + dl) as usize;
        at(&self.dogs[layer], self.x + dx, self.y + dy) as f64
    }

    /// (x, y, scale) 方向の勾配
    fn gradient(&self) -> [f64; 3] {
        [
            0.5 * (self.at(0, 1, 0) - self.at(0, -1, 0)),
            0.5 * (self.at(0, 0, 1) - self.at(0, 0, -1)),
            0.5 * (self.at(1, 0, 0) - self.at(-1, 0, 0)),
        ]
    }

    fn hessian(&self) -> [[f64; 3]; 3] {
        let v2 = 2.0 * self.at(0, 0, 0);
        let dxx = self.at(0, 1, 0) + self.at(0, -1, 0) - v2;
        let dyy = self.at(0, 0, 1) + self.at(0, 0, -1) - v2;
        let dss = self.at(1, 0, 0) + self.at(-1, 0, 0) - v2;
        let dxy = 0.25 * (self.at(0, 1, 1) - self.at(0, -1, 1) - self.at(0, 1, -1) + self.at(0, -1, -1));
        let dxs = 0.25 * (self.at(1, 1, 0) - self.at(1, -1, 0) - self.at(-1, 1, 0) + self.at(-1, -1, 0));
        let dys = 0.25 * (self.at(1, 0, 1) - self.at(1, 0, -1) - self.at(-1, 0, 1) + self.at(-1, 0, -1));
        [[dxx, dxy, dxs], [dxy, dyy, dys], [dxs, dys, dss]]
    }
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// クラメルの公式で m * v = b を解く
fn solve3(m: &[[f64; 3]; 3], b: &[f64; 3]) -> Option<[f64; 3]> {
    let det = det3(m);
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let mut out = [0.0; 3];
    for (col, value) in out.iter_mut().enumerate() {
        let mut replaced = *m;
        for row in 0..3 {
            replaced[row][col] = b[row];
        }
        *value = det3(&replaced) / det;
    }
    out.iter().all(|v| v.is_finite()).then_some(out)
}

/// 極値をサブピクセル補間し、低コントラスト点とエッジ上の点を除外
fn localize(
    octave_index: usize,
    octave: &Octave,
    layer: usize,
    x: i32,
    y: i32,
    config: &SiftConfig,
) -> Option<KeyPoint> {
    let intervals = config.num_intervals as i32;
    let border = config.image_border_width as i32;
    let width = octave.dogs[0].width() as i32;
    let height = octave.dogs[0].height() as i32;

    let mut sample = DogSample { dogs: &octave.dogs, layer, x, y };
    let mut offset = [0.0f64; 3];
    let mut converged = false;

    for _ in 0..MAX_INTERP_STEPS {
        let gradient = sample.gradient();
        let solved = solve3(&sample.hessian(), &gradient)?;
        offset = [-solved[0], -solved[1], -solved[2]];

        if offset.iter().all(|v| v.abs() < 0.5) {
            converged = true;
            break;
        }
        if offset.iter().any(|v| v.abs() > (i32::MAX / 3) as f64) {
            return None;
        }

        let next_layer = sample.layer as i32 + offset[2].round() as i32;
        sample.x += offset[0].round() as i32;
        sample.y += offset[1].round() as i32;

        if next_layer < 1
            || next_layer > intervals
            || sample.x < border
            || sample.x >= width - border
            || sample.y < border
            || sample.y >= height - border
        {
            return None;
        }
        sample.layer = next_layer as usize;
    }

    if !converged {
        return None;
    }

    let gradient = sample.gradient();
    let dot: f64 = gradient.iter().zip(offset.iter()).map(|(g, o)| g * o).sum();
    let contrast = sample.at(0, 0, 0) + 0.5 * dot;
    if contrast.abs() * (intervals as f64) < config.contrast_threshold as f64 {
        return None;
    }

    let hessian = sample.hessian();
    let (dxx, dyy, dxy) = (hessian[0][0], hessian[1][1], hessian[0][1]);
    let trace = dxx + dyy;
    let det = dxx * dyy - dxy * dxy;
    let r = config.edge_threshold as f64;
    if det <= 0.0 || trace * trace * r >= (r + 1.0) * (r + 1.0) * det {
        return None;
    }

    let scale = 2f32.powi(octave_index as i32) * 0.5;
    let scale_layer = sample.layer as f32 + offset[2] as f32;

    Some(KeyPoint {
        x: (sample.x as f32 + offset[0] as f32) * scale,
        y: (sample.y as f32 + offset[1] as f32) * scale,
        sigma: config.sigma * 2f32.powf(scale_layer / intervals as f32) * scale,
        angle: 0.0,
        response: contrast.abs() as f32,
        octave: octave_index,
        layer: sample.layer,
    })
}

/// 勾配方向ヒストグラムのピークごとに特徴点を複製して主方向を付与
fn assign_orientations(octave: &Octave, kp: KeyPoint) -> Vec<KeyPoint> {
    let image = &octave.gaussians[kp.layer];
    let width = image.width() as i32;
    let height = image.height() as i32;

    let scale = kp.octave_scale();
    let cx = (kp.x / scale).round() as i32;
    let cy = (kp.y / scale).round() as i32;
    let sigma_w = ORI_SIG_FCTR * kp.sigma / scale;
    let radius = (ORI_RADIUS * kp.sigma / scale).round() as i32;
    let weight_factor = -1.0 / (2.0 * sigma_w * sigma_w);

    let n = ORI_HIST_BINS as i32;
    let mut raw = [0.0f32; ORI_HIST_BINS];

    for dy in -radius..=radius {
        let y = cy + dy;
        if y <= 0 || y >= height - 1 {
            continue;
        }
        for dx in -radius..=radius {
            let x = cx + dx;
            if x <= 0 || x >= width - 1 {
                continue;
            }
            let gx = at(image, x + 1, y) - at(image, x - 1, y);
            let gy = at(image, x, y - 1) - at(image, x, y + 1);
            let magnitude = (gx * gx + gy * gy).sqrt();
            let orientation = gy.atan2(gx).to_degrees();
            let weight = ((dx * dx + dy * dy) as f32 * weight_factor).exp();

            let bin = ((n as f32 * orientation / 360.0).round() as i32).rem_euclid(n);
            raw[bin as usize] += weight * magnitude;
        }
    }

    let hist = smooth_histogram(&raw);
    let max = hist.iter().cloned().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }

    let mut oriented = Vec::new();
    for i in 0..ORI_HIST_BINS {
        let left = hist[(i + ORI_HIST_BINS - 1) % ORI_HIST_BINS];
        let right = hist[(i + 1) % ORI_HIST_BINS];
        let center = hist[i];

        if center > left && center > right && center >= ORI_PEAK_RATIO * max {
            let mut bin = i as f32 + 0.5 * (left - right) / (left - 2.0 * center + right);
            if bin < 0.0 {
                bin += n as f32;
            } else if bin >= n as f32 {
                bin -= n as f32;
            }

            let mut angle = 360.0 - (360.0 / n as f32) * bin;
            if angle >= 360.0 || (angle - 360.0).abs() < f32::EPSILON * 360.0 {
                angle = 0.0;
            } else if angle < 0.0 {
                angle += 360.0;
            }
            oriented.push(KeyPoint { angle, ..kp });
        }
    }

    oriented
}

fn smooth_histogram(raw: &[f32; ORI_HIST_BINS]) -> [f32; ORI_HIST_BINS] {
    let n = ORI_HIST_BINS;
    let mut hist = [0.0f32; ORI_HIST_BINS];
    for (i, h) in hist.iter_mut().enumerate() {
        let m1 = raw[(i + n - 1) % n];
        let m2 = raw[(i + n - 2) % n];
        let p1 = raw[(i + 1) % n];
        let p2 = raw[(i + 2) % n];
        *h = (m2 + p2) * (1.0 / 16.0) + (m1 + p1) * (4.0 / 16.0) + raw[i] * (6.0 / 16.0);
    }
    hist
}
