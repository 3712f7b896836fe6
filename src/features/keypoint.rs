/// 検出された特徴点
///
/// 座標・スケールは入力画像の座標系。角度は度（OpenCVと同じ向き）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    /// ガウシアンスケール（入力画像座標系）
    pub sigma: f32,
    /// 主方向 [0, 360)
    pub angle: f32,
    /// 補間後のDoG応答の絶対値
    pub response: f32,
    pub octave: usize,
    /// オクターブ内のガウシアン画像の添字
    pub layer: usize,
}

impl KeyPoint {
    /// オクターブ座標→入力画像座標の倍率（ベース画像は2倍拡大済み）
    pub fn octave_scale(&self) -> f32 {
        2f32.powi(self.octave as i32) * 0.5
    }
}

/// 完全に同一の特徴点を除去
pub(crate) fn remove_duplicates(keypoints: &mut Vec<KeyPoint>) {
    keypoints.sort_by(|a, b| {
        a.x.total_cmp(&b.x)
            .then(a.y.total_cmp(&b.y))
            .then(a.sigma.total_cmp(&b.sigma))
            .then(a.angle.total_cmp(&b.angle))
    });
    keypoints.dedup_by(|a, b| a.x == b.x && a.y == b.y && a.sigma == b.sigma && a.angle == b.angle);
}

/// 応答の強い順に上限件数だけ残す
pub(crate) fn retain_best(keypoints: &mut Vec<KeyPoint>, limit: usize) {
    if keypoints.len() <= limit {
        return;
    }
    keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
    keypoints.truncate(limit);
}
