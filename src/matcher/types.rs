/// 記述子同士の対応（query側の添字・train側の添字・距離）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// 照合結果
#[derive(Debug, Clone, Default)]
pub struct MatchSummary {
    /// 比率テストを通過した対応
    pub good_matches: Vec<DescriptorMatch>,
    /// k近傍探索で得た対応レコード数
    pub total: usize,
    /// good / total（goodが0なら0）
    pub similarity_score: f64,
}
