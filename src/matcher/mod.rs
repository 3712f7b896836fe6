mod types;

pub use types::{DescriptorMatch, MatchSummary};

use crate::features::Descriptor;
use rayon::prelude::*;

/// 比率テストの既定値（Lowe）
pub const DEFAULT_RATIO: f32 = 0.75;

/// 総当たりk近傍探索（L2距離）
///
/// queryの各記述子について、trainから距離の近い順に最大k件を返す。
/// trainが空なら結果も空。
pub fn knn_match(query: &[Descriptor], train: &[Descriptor], k: usize) -> Vec<Vec<DescriptorMatch>> {
    if train.is_empty() || k == 0 {
        return Vec::new();
    }

    query
        .par_iter()
        .enumerate()
        .map(|(query_idx, descriptor)| nearest_k(query_idx, descriptor, train, k))
        .collect()
}

fn nearest_k(query_idx: usize, descriptor: &Descriptor, train: &[Descriptor], k: usize) -> Vec<DescriptorMatch> {
    let mut best: Vec<DescriptorMatch> = Vec::with_capacity(k + 1);

    for (train_idx, candidate) in train.iter().enumerate() {
        let distance = descriptor.distance(candidate);
        if best.len() == k && distance >= best[k - 1].distance {
            continue;
        }
        let pos = best.partition_point(|m| m.distance <= distance);
        best.insert(pos, DescriptorMatch { query_idx, train_idx, distance });
        best.truncate(k);
    }

    best
}

/// 比率テスト: 最近傍距離 < ratio × 第2近傍距離 の対応だけを残す
///
/// 近傍が1件しかない対応は判定できないため除外する。
pub fn ratio_test(knn_matches: &[Vec<DescriptorMatch>], ratio: f32) -> Vec<DescriptorMatch> {
    knn_matches
        .iter()
        .filter_map(|neighbors| match neighbors.as_slice() {
            [best, second, ..] if best.distance < ratio * second.distance => Some(*best),
            _ => None,
        })
        .collect()
}

/// 類似度 = 良好な対応数 / 対応レコード数
pub fn similarity_score(good: usize, total: usize) -> f64 {
    if good == 0 || total == 0 {
        0.0
    } else {
        good as f64 / total as f64
    }
}

/// k=2で探索して比率テストをかけ、類似度まで計算
pub fn match_descriptors(query: &[Descriptor], train: &[Descriptor], ratio: f32) -> MatchSummary {
    let knn_matches = knn_match(query, train, 2);
    let good_matches = ratio_test(&knn_matches, ratio);
    let total = knn_matches.len();

    MatchSummary {
        similarity_score: similarity_score(good_matches.len(), total),
        good_matches,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::DESCRIPTOR_LEN;

    fn descriptor(values: &[(usize, f32)]) -> Descriptor {
        let mut d = [0.0; DESCRIPTOR_LEN];
        for &(i, v) in values {
            d[i] = v;
        }
        Descriptor(d)
    }

    #[test]
    fn test_knn_sorted_by_distance() {
        let query = vec![descriptor(&[(0, 0.0)])];
        let train = vec![
            descriptor(&[(0, 5.0)]),
            descriptor(&[(0, 1.0)]),
            descriptor(&[(0, 3.0)]),
        ];

        let knn = knn_match(&query, &train, 2);
        assert_eq!(knn.len(), 1);
        assert_eq!(knn[0].len(), 2);
        assert_eq!(knn[0][0].train_idx, 1);
        assert_eq!(knn[0][1].train_idx, 2);
        assert_eq!(knn[0][0].distance, 1.0);
    }

    #[test]
    fn test_knn_empty_train() {
        let query = vec![descriptor(&[(0, 1.0)])];
        assert!(knn_match(&query, &[], 2).is_empty());
    }

    #[test]
    fn test_knn_single_train_descriptor() {
        let query = vec![descriptor(&[(0, 1.0)]), descriptor(&[(1, 1.0)])];
        let train = vec![descriptor(&[(0, 1.0)])];

        let knn = knn_match(&query, &train, 2);
        assert_eq!(knn.len(), 2);
        assert!(knn.iter().all(|m| m.len() == 1));

        // 近傍1件のみの対応は比率テストを通過しない
        assert!(ratio_test(&knn, DEFAULT_RATIO).is_empty());
    }

    #[test]
    fn test_ratio_test_filters_ambiguous() {
        let query = vec![descriptor(&[(0, 0.0)]), descriptor(&[(1, 10.0)])];
        let train = vec![
            descriptor(&[(0, 1.0)]),
            descriptor(&[(0, 10.0)]),
            descriptor(&[(1, 10.0), (2, 5.0)]),
            descriptor(&[(1, 10.0), (2, 5.5)]),
        ];

        let knn = knn_match(&query, &train, 2);
        let good = ratio_test(&knn, DEFAULT_RATIO);

        // query0: 1.0 vs 次点 → 明確 / query1: 5.0 vs 5.5 → 曖昧
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].query_idx, 0);
        assert_eq!(good[0].train_idx, 0);
    }

    #[test]
    fn test_similarity_score_zero_without_good_matches() {
        assert_eq!(similarity_score(0, 10), 0.0);
        assert_eq!(similarity_score(0, 0), 0.0);
        assert_eq!(similarity_score(3, 4), 0.75);
    }

    #[test]
    fn test_match_descriptors_identical_sets() {
        let set: Vec<Descriptor> = (0..5).map(|i| descriptor(&[(i, 100.0)])).collect();
        let summary = match_descriptors(&set, &set, DEFAULT_RATIO);

        assert_eq!(summary.total, 5);
        assert_eq!(summary.good_matches.len(), 5);
        assert_eq!(summary.similarity_score, 1.0);
    }

    #[test]
    fn test_match_descriptors_empty_query() {
        let train = vec![descriptor(&[(0, 1.0)])];
        let summary = match_descriptors(&[], &train, DEFAULT_RATIO);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.similarity_score, 0.0);
    }
}
