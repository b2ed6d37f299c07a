//! Histogram-based regression trees.
//!
//! Both tree ensembles share this grower:
//! - features are quantised once per fit into at most 256 bins ([`BinnedFeatures`]);
//! - splits minimise squared error on a caller-supplied target;
//! - growth is best-first (highest gain leaf next) and bounded by depth and leaf count;
//! - leaf values are computed by a caller-supplied function, so L1 boosting can set
//!   them to residual medians while the forest uses means.
//!
//! Split thresholds are stored in raw feature units, so prediction never needs the bins.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Upper bound on cut points per feature (bin ids fit in a `u8`).
const MAX_CUTS: usize = 255;

const MIN_GAIN: f64 = 1e-12;

/// Training matrix quantised per feature.
#[derive(Debug, Clone)]
pub struct BinnedFeatures {
    /// Sorted cut points; bin `b` holds values `x` with `cuts[b-1] < x <= cuts[b]`.
    cuts: Vec<Vec<f64>>,
    /// Column-major bin ids.
    bins: Vec<Vec<u8>>,
}

impl BinnedFeatures {
    pub fn new(x: &[Vec<f64>]) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut cuts = Vec::with_capacity(n_features);
        let mut bins = Vec::with_capacity(n_features);

        for f in 0..n_features {
            let mut column: Vec<f64> = x.iter().map(|row| row[f]).collect();
            let feature_cuts = cut_points(&mut column);
            let ids = x
                .iter()
                .map(|row| bin_of(&feature_cuts, row[f]))
                .collect();
            cuts.push(feature_cuts);
            bins.push(ids);
        }

        Self { cuts, bins }
    }

    pub fn n_features(&self) -> usize {
        self.cuts.len()
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }

    fn bin(&self, feature: usize, row: usize) -> u8 {
        self.bins[feature][row]
    }

    fn threshold(&self, feature: usize, bin: u8) -> f64 {
        self.cuts[feature][bin as usize]
    }
}

/// Midpoints between distinct values, thinned to at most [`MAX_CUTS`] quantiles.
fn cut_points(values: &mut Vec<f64>) -> Vec<f64> {
    values.retain(|v| v.is_finite());
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    if values.len() < 2 {
        return Vec::new();
    }

    let gaps = values.len() - 1;
    if gaps <= MAX_CUTS {
        return values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    }

    let step = values.len() as f64 / (MAX_CUTS + 1) as f64;
    let mut cuts: Vec<f64> = (1..=MAX_CUTS)
        .map(|k| {
            let i = ((k as f64 * step) as usize).clamp(1, gaps);
            (values[i - 1] + values[i]) / 2.0
        })
        .collect();
    cuts.dedup();
    cuts
}

fn bin_of(cuts: &[f64], value: f64) -> u8 {
    // Number of cuts strictly below `value`; at most MAX_CUTS.
    cuts.partition_point(|&c| c < value) as u8
}

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy)]
pub struct GrowParams {
    pub max_depth: usize,
    pub max_leaves: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split; `usize::MAX` means all available.
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Arena-allocated regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: u8,
    gain: f64,
}

struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    split: Option<SplitCandidate>,
}

impl RegressionTree {
    /// Grow a tree on `rows` of `bins`, splitting to reduce squared error of `target`.
    ///
    /// `features` restricts the candidate columns for the whole tree; `importances`
    /// receives the split gain credited to each feature.
    #[allow(clippy::too_many_arguments)]
    pub fn grow(
        bins: &BinnedFeatures,
        target: &[f64],
        rows: Vec<usize>,
        features: &[usize],
        params: &GrowParams,
        rng: &mut StdRng,
        importances: &mut [f64],
        leaf_value: impl Fn(&[usize]) -> f64,
    ) -> Self {
        let min_leaf = params.min_samples_leaf.max(1);
        let pick = |rng: &mut StdRng| -> Vec<usize> {
            if params.max_features >= features.len() {
                return features.to_vec();
            }
            let mut chosen: Vec<usize> = features
                .choose_multiple(rng, params.max_features.max(1))
                .copied()
                .collect();
            chosen.sort_unstable();
            chosen
        };

        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        let root_split = if params.max_depth > 0 {
            find_split(bins, target, &rows, &pick(rng), min_leaf)
        } else {
            None
        };
        let mut open = vec![OpenLeaf {
            node: 0,
            rows,
            depth: 0,
            split: root_split,
        }];
        let mut n_leaves = 1;

        while n_leaves < params.max_leaves {
            let best = open
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.split.map(|s| (i, s.gain)))
                .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));
            let Some((idx, _)) = best else {
                break;
            };

            let leaf = open.remove(idx);
            let Some(split) = leaf.split else {
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .iter()
                .partition(|&&r| bins.bin(split.feature, r) <= split.bin);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes[leaf.node] = TreeNode::Split {
                feature: split.feature,
                threshold: bins.threshold(split.feature, split.bin),
                left,
                right,
            };
            importances[split.feature] += split.gain;
            n_leaves += 1;

            let depth = leaf.depth + 1;
            for (node, child_rows) in [(left, left_rows), (right, right_rows)] {
                let child_split = if depth < params.max_depth {
                    find_split(bins, target, &child_rows, &pick(rng), min_leaf)
                } else {
                    None
                };
                open.push(OpenLeaf {
                    node,
                    rows: child_rows,
                    depth,
                    split: child_split,
                });
            }
        }

        for leaf in &open {
            nodes[leaf.node] = TreeNode::Leaf {
                value: leaf_value(&leaf.rows),
            };
        }

        Self { nodes }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Largest feature index referenced by a split, if any.
    pub fn max_feature_index(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                TreeNode::Split { feature, .. } => Some(*feature),
                TreeNode::Leaf { .. } => None,
            })
            .max()
    }
}

/// Best squared-error split of `rows` over `features`, using per-bin sums.
fn find_split(
    bins: &BinnedFeatures,
    target: &[f64],
    rows: &[usize],
    features: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let n = rows.len();
    if n < 2 * min_leaf {
        return None;
    }

    let total: f64 = rows.iter().map(|&r| target[r]).sum();
    let parent = total * total / n as f64;
    let mut best: Option<SplitCandidate> = None;

    for &f in features {
        let n_bins = bins.n_bins(f);
        if n_bins < 2 {
            continue;
        }

        let mut sums = vec![0.0; n_bins];
        let mut counts = vec![0usize; n_bins];
        for &r in rows {
            let b = bins.bin(f, r) as usize;
            sums[b] += target[r];
            counts[b] += 1;
        }

        let mut left_sum = 0.0;
        let mut left_n = 0usize;
        for b in 0..n_bins - 1 {
            if counts[b] == 0 {
                continue;
            }
            left_sum += sums[b];
            left_n += counts[b];
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64
                - parent;
            if gain > best.map_or(MIN_GAIN, |s| s.gain) {
                best = Some(SplitCandidate {
                    feature: f,
                    bin: b as u8,
                    gain,
                });
            }
        }
    }

    best
}
