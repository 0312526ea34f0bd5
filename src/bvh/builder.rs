//! Generic top-down SAH BVH builder.
//!
//! The builder is parameterized by the item type (through a
//! [`BoundsAccessor`]) and by a [`ScoringStrategy`]. Split candidates for a
//! node are scored in parallel on rayon; the partition/recurse control flow
//! stays single-threaded and depth-first, left before right.
//!
//! Every node reserves its slot before its children are built, so the root of
//! a build is always index 0. Leaves are appended as they complete.

use rayon::prelude::*;

use super::node::{BvhNode, NodeKind};
use crate::util::{BBox3f, Error, Result, Vec3};

/// Exposes the bounds of a build item.
pub trait BoundsAccessor<T> {
    fn bbox(&self, item: &T) -> BBox3f;
    fn centroid(&self, item: &T) -> Vec3;
}

/// Item bounds, gathered once per build.
pub struct BuildItems {
    pub bboxes: Vec<BBox3f>,
    pub centroids: Vec<Vec3>,
}

impl BuildItems {
    fn gather<T, A: BoundsAccessor<T>>(items: &[T], accessor: &A) -> Self {
        Self {
            bboxes: items.iter().map(|item| accessor.bbox(item)).collect(),
            centroids: items.iter().map(|item| accessor.centroid(item)).collect(),
        }
    }
}

/// Result of scoring one candidate split plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitScore {
    pub axis: usize,
    pub split_point: f32,
    pub left_count: u32,
    pub right_count: u32,
    pub score: f32,
}

/// Cost model used to pick split planes.
pub trait ScoringStrategy: Sync {
    /// Score splitting `indices` at `split_point` along `axis`.
    /// Must return `f32::INFINITY` when either side would be empty.
    fn score_split(&self, items: &BuildItems, indices: &[u32], axis: usize, split_point: f32) -> SplitScore;

    /// Cost of keeping `count` items in one leaf bounded by `bbox`.
    fn score_partition(&self, count: usize, bbox: &BBox3f) -> f32;
}

/// Surface area heuristic: `count x area` per side.
#[derive(Debug, Clone, Copy, Default)]
pub struct SahStrategy;

impl ScoringStrategy for SahStrategy {
    fn score_split(&self, items: &BuildItems, indices: &[u32], axis: usize, split_point: f32) -> SplitScore {
        let mut left_bbox = BBox3f::EMPTY;
        let mut right_bbox = BBox3f::EMPTY;
        let mut left_count = 0u32;
        let mut right_count = 0u32;

        for &idx in indices {
            let idx = idx as usize;
            if items.centroids[idx][axis] < split_point {
                left_count += 1;
                left_bbox.expand_by_box(&items.bboxes[idx]);
            } else {
                right_count += 1;
                right_bbox.expand_by_box(&items.bboxes[idx]);
            }
        }

        let score = if left_count == 0 || right_count == 0 {
            f32::INFINITY
        } else {
            left_count as f32 * left_bbox.surface_area() + right_count as f32 * right_bbox.surface_area()
        };

        SplitScore {
            axis,
            split_point,
            left_count,
            right_count,
            score,
        }
    }

    fn score_partition(&self, count: usize, bbox: &BBox3f) -> f32 {
        if count == 0 {
            return f32::INFINITY;
        }
        count as f32 * bbox.surface_area()
    }
}

/// Builder parameters.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Nodes with this many items or fewer become leaves.
    pub min_leaf_size: usize,
    /// Upper bound on leaf size; when SAH refuses to split a larger node,
    /// an object median split is forced. `None` keeps SAH leaves as-is.
    pub max_leaf_size: Option<usize>,
    /// Candidate planes per axis.
    pub split_candidates: u32,
    /// Axes with a smaller extent are not split.
    pub min_axis_extent: f32,
    /// Axes whose candidate spacing is smaller are not split.
    pub min_split_step: f32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            min_leaf_size: 1,
            max_leaf_size: None,
            split_candidates: 100,
            min_axis_extent: 1e-3,
            min_split_step: 1e-5,
        }
    }
}

/// Counters collected during a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub nodes: u32,
    pub leaves: u32,
    pub max_depth: u32,
    pub partitioned_items: u32,
}

/// Output of a build.
#[derive(Debug, Clone)]
pub struct BuiltBvh {
    pub nodes: Vec<BvhNode>,
    pub root: u32,
    pub stats: BuildStats,
}

/// Generic SAH builder.
pub struct BvhBuilder<'p, S = SahStrategy> {
    strategy: S,
    options: BuildOptions,
    pool: Option<&'p rayon::ThreadPool>,
}

impl<'p, S: ScoringStrategy> BvhBuilder<'p, S> {
    pub fn new(strategy: S, options: BuildOptions) -> Self {
        Self {
            strategy,
            options,
            pool: None,
        }
    }

    /// Score candidates on a dedicated pool instead of the global one.
    pub fn with_pool(mut self, pool: &'p rayon::ThreadPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Build a tree over `items`.
    ///
    /// `leaf` receives the item indices of each new leaf (in depth-first
    /// order) and returns the leaf payload.
    #[tracing::instrument(skip_all, fields(items = items.len()))]
    pub fn build<T, A, F>(&self, items: &[T], accessor: &A, leaf: F) -> Result<BuiltBvh>
    where
        A: BoundsAccessor<T>,
        F: FnMut(&[u32]) -> NodeKind,
    {
        if items.is_empty() {
            return Err(Error::EmptyBuild);
        }

        let mut state = BuildState {
            builder: self,
            items: BuildItems::gather(items, accessor),
            nodes: Vec::with_capacity(2 * items.len()),
            stats: BuildStats::default(),
            leaf,
        };

        let indices: Vec<u32> = (0..items.len() as u32).collect();
        let root = state.partition(indices, 0);

        tracing::debug!(
            nodes = state.stats.nodes,
            leaves = state.stats.leaves,
            max_depth = state.stats.max_depth,
            "BVH built"
        );

        Ok(BuiltBvh {
            nodes: state.nodes,
            root,
            stats: state.stats,
        })
    }

    fn candidates(&self, bbox: &BBox3f) -> Vec<(usize, f32)> {
        let n = self.options.split_candidates.max(2);
        let side = bbox.size();
        let mut out = Vec::with_capacity(3 * n as usize);

        for axis in 0..3 {
            if side[axis] < self.options.min_axis_extent {
                continue;
            }
            let step = side[axis] / n as f32;
            if step < self.options.min_split_step {
                continue;
            }
            for i in 1..n {
                out.push((axis, bbox.min[axis] + step * i as f32));
            }
        }

        out
    }

    fn score_candidates(&self, items: &BuildItems, indices: &[u32], candidates: &[(usize, f32)]) -> Vec<SplitScore> {
        let strategy = &self.strategy;
        let score_all = || {
            candidates
                .par_iter()
                .with_min_len(4)
                .map(|&(axis, split)| strategy.score_split(items, indices, axis, split))
                .collect::<Vec<_>>()
        };

        match self.pool {
            Some(pool) => pool.install(score_all),
            None => score_all(),
        }
    }
}

struct BuildState<'b, 'p, S, F> {
    builder: &'b BvhBuilder<'p, S>,
    items: BuildItems,
    nodes: Vec<BvhNode>,
    stats: BuildStats,
    leaf: F,
}

impl<S, F> BuildState<'_, '_, S, F>
where
    S: ScoringStrategy,
    F: FnMut(&[u32]) -> NodeKind,
{
    fn partition(&mut self, indices: Vec<u32>, depth: u32) -> u32 {
        self.stats.max_depth = self.stats.max_depth.max(depth);

        let mut bbox = BBox3f::EMPTY;
        for &idx in &indices {
            bbox.expand_by_box(&self.items.bboxes[idx as usize]);
        }

        let builder = self.builder;
        let options = &builder.options;
        if indices.len() <= options.min_leaf_size {
            return self.create_leaf(bbox, &indices);
        }

        let baseline = builder.strategy.score_partition(indices.len(), &bbox);
        let candidates = builder.candidates(&bbox);
        let scores = builder.score_candidates(&self.items, &indices, &candidates);

        // Sequential reduction keeps the first minimum for determinism.
        let mut best: Option<SplitScore> = None;
        let mut best_score = baseline;
        for score in scores {
            if score.score < best_score {
                best_score = score.score;
                best = Some(score);
            }
        }

        let (left, right) = match best {
            Some(split) => indices.iter().partition::<Vec<u32>, _>(|&&idx| {
                self.items.centroids[idx as usize][split.axis] < split.split_point
            }),
            None => match options.max_leaf_size {
                Some(max) if indices.len() > max => self.median_split(&indices),
                _ => return self.create_leaf(bbox, &indices),
            },
        };

        let node_index = self.nodes.len() as u32;
        self.nodes.push(BvhNode::new(bbox, NodeKind::Internal { left: 0, right: 0 }));
        self.stats.nodes += 1;

        let left_index = self.partition(left, depth + 1);
        let right_index = self.partition(right, depth + 1);
        self.nodes[node_index as usize].kind = NodeKind::Internal {
            left: left_index,
            right: right_index,
        };

        node_index
    }

    /// Object median along the axis of largest centroid spread.
    fn median_split(&self, indices: &[u32]) -> (Vec<u32>, Vec<u32>) {
        let centroids = &self.items.centroids;
        let spread = BBox3f::from_points(indices.iter().map(|&i| centroids[i as usize])).size();
        let axis = if spread.x >= spread.y && spread.x >= spread.z {
            0
        } else if spread.y >= spread.z {
            1
        } else {
            2
        };

        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| {
            centroids[a as usize][axis]
                .total_cmp(&centroids[b as usize][axis])
                .then(a.cmp(&b))
        });
        let right = sorted.split_off(sorted.len() / 2);
        (sorted, right)
    }

    fn create_leaf(&mut self, bbox: BBox3f, indices: &[u32]) -> u32 {
        let kind = (self.leaf)(indices);
        debug_assert!(
            !matches!(kind, NodeKind::Internal { .. }),
            "leaf callback must return a leaf payload"
        );

        let node_index = self.nodes.len() as u32;
        self.nodes.push(BvhNode::new(bbox, kind));
        self.stats.nodes += 1;
        self.stats.leaves += 1;
        self.stats.partitioned_items += indices.len() as u32;
        node_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct BoxAccessor;

    impl BoundsAccessor<BBox3f> for BoxAccessor {
        fn bbox(&self, item: &BBox3f) -> BBox3f {
            *item
        }
        fn centroid(&self, item: &BBox3f) -> Vec3 {
            item.center()
        }
    }

    fn cube_at(x: f32, y: f32, z: f32) -> BBox3f {
        let c = Vec3::new(x, y, z);
        BBox3f::new(c - Vec3::splat(0.25), c + Vec3::splat(0.25))
    }

    fn grid(n: usize) -> Vec<BBox3f> {
        (0..n)
            .map(|i| cube_at((i % 7) as f32 * 2.0, (i / 7 % 5) as f32 * 1.5, (i / 35) as f32 * 3.0))
            .collect()
    }

    fn build_ranges(items: &[BBox3f], options: BuildOptions) -> (BuiltBvh, Vec<Vec<u32>>) {
        let mut leaves = Vec::new();
        let bvh = BvhBuilder::new(SahStrategy, options)
            .build(items, &BoxAccessor, |idx| {
                leaves.push(idx.to_vec());
                NodeKind::PrimitiveLeaf {
                    offset: (leaves.len() - 1) as u32,
                    count: idx.len() as u32,
                }
            })
            .unwrap();
        (bvh, leaves)
    }

    fn check_bounds(bvh: &BuiltBvh, items: &[BBox3f], leaves: &[Vec<u32>]) {
        for node in &bvh.nodes {
            match node.kind {
                NodeKind::Internal { left, right } => {
                    let l = bvh.nodes[left as usize].bbox;
                    let r = bvh.nodes[right as usize].bbox;
                    assert_eq!(node.bbox, l.union(&r));
                }
                NodeKind::PrimitiveLeaf { offset, .. } => {
                    for &i in &leaves[offset as usize] {
                        assert!(node.bbox.contains_box(&items[i as usize]));
                    }
                }
                NodeKind::InstanceLeaf { .. } => unreachable!(),
            }
        }
    }

    #[test]
    fn test_single_item() {
        let items = vec![cube_at(0.0, 0.0, 0.0)];
        let (bvh, leaves) = build_ranges(&items, BuildOptions::default());
        assert_eq!(bvh.nodes.len(), 1);
        assert_eq!(bvh.root, 0);
        assert_eq!(leaves, vec![vec![0]]);
    }

    #[test]
    fn test_bounds_invariant_and_completeness() {
        let items = grid(200);
        let options = BuildOptions {
            min_leaf_size: 4,
            ..Default::default()
        };
        let (bvh, leaves) = build_ranges(&items, options);

        assert!(bvh.nodes.len() > 1, "BVH should have internal nodes");
        assert_eq!(bvh.root, 0);
        check_bounds(&bvh, &items, &leaves);

        let mut seen: Vec<u32> = leaves.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..200).collect::<Vec<_>>());
        assert_eq!(bvh.stats.partitioned_items, 200);
        assert_eq!(bvh.stats.leaves as usize, leaves.len());
    }

    #[test]
    fn test_children_are_reachable_once() {
        let items = grid(64);
        let (bvh, _) = build_ranges(&items, BuildOptions::default());

        let mut visited = HashSet::new();
        let mut stack = vec![bvh.root];
        while let Some(i) = stack.pop() {
            assert!(visited.insert(i), "node {i} reached twice");
            if let Some((l, r)) = bvh.nodes[i as usize].children() {
                stack.push(l);
                stack.push(r);
            }
        }
        assert_eq!(visited.len(), bvh.nodes.len());
    }

    #[test]
    fn test_identical_centroids_make_one_leaf() {
        let items: Vec<BBox3f> = (1..=20)
            .map(|i| {
                let h = Vec3::splat(i as f32 * 0.1);
                BBox3f::new(-h, h)
            })
            .collect();
        let (bvh, leaves) = build_ranges(&items, BuildOptions::default());
        assert_eq!(bvh.nodes.len(), 1);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].len(), 20);
    }

    #[test]
    fn test_max_leaf_size_forces_split() {
        let items = vec![cube_at(1.0, 1.0, 1.0); 5];
        let options = BuildOptions {
            max_leaf_size: Some(1),
            ..Default::default()
        };
        let (bvh, leaves) = build_ranges(&items, options);
        assert_eq!(leaves.len(), 5);
        assert!(leaves.iter().all(|l| l.len() == 1));
        check_bounds(&bvh, &items, &leaves);
    }

    #[test]
    fn test_build_is_deterministic() {
        let items = grid(120);
        let (a, _) = build_ranges(&items, BuildOptions::default());
        let (b, _) = build_ranges(&items, BuildOptions::default());
        assert_eq!(a.nodes, b.nodes);
    }

    #[test]
    fn test_dedicated_pool() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let items = grid(50);
        let options = BuildOptions {
            max_leaf_size: Some(1),
            ..Default::default()
        };
        let bvh = BvhBuilder::new(SahStrategy, options)
            .with_pool(&pool)
            .build(&items, &BoxAccessor, |idx| NodeKind::InstanceLeaf { instance: idx[0] })
            .unwrap();
        assert_eq!(bvh.stats.leaves, 50);
    }

    #[test]
    fn test_empty_build_rejected() {
        let items: Vec<BBox3f> = Vec::new();
        let result = BvhBuilder::new(SahStrategy, BuildOptions::default())
            .build(&items, &BoxAccessor, |_| NodeKind::InstanceLeaf { instance: 0 });
        assert!(matches!(result, Err(Error::EmptyBuild)));
    }

    #[test]
    fn test_sah_rejects_empty_side() {
        let items = BuildItems {
            bboxes: vec![cube_at(0.0, 0.0, 0.0), cube_at(1.0, 0.0, 0.0)],
            centroids: vec![Vec3::ZERO, Vec3::X],
        };
        let score = SahStrategy.score_split(&items, &[0, 1], 0, 5.0);
        assert_eq!(score.score, f32::INFINITY);
        let score = SahStrategy.score_split(&items, &[0, 1], 0, 0.5);
        assert_eq!((score.left_count, score.right_count), (1, 1));
        assert!(score.score.is_finite());
    }
}
