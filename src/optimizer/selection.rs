//! Diversity-constrained batch selection.
//!
//! Candidates are visited in descending score order and accepted when they
//! sit at least `min_distance` (in bounds-normalised space) from every
//! observation and every accepted candidate. If that yields fewer than `k`
//! picks the constraint is relaxed and the batch is filled with the best
//! remaining candidates.

use tracing::debug;

use crate::config::defaults::DEGENERATE_RANGE_EPS;
use crate::types::ParamBounds;

/// Scored candidates plus their positions in the unit box.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    pub points: Vec<Vec<f64>>,
    pub scores: Vec<f64>,
    normalized: Vec<Vec<f64>>,
    order: Vec<usize>,
}

/// Map a point into the bounds box; near-zero spans count as 1.
pub fn normalize(point: &[f64], bounds: &[ParamBounds]) -> Vec<f64> {
    point
        .iter()
        .zip(bounds)
        .map(|(v, b)| {
            let span = b.span();
            let span = if span <= DEGENERATE_RANGE_EPS { 1.0 } else { span };
            (v - b.low) / span
        })
        .collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

impl CandidatePool {
    pub fn new(points: Vec<Vec<f64>>, scores: Vec<f64>, bounds: &[ParamBounds]) -> Self {
        let normalized = points.iter().map(|p| normalize(p, bounds)).collect();
        let mut order: Vec<usize> = (0..points.len()).collect();
        // stable sort keeps the draw order among equal scores
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        Self {
            points,
            scores,
            normalized,
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Indices by descending score.
    pub fn ranked(&self) -> &[usize] {
        &self.order
    }

    pub fn normalized(&self, idx: usize) -> &[f64] {
        &self.normalized[idx]
    }
}

/// Indices of the accepted candidates, in acceptance order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptedSet {
    indices: Vec<usize>,
}

impl AcceptedSet {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.indices.contains(&idx)
    }

    pub fn push(&mut self, idx: usize) {
        self.indices.push(idx);
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn into_indices(self) -> Vec<usize> {
        self.indices
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub indices: Vec<usize>,
    /// Whether the distance constraint had to be dropped to reach `k`
    pub relaxed: bool,
}

/// Pick exactly `k` candidate indices (`k >= 1`, pool non-empty).
///
/// When the pool holds fewer than `k` candidates, indices repeat in rank
/// order.
pub fn select_batch(
    pool: &CandidatePool,
    observed_normalized: &[Vec<f64>],
    k: usize,
    min_distance: f64,
) -> Selection {
    let k = k.max(1);
    let min_d = min_distance.max(0.0);
    let mut accepted = AcceptedSet::default();
    if pool.is_empty() {
        return Selection {
            indices: Vec::new(),
            relaxed: true,
        };
    }

    for &idx in pool.ranked() {
        let v = pool.normalized(idx);
        if observed_normalized.iter().any(|o| distance(o, v) < min_d) {
            continue;
        }
        if accepted
            .indices()
            .iter()
            .any(|&a| distance(pool.normalized(a), v) < min_d)
        {
            continue;
        }
        accepted.push(idx);
        if accepted.len() >= k {
            break;
        }
    }

    let relaxed = accepted.len() < k;
    if relaxed {
        debug!(accepted = accepted.len(), wanted = k, min_d, "Relaxing diversity constraint");
        if accepted.is_empty() {
            accepted.push(pool.ranked()[0]);
        }
        for &idx in pool.ranked() {
            if accepted.len() >= k {
                break;
            }
            if !accepted.contains(idx) {
                accepted.push(idx);
            }
        }
        let mut cycle = pool.ranked().iter().cycle();
        while accepted.len() < k {
            if let Some(&idx) = cycle.next() {
                accepted.push(idx);
            }
        }
    }

    Selection {
        indices: accepted.into_indices(),
        relaxed,
    }
}
