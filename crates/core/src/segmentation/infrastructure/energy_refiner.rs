//! GrabCut-style foreground/background separation.
//!
//! One model-estimation round: colour histograms are learned from the
//! trimap's current labelling, then a single s-t minimum cut over the
//! undecided pixels minimises data cost plus a contrast-sensitive Potts
//! smoothness term. Fixed seeds only enter as terminal costs on their
//! undecided neighbours, so the graph is as small as the uncertain band.

use std::collections::VecDeque;

use crate::segmentation::domain::morphology::BinaryImage;
use crate::segmentation::domain::seeded_refiner::{RefinementError, Seed, SeededRefiner, Trimap};
use crate::shared::frame::Frame;

/// Histogram bins per colour channel.
const BINS_PER_CHANNEL: usize = 8;
const BIN_SHIFT: u32 = 5; // 256 / 8
const HISTOGRAM_SIZE: usize = BINS_PER_CHANNEL * BINS_PER_CHANNEL * BINS_PER_CHANNEL;

/// Smoothness weight (GrabCut's gamma).
pub const DEFAULT_GAMMA: f64 = 50.0;

const FLOW_EPS: f64 = 1e-9;

pub struct EnergyRefiner {
    gamma: f64,
}

impl EnergyRefiner {
    pub fn new(gamma: f64) -> Self {
        Self { gamma }
    }
}

impl Default for EnergyRefiner {
    fn default() -> Self {
        Self::new(DEFAULT_GAMMA)
    }
}

impl SeededRefiner for EnergyRefiner {
    fn refine(&self, frame: &Frame, trimap: &Trimap) -> Result<BinaryImage, RefinementError> {
        let (w, h) = (trimap.width, trimap.height);
        if w != frame.width() as usize || h != frame.height() as usize || trimap.seeds.len() != w * h
        {
            return Err(RefinementError::ShapeMismatch {
                trimap_width: w,
                trimap_height: h,
                frame_width: frame.width() as usize,
                frame_height: frame.height() as usize,
            });
        }

        let pixels = frame.data();
        let colour = |i: usize| -> [f64; 3] {
            [
                pixels[i * 3] as f64,
                pixels[i * 3 + 1] as f64,
                pixels[i * 3 + 2] as f64,
            ]
        };
        let bin = |i: usize| -> usize {
            let r = (pixels[i * 3] >> BIN_SHIFT) as usize;
            let g = (pixels[i * 3 + 1] >> BIN_SHIFT) as usize;
            let b = (pixels[i * 3 + 2] >> BIN_SHIFT) as usize;
            (r * BINS_PER_CHANNEL + g) * BINS_PER_CHANNEL + b
        };

        let is_fg = |i: &usize| trimap.seeds[*i].is_foreground();
        let fg_model = ColourModel::learn((0..w * h).filter(is_fg).map(bin));
        let bg_model = ColourModel::learn((0..w * h).filter(|i| !is_fg(i)).map(bin));
        if fg_model.total == 0 || bg_model.total == 0 {
            return Err(RefinementError::InsufficientSeeds);
        }

        let beta = contrast_beta(w, h, &colour);
        let smoothness = |a: usize, b: usize| -> f64 {
            self.gamma * (-beta * squared_distance(colour(a), colour(b))).exp()
        };

        // Undecided pixels become graph nodes 2.. ; 0 is source (fg), 1 sink (bg).
        let mut node_of = vec![usize::MAX; w * h];
        let mut free = Vec::new();
        for (i, seed) in trimap.seeds.iter().enumerate() {
            if !seed.is_fixed() {
                node_of[i] = free.len() + 2;
                free.push(i);
            }
        }

        let mut result = BinaryImage::new(w, h);
        for (i, seed) in trimap.seeds.iter().enumerate() {
            if *seed == Seed::Foreground {
                result.set(i % w, i / w, true);
            }
        }
        if free.is_empty() {
            return Ok(result);
        }

        let mut graph = FlowGraph::new(free.len() + 2);
        for &i in &free {
            let node = node_of[i];
            let b = bin(i);
            // Cutting source→p labels p background; cutting p→sink labels it foreground.
            let mut to_source = bg_model.cost(b);
            let mut to_sink = fg_model.cost(b);
            let (x, y) = (i % w, i / w);
            for (nx, ny) in neighbours(x, y, w, h) {
                let j = ny * w + nx;
                let weight = smoothness(i, j);
                match trimap.seeds[j] {
                    s if !s.is_fixed() => {
                        // Each undirected pair is added once.
                        if j > i {
                            graph.add_edge(node, node_of[j], weight, weight);
                        }
                    }
                    s if s.is_foreground() => to_source += weight,
                    _ => to_sink += weight,
                }
            }
            let shared = to_source.min(to_sink);
            graph.add_edge(0, node, to_source - shared, 0.0);
            graph.add_edge(node, 1, to_sink - shared, 0.0);
        }

        graph.max_flow(0, 1);
        let source_side = graph.reachable_from(0);
        for &i in &free {
            result.set(i % w, i / w, source_side[node_of[i]]);
        }
        Ok(result)
    }
}

struct ColourModel {
    counts: Vec<u32>,
    total: u32,
}

impl ColourModel {
    fn learn(bins: impl Iterator<Item = usize>) -> Self {
        let mut counts = vec![0u32; HISTOGRAM_SIZE];
        let mut total = 0;
        for b in bins {
            counts[b] += 1;
            total += 1;
        }
        Self { counts, total }
    }

    /// Negative log-likelihood with add-one smoothing.
    fn cost(&self, bin: usize) -> f64 {
        let p = (self.counts[bin] as f64 + 1.0) / (self.total as f64 + HISTOGRAM_SIZE as f64);
        -p.ln()
    }
}

fn squared_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// `1 / (2 * mean squared neighbour difference)`, 0 for flat images.
fn contrast_beta(w: usize, h: usize, colour: &impl Fn(usize) -> [f64; 3]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            if x + 1 < w {
                sum += squared_distance(colour(i), colour(i + 1));
                count += 1;
            }
            if y + 1 < h {
                sum += squared_distance(colour(i), colour(i + w));
                count += 1;
            }
        }
    }
    if count == 0 || sum <= 0.0 {
        0.0
    } else {
        1.0 / (2.0 * sum / count as f64)
    }
}

fn neighbours(x: usize, y: usize, w: usize, h: usize) -> impl Iterator<Item = (usize, usize)> {
    let candidates = [
        (x.wrapping_sub(1), y),
        (x + 1, y),
        (x, y.wrapping_sub(1)),
        (x, y + 1),
    ];
    candidates.into_iter().filter(move |&(nx, ny)| nx < w && ny < h)
}

struct Edge {
    to: usize,
    cap: f64,
}

/// Dinic max-flow over residual capacities. Edge `e ^ 1` is the reverse of `e`.
struct FlowGraph {
    edges: Vec<Edge>,
    adjacency: Vec<Vec<usize>>,
}

impl FlowGraph {
    fn new(nodes: usize) -> Self {
        Self {
            edges: Vec::new(),
            adjacency: vec![Vec::new(); nodes],
        }
    }

    fn add_edge(&mut self, from: usize, to: usize, cap: f64, reverse_cap: f64) {
        self.adjacency[from].push(self.edges.len());
        self.edges.push(Edge { to, cap });
        self.adjacency[to].push(self.edges.len());
        self.edges.push(Edge {
            to: from,
            cap: reverse_cap,
        });
    }

    fn max_flow(&mut self, source: usize, sink: usize) -> f64 {
        let mut total = 0.0;
        while let Some(mut level) = self.levels(source, sink) {
            let mut next = vec![0usize; self.adjacency.len()];
            total += self.blocking_flow(source, sink, &mut level, &mut next);
        }
        total
    }

    /// BFS levels in the residual graph, `None` once the sink is unreachable.
    fn levels(&self, source: usize, sink: usize) -> Option<Vec<u32>> {
        let mut level = vec![u32::MAX; self.adjacency.len()];
        level[source] = 0;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adjacency[u] {
                let v = self.edges[e].to;
                if self.edges[e].cap > FLOW_EPS && level[v] == u32::MAX {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        (level[sink] != u32::MAX).then_some(level)
    }

    /// Iterative DFS augmenting along level-increasing edges until blocked.
    fn blocking_flow(
        &mut self,
        source: usize,
        sink: usize,
        level: &mut [u32],
        next: &mut [usize],
    ) -> f64 {
        let mut total = 0.0;
        let mut path: Vec<usize> = Vec::new();
        let mut u = source;
        loop {
            if u == sink {
                let pushed = path
                    .iter()
                    .map(|&e| self.edges[e].cap)
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.edges[e].cap -= pushed;
                    self.edges[e ^ 1].cap += pushed;
                }
                total += pushed;
                path.clear();
                u = source;
                continue;
            }

            let mut advanced = false;
            while next[u] < self.adjacency[u].len() {
                let e = self.adjacency[u][next[u]];
                let v = self.edges[e].to;
                if self.edges[e].cap > FLOW_EPS && level[v] == level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                next[u] += 1;
            }
            if advanced {
                continue;
            }

            // Dead end: drop `u` from the level graph and step back.
            level[u] = u32::MAX;
            match path.pop() {
                Some(e) => {
                    u = self.edges[e ^ 1].to;
                    next[u] += 1;
                }
                None => return total,
            }
        }
    }

    fn reachable_from(&self, source: usize) -> Vec<bool> {
        let mut seen = vec![false; self.adjacency.len()];
        seen[source] = true;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adjacency[u] {
                let v = self.edges[e].to;
                if self.edges[e].cap > FLOW_EPS && !seen[v] {
                    seen[v] = true;
                    queue.push_back(v);
                }
            }
        }
        seen
    }
}
