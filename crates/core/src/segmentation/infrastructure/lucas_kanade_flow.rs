use crate::segmentation::domain::flow_estimator::{FlowEstimator, FlowField, LumaPlane};

pub const DEFAULT_LEVELS: usize = 3;
pub const DEFAULT_WINDOW_RADIUS: usize = 4;
const ITERATIONS_PER_LEVEL: usize = 2;
/// Pyramid stops before a level would drop below this size.
const MIN_LEVEL_SIZE: usize = 16;
/// Smallest structure-tensor eigenvalue, in squared luma levels per window
/// pixel, for a window to count as trackable. Sensor noise of a level or two
/// stays below it, as do windows whose gradients all point one way.
const MIN_EIGENVALUE: f64 = 2.0;
/// Largest update a single Gauss-Newton step may apply, in level pixels.
const MAX_STEP: f32 = 1.0;
/// Largest correction a level may add to the upsampled coarser estimate.
const MAX_LEVEL_CORRECTION: f32 = 2.0;

/// Dense pyramidal Lucas–Kanade optical flow.
///
/// Each level refines the upsampled coarser estimate with a few Gauss-Newton
/// steps; window sums come from integral images, so cost per step is
/// independent of the window size.
pub struct LucasKanadeFlow {
    levels: usize,
    window_radius: usize,
}

impl LucasKanadeFlow {
    pub fn new(levels: usize, window_radius: usize) -> Self {
        Self {
            levels: levels.max(1),
            window_radius,
        }
    }
}

impl Default for LucasKanadeFlow {
    fn default() -> Self {
        Self::new(DEFAULT_LEVELS, DEFAULT_WINDOW_RADIUS)
    }
}

#[derive(Clone)]
struct Plane {
    w: usize,
    h: usize,
    data: Vec<f32>,
}

impl Plane {
    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }

    /// Bilinear sample with edge replication.
    fn sample(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.w - 1) as f32);
        let y = y.clamp(0.0, (self.h - 1) as f32);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.w - 1);
        let y1 = (y0 + 1).min(self.h - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let top = self.at(x0, y0) * (1.0 - fx) + self.at(x1, y0) * fx;
        let bottom = self.at(x0, y1) * (1.0 - fx) + self.at(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// 2x2 box downsample.
    fn half(&self) -> Plane {
        let (w, h) = (self.w / 2, self.h / 2);
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let sum = self.at(2 * x, 2 * y)
                    + self.at(2 * x + 1, 2 * y)
                    + self.at(2 * x, 2 * y + 1)
                    + self.at(2 * x + 1, 2 * y + 1);
                data.push(sum / 4.0);
            }
        }
        Plane { w, h, data }
    }
}

fn pyramid(base: Plane, levels: usize) -> Vec<Plane> {
    let mut out = vec![base];
    while out.len() < levels {
        let last = &out[out.len() - 1];
        if last.w / 2 < MIN_LEVEL_SIZE || last.h / 2 < MIN_LEVEL_SIZE {
            break;
        }
        let next = last.half();
        out.push(next);
    }
    out
}

/// Inclusive-exclusive window sums over a plane.
struct Integral {
    w1: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn new(w: usize, h: usize, values: impl Fn(usize) -> f64) -> Self {
        let w1 = w + 1;
        let mut sums = vec![0.0; w1 * (h + 1)];
        for y in 0..h {
            let mut row = 0.0;
            for x in 0..w {
                row += values(y * w + x);
                sums[(y + 1) * w1 + x + 1] = sums[y * w1 + x + 1] + row;
            }
        }
        Self { w1, sums }
    }

    fn window(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let s = &self.sums;
        let w1 = self.w1;
        s[y1 * w1 + x1] - s[y0 * w1 + x1] - s[y1 * w1 + x0] + s[y0 * w1 + x0]
    }
}

impl LucasKanadeFlow {
    /// Gauss-Newton step on one level, updating `dx`/`dy` in place.
    ///
    /// Untrackable windows keep the estimate they came in with, and every
    /// pixel stays within [`MAX_LEVEL_CORRECTION`] of `base`.
    fn refine_level(
        &self,
        prev: &Plane,
        cur: &Plane,
        base: (&[f32], &[f32]),
        dx: &mut [f32],
        dy: &mut [f32],
    ) {
        let (w, h) = (prev.w, prev.h);
        let warped: Vec<f32> = (0..w * h)
            .map(|i| prev.sample((i % w) as f32 + dx[i], (i / w) as f32 + dy[i]))
            .collect();
        let warped = Plane { w, h, data: warped };

        let mut ix = vec![0.0f32; w * h];
        let mut iy = vec![0.0f32; w * h];
        let mut it = vec![0.0f32; w * h];
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let (xl, xr) = (x.saturating_sub(1), (x + 1).min(w - 1));
                let (yu, yd) = (y.saturating_sub(1), (y + 1).min(h - 1));
                ix[i] = (warped.at(xr, y) - warped.at(xl, y)) / (xr - xl).max(1) as f32;
                iy[i] = (warped.at(x, yd) - warped.at(x, yu)) / (yd - yu).max(1) as f32;
                it[i] = warped.data[i] - cur.data[i];
            }
        }

        let sxx = Integral::new(w, h, |i| (ix[i] * ix[i]) as f64);
        let sxy = Integral::new(w, h, |i| (ix[i] * iy[i]) as f64);
        let syy = Integral::new(w, h, |i| (iy[i] * iy[i]) as f64);
        let sxt = Integral::new(w, h, |i| (ix[i] * it[i]) as f64);
        let syt = Integral::new(w, h, |i| (iy[i] * it[i]) as f64);

        let r = self.window_radius;
        for y in 0..h {
            let (y0, y1) = (y.saturating_sub(r), (y + r + 1).min(h));
            for x in 0..w {
                let (x0, x1) = (x.saturating_sub(r), (x + r + 1).min(w));
                let a = sxx.window(x0, y0, x1, y1);
                let b = sxy.window(x0, y0, x1, y1);
                let c = syy.window(x0, y0, x1, y1);
                let area = ((x1 - x0) * (y1 - y0)) as f64;
                if min_eigenvalue(a, b, c) / area < MIN_EIGENVALUE {
                    continue;
                }
                let det = a * c - b * b;
                let bx = -sxt.window(x0, y0, x1, y1);
                let by = -syt.window(x0, y0, x1, y1);
                let step_x = (((c * bx - b * by) / det) as f32).clamp(-MAX_STEP, MAX_STEP);
                let step_y = (((a * by - b * bx) / det) as f32).clamp(-MAX_STEP, MAX_STEP);
                let i = y * w + x;
                dx[i] = clamp_around(dx[i] + step_x, base.0[i]);
                dy[i] = clamp_around(dy[i] + step_y, base.1[i]);
            }
        }
    }
}

impl FlowEstimator for LucasKanadeFlow {
    fn estimate(
        &mut self,
        previous: &LumaPlane,
        current: &LumaPlane,
    ) -> Result<FlowField, Box<dyn std::error::Error>> {
        if previous.width != current.width || previous.height != current.height {
            return Err(format!(
                "frame size changed from {}x{} to {}x{}",
                previous.width, previous.height, current.width, current.height
            )
            .into());
        }
        let (w, h) = (current.width as usize, current.height as usize);
        if w == 0 || h == 0 {
            return Ok(FlowField::zeros(current.width, current.height));
        }

        let prev_pyr = pyramid(
            Plane {
                w,
                h,
                data: previous.data.clone(),
            },
            self.levels,
        );
        let cur_pyr = pyramid(
            Plane {
                w,
                h,
                data: current.data.clone(),
            },
            self.levels,
        );

        let coarsest = &cur_pyr[cur_pyr.len() - 1];
        let mut dx = vec![0.0f32; coarsest.w * coarsest.h];
        let mut dy = vec![0.0f32; coarsest.w * coarsest.h];
        let mut level_w = coarsest.w;

        for level in (0..cur_pyr.len()).rev() {
            let (prev, cur) = (&prev_pyr[level], &cur_pyr[level]);
            if cur.w != level_w {
                (dx, dy) = upsample_flow(&dx, &dy, level_w, cur.w, cur.h);
                level_w = cur.w;
            }
            let (base_x, base_y) = (dx.clone(), dy.clone());
            for _ in 0..ITERATIONS_PER_LEVEL {
                self.refine_level(prev, cur, (&base_x, &base_y), &mut dx, &mut dy);
            }
        }

        Ok(FlowField {
            width: current.width,
            height: current.height,
            dx,
            dy,
        })
    }
}

/// Smaller eigenvalue of the symmetric tensor `[[a, b], [b, c]]`.
fn min_eigenvalue(a: f64, b: f64, c: f64) -> f64 {
    let half_trace = (a + c) / 2.0;
    let spread = (((a - c) / 2.0).powi(2) + b * b).sqrt();
    half_trace - spread
}

fn clamp_around(value: f32, base: f32) -> f32 {
    value.clamp(base - MAX_LEVEL_CORRECTION, base + MAX_LEVEL_CORRECTION)
}

/// Nearest-neighbour upsample of a coarse field, doubling displacements.
fn upsample_flow(
    dx: &[f32],
    dy: &[f32],
    coarse_w: usize,
    w: usize,
    h: usize,
) -> (Vec<f32>, Vec<f32>) {
    let coarse_h = dx.len() / coarse_w;
    let mut out_x = Vec::with_capacity(w * h);
    let mut out_y = Vec::with_capacity(w * h);
    for y in 0..h {
        let cy = (y / 2).min(coarse_h - 1);
        for x in 0..w {
            let cx = (x / 2).min(coarse_w - 1);
            out_x.push(dx[cy * coarse_w + cx] * 2.0);
            out_y.push(dy[cy * coarse_w + cx] * 2.0);
        }
    }
    (out_x, out_y)
}
