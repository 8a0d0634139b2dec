//! Binary image morphology used by the aggressive boundary policy.
//!
//! Structuring elements are stored as horizontal runs (one half-width per
//! row offset), so dilation and erosion cost O(pixels x kernel rows) using
//! per-row prefix counts.

use std::collections::VecDeque;

use crate::shared::mask::Mask;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryImage {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

/// Symmetric structuring element: for each row offset `dy`, the run
/// `[-half_width, half_width]` is part of the element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuringElement {
    rows: Vec<(i32, i32)>,
}

impl StructuringElement {
    /// Filled ellipse inscribed in a `size` x `size` square (`size` odd).
    pub fn ellipse(size: usize) -> Self {
        let r = (size / 2) as i32;
        let rows = (-r..=r)
            .map(|dy| {
                let half = ((r * r - dy * dy) as f64).sqrt().round() as i32;
                (dy, half)
            })
            .collect();
        Self { rows }
    }

    /// Axis-aligned `width` x `height` rectangle (both odd).
    pub fn rect(width: usize, height: usize) -> Self {
        let half_h = (height / 2) as i32;
        let half_w = (width / 2) as i32;
        Self {
            rows: (-half_h..=half_h).map(|dy| (dy, half_w)).collect(),
        }
    }
}

/// Rounds up to the next odd number.
pub fn odd(n: usize) -> usize {
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

impl BinaryImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![false; width * height],
        }
    }

    pub fn from_mask(mask: &Mask, threshold: f32) -> Self {
        Self {
            width: mask.width() as usize,
            height: mask.height() as usize,
            data: mask.data().iter().map(|&v| v > threshold).collect(),
        }
    }

    pub fn to_mask(&self) -> Mask {
        Mask::from_vec(
            self.width as u32,
            self.height as u32,
            self.data.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[bool] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        self.data[y * self.width + x] = value;
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    pub fn union_with(&mut self, other: &BinaryImage) {
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a |= b;
        }
    }

    /// First and last row containing a set pixel.
    pub fn row_extent(&self) -> Option<(usize, usize)> {
        let rows_with_pixels = |y: &usize| {
            self.data[y * self.width..(y + 1) * self.width]
                .iter()
                .any(|&b| b)
        };
        let top = (0..self.height).find(rows_with_pixels)?;
        let bottom = (0..self.height).rev().find(rows_with_pixels)?;
        Some((top, bottom))
    }

    /// Pixels outside the image never contribute.
    pub fn dilate(&self, element: &StructuringElement) -> BinaryImage {
        let prefix = self.row_prefix_counts();
        self.apply(element, |y, lo, hi| self.window_count(&prefix, y, lo, hi) > 0, false)
    }

    /// Pixels outside the image never erode.
    pub fn erode(&self, element: &StructuringElement) -> BinaryImage {
        let prefix = self.row_prefix_counts();
        self.apply(
            element,
            |y, lo, hi| self.window_count(&prefix, y, lo, hi) == hi - lo + 1,
            true,
        )
    }

    pub fn close(&self, element: &StructuringElement) -> BinaryImage {
        self.dilate(element).erode(element)
    }

    /// Sets every unset pixel that is not 4-connected to the image border
    /// through unset pixels.
    pub fn fill_holes(&self) -> BinaryImage {
        let (w, h) = (self.width, self.height);
        if w == 0 || h == 0 {
            return self.clone();
        }
        let mut outside = vec![false; w * h];
        let mut queue = VecDeque::new();
        let seed = |x: usize, y: usize, outside: &mut Vec<bool>, queue: &mut VecDeque<_>| {
            let i = y * w + x;
            if !self.data[i] && !outside[i] {
                outside[i] = true;
                queue.push_back((x, y));
            }
        };
        for x in 0..w {
            seed(x, 0, &mut outside, &mut queue);
            seed(x, h - 1, &mut outside, &mut queue);
        }
        for y in 0..h {
            seed(0, y, &mut outside, &mut queue);
            seed(w - 1, y, &mut outside, &mut queue);
        }
        while let Some((x, y)) = queue.pop_front() {
            if x > 0 {
                seed(x - 1, y, &mut outside, &mut queue);
            }
            if x + 1 < w {
                seed(x + 1, y, &mut outside, &mut queue);
            }
            if y > 0 {
                seed(x, y - 1, &mut outside, &mut queue);
            }
            if y + 1 < h {
                seed(x, y + 1, &mut outside, &mut queue);
            }
        }
        BinaryImage {
            width: w,
            height: h,
            data: outside.iter().map(|&o| !o).collect(),
        }
    }

    /// 8-connected components of set pixels, as pixel lists.
    pub fn components(&self) -> Vec<Vec<(usize, usize)>> {
        let (w, h) = (self.width, self.height);
        let mut visited = vec![false; w * h];
        let mut components = Vec::new();
        for start in 0..w * h {
            if !self.data[start] || visited[start] {
                continue;
            }
            visited[start] = true;
            let mut pixels = Vec::new();
            let mut queue = VecDeque::from([(start % w, start / w)]);
            while let Some((x, y)) = queue.pop_front() {
                pixels.push((x, y));
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        let ni = ny as usize * w + nx as usize;
                        if self.data[ni] && !visited[ni] {
                            visited[ni] = true;
                            queue.push_back((nx as usize, ny as usize));
                        }
                    }
                }
            }
            components.push(pixels);
        }
        components
    }

    /// Sets every pixel inside (or on) the convex polygon `hull`.
    pub fn fill_convex_polygon(&mut self, hull: &[(i64, i64)]) {
        if hull.is_empty() {
            return;
        }
        let y_min = hull.iter().map(|p| p.1).min().unwrap_or(0).max(0);
        let y_max = hull
            .iter()
            .map(|p| p.1)
            .max()
            .unwrap_or(0)
            .min(self.height as i64 - 1);
        for y in y_min..=y_max {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for i in 0..hull.len() {
                let (x0, y0) = hull[i];
                let (x1, y1) = hull[(i + 1) % hull.len()];
                if y < y0.min(y1) || y > y0.max(y1) {
                    continue;
                }
                if y0 == y1 {
                    lo = lo.min(x0.min(x1) as f64);
                    hi = hi.max(x0.max(x1) as f64);
                } else {
                    let t = (y - y0) as f64 / (y1 - y0) as f64;
                    let x = x0 as f64 + t * (x1 - x0) as f64;
                    lo = lo.min(x);
                    hi = hi.max(x);
                }
            }
            if lo > hi {
                continue;
            }
            let x_start = (lo.ceil() as i64).max(0);
            let x_end = (hi.floor() as i64).min(self.width as i64 - 1);
            for x in x_start..=x_end {
                self.set(x as usize, y as usize, true);
            }
        }
    }

    fn row_prefix_counts(&self) -> Vec<u32> {
        let w1 = self.width + 1;
        let mut prefix = vec![0u32; w1 * self.height];
        for y in 0..self.height {
            for x in 0..self.width {
                prefix[y * w1 + x + 1] = prefix[y * w1 + x] + self.data[y * self.width + x] as u32;
            }
        }
        prefix
    }

    /// Set pixels in row `y`, columns `lo..=hi`.
    fn window_count(&self, prefix: &[u32], y: usize, lo: usize, hi: usize) -> usize {
        let w1 = self.width + 1;
        (prefix[y * w1 + hi + 1] - prefix[y * w1 + lo]) as usize
    }

    /// Evaluates `row_test(row, lo, hi)` for every kernel row that falls
    /// inside the image. Dilation wants any row to pass, erosion all rows;
    /// `all` selects which.
    fn apply(
        &self,
        element: &StructuringElement,
        row_test: impl Fn(usize, usize, usize) -> bool,
        all: bool,
    ) -> BinaryImage {
        let (w, h) = (self.width as i64, self.height as i64);
        let mut out = BinaryImage::new(self.width, self.height);
        if w == 0 || h == 0 {
            return out;
        }
        for y in 0..h {
            for x in 0..w {
                let mut result = all;
                for &(dy, half) in &element.rows {
                    let ry = y + dy as i64;
                    if ry < 0 || ry >= h {
                        continue;
                    }
                    let lo = (x - half as i64).max(0) as usize;
                    let hi = (x + half as i64).min(w - 1) as usize;
                    let pass = row_test(ry as usize, lo, hi);
                    if all && !pass {
                        result = false;
                        break;
                    }
                    if !all && pass {
                        result = true;
                        break;
                    }
                }
                out.data[(y * w + x) as usize] = result;
            }
        }
        out
    }
}

/// Convex hull (Andrew's monotone chain), counter-clockwise, without
/// collinear points.
pub fn convex_hull(points: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let mut pts = points.to_vec();
    pts.sort_unstable();
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }
    let cross = |o: (i64, i64), a: (i64, i64), b: (i64, i64)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };
    let mut hull: Vec<(i64, i64)> = Vec::with_capacity(pts.len() * 2);
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Leftmost and rightmost pixel of each row; enough to determine the hull.
pub fn row_extremes(pixels: &[(usize, usize)]) -> Vec<(i64, i64)> {
    let mut extremes: std::collections::BTreeMap<usize, (usize, usize)> = Default::default();
    for &(x, y) in pixels {
        extremes
            .entry(y)
            .and_modify(|e| {
                e.0 = e.0.min(x);
                e.1 = e.1.max(x);
            })
            .or_insert((x, x));
    }
    extremes
        .into_iter()
        .flat_map(|(y, (lo, hi))| [(lo as i64, y as i64), (hi as i64, y as i64)])
        .collect()
}
