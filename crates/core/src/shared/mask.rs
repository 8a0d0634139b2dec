
use crate::shared::bbox::BoundingBox;

/// Single-channel float map, one value per pixel, row-major.
///
/// Used for every mask stage (fused, refined, temporal, region). Values are
/// expected in `[0, 1]`; operations that can leave that range say so.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Mask {
    pub fn zeros(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize,
            "mask data length must equal width * height"
        );
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::from_vec(width, height, data)
    }

    /// 1.0 inside `rect` (clipped to the mask), 0.0 elsewhere.
    pub fn from_rect(width: u32, height: u32, rect: BoundingBox) -> Self {
        Self::from_fn(width, height, |x, y| {
            let (x, y) = (x as i32, y as i32);
            if x >= rect.x1 && x < rect.x2 && y >= rect.y1 && y < rect.y2 {
                1.0
            } else {
                0.0
            }
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let w = self.width as usize;
        self.data[y as usize * w + x as usize] = value;
    }

    pub fn same_size(&self, other: &Mask) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Mask {
        Mask::from_vec(self.width, self.height, self.data.iter().map(|&v| f(v)).collect())
    }

    pub fn clamped(&self) -> Mask {
        self.map(|v| v.clamp(0.0, 1.0))
    }

    pub fn inverted(&self) -> Mask {
        self.map(|v| 1.0 - v)
    }

    /// 1.0 where the value is strictly above `threshold`, 0.0 elsewhere.
    pub fn binarized(&self, threshold: f32) -> Mask {
        self.map(|v| if v > threshold { 1.0 } else { 0.0 })
    }

    pub fn any_above(&self, threshold: f32) -> bool {
        self.data.iter().any(|&v| v > threshold)
    }

    /// Pixelwise maximum, in place. Both masks must have the same size.
    pub fn max_assign(&mut self, other: &Mask) {
        debug_assert!(self.same_size(other));
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a = a.max(b);
        }
    }

    /// Tight box around pixels strictly above `threshold`.
    pub fn bounding_box(&self, threshold: f32) -> Option<BoundingBox> {
        let w = self.width as usize;
        let mut bounds: Option<(usize, usize, usize, usize)> = None;
        for (i, &v) in self.data.iter().enumerate() {
            if v <= threshold {
                continue;
            }
            let (x, y) = (i % w, i / w);
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
            });
        }
        bounds.map(|(x1, y1, x2, y2)| {
            BoundingBox::new(x1 as i32, y1 as i32, x2 as i32 + 1, y2 as i32 + 1)
        })
    }

    /// Bilinear sample at a fractional position. Neighbours outside the mask
    /// contribute 0.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);
        let at = |xi: i64, yi: i64| -> f32 {
            if xi < 0 || yi < 0 || xi >= self.width as i64 || yi >= self.height as i64 {
                0.0
            } else {
                self.data[yi as usize * self.width as usize + xi as usize]
            }
        };
        let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1, y0) * fx;
        let bottom = at(x0, y0 + 1) * (1.0 - fx) + at(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Bilinear resize with half-pixel centres and edge replication.
    pub fn resized(&self, width: u32, height: u32) -> Mask {
        if width == self.width && height == self.height {
            return self.clone();
        }
        if self.data.is_empty() {
            return Mask::zeros(width, height);
        }
        let sx = self.width as f32 / width as f32;
        let sy = self.height as f32 / height as f32;
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let sw = self.width as usize;
        Mask::from_fn(width, height, |x, y| {
            let src_x = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, max_x);
            let src_y = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, max_y);
            let x0 = src_x.floor() as usize;
            let y0 = src_y.floor() as usize;
            let x1 = (x0 + 1).min(self.width as usize - 1);
            let y1 = (y0 + 1).min(self.height as usize - 1);
            let fx = src_x - x0 as f32;
            let fy = src_y - y0 as f32;
            let top = self.data[y0 * sw + x0] * (1.0 - fx) + self.data[y0 * sw + x1] * fx;
            let bottom = self.data[y1 * sw + x0] * (1.0 - fx) + self.data[y1 * sw + x1] * fx;
            top * (1.0 - fy) + bottom * fy
        })
    }
}
