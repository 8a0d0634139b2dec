/// Axis-aligned pixel rectangle. `x1`/`y1` are inclusive, `x2`/`y2` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn center_x(&self) -> f64 {
        (self.x1 + self.x2) as f64 / 2.0
    }

    pub fn area(&self) -> i64 {
        self.width().max(0) as i64 * self.height().max(0) as i64
    }

    /// Grows the box by `factor` of its own width/height on each side.
    pub fn expand(&self, factor: f64) -> Self {
        let pad_x = (self.width() as f64 * factor).round() as i32;
        let pad_y = (self.height() as f64 * factor).round() as i32;
        Self::new(
            self.x1 - pad_x,
            self.y1 - pad_y,
            self.x2 + pad_x,
            self.y2 + pad_y,
        )
    }

    /// Clamps to `[0, width) x [0, height)` keeping at least one pixel on each axis.
    pub fn clamp(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width.max(1) as i32, height.max(1) as i32);
        let x1 = self.x1.clamp(0, w - 1);
        let y1 = self.y1.clamp(0, h - 1);
        let x2 = self.x2.clamp(x1 + 1, w);
        let y2 = self.y2.clamp(y1 + 1, h);
        Self::new(x1, y1, x2, y2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions() {
        let b = BoundingBox::new(10, 20, 50, 100);
        assert_eq!(b.width(), 40);
        assert_eq!(b.height(), 80);
        assert_eq!(b.area(), 3200);
        assert_eq!(b.center_x(), 30.0);
    }

    #[test]
    fn test_inverted_box_has_zero_area() {
        assert_eq!(BoundingBox::new(10, 10, 5, 20).area(), 0);
    }

    #[test]
    fn test_expand_pads_each_side() {
        let b = BoundingBox::new(100, 100, 200, 150).expand(0.5);
        assert_eq!(b, BoundingBox::new(50, 75, 250, 175));
    }

    #[test]
    fn test_clamp_to_frame() {
        let b = BoundingBox::new(-20, -5, 700, 500).clamp(640, 480);
        assert_eq!(b, BoundingBox::new(0, 0, 640, 480));
    }

    #[test]
    fn test_clamp_keeps_minimum_extent() {
        let b = BoundingBox::new(700, 500, 710, 520).clamp(640, 480);
        assert_eq!(b, BoundingBox::new(639, 479, 640, 480));
        assert_eq!(b.width(), 1);
        assert_eq!(b.height(), 1);

        let degenerate = BoundingBox::new(10, 10, 10, 10).clamp(640, 480);
        assert_eq!(degenerate.width(), 1);
        assert_eq!(degenerate.height(), 1);
    }
}
