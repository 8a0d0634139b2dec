use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::shared::constants::PREVIEW_JPEG_QUALITY;
use crate::shared::frame::Frame;
use crate::video::domain::image_writer::ImageWriter;

/// Writes frames with the `image` crate. JPEG output uses a fixed quality
/// so preview files stay small.
pub struct ImageFileWriter {
    jpeg_quality: u8,
}

impl ImageFileWriter {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new(PREVIEW_JPEG_QUALITY)
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false)
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("Failed to create image from frame data")?;

        if is_jpeg(path) {
            let out = BufWriter::new(File::create(path)?);
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(out, self.jpeg_quality);
            encoder.encode_image(&img)?;
        } else {
            img.save(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        Frame::from_fn(width, height, 0, |_, _| rgb)
    }

    #[test]
    fn test_png_roundtrip_preserves_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        ImageFileWriter::default()
            .write(&path, &make_frame(50, 40, [50, 100, 200]))
            .unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!((img.width(), img.height()), (50, 40));
        assert_eq!(img.get_pixel(0, 0).0, [50, 100, 200]);
    }

    #[test]
    fn test_jpeg_is_written_and_lossy_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        ImageFileWriter::default()
            .write(&path, &make_frame(64, 64, [120, 120, 120]))
            .unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        let p = img.get_pixel(32, 32).0;
        assert!(p.iter().all(|&v| (v as i32 - 120).abs() <= 3));
    }

    #[test]
    fn test_lower_quality_gives_smaller_file() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::from_fn(96, 96, 0, |x, y| [(x * 2) as u8, (y * 2) as u8, ((x ^ y) * 2) as u8]);
        let hi = dir.path().join("hi.jpg");
        let lo = dir.path().join("lo.jpg");
        ImageFileWriter::new(95).write(&hi, &frame).unwrap();
        ImageFileWriter::new(20).write(&lo, &frame).unwrap();
        let size = |p: &Path| std::fs::metadata(p).unwrap().len();
        assert!(size(&lo) < size(&hi));
    }

    #[test]
    fn test_write_invalid_path_returns_error() {
        let writer = ImageFileWriter::default();
        assert!(writer
            .write(Path::new("/nonexistent/dir/out.jpg"), &make_frame(4, 4, [0, 0, 0]))
            .is_err());
    }
}
