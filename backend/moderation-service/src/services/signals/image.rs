//! Image metadata signals: dimension checks and perceptual duplicate detection

use crate::error::{ModerationError, Result};
use crate::models::{ImageFingerprint, Signal, SignalSet};
use chrono::{DateTime, Duration, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};

/// Image-side rule parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePolicy {
    pub min_width: u32,
    pub min_height: u32,
    pub duplicate_window_days: i64,
    /// Maximum hamming distance between hashes still counted as a duplicate
    pub duplicate_hash_tolerance: u32,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            min_width: 200,
            min_height: 200,
            duplicate_window_days: 30,
            duplicate_hash_tolerance: 0,
        }
    }
}

/// What the inspector learned from one decoded image
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub hash: u64,
    /// Raw file contents, forwarded to the classification oracle
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageInspector {
    policy: ImagePolicy,
}

impl ImageInspector {
    pub fn new(policy: ImagePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ImagePolicy {
        &self.policy
    }

    /// Start of the duplicate lookback window
    pub fn duplicate_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.policy.duplicate_window_days)
    }

    /// Read and decode an image file off the async runtime
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<ImageMetadata> {
        let path: PathBuf = path.as_ref().to_path_buf();

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ModerationError::Validation(format!(
                "image file not found: {}",
                path.display()
            )));
        }

        let bytes = tokio::fs::read(&path).await?;
        tokio::task::spawn_blocking(move || decode(bytes))
            .await
            .map_err(|e| ModerationError::Internal(format!("image decode task failed: {}", e)))?
    }

    /// Dimension and duplicate signals for an image owned by a user.
    /// `recent` holds that user's fingerprints inside the lookback window.
    pub fn signals(
        &self,
        metadata: &ImageMetadata,
        content_id: i64,
        recent: &[ImageFingerprint],
    ) -> SignalSet {
        let mut set = SignalSet::default();

        if metadata.width < self.policy.min_width || metadata.height < self.policy.min_height {
            tracing::debug!(
                width = metadata.width,
                height = metadata.height,
                "Low quality image"
            );
            set.push(Signal::LowQualityImage {
                width: metadata.width,
                height: metadata.height,
            });
        }

        let tolerance = self.policy.duplicate_hash_tolerance;
        let duplicate = recent
            .iter()
            .filter(|f| f.content_id != content_id)
            .find(|f| hamming_distance(f.hash as u64, metadata.hash) <= tolerance);
        if let Some(previous) = duplicate {
            tracing::debug!(
                content_id,
                previous_content_id = previous.content_id,
                "Duplicate image"
            );
            set.push(Signal::DuplicateImage {
                previous_content_id: previous.content_id,
            });
        }

        set
    }
}

fn decode(bytes: Vec<u8>) -> Result<ImageMetadata> {
    let img = image::load_from_memory(&bytes)
        .map_err(|e| ModerationError::ImageProcessing(e.to_string()))?;
    let (width, height) = img.dimensions();
    let hash = perceptual_hash(&img);

    Ok(ImageMetadata {
        width,
        height,
        hash,
        bytes,
    })
}

/// 64-bit difference hash: each bit says whether a pixel is brighter than its
/// right neighbour on a 9x8 grayscale thumbnail
pub fn perceptual_hash(img: &DynamicImage) -> u64 {
    let thumb = img.resize_exact(9, 8, FilterType::Triangle).to_luma8();

    let mut hash = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            let left = thumb.get_pixel(x, y)[0];
            let right = thumb.get_pixel(x + 1, y)[0];
            hash = (hash << 1) | u64::from(left > right);
        }
    }
    hash
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, RgbImage};
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        })
    }

    fn fingerprint(content_id: i64, hash: u64) -> ImageFingerprint {
        ImageFingerprint {
            user_id: 1,
            content_id,
            hash: hash as i64,
            created_at: Utc::now(),
        }
    }

    fn metadata(width: u32, height: u32, hash: u64) -> ImageMetadata {
        ImageMetadata {
            width,
            height,
            hash,
            bytes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_load_reads_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("listing.png");
        gradient(320, 240).save(&path).unwrap();

        let meta = ImageInspector::default().load(&path).await.unwrap();
        assert_eq!((meta.width, meta.height), (320, 240));
        assert!(!meta.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_validation_error() {
        let result = ImageInspector::default().load("/nonexistent/photo.jpg").await;
        assert!(matches!(result, Err(ModerationError::Validation(_))));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_processing_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let result = ImageInspector::default().load(&path).await;
        assert!(matches!(result, Err(ModerationError::ImageProcessing(_))));
    }

    #[test]
    fn test_small_image_flagged() {
        let inspector = ImageInspector::default();

        let small = inspector.signals(&metadata(199, 400, 1), 10, &[]);
        assert!(matches!(
            small.signals.as_slice(),
            [Signal::LowQualityImage { width: 199, .. }]
        ));

        let ok = inspector.signals(&metadata(200, 200, 1), 10, &[]);
        assert!(ok.is_empty());
    }

    #[test]
    fn test_duplicate_hash_match() {
        let inspector = ImageInspector::default();
        let recent = vec![fingerprint(7, 0xFF00), fingerprint(8, 0xABCD)];

        let set = inspector.signals(&metadata(640, 480, 0xABCD), 10, &recent);
        assert!(matches!(
            set.signals.as_slice(),
            [Signal::DuplicateImage {
                previous_content_id: 8
            }]
        ));

        // The item's own earlier fingerprint is not a duplicate
        let own = inspector.signals(&metadata(640, 480, 0xABCD), 8, &recent[1..]);
        assert!(own.is_empty());
    }

    #[test]
    fn test_duplicate_tolerance() {
        let strict = ImageInspector::default();
        let lenient = ImageInspector::new(ImagePolicy {
            duplicate_hash_tolerance: 2,
            ..Default::default()
        });
        let recent = vec![fingerprint(7, 0b1011)];

        assert!(strict.signals(&metadata(640, 480, 0b1000), 10, &recent).is_empty());
        assert!(!lenient.signals(&metadata(640, 480, 0b1000), 10, &recent).is_empty());
    }

    #[test]
    fn test_perceptual_hash_stable_across_scale() {
        let original = DynamicImage::ImageRgb8(gradient(400, 300));
        let scaled = original.resize_exact(200, 150, FilterType::Triangle);

        let distance = hamming_distance(perceptual_hash(&original), perceptual_hash(&scaled));
        assert!(distance <= 4, "distance was {}", distance);
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(0, 0), 0);
        assert_eq!(hamming_distance(0b1010, 0b0101), 4);
        assert_eq!(hamming_distance(u64::MAX, 0), 64);
    }
}
