//! Detecting repeated pages.
//!
//! When the reader app hasn't finished rendering the next page, or when we've
//! run off the end of the book, we photograph the same page twice. We detect
//! this with an exact content hash of a small, normalized copy of the image.
//! Downsampling with a good filter hides sub-pixel rendering jitter, but this
//! is deliberately an exact-match test, not a similarity score.

use std::fmt;

use image::{DynamicImage, imageops::FilterType};
use sha2::{Digest as _, Sha256};

use crate::errors::ScanError;

/// The size we downsample to before hashing.
pub const FINGERPRINT_SIZE: u32 = 64;

/// A content hash of a normalized image.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first few bytes are plenty for logs.
        write!(f, "Fingerprint({}…)", hex::encode(&self.0[..6]))
    }
}

/// Compute the fingerprint of an image.
///
/// We convert to 8-bit RGB, resize to [`FINGERPRINT_SIZE`] square using
/// Lanczos resampling, and hash the raw pixel bytes.
pub fn fingerprint(image: &DynamicImage) -> Result<Fingerprint, ScanError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ScanError::InvalidImage(format!(
            "image has no pixels ({}x{})",
            image.width(),
            image.height()
        )));
    }
    let rgb = image.to_rgb8();
    let small = image::imageops::resize(
        &rgb,
        FINGERPRINT_SIZE,
        FINGERPRINT_SIZE,
        FilterType::Lanczos3,
    );
    let digest: [u8; 32] = Sha256::digest(small.as_raw()).into();
    Ok(Fingerprint(digest))
}

/// Do these fingerprints belong to the same page?
///
/// Exact equality. There is no tolerance for "nearly the same" pages.
pub fn same_page(a: &Fingerprint, b: &Fingerprint) -> bool {
    a == b
}

/// Are these two images the same page?
///
/// The capture loop keeps fingerprints rather than images, so it calls
/// [`same_page`] directly.
#[cfg(test)]
pub fn are_similar(a: &DynamicImage, b: &DynamicImage) -> Result<bool, ScanError> {
    Ok(same_page(&fingerprint(a)?, &fingerprint(b)?))
}

#[cfg(test)]
pub(crate) mod tests {
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;

    /// A white page, optionally with a black square drawn on it.
    pub(crate) fn page(width: u32, height: u32, square: Option<(u32, u32, u32)>) -> DynamicImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        if let Some((left, top, size)) = square {
            for y in top..(top + size).min(height) {
                for x in left..(left + size).min(width) {
                    img.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn same_page_is_exact_fingerprint_equality() {
        let a = fingerprint(&page(100, 150, Some((10, 10, 40)))).unwrap();
        let b = fingerprint(&page(100, 150, Some((10, 10, 40)))).unwrap();
        let c = fingerprint(&page(100, 150, Some((60, 60, 40)))).unwrap();
        assert!(same_page(&a, &b));
        assert!(!same_page(&a, &c));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let img = page(200, 300, Some((50, 50, 100)));
        assert_eq!(fingerprint(&img).unwrap(), fingerprint(&img).unwrap());
        let copy = img.clone();
        assert_eq!(fingerprint(&copy).unwrap(), fingerprint(&img).unwrap());
    }

    #[test]
    fn identical_pages_are_similar() {
        let a = page(200, 300, Some((50, 50, 100)));
        let b = page(200, 300, Some((50, 50, 100)));
        assert!(are_similar(&a, &b).unwrap());
    }

    #[test]
    fn color_mode_is_normalized() {
        // The same pixels with an alpha channel should hash identically.
        let rgb = page(80, 80, Some((10, 10, 30)));
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_fn(80, 80, |x, y| {
            let Rgb([r, g, b]) = *rgb.as_rgb8().unwrap().get_pixel(x, y);
            Rgba([r, g, b, 255])
        }));
        assert!(are_similar(&rgb, &rgba).unwrap());
    }

    #[test]
    fn blank_and_marked_pages_differ() {
        let blank = page(200, 300, None);
        let marked = page(200, 300, Some((40, 60, 120)));
        assert!(!are_similar(&blank, &marked).unwrap());
    }

    #[test]
    fn moved_content_differs() {
        let a = page(200, 300, Some((20, 20, 80)));
        let b = page(200, 300, Some((100, 180, 80)));
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn empty_images_are_invalid() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let err = fingerprint(&empty).unwrap_err();
        assert!(matches!(err, ScanError::InvalidImage(_)));
        assert!(are_similar(&empty, &page(10, 10, None)).is_err());
    }

    #[test]
    fn fingerprints_display_as_hex() {
        let text = fingerprint(&page(10, 10, None)).unwrap().to_string();
        assert_eq!(text.len(), 64);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
