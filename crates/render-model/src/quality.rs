//! Bitrate quality estimation.
//!
//! Quality is judged by bits per pixel per second: the bitrate spread over
//! every pixel of every frame.

use crate::settings::Resolution;

/// A named quality band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityLevel {
    /// Lower bound of the band in bits per pixel per second.
    pub min_bits_per_pixel_second: f64,
    pub title: &'static str,
    pub description: &'static str,
}

/// Quality bands, ordered from lowest to highest.
pub const QUALITY_LEVELS: [QualityLevel; 7] = [
    QualityLevel {
        min_bits_per_pixel_second: 0.01,
        title: "Poor",
        description: "Very low quality. Consider lower resolution.",
    },
    QualityLevel {
        min_bits_per_pixel_second: 0.02,
        title: "Low",
        description: "Probable strong artifacts",
    },
    QualityLevel {
        min_bits_per_pixel_second: 0.05,
        title: "Medium",
        description: "Will exhibit artifacts in noisy regions",
    },
    QualityLevel {
        min_bits_per_pixel_second: 0.08,
        title: "Okay",
        description: "Compromise between filesize and quality",
    },
    QualityLevel {
        min_bits_per_pixel_second: 0.12,
        title: "Good",
        description: "Good quality. Probably sufficient for YouTube.",
    },
    QualityLevel {
        min_bits_per_pixel_second: 0.5,
        title: "Very good",
        description: "Excellent quality, but large.",
    },
    QualityLevel {
        min_bits_per_pixel_second: 1.0,
        title: "Reference",
        description: "Indistinguishable. Very large files.",
    },
];

/// Bits per pixel per second for the given bitrate, size and rate.
/// Returns 0 when any dimension is degenerate.
pub fn bits_per_pixel_second(bitrate: u32, resolution: Resolution, fps: f64) -> f64 {
    if resolution.width == 0 || resolution.height == 0 || fps <= 0.0 {
        return 0.0;
    }
    bitrate as f64 / resolution.pixel_count() as f64 / fps
}

/// The highest band whose lower bound lies below `bits_per_pixel_second`.
/// Anything below every band is reported as the lowest band.
pub fn quality_for(bits_per_pixel_second: f64) -> QualityLevel {
    QUALITY_LEVELS
        .iter()
        .rev()
        .find(|level| level.min_bits_per_pixel_second < bits_per_pixel_second)
        .copied()
        .unwrap_or(QUALITY_LEVELS[0])
}

/// Expected output size in MiB for a render of `duration_secs`.
pub fn estimated_size_mb(bitrate: u32, duration_secs: f64) -> f64 {
    bitrate as f64 * duration_secs.max(0.0) / 1024.0 / 1024.0 / 8.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_for_default_bitrate_at_1080p60() {
        let bpp = bits_per_pixel_second(25_000_000, Resolution::new(1920, 1080), 60.0);
        assert!((bpp - 0.2009).abs() < 1e-3);
        assert_eq!(quality_for(bpp).title, "Good");
    }

    #[test]
    fn test_quality_extremes() {
        assert_eq!(quality_for(0.0).title, "Poor");
        assert_eq!(quality_for(5.0).title, "Reference");
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(bits_per_pixel_second(1000, Resolution::new(0, 10), 30.0), 0.0);
        assert_eq!(bits_per_pixel_second(1000, Resolution::new(10, 10), 0.0), 0.0);
    }

    #[test]
    fn test_estimated_size() {
        // 8 Mbit/s for 8 seconds is 8 MiB of payload bits / 8.
        let mb = estimated_size_mb(8 * 1024 * 1024, 8.0);
        assert!((mb - 8.0).abs() < 1e-9);
    }

    proptest::proptest! {
        #[test]
        fn prop_higher_bitrate_never_lowers_quality(
            bitrate in 1u32..200_000_000,
            extra in 0u32..50_000_000,
            width in 1u32..8192,
            height in 1u32..8192,
            fps in 1.0f64..240.0,
        ) {
            let resolution = Resolution::new(width, height);
            let low = quality_for(bits_per_pixel_second(bitrate, resolution, fps));
            let high = quality_for(bits_per_pixel_second(
                bitrate.saturating_add(extra),
                resolution,
                fps,
            ));
            proptest::prop_assert!(
                high.min_bits_per_pixel_second >= low.min_bits_per_pixel_second
            );
        }
    }
}
