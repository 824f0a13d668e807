// Normalized-in / pixel-out: callers and the vision service speak 0..1
// fractions, the browser only ever sees CSS pixels.
use crate::errors::{ParasightError, ParasightResult};
use crate::executor::session::Viewport;
use crate::perception::types::{NormalizedPoint, PixelPoint};

/// Converts a normalized position to viewport pixels.
pub fn normalized_to_pixel(point: NormalizedPoint, viewport: Viewport) -> ParasightResult<PixelPoint> {
    if !point.x.is_finite() || !point.y.is_finite() || !point.is_in_range() {
        return Err(ParasightError::Input(format!(
            "position ({}, {}) is outside the normalized 0..1 range",
            point.x, point.y
        )));
    }
    Ok(PixelPoint {
        x: (point.x * viewport.width).round(),
        y: (point.y * viewport.height).round(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VP: Viewport = Viewport { width: 1280.0, height: 720.0 };

    #[test]
    fn test_scales_and_rounds() {
        let px = normalized_to_pixel(NormalizedPoint { x: 0.5, y: 0.6 }, VP).unwrap();
        assert_eq!(px, PixelPoint { x: 640.0, y: 432.0 });
        let px = normalized_to_pixel(NormalizedPoint { x: 0.1234, y: 0.0 }, VP).unwrap();
        assert_eq!(px, PixelPoint { x: 158.0, y: 0.0 });
    }

    #[test]
    fn test_rejects_pixel_input() {
        let err = normalized_to_pixel(NormalizedPoint { x: 640.0, y: 400.0 }, VP).unwrap_err();
        assert!(matches!(err, ParasightError::Input(_)));
        assert!(normalized_to_pixel(NormalizedPoint { x: f64::NAN, y: 0.5 }, VP).is_err());
    }
}
