//! Screen coordinates.

use std::{fmt, str::FromStr};

use schemars::JsonSchema;

use crate::{errors::ScanError, prelude::*};

/// An absolute screen position, in pixels.
///
/// Serialized as `[x, y]`, and parsed from the command line as `X,Y`.
#[derive(
    Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Hash, Serialize,
)]
pub struct ScreenPoint(pub i32, pub i32);

impl ScreenPoint {
    pub fn x(self) -> i32 {
        self.0
    }

    pub fn y(self) -> i32 {
        self.1
    }
}

impl fmt::Display for ScreenPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

impl FromStr for ScreenPoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |s: &str| -> Result<_> {
            let (x, y) = s
                .split_once(',')
                .ok_or_else(|| anyhow!("expected X,Y"))?;
            Ok(Self(x.trim().parse()?, y.trim().parse()?))
        };
        parse(s).with_context(|| format!("Failed to parse screen point: {:?}", s))
    }
}

/// The rectangle of the screen we photograph on every page.
///
/// Always non-empty: `bottom_right` is strictly below and to the right of
/// `top_left`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CaptureRegion {
    top_left: ScreenPoint,
    bottom_right: ScreenPoint,
}

impl CaptureRegion {
    /// Create a new region, checking that it isn't empty.
    pub fn new(
        top_left: ScreenPoint,
        bottom_right: ScreenPoint,
    ) -> Result<Self, ScanError> {
        if bottom_right.x() <= top_left.x() || bottom_right.y() <= top_left.y() {
            return Err(ScanError::Configuration(format!(
                "capture region {} to {} is empty: the bottom-right corner must be \
                 below and to the right of the top-left corner",
                top_left, bottom_right
            )));
        }
        Ok(Self {
            top_left,
            bottom_right,
        })
    }

    pub fn top_left(&self) -> ScreenPoint {
        self.top_left
    }

    pub fn width(&self) -> u32 {
        self.bottom_right.x().abs_diff(self.top_left.x())
    }

    pub fn height(&self) -> u32 {
        self.bottom_right.y().abs_diff(self.top_left.y())
    }
}

impl fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {} ({}x{})",
            self.top_left,
            self.bottom_right,
            self.width(),
            self.height()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        let point = ScreenPoint::from_str("120, 340").unwrap();
        assert_eq!(point, ScreenPoint(120, 340));
        assert_eq!(ScreenPoint::from_str("-5,7").unwrap(), ScreenPoint(-5, 7));
    }

    #[test]
    fn test_failed_parse_point() {
        assert!(ScreenPoint::from_str("120").is_err());
        assert!(ScreenPoint::from_str("a,b").is_err());
        assert!(ScreenPoint::from_str("").is_err());
    }

    #[test]
    fn region_has_positive_size() {
        let region = CaptureRegion::new(ScreenPoint(10, 20), ScreenPoint(110, 70)).unwrap();
        assert_eq!(region.width(), 100);
        assert_eq!(region.height(), 50);
    }

    #[test]
    fn empty_or_inverted_regions_are_rejected() {
        let cases = [
            (ScreenPoint(10, 10), ScreenPoint(10, 50)),
            (ScreenPoint(10, 10), ScreenPoint(50, 10)),
            (ScreenPoint(50, 50), ScreenPoint(10, 10)),
        ];
        for (top_left, bottom_right) in cases {
            let err = CaptureRegion::new(top_left, bottom_right).unwrap_err();
            assert!(matches!(err, ScanError::Configuration(_)), "{err:?}");
        }
    }

    #[test]
    fn points_serialize_as_pairs() {
        let json = serde_json::to_string(&ScreenPoint(3, 4)).unwrap();
        assert_eq!(json, "[3,4]");
        let point: ScreenPoint = serde_json::from_str("[5, 6]").unwrap();
        assert_eq!(point, ScreenPoint(5, 6));
    }
}
