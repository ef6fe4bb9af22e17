//! Scale resolution for the ffmpeg `scale` filter.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScaleSpec {
    /// Multiplies input width and height independently.
    Factor { factor: f64 },
    Pixels { width: u32, height: u32 },
}

impl ScaleSpec {
    pub fn factor(factor: f64) -> Self {
        ScaleSpec::Factor { factor }
    }

    pub fn pixels(width: u32, height: u32) -> Self {
        ScaleSpec::Pixels { width, height }
    }

    /// Geometry expression as used in `scale=<expr>`.
    ///
    /// ```
    /// use gif_core::scale::ScaleSpec;
    ///
    /// assert_eq!(ScaleSpec::factor(0.5).filter_expr(), "iw*0.5:ih*0.5");
    /// assert_eq!(ScaleSpec::pixels(640, 480).filter_expr(), "640:480");
    /// ```
    pub fn filter_expr(&self) -> String {
        match *self {
            ScaleSpec::Factor { factor } => format!("iw*{factor}:ih*{factor}"),
            ScaleSpec::Pixels { width, height } => format!("{width}:{height}"),
        }
    }
}

impl fmt::Display for ScaleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleSpec::Factor { factor } => write!(f, "×{}", factor),
            ScaleSpec::Pixels { width, height } => write!(f, "{}x{}", width, height),
        }
    }
}

/// Splits `"640x480"`, `"640X480"` or `"640:480"` into its two text halves.
/// The halves are left unparsed so the validator can report which one is bad.
pub fn split_dimensions(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    let sep = text.find(['x', 'X', ':'])?;
    let (w, h) = text.split_at(sep);
    Some((w.trim(), h[1..].trim()))
}
