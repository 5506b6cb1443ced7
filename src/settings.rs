//! Optional settings files.
//!
//! Operators who scan several books from the same reader app can keep their
//! screen coordinates in a JSON or TOML file instead of retyping them. We
//! only ever read these files.

use std::time::Duration;

use schemars::JsonSchema;

use crate::{
    async_utils::io::read_json_or_toml,
    geometry::ScreenPoint,
    output::OutputNaming,
    prelude::*,
    session::{CaptureConfig, CapturePolicy},
};

/// Settings for a capture session. Every field is optional.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Top-left corner of the page on screen, as `[x, y]`.
    pub top_left: Option<ScreenPoint>,
    /// Bottom-right corner of the page on screen, as `[x, y]`.
    pub bottom_right: Option<ScreenPoint>,
    /// Position of the reader app's "next page" button, as `[x, y]`.
    pub next_button: Option<ScreenPoint>,
    /// Maximum number of pages to capture.
    pub pages: Option<usize>,
    /// Directory to write the PDF to.
    pub base_location: Option<PathBuf>,
    /// PDF file name, without timestamp or extension.
    pub base_filename: Option<String>,
    /// Seconds to wait after each click.
    pub settle_secs: Option<f64>,
    /// Seconds to wait before the first click.
    pub warmup_secs: Option<f64>,
    /// Consecutive unchanged pages which end the session.
    pub duplicate_threshold: Option<usize>,
}

impl Settings {
    /// Load settings from a `.json` or `.toml` file.
    pub async fn load(path: &Path) -> Result<Self> {
        read_json_or_toml(path)
            .await
            .with_context(|| format!("Failed to load settings from {:?}", path.display()))
    }

    /// Fill in any missing values from `fallback`.
    pub fn or(self, fallback: Settings) -> Settings {
        Settings {
            top_left: self.top_left.or(fallback.top_left),
            bottom_right: self.bottom_right.or(fallback.bottom_right),
            next_button: self.next_button.or(fallback.next_button),
            pages: self.pages.or(fallback.pages),
            base_location: self.base_location.or(fallback.base_location),
            base_filename: self.base_filename.or(fallback.base_filename),
            settle_secs: self.settle_secs.or(fallback.settle_secs),
            warmup_secs: self.warmup_secs.or(fallback.warmup_secs),
            duplicate_threshold: self.duplicate_threshold.or(fallback.duplicate_threshold),
        }
    }

    /// What to capture. Missing values are caught by validation later.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            top_left: self.top_left,
            bottom_right: self.bottom_right,
            click_point: self.next_button,
            pages: self.pages.unwrap_or(0),
        }
    }

    /// Timing policy, starting from `base`.
    pub fn capture_policy(&self, base: CapturePolicy) -> Result<CapturePolicy> {
        Ok(CapturePolicy {
            warmup: match self.warmup_secs {
                Some(secs) => seconds("warmup_secs", secs)?,
                None => base.warmup,
            },
            settle_delay: match self.settle_secs {
                Some(secs) => seconds("settle_secs", secs)?,
                None => base.settle_delay,
            },
            duplicate_threshold: self
                .duplicate_threshold
                .unwrap_or(base.duplicate_threshold),
            ..base
        })
    }

    /// How to name the output.
    pub fn output_naming(&self, no_timestamp: bool) -> OutputNaming {
        OutputNaming {
            base_location: self.base_location.clone(),
            base_filename: self.base_filename.clone(),
            no_timestamp,
        }
    }
}

/// Convert a number of seconds from a settings file or the command line.
pub fn seconds(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .with_context(|| format!("{name} must be a non-negative number of seconds, not {secs}"))
}
