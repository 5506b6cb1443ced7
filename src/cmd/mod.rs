//! Command-line entry points.

use clap::Args;

use crate::{geometry::ScreenPoint, prelude::*, settings::Settings};

pub mod capture;
pub mod ocr;
pub mod schema;
pub mod test_capture;

/// Options for locating the page on screen.
#[derive(Debug, Clone, Args)]
pub struct RegionOpts {
    /// Read coordinates and other defaults from a JSON or TOML settings
    /// file. Command-line options take priority.
    #[clap(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Top-left corner of the page on screen.
    #[clap(long, value_name = "X,Y", allow_hyphen_values = true)]
    pub top_left: Option<ScreenPoint>,

    /// Bottom-right corner of the page on screen.
    #[clap(long, value_name = "X,Y", allow_hyphen_values = true)]
    pub bottom_right: Option<ScreenPoint>,
}

impl RegionOpts {
    /// Merge `overrides` (from the command line) over our settings file, if
    /// we have one.
    pub async fn resolve_settings(&self, overrides: Settings) -> Result<Settings> {
        let overrides = Settings {
            top_left: self.top_left,
            bottom_right: self.bottom_right,
            ..overrides
        };
        match &self.settings {
            Some(path) => Ok(overrides.or(Settings::load(path).await?)),
            None => Ok(overrides),
        }
    }
}
