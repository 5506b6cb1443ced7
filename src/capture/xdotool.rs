//! Clicking via the `xdotool` CLI tool.

use std::io;

use tokio::process::Command;

use super::PageTurner;
use crate::{
    async_utils::check_for_command_failure, errors::ScanError, geometry::ScreenPoint,
    prelude::*,
};

/// Clicks the left mouse button using `xdotool`.
#[non_exhaustive]
pub struct XdotoolPageTurner {}

impl XdotoolPageTurner {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl PageTurner for XdotoolPageTurner {
    #[instrument(level = "debug", skip_all, fields(point = %point))]
    async fn click(&self, point: ScreenPoint) -> Result<(), ScanError> {
        let output = Command::new("xdotool")
            .arg("mousemove")
            .arg("--sync")
            .arg(point.x().to_string())
            .arg(point.y().to_string())
            .arg("click")
            .arg("1")
            .output()
            .await
            .map_err(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    ScanError::InputUnavailable(
                        "xdotool is not installed or not on the PATH".to_owned(),
                    )
                } else {
                    ScanError::InputUnavailable(format!("cannot run xdotool: {err}"))
                }
            })?;
        check_for_command_failure("xdotool", &output, None)
            .map_err(|err| ScanError::InputUnavailable(format!("{err:#}")))
    }
}
