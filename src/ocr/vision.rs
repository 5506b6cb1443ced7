//! OCR using the Google Cloud Vision REST API.

use std::io::Cursor;

use base64::{Engine as _, prelude::BASE64_STANDARD};
use futures::{StreamExt as _, TryStreamExt as _, stream};
use image::{DynamicImage, ImageFormat};
use leaky_bucket::RateLimiter;
use reqwest::StatusCode;
use serde_json::json;

use super::{TextExtractor, rasterize_pdf};
use crate::{
    async_utils::spawn_blocking_propagating_panics, errors::ScanError, prelude::*,
    rate_limit::RateLimit,
};

/// The `images:annotate` endpoint.
const ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

/// How many pages to have in flight at once. The rate limiter has the final
/// say.
const CONCURRENCY: usize = 4;

/// OCR engine wrapping Google Cloud Vision's `DOCUMENT_TEXT_DETECTION`.
pub struct VisionExtractor {
    /// `None` if no key was configured, in which case OCR is unavailable.
    api_key: Option<String>,
    dpi: u32,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl VisionExtractor {
    pub fn new(api_key: Option<String>, dpi: u32, rate_limit: &RateLimit) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            dpi,
            client: reqwest::Client::new(),
            rate_limiter: rate_limit.to_rate_limiter(),
        }
    }

    #[instrument(level = "debug", skip_all, fields(page = %page.display()))]
    async fn ocr_page(&self, api_key: &str, page: &Path) -> Result<String, ScanError> {
        let png = grayscale_png(page.to_owned()).await?;

        self.rate_limiter.acquire_one().await;
        let body = json!({
            "requests": [{
                "image": { "content": BASE64_STANDARD.encode(png) },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
            }]
        });
        let response = self
            .client
            .post(ANNOTATE_URL)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                ScanError::OcrProcessing(format!("Cloud Vision request failed: {err}"))
            })?;
        let status = response.status();
        let text = response.text().await.map_err(|err| {
            ScanError::OcrProcessing(format!("Cloud Vision response failed: {err}"))
        })?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ScanError::OcrUnavailable(format!(
                "Cloud Vision rejected our credentials (status {status})"
            )));
        }
        if !status.is_success() {
            return Err(ScanError::OcrProcessing(format!(
                "Cloud Vision returned status {status}: {text}"
            )));
        }
        parse_annotate_response(&text)
    }
}

#[async_trait]
impl TextExtractor for VisionExtractor {
    #[instrument(level = "debug", skip_all, fields(pdf = %pdf.display()))]
    async fn extract_text(&self, pdf: &Path) -> Result<Vec<String>, ScanError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ScanError::OcrUnavailable(
                "GOOGLE_VISION_API_KEY is not set".to_owned(),
            ));
        };
        let rasterized = rasterize_pdf(pdf, self.dpi).await?;
        stream::iter(rasterized.pages.clone())
            .map(|page| async move { self.ocr_page(api_key, &page).await })
            .buffered(CONCURRENCY)
            .try_collect()
            .await
    }
}

/// Load a page image and re-encode it as grayscale PNG.
///
/// This is smaller to upload, and OCR doesn't need color.
async fn grayscale_png(path: PathBuf) -> Result<Vec<u8>, ScanError> {
    spawn_blocking_propagating_panics(move || -> Result<Vec<u8>> {
        let image = image::open(&path)
            .with_context(|| format!("Failed to read page image {:?}", path.display()))?;
        let gray = DynamicImage::ImageLuma8(image.to_luma8());
        let mut png = Cursor::new(Vec::new());
        gray.write_to(&mut png, ImageFormat::Png)
            .context("Failed to encode grayscale page")?;
        Ok(png.into_inner())
    })
    .await
    .map_err(|err| ScanError::OcrProcessing(format!("{err:#}")))
}

/// Pull the page text out of an `images:annotate` response.
fn parse_annotate_response(body: &str) -> Result<String, ScanError> {
    #[derive(Deserialize)]
    struct AnnotateResponse {
        #[serde(default)]
        responses: Vec<ImageResponse>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ImageResponse {
        full_text_annotation: Option<TextAnnotation>,
        error: Option<Status>,
    }

    #[derive(Deserialize)]
    struct TextAnnotation {
        text: String,
    }

    #[derive(Deserialize)]
    struct Status {
        #[serde(default)]
        message: String,
    }

    let parsed: AnnotateResponse = serde_json::from_str(body).map_err(|err| {
        ScanError::OcrProcessing(format!("Cannot parse Cloud Vision response: {err}"))
    })?;
    let Some(response) = parsed.responses.into_iter().next() else {
        return Err(ScanError::OcrProcessing(
            "Cloud Vision returned no responses".to_owned(),
        ));
    };
    if let Some(status) = response.error {
        return Err(ScanError::OcrProcessing(format!(
            "Cloud Vision error: {}",
            status.message
        )));
    }
    // Pages with no text have no annotation at all.
    Ok(response
        .full_text_annotation
        .map(|annotation| annotation.text)
        .unwrap_or_default())
}
