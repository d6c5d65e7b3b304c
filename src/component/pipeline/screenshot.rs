use crate::config::ScreenshotOptions;
use crate::context::RunContext;
use crate::error::{SegmentError, SegmentResult};
use log::info;
use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SCREENSHOT_TOKEN_ENV: &str = "SCREENSHOT_API_TOKEN";

/// 整頁截圖服務
pub trait ScreenshotCapture: Send + Sync {
    fn capture(&self, url: &str, output_path: &Path, ctx: &RunContext) -> SegmentResult<PathBuf>;
}

/// 呼叫 ScreenshotAPI；金鑰只放在查詢字串裡，不出現在任何子行程參數
pub struct ScreenshotApiCapture {
    http: Client,
    token: String,
    options: ScreenshotOptions,
}

impl ScreenshotApiCapture {
    pub fn new(token: &str, options: ScreenshotOptions, timeout: Duration) -> SegmentResult<Self> {
        if token.trim().is_empty() {
            return Err(SegmentError::validation(format!(
                "缺少截圖服務金鑰，請設定 {SCREENSHOT_TOKEN_ENV}"
            )));
        }
        options.validate()?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SegmentError::unrecoverable(format!("無法建立 HTTP client: {e}")))?;
        Ok(Self {
            http,
            token: token.trim().to_string(),
            options,
        })
    }

    /// 從環境變數讀取金鑰
    pub fn from_env(options: ScreenshotOptions, timeout: Duration) -> SegmentResult<Self> {
        let token = std::env::var(SCREENSHOT_TOKEN_ENV).unwrap_or_default();
        Self::new(&token, options, timeout)
    }

    fn query_params(&self, url: &str) -> Vec<(&'static str, String)> {
        let options = &self.options;
        vec![
            ("url", url.to_string()),
            ("token", self.token.clone()),
            ("width", options.width.to_string()),
            ("height", options.height.to_string()),
            ("full_page", options.full_page.to_string()),
            ("fresh", "true".to_string()),
            ("output", "image".to_string()),
            ("file_type", options.file_type.clone()),
            ("wait_for_event", "load".to_string()),
            ("delay", options.delay_ms.to_string()),
            ("block_ads", options.block_ads.to_string()),
            ("no_cookie_banners", "true".to_string()),
        ]
    }
}

/// reqwest 錯誤轉成網路錯誤；去掉 URL 以免金鑰寫進 log
fn network_error(context: &str, error: reqwest::Error) -> SegmentError {
    let error = error.without_url();
    if error.is_timeout() {
        SegmentError::network(format!("{context}逾時: {error}"))
    } else {
        SegmentError::network(format!("{context}: {error}"))
    }
}

impl ScreenshotCapture for ScreenshotApiCapture {
    fn capture(&self, url: &str, output_path: &Path, ctx: &RunContext) -> SegmentResult<PathBuf> {
        ctx.check_cancelled()?;
        info!("擷取網頁截圖: {url}");

        let response = self
            .http
            .get(self.options.endpoint.as_str())
            .query(&self.query_params(url))
            .send()
            .map_err(|e| network_error("截圖服務請求失敗", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SegmentError::network(format!("截圖服務回應 {status}")));
        }

        let body = response
            .bytes()
            .map_err(|e| network_error("截圖內容讀取失敗", e))?;
        if body.is_empty() {
            return Err(SegmentError::network("截圖服務回傳空白內容"));
        }
        ctx.check_cancelled()?;

        fs::write(output_path, &body).map_err(|e| SegmentError::io(output_path, e))?;
        info!("截圖完成: {}（{} bytes）", output_path.display(), body.len());
        Ok(output_path.to_path_buf())
    }
}
