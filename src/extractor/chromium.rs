use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use reqwest::Url;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::filter::{filter_candidates, RawPageData};
use crate::config::{normalize_host, ScraperConfig};
use crate::error::ScraperError;
use crate::traits::ImageExtractor;
use crate::types::ProductPage;

/// readyState 確認の間隔
const READY_CHECK_INTERVAL_MS: u64 = 250;

/// 商品名と画像一覧をJSON文字列で返すスクリプト
const COLLECT_SCRIPT: &str = r#"
(() => {
    const abs = (s) => {
        if (!s) return '';
        try { return new URL(s, document.baseURI).href; } catch (e) { return ''; }
    };
    const images = Array.from(document.querySelectorAll('img')).map((img) => ({
        src: abs(img.currentSrc || img.src || img.getAttribute('data-src') || img.getAttribute('data-lazy-src')),
        alt: (img.getAttribute('alt') || '').trim(),
        width: img.naturalWidth || img.width || null,
        height: img.naturalHeight || img.height || null,
    }));
    const h1 = document.querySelector('h1');
    const og = document.querySelector('meta[property="og:title"]');
    const title = (h1 && h1.textContent.trim()) || (og && og.content && og.content.trim()) || document.title || '';
    return JSON.stringify({ title, images });
})()
"#;

/// chromiumoxide で商品ページから画像を抽出する
///
/// ブラウザは最初の `extract` で起動し、`close` まで使い回す。
pub struct ChromiumExtractor {
    config: ScraperConfig,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

impl ChromiumExtractor {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config,
            browser: None,
            handler: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.browser.is_some()
    }

    /// 対象ホスト以外のURLを拒否
    fn check_url(&self, url: &str) -> Result<(), ScraperError> {
        let parsed =
            Url::parse(url).map_err(|e| ScraperError::Navigation(format!("不正なURL {}: {}", url, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScraperError::Navigation(format!(
                "http(s)以外のURLは処理できません: {}",
                url
            )));
        }

        if let Some(allowed) = &self.config.allowed_host {
            let allowed = normalize_host(allowed)?;
            let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
            let host_bare = host.trim_start_matches("www.");
            if host_bare != allowed && !host_bare.ends_with(&format!(".{}", allowed)) {
                return Err(ScraperError::Navigation(format!(
                    "対象外のホストです: {} (許可: {})",
                    host, allowed
                )));
            }
        }
        Ok(())
    }

    async fn launch(&mut self) -> Result<(), ScraperError> {
        info!("Launching browser for image extraction...");

        let mut builder = BrowserConfig::builder().window_size(1366, 900);
        if let Some(path) = &self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        builder = builder
            .no_sandbox()
            .request_timeout(self.config.page_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ設定エラー: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        let task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {:?}", e);
                }
            }
        });

        self.browser = Some(browser);
        self.handler = Some(task);
        info!("Browser launched");
        Ok(())
    }

    async fn open_page(&mut self) -> Result<Page, ScraperError> {
        if self.browser.is_none() {
            self.launch().await?;
        }
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("ブラウザが初期化されていません".into()))?;

        browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))
    }

    /// ページ遷移から画像収集まで
    async fn load_and_collect(&self, page: &Page, url: &str) -> Result<RawPageData, ScraperError> {
        page.goto(url)
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;

        self.wait_ready(page).await?;

        // 遅延読み込み画像を表示させる
        if let Err(e) = page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
        {
            debug!("Scroll failed: {}", e);
        }
        sleep(self.config.settle_delay).await;
        if let Err(e) = page.evaluate("window.scrollTo(0, 0)").await {
            debug!("Scroll back failed: {}", e);
        }

        if self.config.debug {
            if let Ok(screenshot) = page
                .screenshot(ScreenshotParams::builder().full_page(true).build())
                .await
            {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
                debug!("Page screenshot: data:image/png;base64,{}", encoded);
            }
        }

        let json_str: String = page
            .evaluate(COLLECT_SCRIPT)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?
            .into_value()
            .map_err(|e| ScraperError::Extraction(format!("画像一覧の取得失敗: {}", e)))?;

        serde_json::from_str(&json_str)
            .map_err(|e| ScraperError::Extraction(format!("画像一覧の解析失敗: {}", e)))
    }

    /// document.readyState が complete になるまで待機
    async fn wait_ready(&self, page: &Page) -> Result<(), ScraperError> {
        let start = Instant::now();
        loop {
            let state = page
                .evaluate("document.readyState")
                .await
                .map_err(|e| ScraperError::JavaScript(e.to_string()))?
                .into_value::<String>()
                .unwrap_or_default();

            if state == "complete" {
                debug!("Page ready after {:?}", start.elapsed());
                return Ok(());
            }
            sleep(Duration::from_millis(READY_CHECK_INTERVAL_MS)).await;
        }
    }
}

#[async_trait]
impl ImageExtractor for ChromiumExtractor {
    async fn extract(&mut self, url: &str) -> Result<ProductPage, ScraperError> {
        self.check_url(url)?;
        info!("Extracting images from {}", url);

        let page = self.open_page().await?;
        let start = Instant::now();
        let loaded = tokio::time::timeout(
            self.config.page_timeout,
            self.load_and_collect(&page, url),
        )
        .await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }

        let data = match loaded {
            Ok(result) => result?,
            Err(_) => {
                return Err(ScraperError::Timeout(format!(
                    "{}秒以内にページが読み込まれませんでした: {}",
                    self.config.page_timeout.as_secs(),
                    url
                )))
            }
        };

        let total = data.images.len();
        let images = filter_candidates(
            data.images,
            self.config.min_image_width,
            self.config.max_candidates,
        );
        info!(
            "Extracted {} candidate images ({} raw) from {} in {:?}",
            images.len(),
            total,
            url,
            start.elapsed()
        );

        let product_name = if data.title.trim().is_empty() {
            url.to_string()
        } else {
            data.title.trim().to_string()
        };

        Ok(ProductPage {
            url: url.to_string(),
            product_name,
            images,
        })
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        info!("ブラウザを終了中...");

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Failed to wait for browser process: {}", e);
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        info!("ブラウザ終了完了");
        Ok(())
    }
}
