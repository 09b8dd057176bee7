use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::Deserialize;
use tokio::sync::Mutex;
use tower::Service;
use tracing::{info, warn};

use crate::bulk::BulkOutcome;
use crate::error::ScraperError;
use crate::selector::ImageSelector;
use crate::traits::ImageExtractor;
use crate::types::{FailureRecord, SelectionResult};

/// 画像選定リクエスト
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub url: String,
    #[serde(default)]
    pub use_ai: bool,
}

impl AnalyzeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            use_ai: false,
        }
    }

    pub fn with_ai(mut self, use_ai: bool) -> Self {
        self.use_ai = use_ai;
        self
    }
}

/// 抽出と選定をまとめたサービス
///
/// 抽出器はMutexで保護され、同時に1件ずつ処理される。
pub struct AnalyzeService<E> {
    extractor: Arc<Mutex<E>>,
    selector: Arc<ImageSelector>,
}

impl<E> Clone for AnalyzeService<E> {
    fn clone(&self) -> Self {
        Self {
            extractor: Arc::clone(&self.extractor),
            selector: Arc::clone(&self.selector),
        }
    }
}

impl<E: ImageExtractor + 'static> AnalyzeService<E> {
    pub fn new(extractor: E, selector: ImageSelector) -> Self {
        Self {
            extractor: Arc::new(Mutex::new(extractor)),
            selector: Arc::new(selector),
        }
    }

    pub fn ai_available(&self) -> bool {
        self.selector.ai_available()
    }

    /// 1商品を処理
    pub async fn analyze(&self, req: &AnalyzeRequest) -> Result<SelectionResult, ScraperError> {
        let page = {
            let mut extractor = self.extractor.lock().await;
            extractor.extract(&req.url).await?
        };

        self.selector
            .select(&page.url, &page.product_name, &page.images, req.use_ai)
            .await
    }

    /// 複数商品を順番に処理。1件の失敗で残りを止めない
    pub async fn analyze_bulk(&self, urls: &[String], use_ai: bool) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();

        for (i, url) in urls.iter().enumerate() {
            info!("[{}/{}] Processing {}", i + 1, urls.len(), url);
            let req = AnalyzeRequest::new(url.as_str()).with_ai(use_ai);

            match self.analyze(&req).await {
                Ok(result) => outcome.successes.push(result),
                Err(e) => {
                    warn!("[{}/{}] Failed {}: {}", i + 1, urls.len(), url, e);
                    outcome.failures.push(FailureRecord::new(url.as_str(), e));
                }
            }
        }

        info!(
            "Bulk run finished: {} succeeded, {} failed",
            outcome.successes.len(),
            outcome.failures.len()
        );
        outcome
    }

    /// 抽出器のリソースを解放
    pub async fn shutdown(&self) -> Result<(), ScraperError> {
        self.extractor.lock().await.close().await
    }
}

impl<E: ImageExtractor + 'static> Service<AnalyzeRequest> for AnalyzeService<E> {
    type Response = SelectionResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AnalyzeRequest) -> Self::Future {
        info!("画像選定リクエスト受信: url={}, use_ai={}", req.url, req.use_ai);
        let service = self.clone();

        Box::pin(async move {
            let result = service.analyze(&req).await?;

            info!(
                "画像選定完了: url={}, selected={}, strategy={}",
                result.source_url,
                result.selected_image_url,
                result.strategy.as_str()
            );

            Ok(result)
        })
    }
}
