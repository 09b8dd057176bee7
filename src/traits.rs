use async_trait::async_trait;

use crate::error::{ModelError, ScraperError};
use crate::selector::{ModelVerdict, VisionRequest};
use crate::types::ProductPage;

/// 商品ページから候補画像を取り出す
#[async_trait]
pub trait ImageExtractor: Send {
    /// ページを開いて商品名と候補画像を抽出
    async fn extract(&mut self, url: &str) -> Result<ProductPage, ScraperError>;

    /// リソース解放
    async fn close(&mut self) -> Result<(), ScraperError>;
}

/// 画像を評価できる外部モデル
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// 1商品につき1リクエスト。リトライはしない
    async fn evaluate(&self, request: &VisionRequest) -> Result<ModelVerdict, ModelError>;
}
