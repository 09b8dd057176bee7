//! 商品画像選定ライブラリ
//!
//! - ブラウザで商品ページを開いて候補画像を抽出
//! - AIモデル（失敗時はヒューリスティック）で広告向けの1枚を選定
//! - 複数URLの一括処理とCSV出力
//!
//! # 使用例
//!
//! ```rust,ignore
//! use product_image_picker::{
//!     AnalyzeRequest, AnalyzeService, ChromiumExtractor, ImageSelector, ScraperConfig,
//!     SelectorConfig,
//! };
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let extractor = ChromiumExtractor::new(ScraperConfig::from_env());
//!     let selector = ImageSelector::from_config(&SelectorConfig::from_env()).unwrap();
//!     let mut service = AnalyzeService::new(extractor, selector);
//!
//!     let request = AnalyzeRequest::new("https://shop.example/products/mug").with_ai(true);
//!     let result = service.call(request).await.unwrap();
//!     println!("Selected: {}", result.selected_image_url);
//!
//!     service.shutdown().await.unwrap();
//! }
//! ```

pub mod bulk;
pub mod config;
pub mod error;
pub mod extractor;
pub mod output;
pub mod selector;
pub mod server;
pub mod service;
pub mod traits;
pub mod types;

// 主要な型をリエクスポート
pub use bulk::BulkOutcome;
pub use config::{ScraperConfig, SelectorConfig};
pub use error::{ModelError, ScraperError};
pub use extractor::ChromiumExtractor;
pub use selector::{AiSelector, ImageSelector, OpenAiVisionModel};
pub use service::{AnalyzeRequest, AnalyzeService};
pub use traits::{ImageExtractor, VisionModel};
pub use types::{
    CandidateImage, FailureRecord, ProductPage, ScoredImage, SelectionResult, SelectionStrategy,
};
