//! 画像選定で扱う型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 商品ページから抽出した候補画像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateImage {
    /// 絶対URL
    pub url: String,
    /// alt属性（空文字の場合あり）
    pub alt_text: String,
    /// 抽出順（0始まり）
    pub position: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl CandidateImage {
    pub fn new(url: impl Into<String>, alt_text: impl Into<String>, position: usize) -> Self {
        Self {
            url: url.into(),
            alt_text: alt_text.into(),
            position,
            width: None,
            height: None,
        }
    }

    pub fn with_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// スコア付きの候補画像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredImage {
    #[serde(flatten)]
    pub image: CandidateImage,
    pub score: f64,
    /// 商品全体が写っている
    pub shows_full_product: bool,
    /// カスタマイズ内容が分かる
    pub shows_customization: bool,
    /// 用途が明確
    pub purpose_clear: bool,
    pub reasoning: String,
}

/// 選定に使った方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    Heuristic,
    Ai,
    /// AI呼び出しに失敗しヒューリスティックで代替した
    AiFallback,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::Heuristic => "heuristic",
            SelectionStrategy::Ai => "ai",
            SelectionStrategy::AiFallback => "ai_fallback",
        }
    }
}

/// 1商品分の選定結果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    pub source_url: String,
    pub product_name: String,
    pub selected_image_url: String,
    pub reasoning: String,
    pub scored_images: Vec<ScoredImage>,
    pub strategy: SelectionStrategy,
    /// フォールバック時に握りつぶしたAIエラー
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SelectionResult {
    /// 選ばれた画像のスコア情報
    pub fn selected(&self) -> Option<&ScoredImage> {
        self.scored_images
            .iter()
            .find(|s| s.image.url == self.selected_image_url)
    }
}

/// 1商品分の失敗記録
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub source_url: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(source_url: impl Into<String>, error: impl ToString) -> Self {
        Self {
            source_url: source_url.into(),
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// 抽出結果（商品名と候補画像）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub url: String,
    pub product_name: String,
    pub images: Vec<CandidateImage>,
}
