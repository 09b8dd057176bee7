//! 画像選定モジュール
//!
//! AI選定とヒューリスティック選定を切り替える

mod heuristic;
mod openai;
mod remote;

use std::sync::Arc;

use tracing::debug;

pub use heuristic::{score_image, select as select_heuristic};
pub use openai::OpenAiVisionModel;
pub use remote::{
    build_prompt, parse_verdict, resolve_verdict, AiSelector, ModelImageScore, ModelVerdict,
    VisionRequest,
};

use crate::config::SelectorConfig;
use crate::error::ScraperError;
use crate::traits::VisionModel;
use crate::types::{CandidateImage, SelectionResult};

/// 選定方式の振り分け
///
/// AI利用が要求され、かつ認証情報が設定されている場合のみAI選定を行う。
#[derive(Clone, Default)]
pub struct ImageSelector {
    ai: Option<AiSelector>,
}

impl ImageSelector {
    pub fn heuristic_only() -> Self {
        Self::default()
    }

    pub fn with_model(model: Arc<dyn VisionModel>, config: &SelectorConfig) -> Self {
        Self {
            ai: Some(AiSelector::new(model, config.max_images, config.timeout)),
        }
    }

    /// APIキーがあればOpenAIクライアントを作成
    pub fn from_config(config: &SelectorConfig) -> Result<Self, ScraperError> {
        if !config.has_credentials() {
            return Ok(Self::heuristic_only());
        }
        let model = OpenAiVisionModel::new(config)?;
        Ok(Self::with_model(Arc::new(model), config))
    }

    pub fn ai_available(&self) -> bool {
        self.ai.is_some()
    }

    pub async fn select(
        &self,
        source_url: &str,
        product_name: &str,
        candidates: &[CandidateImage],
        use_ai: bool,
    ) -> Result<SelectionResult, ScraperError> {
        match (&self.ai, use_ai) {
            (Some(ai), true) => ai.select(source_url, product_name, candidates).await,
            (None, true) => {
                debug!("AI requested but no API key configured, using heuristic");
                select_heuristic(source_url, product_name, candidates)
            }
            _ => select_heuristic(source_url, product_name, candidates),
        }
    }
}
