//! AIモデルによる画像選定
//!
//! 先頭から最大 `max_images` 枚をモデルに送り、応答を候補リストに照合する。
//! 呼び出しが失敗した場合はエラーを記録したうえで全候補に対するヒューリスティック選定を返す。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

use super::heuristic;
use crate::error::{ModelError, ScraperError};
use crate::traits::VisionModel;
use crate::types::{CandidateImage, ScoredImage, SelectionResult, SelectionStrategy};

/// モデルへ送るリクエスト
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub product_name: String,
    pub images: Vec<CandidateImage>,
    pub prompt: String,
}

impl VisionRequest {
    pub fn new(product_name: &str, images: &[CandidateImage]) -> Self {
        Self {
            product_name: product_name.to_string(),
            images: images.to_vec(),
            prompt: build_prompt(product_name, images),
        }
    }
}

/// モデル応答（画像ごとの評価）
#[derive(Debug, Clone, Deserialize)]
pub struct ModelImageScore {
    /// 解釈できない index は `None`（その評価は捨てられる）
    #[serde(default, deserialize_with = "lenient_index")]
    pub index: Option<usize>,
    pub score: f64,
    #[serde(default, alias = "showsFullProduct")]
    pub shows_full_product: bool,
    #[serde(default, alias = "showsCustomization")]
    pub shows_customization: bool,
    #[serde(default, alias = "purposeClear")]
    pub purpose_clear: bool,
    #[serde(default)]
    pub reasoning: String,
}

/// モデル応答全体
#[derive(Debug, Clone, Deserialize)]
pub struct ModelVerdict {
    #[serde(default)]
    pub images: Vec<ModelImageScore>,
    #[serde(default, alias = "selectedIndex", deserialize_with = "lenient_index")]
    pub selected_index: Option<usize>,
    #[serde(default)]
    pub reasoning: String,
}

/// 数値と数字文字列を index として受け付け、それ以外は `None` にする
fn lenient_index<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().map(|v| v as usize),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// 評価基準を含むプロンプトを組み立てる
pub fn build_prompt(product_name: &str, images: &[CandidateImage]) -> String {
    let index = images
        .iter()
        .enumerate()
        .map(|(i, img)| {
            let alt = if img.alt_text.trim().is_empty() {
                "(no alt text)"
            } else {
                img.alt_text.trim()
            };
            format!("Image {}: {}", i, alt)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are choosing the best advertising image for the product "{product_name}".
{count} images are attached in order. Their alt texts are:
{index}

Score every image from 0 to 100 using this rubric:
- 40%: shows the full product
- 35%: shows the customization or personalization options
- 25%: the purpose of the product is clear

Respond with a JSON object only, in this shape:
{{
  "images": [
    {{"index": 0, "score": 0, "shows_full_product": false, "shows_customization": false, "purpose_clear": false, "reasoning": "..."}}
  ],
  "selected_index": 0,
  "reasoning": "why the selected image is the best choice"
}}"#,
        product_name = product_name,
        count = images.len(),
        index = index,
    )
}

/// コードフェンス等を取り除いてJSONを解析
pub fn parse_verdict(content: &str) -> Result<ModelVerdict, ModelError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ModelError::EmptyResponse);
    }

    let json = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => return Err(ModelError::InvalidJson(truncate(trimmed, 200))),
    };

    serde_json::from_str(json).map_err(|e| ModelError::InvalidJson(e.to_string()))
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// モデル応答を送信済み候補に照合して選定結果を作る
///
/// 送信範囲外または解釈できない index を持つ評価は捨てる。`selected_index` が
/// 解決できない場合や評価の無い画像を指す場合は、候補順で最初に現れる最高点の画像を選ぶ。
pub fn resolve_verdict(
    source_url: &str,
    product_name: &str,
    sent: &[CandidateImage],
    verdict: ModelVerdict,
) -> Result<SelectionResult, ModelError> {
    let mut entries: Vec<(usize, ModelImageScore)> = verdict
        .images
        .iter()
        .filter_map(|entry| match entry.index {
            Some(i) if i < sent.len() => Some((i, entry.clone())),
            _ => None,
        })
        .collect();
    if entries.is_empty() {
        return Err(ModelError::NoUsableScores);
    }

    // 同じ index が重複した場合は最初の評価を採用
    entries.sort_by_key(|(i, _)| *i);
    entries.dedup_by_key(|(i, _)| *i);
    let scored_indices: Vec<usize> = entries.iter().map(|(i, _)| *i).collect();

    let scored: Vec<ScoredImage> = entries
        .into_iter()
        .map(|(i, entry)| ScoredImage {
            image: sent[i].clone(),
            score: entry.score,
            shows_full_product: entry.shows_full_product,
            shows_customization: entry.shows_customization,
            purpose_clear: entry.purpose_clear,
            reasoning: entry.reasoning,
        })
        .collect();

    // 選ばれた画像は必ず scored_images に含まれるようにする
    let (selected_image_url, reasoning) = match verdict.selected_index {
        Some(i) if scored_indices.contains(&i) => (sent[i].url.clone(), verdict.reasoning.clone()),
        other => {
            let best = heuristic::first_max_index(&scored).ok_or(ModelError::NoUsableScores)?;
            let chosen = &scored[best];
            warn!(
                "Model selected index {:?} has no score among {} sent images, using top score {} (position {})",
                other,
                sent.len(),
                chosen.score,
                chosen.image.position
            );
            let reasoning = if chosen.reasoning.is_empty() {
                format!("Highest model score ({})", chosen.score)
            } else {
                format!("Highest model score ({}): {}", chosen.score, chosen.reasoning)
            };
            (chosen.image.url.clone(), reasoning)
        }
    };

    Ok(SelectionResult {
        source_url: source_url.to_string(),
        product_name: product_name.to_string(),
        selected_image_url,
        reasoning,
        scored_images: scored,
        strategy: SelectionStrategy::Ai,
        fallback_error: None,
        timestamp: Utc::now(),
    })
}

/// AI選定
#[derive(Clone)]
pub struct AiSelector {
    model: Arc<dyn VisionModel>,
    max_images: usize,
    timeout: Duration,
}

impl AiSelector {
    pub fn new(model: Arc<dyn VisionModel>, max_images: usize, timeout: Duration) -> Self {
        Self {
            model,
            max_images: max_images.max(1),
            timeout,
        }
    }

    /// 空の候補以外は必ず結果を返す
    pub async fn select(
        &self,
        source_url: &str,
        product_name: &str,
        candidates: &[CandidateImage],
    ) -> Result<SelectionResult, ScraperError> {
        if candidates.is_empty() {
            return Err(ScraperError::InvalidInput(format!(
                "候補画像がありません: {}",
                source_url
            )));
        }

        match self.try_select(source_url, product_name, candidates).await {
            Ok(result) => {
                info!(
                    "AI selected {} for {} ({} scored)",
                    result.selected_image_url,
                    source_url,
                    result.scored_images.len()
                );
                Ok(result)
            }
            Err(e) => {
                warn!("AI selection failed for {}, falling back to heuristic: {}", source_url, e);
                let mut result = heuristic::select(source_url, product_name, candidates)?;
                result.strategy = SelectionStrategy::AiFallback;
                result.fallback_error = Some(e.to_string());
                Ok(result)
            }
        }
    }

    async fn try_select(
        &self,
        source_url: &str,
        product_name: &str,
        candidates: &[CandidateImage],
    ) -> Result<SelectionResult, ModelError> {
        let sent = &candidates[..candidates.len().min(self.max_images)];
        debug!(
            "Sending {} of {} images to model for {}",
            sent.len(),
            candidates.len(),
            source_url
        );

        let request = VisionRequest::new(product_name, sent);
        let verdict = tokio::time::timeout(self.timeout, self.model.evaluate(&request))
            .await
            .map_err(|_| ModelError::Timeout(self.timeout))??;

        resolve_verdict(source_url, product_name, sent, verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 受け取ったリクエストを記録して固定の応答を返す
    struct FakeModel {
        response: Result<String, String>,
        delay: Option<Duration>,
        seen: Mutex<Vec<VisionRequest>>,
    }

    impl FakeModel {
        fn replying(json: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(json.to_string()),
                delay: None,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Err(message.to_string()),
                delay: None,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn sent_counts(&self) -> Vec<usize> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.images.len())
                .collect()
        }
    }

    #[async_trait]
    impl VisionModel for FakeModel {
        async fn evaluate(&self, request: &VisionRequest) -> Result<ModelVerdict, ModelError> {
            self.seen.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.response {
                Ok(json) => parse_verdict(json),
                Err(message) => Err(ModelError::Request(message.clone())),
            }
        }
    }

    fn candidates(n: usize) -> Vec<CandidateImage> {
        (0..n)
            .map(|i| CandidateImage::new(format!("https://cdn.example/{}.jpg", i), format!("view {}", i), i))
            .collect()
    }

    fn selector(model: Arc<FakeModel>) -> AiSelector {
        AiSelector::new(model, 8, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_only_first_eight_images_are_sent() {
        let model = FakeModel::replying(
            r#"{"images":[{"index":2,"score":90,"reasoning":"best"}],"selected_index":2,"reasoning":"clear"}"#,
        );
        let result = selector(model.clone())
            .select("u", "Mug", &candidates(10))
            .await
            .unwrap();

        assert_eq!(model.sent_counts(), vec![8]);
        assert_eq!(result.strategy, SelectionStrategy::Ai);
        assert_eq!(result.selected_image_url, "https://cdn.example/2.jpg");
        assert_eq!(result.reasoning, "clear");
    }

    #[tokio::test]
    async fn test_out_of_range_selected_index_uses_top_score() {
        let model = FakeModel::replying(
            r#"{"images":[
                {"index":0,"score":40},
                {"index":1,"score":88,"shows_full_product":true,"reasoning":"whole mug"},
                {"index":2,"score":70}
            ],"selectedIndex":5,"reasoning":"?"}"#,
        );
        let result = selector(model)
            .select("u", "Mug", &candidates(3))
            .await
            .unwrap();

        assert_eq!(result.strategy, SelectionStrategy::Ai);
        assert_eq!(result.selected_image_url, "https://cdn.example/1.jpg");
        assert!(result.selected().unwrap().shows_full_product);
        assert!(result.reasoning.contains("whole mug"));
    }

    #[tokio::test]
    async fn test_selected_index_without_score_uses_top_score() {
        let model = FakeModel::replying(
            r#"{"images":[{"index":0,"score":60},{"index":2,"score":85,"reasoning":"lid open"}],"selected_index":1,"reasoning":"?"}"#,
        );
        let result = selector(model)
            .select("u", "Mug", &candidates(3))
            .await
            .unwrap();

        assert_eq!(result.strategy, SelectionStrategy::Ai);
        assert_eq!(result.selected_image_url, "https://cdn.example/2.jpg");
        let selected = result.selected().unwrap();
        assert_eq!(selected.score, 85.0);
        assert!(result.reasoning.contains("lid open"));
    }

    #[tokio::test]
    async fn test_string_indices_are_accepted() {
        let model = FakeModel::replying(
            r#"{"images":[{"index":"0","score":30},{"index":" 1 ","score":92},{"index":"first","score":99}],"selected_index":"1","reasoning":"sharp"}"#,
        );
        let result = selector(model)
            .select("u", "Mug", &candidates(3))
            .await
            .unwrap();

        assert_eq!(result.strategy, SelectionStrategy::Ai);
        assert_eq!(result.fallback_error, None);
        assert_eq!(result.selected_image_url, "https://cdn.example/1.jpg");
        assert_eq!(result.scored_images.len(), 2);
        assert_eq!(result.selected().unwrap().score, 92.0);
    }

    #[tokio::test]
    async fn test_top_score_tie_follows_candidate_order() {
        // 応答順は 2, 0 だが候補順で最初の 0 を選ぶ
        let model = FakeModel::replying(
            r#"{"images":[{"index":2,"score":80},{"index":0,"score":80}],"selected_index":"n/a"}"#,
        );
        let result = selector(model)
            .select("u", "Mug", &candidates(3))
            .await
            .unwrap();

        assert_eq!(result.selected_image_url, "https://cdn.example/0.jpg");
    }

    #[tokio::test]
    async fn test_model_error_falls_back_to_heuristic_on_full_list() {
        let mut images = candidates(10);
        // 送信対象外の9番目がヒューリスティックでは最高点
        images[9].url = "https://cdn.example/hero.jpg".into();
        images[9].alt_text = "custom engraving".into();
        images[9].width = Some(1200);

        let model = FakeModel::failing("connection refused");
        let result = selector(model).select("u", "Mug", &images).await.unwrap();
        let expected = heuristic::select("u", "Mug", &images).unwrap();

        assert_eq!(result.strategy, SelectionStrategy::AiFallback);
        assert_eq!(result.selected_image_url, expected.selected_image_url);
        assert_eq!(result.selected_image_url, "https://cdn.example/hero.jpg");
        assert_eq!(result.scored_images.len(), 10);
        assert!(result
            .fallback_error
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_malformed_json_falls_back() {
        let model = FakeModel::replying("I think image 1 looks best");
        let result = selector(model)
            .select("u", "Mug", &candidates(3))
            .await
            .unwrap();

        assert_eq!(result.strategy, SelectionStrategy::AiFallback);
        assert!(result.fallback_error.is_some());
    }

    #[tokio::test]
    async fn test_no_usable_scores_falls_back() {
        let model = FakeModel::replying(r#"{"images":[{"index":7,"score":99}],"selected_index":7}"#);
        let result = selector(model)
            .select("u", "Mug", &candidates(3))
            .await
            .unwrap();

        assert_eq!(result.strategy, SelectionStrategy::AiFallback);
        assert_eq!(result.selected_image_url, "https://cdn.example/0.jpg");
    }

    #[tokio::test]
    async fn test_slow_model_times_out_and_falls_back() {
        let model = Arc::new(FakeModel {
            response: Ok(r#"{"images":[{"index":1,"score":99}],"selected_index":1}"#.into()),
            delay: Some(Duration::from_secs(5)),
            seen: Mutex::new(Vec::new()),
        });
        let selector = AiSelector::new(model, 8, Duration::from_millis(50));
        let result = selector.select("u", "Mug", &candidates(2)).await.unwrap();

        assert_eq!(result.strategy, SelectionStrategy::AiFallback);
        assert!(result.fallback_error.unwrap().contains("50ms"));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_invalid_input() {
        let model = FakeModel::replying("{}");
        let err = selector(model.clone()).select("u", "Mug", &[]).await.unwrap_err();

        assert!(matches!(err, ScraperError::InvalidInput(_)));
        assert!(model.sent_counts().is_empty());
    }

    #[test]
    fn test_parse_verdict_strips_code_fence() {
        let verdict = parse_verdict(
            "```json\n{\"images\":[{\"index\":0,\"score\":55.5}],\"selected_index\":0}\n```",
        )
        .unwrap();
        assert_eq!(verdict.images.len(), 1);
        assert_eq!(verdict.images[0].score, 55.5);
        assert_eq!(verdict.selected_index, Some(0));
    }

    #[test]
    fn test_parse_verdict_rejects_empty() {
        assert!(matches!(parse_verdict("  "), Err(ModelError::EmptyResponse)));
    }

    #[test]
    fn test_prompt_lists_alt_text_and_rubric() {
        let images = vec![
            CandidateImage::new("a.jpg", "engraved mug", 0),
            CandidateImage::new("b.jpg", "", 1),
        ];
        let prompt = build_prompt("Photo Mug", &images);

        assert!(prompt.contains("\"Photo Mug\""));
        assert!(prompt.contains("Image 0: engraved mug"));
        assert!(prompt.contains("Image 1: (no alt text)"));
        assert!(prompt.contains("40%"));
        assert!(prompt.contains("35%"));
        assert!(prompt.contains("25%"));
    }
}
