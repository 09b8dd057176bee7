//! ヒューリスティック選定
//!
//! 外部呼び出しなしでサイズ・位置・テキストから点数を付ける。AI選定の必須フォールバック。

use chrono::Utc;

use crate::error::ScraperError;
use crate::types::{CandidateImage, ScoredImage, SelectionResult, SelectionStrategy};

const BASE_SCORE: i32 = 50;
const LARGE_IMAGE_WIDTH: u32 = 800;

const CUSTOMIZATION_KEYWORDS: &[&str] = &["custom", "personalized", "design"];
const DETAIL_KEYWORDS: &[&str] = &["detail", "close", "zoom"];
const URL_HINTS: &[&str] = &["main", "hero"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// 1枚の画像を採点
pub fn score_image(image: &CandidateImage) -> ScoredImage {
    let mut score = BASE_SCORE;
    let mut notes = Vec::new();

    let shows_full_product = matches!(image.width, Some(w) if w >= LARGE_IMAGE_WIDTH);
    if shows_full_product {
        score += 15;
        notes.push(format!("large image ({}px wide)", image.width.unwrap_or_default()));
    }

    let shows_customization = contains_any(&image.alt_text, CUSTOMIZATION_KEYWORDS);
    if shows_customization {
        score += 20;
        notes.push("alt text mentions customization".to_string());
    }

    let purpose_clear = image.position == 0;
    match image.position {
        0 => {
            score += 10;
            notes.push("first image on page".to_string());
        }
        1 => {
            score += 5;
            notes.push("second image on page".to_string());
        }
        _ => {}
    }

    if contains_any(&image.url, URL_HINTS) {
        score += 10;
        notes.push("URL suggests a main/hero image".to_string());
    }

    if contains_any(&image.alt_text, DETAIL_KEYWORDS) {
        score -= 15;
        notes.push("alt text suggests a detail shot".to_string());
    }

    let reasoning = if notes.is_empty() {
        format!("position {}: base score only", image.position)
    } else {
        format!("position {}: {}", image.position, notes.join(", "))
    };

    ScoredImage {
        image: image.clone(),
        score: f64::from(score),
        shows_full_product,
        shows_customization,
        purpose_clear,
        reasoning,
    }
}

/// 最高点のうち最初に出現したもののインデックス
pub(crate) fn first_max_index(scored: &[ScoredImage]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, s) in scored.iter().enumerate() {
        match best {
            Some(b) if scored[b].score >= s.score => {}
            _ => best = Some(i),
        }
    }
    best
}

/// 全候補を採点して最高点の画像を選ぶ
pub fn select(
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

    let scored: Vec<ScoredImage> = candidates.iter().map(score_image).collect();
    let best = first_max_index(&scored)
        .ok_or_else(|| ScraperError::InvalidInput("候補画像がありません".into()))?;
    let chosen = &scored[best];

    let reasoning = format!(
        "Heuristic selection: image at position {} scored {} of {} candidates ({})",
        chosen.image.position,
        chosen.score,
        scored.len(),
        chosen.reasoning
    );

    Ok(SelectionResult {
        source_url: source_url.to_string(),
        product_name: product_name.to_string(),
        selected_image_url: chosen.image.url.clone(),
        reasoning,
        scored_images: scored,
        strategy: SelectionStrategy::Heuristic,
        fallback_error: None,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str, alt: &str, position: usize, width: Option<u32>) -> CandidateImage {
        CandidateImage::new(url, alt, position).with_size(width, None)
    }

    #[test]
    fn test_customized_large_first_image_scores_95() {
        let a = score_image(&image("a.jpg", "custom design", 0, Some(900)));
        assert_eq!(a.score, 95.0);
        assert!(a.shows_full_product);
        assert!(a.shows_customization);
        assert!(a.purpose_clear);
    }

    #[test]
    fn test_detail_shot_is_penalized() {
        let b = score_image(&image("b.jpg", "close up detail", 1, Some(100)));
        assert_eq!(b.score, 40.0);
        assert!(!b.shows_full_product);
        assert!(!b.purpose_clear);
    }

    #[test]
    fn test_select_prefers_customized_image() {
        let candidates = vec![
            image("a.jpg", "custom design", 0, Some(900)),
            image("b.jpg", "close up detail", 1, Some(100)),
        ];

        let result = select("https://shop.example/p/1", "Mug", &candidates).unwrap();
        assert_eq!(result.selected_image_url, "a.jpg");
        assert_eq!(result.selected().unwrap().score, 95.0);
        assert_eq!(result.strategy, SelectionStrategy::Heuristic);
        assert_eq!(result.scored_images.len(), 2);
    }

    #[test]
    fn test_ties_pick_first_occurrence() {
        // 位置2以降は位置ボーナスなし、すべて50点
        let candidates = vec![
            image("x.jpg", "", 2, None),
            image("y.jpg", "", 3, None),
            image("z.jpg", "", 4, None),
        ];

        let result = select("u", "p", &candidates).unwrap();
        assert_eq!(result.selected_image_url, "x.jpg");
    }

    #[test]
    fn test_later_higher_score_wins_over_earlier_tie() {
        let candidates = vec![
            image("x.jpg", "", 2, None),
            image("y.jpg", "", 3, None),
            image("hero.jpg", "", 4, None),
        ];

        let result = select("u", "p", &candidates).unwrap();
        assert_eq!(result.selected_image_url, "hero.jpg");
    }

    #[test]
    fn test_keywords_are_case_insensitive_and_stack() {
        let scored = score_image(&image(
            "https://cdn.example/MAIN-shot.jpg",
            "Personalized ZOOM view",
            1,
            Some(800),
        ));
        // 50 + 15 + 20 + 5 + 10 - 15
        assert_eq!(scored.score, 85.0);
    }

    #[test]
    fn test_reasoning_mentions_position() {
        let scored = score_image(&image("p.jpg", "", 3, None));
        assert!(scored.reasoning.contains("position 3"));

        let result = select("u", "p", &[image("p.jpg", "", 3, None)]).unwrap();
        assert!(result.reasoning.contains("position 3"));
    }

    #[test]
    fn test_selected_url_belongs_to_input() {
        let candidates: Vec<CandidateImage> = (0..12)
            .map(|i| image(&format!("img{}.jpg", i), "", i, Some(100 * i as u32)))
            .collect();

        let result = select("u", "p", &candidates).unwrap();
        assert!(candidates.iter().any(|c| c.url == result.selected_image_url));
    }

    #[test]
    fn test_empty_candidates_is_invalid_input() {
        let err = select("https://shop.example/p/2", "p", &[]).unwrap_err();
        assert!(matches!(err, ScraperError::InvalidInput(_)));
    }
}
