//! 抽出した画像の絞り込み

use std::collections::HashSet;

use reqwest::Url;
use serde::Deserialize;

use crate::types::CandidateImage;

/// アイコン・ロゴ類とみなすパス中のトークン
const ICON_TOKENS: &[&str] = &[
    "icon",
    "icons",
    "logo",
    "logos",
    "sprite",
    "sprites",
    "favicon",
    "badge",
    "badges",
    "avatar",
    "spinner",
    "loader",
    "placeholder",
    "spacer",
    "1x1",
];

/// ページ上のスクリプトが返す画像情報
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImage {
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub alt: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// ページ上のスクリプトが返す結果
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPageData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub images: Vec<RawImage>,
}

/// URLパスを `/ - _ .` で区切ったトークン単位で判定する。
/// alt は全体がアイコン語そのものの場合のみ除外対象。
fn looks_like_icon(image: &RawImage) -> bool {
    let path = Url::parse(&image.src)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| image.src.to_lowercase());
    let in_path = path
        .split(|c| matches!(c, '/' | '-' | '_' | '.'))
        .any(|token| ICON_TOKENS.contains(&token));

    let alt = image.alt.trim().to_lowercase();
    in_path || ICON_TOKENS.contains(&alt.as_str())
}

/// 候補画像に変換
///
/// http(s) 以外、重複URL、幅が分かっていて `min_width` 未満のもの、アイコン類を除外する。
/// position は除外後の順序で振り直す。
pub fn filter_candidates(
    raw: Vec<RawImage>,
    min_width: u32,
    max_candidates: usize,
) -> Vec<CandidateImage> {
    let mut seen = HashSet::new();

    raw.into_iter()
        .map(|mut img| {
            img.src = img.src.trim().to_string();
            img
        })
        .filter(|img| img.src.starts_with("http://") || img.src.starts_with("https://"))
        .filter(|img| !matches!(img.width, Some(w) if w < min_width))
        .filter(|img| !looks_like_icon(img))
        .filter(|img| seen.insert(img.src.clone()))
        .take(max_candidates)
        .enumerate()
        .map(|(position, img)| {
            CandidateImage::new(img.src, img.alt.trim(), position).with_size(img.width, img.height)
        })
        .collect()
}
