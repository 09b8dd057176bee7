//! 画像抽出モジュール
//!
//! ブラウザで商品ページを開き、広告候補になりうる画像を取り出す

mod chromium;
mod filter;

pub use chromium::ChromiumExtractor;
pub use filter::{filter_candidates, RawImage, RawPageData};
