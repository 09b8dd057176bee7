use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("画像抽出エラー: {0}")]
    Extraction(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    /// 候補画像が空のまま選定が呼ばれた
    #[error("入力エラー: {0}")]
    InvalidInput(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("CSVエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),
}

/// AIモデル呼び出しのエラー
///
/// 選定処理の内部でのみ使用し、発生した場合はヒューリスティック選定へフォールバックする。
/// 呼び出し元に伝播することはない。
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("APIキーが設定されていません")]
    MissingApiKey,

    #[error("リクエスト失敗: {0}")]
    Request(String),

    #[error("モデル応答が{0:?}以内に返りませんでした")]
    Timeout(Duration),

    #[error("モデルAPIがステータス{status}を返しました: {body}")]
    Status { status: u16, body: String },

    #[error("モデル応答のJSONが不正です: {0}")]
    InvalidJson(String),

    #[error("モデル応答が空です")]
    EmptyResponse,

    #[error("送信した画像に対応するスコアがありません")]
    NoUsableScores,
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::Request(e.to_string())
    }
}
