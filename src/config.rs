use std::time::Duration;

use reqwest::Url;

use crate::error::ScraperError;

/// AIに送る画像の上限
pub const DEFAULT_MAX_AI_IMAGES: usize = 8;
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// ブラウザと画像抽出の設定
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub headless: bool,
    /// 未指定の場合はchromiumoxideの自動検出に任せる
    pub chrome_path: Option<String>,
    /// このホスト（とそのサブドメイン）以外のURLは処理しない
    pub allowed_host: Option<String>,
    /// ページ読み込み全体のタイムアウト
    pub page_timeout: Duration,
    /// 遅延読み込み画像のための待機
    pub settle_delay: Duration,
    pub min_image_width: u32,
    pub max_candidates: usize,
    pub debug: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            allowed_host: None,
            page_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1500),
            min_image_width: 200,
            max_candidates: 20,
            debug: false,
        }
    }
}

impl ScraperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 環境変数 CHROME_PATH / CHROMIUM_PATH を反映
    pub fn from_env() -> Self {
        let chrome_path = std::env::var("CHROME_PATH")
            .or_else(|_| std::env::var("CHROMIUM_PATH"))
            .ok()
            .filter(|p| !p.trim().is_empty());

        Self {
            chrome_path,
            ..Default::default()
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// スキーム・ポート・パス付きで渡された場合もホスト名に揃える。
    /// 解釈できない値はそのまま保持し、`validate` と URL 検査で拒否される。
    pub fn with_allowed_host(mut self, host: Option<String>) -> Self {
        self.allowed_host = host
            .map(|h| normalize_host(&h).unwrap_or_else(|_| h.trim().to_string()))
            .filter(|h| !h.is_empty());
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_min_image_width(mut self, width: u32) -> Self {
        self.min_image_width = width;
        self
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn validate(&self) -> Result<(), ScraperError> {
        if let Some(host) = &self.allowed_host {
            normalize_host(host)?;
        }
        Ok(())
    }
}

/// `https://www.shop.example:8443/path` のような指定から比較用のホスト名を取り出す
///
/// 小文字化し、先頭の `www.` を取り除く。
pub fn normalize_host(raw: &str) -> Result<String, ScraperError> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let host = Url::parse(&with_scheme)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ScraperError::Config(format!("許可ホストを解釈できません: {}", raw)))?;

    Ok(host.trim_start_matches("www.").to_string())
}

/// AI選定の設定
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_images: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_images: DEFAULT_MAX_AI_IMAGES,
        }
    }
}

impl SelectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 環境変数 OPENAI_API_KEY / IMAGE_PICKER_MODEL を反映
    pub fn from_env() -> Self {
        let mut config = Self::default().with_api_key(std::env::var("OPENAI_API_KEY").ok());
        if let Ok(model) = std::env::var("IMAGE_PICKER_MODEL") {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        config
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_images(mut self, max: usize) -> Self {
        self.max_images = max;
        self
    }

    /// 空白のみのキーは未設定とみなす
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key().is_some()
    }
}
