use crate::case_study::RetentionPolicy;
use crate::error::{Result, SignVerifyError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub case_dir: PathBuf,
    /// 比率テストの閾値
    pub ratio_threshold: f32,
    /// 一致と判定する類似度の閾値（これを超えれば一致）
    pub match_threshold: f64,
    /// ケースフォルダにマッチ図(matches.png)を保存
    pub save_match_diagram: bool,
    pub max_upload_bytes: usize,
    /// 画像の幅・高さの上限（px）。超える画像はデコードしない
    pub max_image_dimension: u32,
    pub max_keypoints: Option<usize>,
    pub retention: RetentionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".into(),
            upload_dir: PathBuf::from("uploads"),
            case_dir: PathBuf::from("case_studies"),
            ratio_threshold: 0.75,
            match_threshold: 0.1,
            save_match_diagram: false,
            max_upload_bytes: 20 * 1024 * 1024,
            max_image_dimension: 1600,
            max_keypoints: None,
            retention: RetentionPolicy::default(),
        }
    }
}

impl Config {
    /// 設定ファイル → 環境変数 の順に読み込み
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルがなければデフォルト
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("SIGN_VERIFY_CONFIG") {
            return Ok(PathBuf::from(path));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| SignVerifyError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("sign-verify").join("config.json"))
    }

    /// 環境変数で上書き（環境変数を優先）
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("SIGN_VERIFY_BIND") {
            self.bind_addr = bind;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = parse_env("PORT", &port)?;
            self.bind_addr = format!("0.0.0.0:{}", port);
        }
        if let Some(dir) = lookup("SIGN_VERIFY_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("SIGN_VERIFY_CASE_DIR") {
            self.case_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup("SIGN_VERIFY_RATIO") {
            self.ratio_threshold = parse_env("SIGN_VERIFY_RATIO", &v)?;
        }
        if let Some(v) = lookup("SIGN_VERIFY_MATCH_THRESHOLD") {
            self.match_threshold = parse_env("SIGN_VERIFY_MATCH_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("SIGN_VERIFY_SAVE_DIAGRAM") {
            self.save_match_diagram = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("SIGN_VERIFY_MAX_DIMENSION") {
            self.max_image_dimension = parse_env("SIGN_VERIFY_MAX_DIMENSION", &v)?;
        }
        if let Some(v) = lookup("SIGN_VERIFY_RETENTION_DAYS") {
            self.retention.max_age_days = Some(parse_env("SIGN_VERIFY_RETENTION_DAYS", &v)?);
        }
        if let Some(v) = lookup("SIGN_VERIFY_RETENTION_MAX") {
            self.retention.max_folders = Some(parse_env("SIGN_VERIFY_RETENTION_MAX", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.ratio_threshold > 0.0 && self.ratio_threshold <= 1.0) {
            return Err(SignVerifyError::Config(format!(
                "ratio_threshold は 0 より大きく 1 以下: {}",
                self.ratio_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(SignVerifyError::Config(format!(
                "match_threshold は 0 以上 1 以下: {}",
                self.match_threshold
            )));
        }
        if self.max_image_dimension == 0 {
            return Err(SignVerifyError::Config("max_image_dimension は 1 以上".into()));
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|e| SignVerifyError::Config(format!("bind_addr が不正 ({}): {}", self.bind_addr, e)))
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SignVerifyError::Config(format!("{} が不正 ({}): {}", key, value, e)))
}
