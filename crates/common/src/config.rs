use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::NaiveTime;

use crate::error::AppError;
use crate::types::{SubscriberId, UnauthorizedPolicy};

/// Prompts rotated through when `PROMPTS` is not set.
pub const DEFAULT_PROMPTS: &[&str] = &[
    "妃妃身穿华丽旗袍，优雅地坐在镜头前微笑",
    "妃妃穿着汉服，在竹林中浅笑，神情温婉",
    "妃妃身着晚礼服，坐在窗前，透过窗纱的柔光微笑",
    "可爱妃妃穿着洛丽塔连衣裙，在花园里漫步微笑",
    "妃妃坐在古风庭院，身穿素雅轻纱，温柔含笑",
];

/// Free-text phrases that trigger a generation when `TRIGGER_PHRASES` is not set.
pub const DEFAULT_TRIGGER_PHRASES: &[&str] = &["来张妃妃", "妃妃照片"];

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Telegram bot token
    pub telegram_bot_token: String,

    /// Telegram Bot API base URL (overridable for tests and proxies)
    pub telegram_api_url: String,

    /// OpenAI API key for image generation
    pub openai_api_key: String,

    /// OpenAI API base URL
    pub openai_base_url: String,

    /// Subscribers allowed to invoke guarded commands and receive broadcasts
    pub allowed_user_ids: BTreeSet<SubscriberId>,

    /// Behavior when someone outside the allow-list asks for an image
    pub unauthorized_policy: UnauthorizedPolicy,

    /// Minimum seconds between two accepted invocations of the same command (default: 10)
    pub throttle_window_secs: u64,

    /// Bound on the asset download step in seconds (default: 45)
    pub download_timeout_secs: u64,

    /// Bound on the generation request step in seconds (default: 120)
    pub generation_timeout_secs: u64,

    /// Long-poll timeout passed to `getUpdates` in seconds (default: 30)
    pub poll_timeout_secs: u64,

    /// Local wall-clock time of the daily broadcast (default: 09:00)
    pub broadcast_time: NaiveTime,

    /// Chat that receives error reports, if any
    pub developer_chat_id: Option<i64>,

    /// Directory generated images are written to before delivery
    pub asset_dir: PathBuf,

    /// Prompt rotation, in order
    pub prompts: Vec<String>,

    /// Literal phrases that act like the generate command
    pub trigger_phrases: Vec<String>,

    /// Caption attached to images sent on request
    pub caption: String,

    /// Caption attached to the daily broadcast
    pub broadcast_caption: String,

    /// Bind address of the status server; disabled when unset
    pub status_addr: Option<SocketAddr>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                AppError::Config(format!("{} environment variable is required", key))
            })
        };

        let prompts = match get("PROMPTS") {
            Some(raw) => split_list(&raw, '|'),
            None => DEFAULT_PROMPTS.iter().map(|s| s.to_string()).collect(),
        };
        if prompts.is_empty() {
            return Err(AppError::Config(
                "PROMPTS must contain at least one prompt".to_string(),
            ));
        }

        let trigger_phrases = match get("TRIGGER_PHRASES") {
            Some(raw) => split_list(&raw, '|'),
            None => DEFAULT_TRIGGER_PHRASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        Ok(Self {
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            telegram_api_url: get("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            allowed_user_ids: parse_allow_list(&required("ALLOWED_USER_IDS")?)?,
            unauthorized_policy: match get("UNAUTHORIZED_POLICY") {
                Some(raw) => raw.parse().map_err(AppError::Config)?,
                None => UnauthorizedPolicy::default(),
            },
            throttle_window_secs: parse_or("THROTTLE_WINDOW_SECS", get("THROTTLE_WINDOW_SECS"), 10)?,
            download_timeout_secs: parse_or(
                "DOWNLOAD_TIMEOUT_SECS",
                get("DOWNLOAD_TIMEOUT_SECS"),
                45,
            )?,
            generation_timeout_secs: parse_or(
                "GENERATION_TIMEOUT_SECS",
                get("GENERATION_TIMEOUT_SECS"),
                120,
            )?,
            poll_timeout_secs: parse_or("POLL_TIMEOUT_SECS", get("POLL_TIMEOUT_SECS"), 30)?,
            broadcast_time: match get("BROADCAST_TIME") {
                Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
                    AppError::Config("BROADCAST_TIME must be formatted as HH:MM".to_string())
                })?,
                None => NaiveTime::from_hms_opt(9, 0, 0)
                    .ok_or_else(|| AppError::Config("invalid default broadcast time".to_string()))?,
            },
            developer_chat_id: get("DEVELOPER_CHAT_ID")
                .map(|raw| {
                    raw.trim().parse().map_err(|_| {
                        AppError::Config("DEVELOPER_CHAT_ID must be a valid i64".to_string())
                    })
                })
                .transpose()?,
            asset_dir: get("ASSET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            prompts,
            trigger_phrases,
            caption: get("CAPTION").unwrap_or_else(|| "妃妃来啦 ✨".to_string()),
            broadcast_caption: get("BROADCAST_CAPTION")
                .unwrap_or_else(|| "每日妃妃 🌸".to_string()),
            status_addr: get("STATUS_ADDR")
                .map(|raw| {
                    raw.trim().parse().map_err(|_| {
                        AppError::Config("STATUS_ADDR must be a socket address".to_string())
                    })
                })
                .transpose()?,
        })
    }
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_allow_list(raw: &str) -> Result<BTreeSet<SubscriberId>, AppError> {
    let ids = split_list(raw, ',')
        .iter()
        .map(|id| {
            id.parse::<i64>().map(SubscriberId).map_err(|_| {
                AppError::Config(format!("ALLOWED_USER_IDS contains invalid id '{}'", id))
            })
        })
        .collect::<Result<BTreeSet<_>, _>>()?;

    if ids.is_empty() {
        return Err(AppError::Config(
            "ALLOWED_USER_IDS must list at least one subscriber".to_string(),
        ));
    }
    Ok(ids)
}

fn parse_or(key: &str, raw: Option<String>, default: u64) -> Result<u64, AppError> {
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a valid u64", key))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("OPENAI_API_KEY", "sk-test"),
        ("ALLOWED_USER_IDS", "42, 7"),
    ];

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.throttle_window_secs, 10);
        assert_eq!(config.download_timeout_secs, 45);
        assert_eq!(config.unauthorized_policy, UnauthorizedPolicy::Refuse);
        assert_eq!(config.broadcast_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(config.prompts.len(), DEFAULT_PROMPTS.len());
        assert_eq!(config.trigger_phrases.len(), 2);
        assert!(config.status_addr.is_none());
        assert!(config.developer_chat_id.is_none());
        assert_eq!(
            config.allowed_user_ids,
            BTreeSet::from([SubscriberId(7), SubscriberId(42)])
        );
    }

    #[test]
    fn test_missing_credential_is_config_error() {
        let err = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("ALLOWED_USER_IDS", "42"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("TELEGRAM_BOT_TOKEN")));
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let err = AppConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("OPENAI_API_KEY", "   "),
            ("ALLOWED_USER_IDS", "42"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn test_invalid_allow_list_entry() {
        let err = AppConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("OPENAI_API_KEY", "sk-test"),
            ("ALLOWED_USER_IDS", "42,abc"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("abc")));
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("UNAUTHORIZED_POLICY", "silent"),
            ("BROADCAST_TIME", "21:30"),
            ("PROMPTS", "a cat | a dog"),
            ("DEVELOPER_CHAT_ID", "-100"),
            ("STATUS_ADDR", "127.0.0.1:8080"),
            ("THROTTLE_WINDOW_SECS", "3"),
        ]);
        let config = AppConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.unauthorized_policy, UnauthorizedPolicy::Silent);
        assert_eq!(config.broadcast_time, NaiveTime::from_hms_opt(21, 30, 0).unwrap());
        assert_eq!(config.prompts, vec!["a cat", "a dog"]);
        assert_eq!(config.developer_chat_id, Some(-100));
        assert_eq!(config.status_addr, Some("127.0.0.1:8080".parse().unwrap()));
        assert_eq!(config.throttle_window_secs, 3);
    }

    #[test]
    fn test_malformed_broadcast_time() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("BROADCAST_TIME", "9am"));
        assert!(AppConfig::from_lookup(lookup(&vars)).is_err());
    }
}
