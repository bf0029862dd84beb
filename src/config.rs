//! 配置管理模块
//!
//! 配置来源按优先级从低到高：内置默认值、TOML 配置文件、环境变量。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::browser::{LoadCondition, PageProfile};
use crate::env::EnvOverrides;
use crate::error::{DumpError, DumpResult};
use crate::network::blocklist::DEFAULT_BLOCKLIST_SOURCE;

/// 配置常量
pub mod constants {
    pub const CONFIG_PATHS: &[&str] = &["pagedump.toml", "~/.config/pagedump/config.toml"];

    pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_BLOCKLIST_CACHE: &str = "~/.cache/pagedump/hosts.txt";
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// 广告/跟踪域名列表配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocklistConfig {
    pub enabled: bool,
    /// hosts 格式列表的下载地址
    pub source: String,
    /// 本地缓存文件，支持 `~`
    pub cache_path: Option<String>,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: DEFAULT_BLOCKLIST_SOURCE.to_string(),
            cache_path: Some(constants::DEFAULT_BLOCKLIST_CACHE.to_string()),
        }
    }
}

impl BlocklistConfig {
    /// 展开 `~` 后的缓存路径
    pub fn cache_file(&self) -> Option<PathBuf> {
        self.cache_path
            .as_deref()
            .filter(|path| !path.is_empty())
            .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned()))
    }
}

/// 浏览器进程配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// 浏览器可执行文件，未设置时自动查找
    pub executable: Option<String>,
    pub headless: bool,
    /// 用户数据目录，未设置时使用临时目录
    pub data_dir: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            data_dir: None,
        }
    }
}

/// 捕获会话配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumperConfig {
    /// 导航超时
    #[serde(rename = "navigation_timeout_ms", with = "duration_millis")]
    pub navigation_timeout: Duration,

    /// 单个被拦截请求的超时
    #[serde(rename = "request_timeout_ms", with = "duration_millis")]
    pub request_timeout: Duration,

    pub load_condition: LoadCondition,
    pub profile: PageProfile,
    pub blocklist: BlocklistConfig,
    pub browser: BrowserSettings,
}

impl Default for DumperConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_millis(constants::DEFAULT_NAVIGATION_TIMEOUT_MS),
            request_timeout: Duration::from_millis(constants::DEFAULT_REQUEST_TIMEOUT_MS),
            load_condition: LoadCondition::default(),
            profile: PageProfile::default(),
            blocklist: BlocklistConfig::default(),
            browser: BrowserSettings::default(),
        }
    }
}

impl DumperConfig {
    /// 加载配置
    ///
    /// # 参数
    ///
    /// * `explicit_path` - 命令行指定的配置文件；未指定时依次查找 `CONFIG_PATHS`
    pub fn load(explicit_path: Option<&Path>) -> DumpResult<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => match Self::find_config_file() {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("no configuration file found, using defaults");
                    Self::default()
                }
            },
        };

        let overrides =
            EnvOverrides::from_env().map_err(|e| DumpError::Config(e.to_string()))?;
        config.apply_overrides(&overrides);
        config.validate()?;

        Ok(config)
    }

    /// 查找第一个存在的配置文件
    pub fn find_config_file() -> Option<PathBuf> {
        constants::CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned()))
            .find(|path| path.is_file())
    }

    /// 从 TOML 文件读取配置
    pub fn from_file(path: &Path) -> DumpResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DumpError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|e| DumpError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> DumpResult<Self> {
        toml::from_str(content).map_err(|e| DumpError::Config(e.to_string()))
    }

    /// 应用环境变量覆盖
    pub fn apply_overrides(&mut self, overrides: &EnvOverrides) {
        if let Some(timeout) = overrides.navigation_timeout {
            self.navigation_timeout = timeout;
        }
        if let Some(timeout) = overrides.request_timeout {
            self.request_timeout = timeout;
        }
        if let Some(user_agent) = &overrides.user_agent {
            self.profile.user_agent = user_agent.clone();
        }
        if let Some(path) = &overrides.chrome_path {
            self.browser.executable = Some(path.clone());
        }
        if let Some(headless) = overrides.headless {
            self.browser.headless = headless;
        }
    }

    /// 验证配置
    pub fn validate(&self) -> DumpResult<()> {
        if self.navigation_timeout.is_zero() {
            return Err(DumpError::Config(
                "navigation timeout must be non-zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(DumpError::Config(
                "request timeout must be non-zero".to_string(),
            ));
        }
        if self.profile.user_agent.trim().is_empty() {
            return Err(DumpError::Config("user agent must not be empty".to_string()));
        }
        if self.profile.viewport_width == 0 || self.profile.viewport_height == 0 {
            return Err(DumpError::Config(
                "viewport dimensions must be non-zero".to_string(),
            ));
        }
        if self.blocklist.enabled && self.blocklist.source.trim().is_empty() {
            return Err(DumpError::Config(
                "blocklist source must be set when the blocklist is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
