//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问。每个变量都声明名称、默认值与说明，
//! 配置加载时用它们覆盖配置文件中的值，CLI 帮助信息也由这里生成。

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 仅当变量被显式设置时返回其值
    fn get_override() -> EnvResult<Option<T>> {
        match env::var(Self::NAME) {
            Ok(value) if !value.trim().is_empty() => Self::parse(&value).map(Some),
            _ => Ok(None),
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "PAGEDUMP_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }

    /// 禁用颜色输出
    pub struct NoColor;
    impl EnvVar<bool> for NoColor {
        const NAME: &'static str = "NO_COLOR";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Disable colored output when set to any value";

        fn parse(value: &str) -> EnvResult<bool> {
            // NO_COLOR 遵循标准：任何值都表示禁用颜色
            Ok(!value.is_empty())
        }
    }
}

/// 捕获会话相关环境变量
pub mod capture {
    use super::*;

    /// 页面导航超时
    pub struct NavigationTimeout;
    impl EnvVar<Duration> for NavigationTimeout {
        const NAME: &'static str = "PAGEDUMP_NAVIGATION_TIMEOUT_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(10_000));
        const DESCRIPTION: &'static str = "Page navigation timeout in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 100, 600_000)
        }
    }

    /// 单个拦截请求的超时
    pub struct RequestTimeout;
    impl EnvVar<Duration> for RequestTimeout {
        const NAME: &'static str = "PAGEDUMP_REQUEST_TIMEOUT_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(10_000));
        const DESCRIPTION: &'static str = "Per-request interception timeout in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 100, 600_000)
        }
    }

    /// 覆盖页面的 User-Agent
    pub struct UserAgent;
    impl EnvVar<String> for UserAgent {
        const NAME: &'static str = "PAGEDUMP_USER_AGENT";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "User agent presented by the page and the fetcher";

        fn parse(value: &str) -> EnvResult<String> {
            let agent = value.trim();
            if agent.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "User agent cannot be empty".to_string(),
                });
            }
            Ok(agent.to_string())
        }
    }
}

/// 浏览器相关环境变量
pub mod browser {
    use super::*;

    /// Chromium 可执行文件路径
    pub struct ChromePath;
    impl EnvVar<String> for ChromePath {
        const NAME: &'static str = "PAGEDUMP_CHROME_PATH";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Path to the Chrome/Chromium executable";

        fn parse(value: &str) -> EnvResult<String> {
            Ok(shellexpand::tilde(value.trim()).into_owned())
        }
    }

    /// 无头模式
    pub struct Headless;
    impl EnvVar<bool> for Headless {
        const NAME: &'static str = "PAGEDUMP_HEADLESS";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Run the browser without a visible window";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_millis(value: &str, var_name: &str, min: u64, max: u64) -> EnvResult<Duration> {
    let millis: u64 = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid number of milliseconds".to_string(),
    })?;

    if millis < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", millis, min),
        });
    }

    if millis > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", millis, max),
        });
    }

    Ok(Duration::from_millis(millis))
}

/// 环境变量覆盖项汇总
///
/// 只有显式设置的变量才会出现在这里，未设置的保持 `None`，由配置文件或默认值决定。
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub navigation_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub user_agent: Option<String>,
    pub chrome_path: Option<String>,
    pub headless: Option<bool>,
}

impl EnvOverrides {
    /// 从环境变量加载覆盖项
    pub fn from_env() -> EnvResult<Self> {
        Ok(Self {
            navigation_timeout: capture::NavigationTimeout::get_override()?,
            request_timeout: capture::RequestTimeout::get_override()?,
            user_agent: capture::UserAgent::get_override()?,
            chrome_path: browser::ChromePath::get_override()?,
            headless: browser::Headless::get_override()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.navigation_timeout.is_none()
            && self.request_timeout.is_none()
            && self.user_agent.is_none()
            && self.chrome_path.is_none()
            && self.headless.is_none()
    }
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let entries = [
        (core::LogLevel::NAME, core::LogLevel::DESCRIPTION, "info".to_string()),
        (
            capture::NavigationTimeout::NAME,
            capture::NavigationTimeout::DESCRIPTION,
            "10000".to_string(),
        ),
        (
            capture::RequestTimeout::NAME,
            capture::RequestTimeout::DESCRIPTION,
            "10000".to_string(),
        ),
        (
            capture::UserAgent::NAME,
            capture::UserAgent::DESCRIPTION,
            "profile default".to_string(),
        ),
        (
            browser::ChromePath::NAME,
            browser::ChromePath::DESCRIPTION,
            "auto-detected".to_string(),
        ),
        (
            browser::Headless::NAME,
            browser::Headless::DESCRIPTION,
            format!("{:?}", browser::Headless::DEFAULT.unwrap_or(true)),
        ),
    ];

    let mut docs = String::from("Environment variables:\n");
    for (name, description, default) in entries {
        docs.push_str(&format!("  {}\n      {} (default: {})\n", name, description, default));
    }
    docs
}
