//! 应用配置
//!
//! 所有字段都有默认值，配置文件只需覆盖关心的部分。
//!
use crate::error::{AppError, AppResult};
use bon::Builder;
use serde::{Deserialize, Serialize};

#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 站点根地址，以 `/` 结尾
    #[builder(into, default = "http://localhost/".to_string())]
    pub site_url: String,
    #[builder(default)]
    pub search: SearchConfig,
    #[builder(default)]
    pub sticky: StickyConfig,
    /// 已启用的功能（插件）名称
    #[builder(default = vec!["groups".to_string()])]
    pub features: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
        }
    }
}

impl SearchConfig {
    /// 把请求的条数限制在 `1..=max_limit`
    pub fn clamp_limit(&self, requested: Option<i64>) -> usize {
        match requested {
            Some(n) if n < 1 => 1,
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX).min(self.max_limit),
            None => self.default_limit.clamp(1, self.max_limit),
        }
    }
}

/// 表单暂存 Cookie 的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickyConfig {
    pub cookie_name: String,
    pub path: String,
    /// 暂存表单时的有效期
    pub ttl_secs: i64,
    /// 清除整张表单后的有效期
    pub clear_ttl_secs: i64,
    /// 清除单个字段时相对当前时刻的偏移（负数即立即过期）
    pub clear_value_offset_secs: i64,
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            cookie_name: "mindsStickyForm".to_string(),
            path: "/".to_string(),
            ttl_secs: 60 * 60 * 60,
            clear_ttl_secs: 60,
            clear_value_offset_secs: -3600,
        }
    }
}

impl AppConfig {
    pub fn from_json(json: &str) -> AppResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AppError::Validation(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.search.max_limit == 0 {
            return Err(AppError::Validation("search.max_limit must be positive".into()));
        }
        if self.search.default_limit == 0 || self.search.default_limit > self.search.max_limit {
            return Err(AppError::Validation(format!(
                "search.default_limit must be within 1..={}",
                self.search.max_limit
            )));
        }
        if self.sticky.cookie_name.trim().is_empty() {
            return Err(AppError::Validation("sticky.cookie_name must not be empty".into()));
        }
        Ok(())
    }

    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// 以 `site_url` 为前缀拼接站内路径
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.site_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
