//! 客户端状态（Cookie）
//!
//! 请求携带的 Cookie 与本次响应需要下发的 `Set-Cookie` 记录。
//! 写入会立即反映到同一请求后续的读取上；过期时间早于当前时刻的写入
//! 等价于删除该 Cookie。
//!
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;

/// 一条待下发的 Cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub expires: DateTime<Utc>,
}

impl ClientCookie {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    /// `Set-Cookie` 头的值；名称与取值按表单编码转义
    pub fn to_header(&self) -> String {
        let pair = serde_urlencoded::to_string([(self.name.as_str(), self.value.as_str())])
            .unwrap_or_else(|_| format!("{}=", self.name));
        format!(
            "{pair}; Path={}; Expires={}",
            self.path,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    values: BTreeMap<String, String>,
    outgoing: Vec<ClientCookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析请求头 `Cookie: a=1; b=2`；无法解析的片段被忽略
    pub fn from_header(header: &str) -> Self {
        let mut jar = Self::new();
        for part in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            match serde_urlencoded::from_str::<Vec<(String, String)>>(part) {
                Ok(pairs) => {
                    for (name, value) in pairs {
                        jar.values.insert(name, value);
                    }
                }
                Err(err) => warn!(error = %err, "ignoring malformed cookie"),
            }
        }
        jar
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// 记录一次下发，并同步更新当前可见的取值
    pub fn set(&mut self, cookie: ClientCookie) {
        if cookie.is_expired_at(Utc::now()) {
            self.values.remove(&cookie.name);
        } else {
            self.values.insert(cookie.name.clone(), cookie.value.clone());
        }
        self.outgoing.push(cookie);
    }

    pub fn outgoing(&self) -> &[ClientCookie] {
        &self.outgoing
    }

    /// 取走待下发的记录（写响应时调用）
    pub fn take_outgoing(&mut self) -> Vec<ClientCookie> {
        std::mem::take(&mut self.outgoing)
    }
}
