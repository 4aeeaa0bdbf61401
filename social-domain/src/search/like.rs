//! LIKE 模式：转义与匹配
//!
//! 搜索词先把 `\`、`_`、`%` 转义为字面量，再拼接成
//! 前缀模式 `term%` 与词首模式 `% term%`。同一份模式既可作为参数
//! 传给数据库（`LIKE $1 ESCAPE '\'`），也可由 [`like_matches`] 在内存中求值。
//!
use std::fmt;

const ESCAPE: char = '\\';

/// 经过转义的搜索词
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    raw: String,
    escaped: String,
}

impl SearchTerm {
    /// 构造搜索词；去除首尾空白后为空则返回 `None`
    pub fn new(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(Self {
            raw: raw.to_string(),
            escaped: escape_like(raw),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn escaped(&self) -> &str {
        &self.escaped
    }

    /// `term%`：从字符串开头匹配
    pub fn prefix_pattern(&self) -> String {
        format!("{}%", self.escaped)
    }

    /// `% term%`：从任意一个词首（空格之后）匹配
    pub fn word_pattern(&self) -> String {
        format!("% {}%", self.escaped)
    }

    pub fn matches_prefix(&self, text: &str) -> bool {
        like_matches(&self.prefix_pattern(), text)
    }

    pub fn matches_word(&self, text: &str) -> bool {
        like_matches(&self.word_pattern(), text)
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// 把 LIKE 通配符转义为字面量
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    for c in input.chars() {
        if matches!(c, '\\' | '_' | '%') {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyOne,
    AnyMany,
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let token = match c {
            ESCAPE => match chars.next() {
                Some(next) => Token::Literal(fold(next)),
                // 末尾孤立的转义符按字面量处理
                None => Token::Literal(ESCAPE),
            },
            '_' => Token::AnyOne,
            '%' => Token::AnyMany,
            other => Token::Literal(fold(other)),
        };
        tokens.push(token);
    }
    tokens
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// 以不区分大小写的方式计算 `text LIKE pattern ESCAPE '\'`
pub fn like_matches(pattern: &str, text: &str) -> bool {
    let tokens = tokenize(pattern);
    let text: Vec<char> = text.chars().map(fold).collect();

    let (mut t, mut p) = (0usize, 0usize);
    // 最近一次 `%` 的位置与其对应的文本回溯点
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match tokens.get(p) {
            Some(Token::AnyMany) => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(Token::AnyOne) => {
                p += 1;
                t += 1;
            }
            Some(Token::Literal(c)) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    tokens[p.min(tokens.len())..]
        .iter()
        .all(|tok| *tok == Token::AnyMany)
}
