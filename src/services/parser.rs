//! 响应解析服务 - 业务能力层
//!
//! 把模型返回的非结构化文本转换成合法的 `ScoringResult`。
//!
//! 解析分三条路径，结果上带有来源标记：
//! 1. `Parsed` - 定位第一个配平的 JSON 对象并校验分数区间
//! 2. `Salvaged` - JSON 失败后用正则从原文抢救分数，夹到区间内
//! 3. `DefaultFallback` - 什么都提取不到，取区间中点
//!
//! 本服务保证不向外抛错：无论输入多离谱，都返回一个结构合法的结果。
//! 评分 API 本身的错误是另一条路径，不经过这里。

use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::error::ParseError;
use crate::models::{ParseOutcome, ScoringResult};

/// 降级解析时使用的固定评语
pub const DEGRADED_FEEDBACK: &str =
    "AI scoring completed with limited feedback due to parsing error";

/// JSON 里缺少评语时的占位文本
const MISSING_FEEDBACK: &str = "No feedback provided";

/// 模型输出的原始 JSON 形状
#[derive(Debug, Deserialize)]
struct RawScoreResponse {
    score: f64,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    breakdown: Option<JsonValue>,
}

/// 响应解析器
pub struct ResponseParser {
    min_score: u32,
    max_score: u32,
    salvage_re: Regex,
}

impl ResponseParser {
    /// 创建默认区间 1-10 的解析器
    pub fn new() -> Self {
        Self::with_bounds(1, 10)
    }

    /// 创建自定义分数区间的解析器
    pub fn with_bounds(min_score: u32, max_score: u32) -> Self {
        Self {
            min_score,
            max_score,
            // 宽松匹配：score 和冒号之间允许引号和空白
            salvage_re: Regex::new(r#"(?i)score["\s]*:[\s]*(\d+)"#).expect("抢救正则不合法"),
        }
    }

    /// 解析模型响应
    ///
    /// 永远返回结构合法的结果，调用方不需要为解析错误做异常处理
    pub fn parse(&self, response_text: &str) -> ScoringResult {
        match self.try_parse_json(response_text) {
            Ok(result) => result,
            Err(e) => {
                warn!("模型响应解析失败: {}，进入降级提取", e);
                self.salvage(response_text)
            }
        }
    }

    /// 主路径：定位第一个配平的 JSON 对象并校验
    fn try_parse_json(&self, response_text: &str) -> Result<ScoringResult, ParseError> {
        let json_str = extract_json_object(response_text).ok_or(ParseError::NoJsonFound)?;

        let raw: RawScoreResponse =
            serde_json::from_str(json_str).map_err(|source| ParseError::JsonInvalid { source })?;

        // 区间外按解析失败处理，不做静默夹取
        if raw.score < self.min_score as f64 || raw.score > self.max_score as f64 {
            return Err(ParseError::ScoreOutOfRange { score: raw.score });
        }

        Ok(ScoringResult {
            score: raw.score.round() as u32,
            feedback: raw
                .feedback
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| MISSING_FEEDBACK.to_string()),
            breakdown: raw.breakdown,
            outcome: ParseOutcome::Parsed,
        })
    }

    /// 降级路径：正则抢救分数，失败则取区间中点
    fn salvage(&self, response_text: &str) -> ScoringResult {
        let (score, outcome) = match self
            .salvage_re
            .captures(response_text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        {
            Some(value) => (
                value.clamp(self.min_score, self.max_score),
                ParseOutcome::Salvaged,
            ),
            None => (
                (self.min_score + self.max_score) / 2,
                ParseOutcome::DefaultFallback,
            ),
        };

        ScoringResult {
            score,
            feedback: DEGRADED_FEEDBACK.to_string(),
            breakdown: None,
            outcome,
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// 定位文本中第一个配平的 JSON 对象子串
///
/// 从第一个 `{` 开始做括号配平扫描，正确跳过字符串字面量和转义符
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + idx + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
