//! 评分模型服务 - 业务能力层
//!
//! 只负责"调用模型给一份提交打分"这一件事，不关心队列和重试
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Gemini 的 OpenAI 兼容网关）

use std::future::Future;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ScorerError;
use crate::models::AssignmentContext;
use crate::utils::{extract_key_requirements, strip_html};

/// 关键要求最多提取的条数
const MAX_KEY_REQUIREMENTS: usize = 8;

/// 评分能力接口
///
/// 队列只依赖这个接口，生产实现是 [`LlmScorer`]，测试注入 mock。
/// `score` 返回模型的原始文本输出，结构化解析交给 `ResponseParser`。
pub trait Scorer: Send + Sync + 'static {
    /// 模型当前是否可用
    fn is_available(&self) -> bool;

    /// 为一份提交打分，返回模型原始输出
    fn score(
        &self,
        content: &str,
        context: &AssignmentContext,
    ) -> impl Future<Output = Result<String, ScorerError>> + Send;
}

/// 评分模型服务
///
/// 职责：
/// - 构造评分提示词（给定相同输入，输出完全确定）
/// - 调用模型 API 并返回原始文本
/// - 启动时探测主模型，失败则尝试一次备用模型；
///   两者都失败则在进程生命周期内保持不可用，不做自动重探
pub struct LlmScorer {
    client: Client<OpenAIConfig>,
    /// 探测成功的模型名；None 表示不可用
    model_name: Option<String>,
}

impl LlmScorer {
    /// 创建评分服务（不探测，直接信任主模型配置）
    pub fn new(config: &Config) -> Self {
        let client = build_client(config);
        Self {
            client,
            model_name: Some(config.llm_model_name.clone()),
        }
    }

    /// 创建评分服务并探测模型可用性
    ///
    /// 先探测主模型；失败后恰好尝试一次备用模型；
    /// 两者都失败则返回一个永久不可用的实例
    pub async fn initialize(config: &Config) -> Self {
        let client = build_client(config);

        if probe_model(&client, &config.llm_model_name).await {
            info!("✅ 评分模型 {} 初始化成功", config.llm_model_name);
            return Self {
                client,
                model_name: Some(config.llm_model_name.clone()),
            };
        }

        warn!(
            "⚠️ 主模型 {} 探测失败，尝试备用模型 {}",
            config.llm_model_name, config.llm_fallback_model_name
        );

        if probe_model(&client, &config.llm_fallback_model_name).await {
            info!(
                "✅ 备用评分模型 {} 初始化成功",
                config.llm_fallback_model_name
            );
            return Self {
                client,
                model_name: Some(config.llm_fallback_model_name.clone()),
            };
        }

        error!("❌ 主模型和备用模型均初始化失败，评分功能不可用");
        Self {
            client,
            model_name: None,
        }
    }

    /// 构造评分提示词
    ///
    /// 给定相同的提交内容和作业上下文，输出完全确定。
    /// 依次包含：作业标题、去除 HTML 的作业说明、提取出的关键要求、
    /// 评分细则、阈值指引、提交原文、JSON 输出格式指令。
    pub fn build_scoring_prompt(content: &str, context: &AssignmentContext) -> String {
        let instructions = strip_html(&context.instructions);
        let requirements = extract_key_requirements(&instructions, MAX_KEY_REQUIREMENTS);

        let mut prompt = String::new();
        prompt.push_str(
            "You are an expert AI trainer evaluating assignment submissions. \
             Please score this submission from 1-10 and provide constructive feedback.\n",
        );

        prompt.push_str(&format!("\nASSIGNMENT: {}\n", context.title));

        if !instructions.is_empty() {
            prompt.push_str(&format!("\nINSTRUCTIONS:\n{}\n", instructions));
        }

        if !requirements.is_empty() {
            prompt.push_str("\nKEY REQUIREMENTS:\n");
            for requirement in &requirements {
                prompt.push_str(&format!("- {}\n", requirement));
            }
        }

        prompt.push_str(&format!("\nSUBMISSION:\n{}\n", content));

        prompt.push_str(
            "\nSCORING CRITERIA (Total: 10 points):\n\
             - Clarity (2 points): Is the response clear and well-structured?\n\
             - Completeness (3 points): Does it address all required aspects?\n\
             - Creativity (2 points): Shows original thinking and innovative approaches\n\
             - Accuracy (3 points): Correct information and appropriate solutions\n",
        );

        prompt.push_str(
            "\nSCORING THRESHOLDS:\n\
             - Submissions irrelevant to the assignment must score 3 or lower.\n\
             - Submissions that address every requirement with correct content should score 8 or higher.\n",
        );

        prompt.push_str(
            "\nRESPONSE FORMAT (JSON only):\n\
             {\n\
             \x20 \"score\": [number between 1-10],\n\
             \x20 \"feedback\": \"[constructive feedback in 2-3 sentences]\",\n\
             \x20 \"breakdown\": {\n\
             \x20   \"clarity\": [score out of 2],\n\
             \x20   \"completeness\": [score out of 3],\n\
             \x20   \"creativity\": [score out of 2],\n\
             \x20   \"accuracy\": [score out of 3]\n\
             \x20 }\n\
             }\n\
             \nPlease provide ONLY the JSON response, no additional text.",
        );

        prompt
    }

    /// 调用模型 API
    async fn chat(&self, model: &str, prompt: &str) -> Result<String, ScorerError> {
        debug!("调用评分 API，模型: {}", model);
        debug!("提示词长度: {} 字符", prompt.len());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| ScorerError::transport(model, e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(0.0)
            .max_tokens(1024u32)
            .build()
            .map_err(|e| ScorerError::transport(model, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("评分 API 调用失败: {}", e);
            ScorerError::transport(model, e)
        })?;

        debug!("评分 API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ScorerError::EmptyResponse {
                model: model.to_string(),
            })?;

        Ok(content.trim().to_string())
    }
}

impl Scorer for LlmScorer {
    fn is_available(&self) -> bool {
        self.model_name.is_some()
    }

    async fn score(
        &self,
        content: &str,
        context: &AssignmentContext,
    ) -> Result<String, ScorerError> {
        let model = self
            .model_name
            .as_deref()
            .ok_or(ScorerError::Unavailable)?;

        let prompt = Self::build_scoring_prompt(content, context);
        self.chat(model, &prompt).await
    }
}

fn build_client(config: &Config) -> Client<OpenAIConfig> {
    // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.llm_api_key)
        .with_api_base(&config.llm_api_base_url);

    Client::with_config(openai_config)
}

/// 用一个最小请求探测模型是否可用
async fn probe_model(client: &Client<OpenAIConfig>, model: &str) -> bool {
    let user_msg = match ChatCompletionRequestUserMessageArgs::default()
        .content("test")
        .build()
    {
        Ok(msg) => msg,
        Err(_) => return false,
    };

    let request = match CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
        .max_tokens(8u32)
        .build()
    {
        Ok(req) => req,
        Err(_) => return false,
    };

    match client.chat().create(request).await {
        Ok(_) => true,
        Err(e) => {
            debug!("模型 {} 探测失败: {}", model, e);
            false
        }
    }
}
