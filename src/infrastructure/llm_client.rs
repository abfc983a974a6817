//! 对话模型客户端 - 基础设施层
//!
//! 持有 `async-openai` 客户端，只暴露"发一条提示词、拿回一段文本"的能力。
//! 兼容 OpenAI API 的服务（Azure、本地代理等）都可以通过 `llm_api_base_url` 接入。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};

/// 一次对话请求
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 图片 URL（含 `data:` URL），非空时走 Vision 接口
    pub image_urls: Vec<String>,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature: 0.3,
            max_tokens: 1024,
            image_urls: Vec::new(),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image_urls.push(url.into());
        self
    }
}

/// 对话补全能力
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 返回去掉首尾空白的回复文本
    async fn complete(&self, prompt: &Prompt) -> AppResult<String>;
}

/// 基于 `async-openai` 的对话模型
///
/// 职责：
/// - 持有唯一的 HTTP 客户端
/// - 组装 system / user / vision 消息
/// - 不认识 Question / Exam
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl OpenAiChat {
    /// 创建客户端，缺少 API Key 时直接报错
    pub fn new(config: &Config) -> AppResult<Self> {
        let api_key = config.require_api_key()?;
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.llm_api_base_url);

        Ok(Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn build_messages(&self, prompt: &Prompt) -> AppResult<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::new();

        if let Some(sys_msg) = &prompt.system {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg.as_str())
                .build()
                .map_err(request_build_failed)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = if prompt.image_urls.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.user.as_str())
                .build()
                .map_err(request_build_failed)?
        } else {
            let mut content_parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.user.clone(),
                },
            )];
            for url in &prompt.image_urls {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }
            debug!("使用 Vision API，包含 {} 张图片", prompt.image_urls.len());

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
                .map_err(request_build_failed)?
        };
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        Ok(messages)
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, prompt: &Prompt) -> AppResult<String> {
        debug!(
            "调用 LLM API，模型: {}，温度: {}，用户消息长度: {} 字符",
            self.model_name,
            prompt.temperature,
            prompt.user.len()
        );

        let messages = self.build_messages(prompt)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(prompt.temperature)
            .max_tokens(prompt.max_tokens)
            .build()
            .map_err(request_build_failed)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(&self.model_name, e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        debug!("LLM API 调用成功");
        Ok(content.trim().to_string())
    }
}

fn request_build_failed(e: impl std::fmt::Display) -> AppError {
    LlmError::RequestBuildFailed {
        message: e.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_builder() {
        let prompt = Prompt::new("hello")
            .system("be brief")
            .temperature(0.9)
            .max_tokens(64)
            .image("data:image/jpeg;base64,AAAA");
        assert_eq!(prompt.system.as_deref(), Some("be brief"));
        assert_eq!(prompt.temperature, 0.9);
        assert_eq!(prompt.max_tokens, 64);
        assert_eq!(prompt.image_urls.len(), 1);
    }

    #[test]
    fn test_new_requires_api_key() {
        let config = Config::default();
        let err = OpenAiChat::new(&config).err().unwrap();
        assert!(err.is_missing_credentials());
    }

    #[test]
    fn test_vision_message_has_text_and_image_parts() {
        let config = Config {
            llm_api_key: "sk-test".to_string(),
            ..Config::default()
        };
        let chat = OpenAiChat::new(&config).unwrap();
        let messages = chat
            .build_messages(&Prompt::new("describe").system("s").image("https://x/y.png"))
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
    }

    #[tokio::test]
    #[ignore] // 需要真实 API Key
    async fn test_live_completion() {
        let _ = dotenvy::dotenv();
        let config = Config::load(None).unwrap();
        let chat = OpenAiChat::new(&config).unwrap();
        let reply = chat
            .complete(&Prompt::new("Reply with the single word: ok").max_tokens(5))
            .await
            .unwrap();
        assert!(!reply.is_empty());
    }
}
