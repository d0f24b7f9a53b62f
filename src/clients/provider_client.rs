//! OpenAI 兼容后端客户端
//!
//! 封装所有与回答后端 API 相关的调用逻辑
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行聊天和视觉调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（Groq、Gemini、Anthropic 等）
//! - 音频转写走 `reqwest` multipart（/audio/transcriptions 端点）

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
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, ProviderError};
use crate::services::provider_chain::AnswerProvider;

/// OpenAI 兼容后端
///
/// 一个实例对应一个 (后端, 模型) 组合；能力由构造函数决定，
/// 链的成员资格由注册表按能力决定。
pub struct OpenAiCompatProvider {
    name: String,
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    vision: bool,
    transcription: bool,
}

impl OpenAiCompatProvider {
    /// 创建纯文本后端
    pub fn text(name: &str, api_key: &str, base_url: &str, model: &str) -> Self {
        Self::build(name, api_key, base_url, model, false, false)
    }

    /// 创建支持视觉的后端
    pub fn with_vision(name: &str, api_key: &str, base_url: &str, model: &str) -> Self {
        Self::build(name, api_key, base_url, model, true, false)
    }

    /// 创建转写后端
    pub fn transcription(name: &str, api_key: &str, base_url: &str, model: &str) -> Self {
        Self::build(name, api_key, base_url, model, false, true)
    }

    fn build(
        name: &str,
        api_key: &str,
        base_url: &str,
        model: &str,
        vision: bool,
        transcription: bool,
    ) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);

        Self {
            name: name.to_string(),
            client: Client::with_config(openai_config),
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            vision,
            transcription,
        }
    }

    /// 空响应错误
    fn empty_response(&self) -> AppError {
        AppError::Provider(ProviderError::EmptyResponse {
            provider: self.name.clone(),
        })
    }
}

#[async_trait]
impl AnswerProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    fn supports_transcription(&self) -> bool {
        self.transcription
    }

    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> AppResult<String> {
        debug!("调用后端 {}，模型: {}", self.name, self.model);
        debug!("用户消息长度: {} 字符", prompt.len());

        let mut messages = Vec::new();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| AppError::provider_call_failed(&self.name, e))?;
        messages.push(ChatCompletionRequestMessage::System(system_msg));

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| AppError::provider_call_failed(&self.name, e))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(temperature)
            .max_tokens(max_tokens)
            .build()
            .map_err(|e| AppError::provider_call_failed(&self.name, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("后端 {} API 调用失败: {}", self.name, e);
            AppError::provider_call_failed(&self.name, e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| self.empty_response())?;
        Ok(content.trim().to_string())
    }

    async fn complete_vision(&self, image_data_uri: &str, prompt: &str) -> AppResult<String> {
        if !self.vision {
            return Err(AppError::Provider(ProviderError::Unsupported {
                provider: self.name.clone(),
                capability: "视觉",
            }));
        }

        debug!("调用视觉后端 {}，模型: {}", self.name, self.model);

        // 构建包含文本和图片的用户消息
        let content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.to_string(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: image_data_uri.to_string(),
                        detail: Some(ImageDetail::Auto),
                    },
                },
            ),
        ];

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()
            .map_err(|e| AppError::provider_call_failed(&self.name, e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(0.1)
            .max_tokens(2000u32)
            .build()
            .map_err(|e| AppError::provider_call_failed(&self.name, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("视觉后端 {} API 调用失败: {}", self.name, e);
            AppError::provider_call_failed(&self.name, e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| self.empty_response())?;
        Ok(content.trim().to_string())
    }

    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> AppResult<String> {
        if !self.transcription {
            return Err(AppError::Provider(ProviderError::Unsupported {
                provider: self.name.clone(),
                capability: "转写",
            }));
        }

        debug!("调用转写后端 {}，模型: {}", self.name, self.model);

        let mime = if filename.ends_with(".wav") {
            "audio/wav"
        } else {
            "audio/mpeg"
        };

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str(mime)
            .map_err(|e| AppError::provider_call_failed(&self.name, e))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("转写后端 {} 请求失败: {}", self.name, e);
                AppError::provider_call_failed(&self.name, e)
            })?;

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| AppError::provider_call_failed(&self.name, e))?;

        let text = body
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| self.empty_response())?;

        debug!("转写完成，共 {} 字符", text.len());
        Ok(text.to_string())
    }
}
