//! LLM 모듈 - OpenAI Chat Completions 호출
//!
//! 프롬프트를 보내고 답변 텍스트를 받는 역할만 합니다.
//! 재시도/타임아웃 정책은 호출자 몫입니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// ChatModel Trait
// ============================================================================

/// 채팅 모델 트레이트
///
/// 테스트에서는 고정 답변을 돌려주는 구현으로 대체할 수 있습니다.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 프롬프트 하나를 보내고 답변 텍스트를 받음
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Chat
// ============================================================================

/// OpenAI Chat Completions 엔드포인트
/// ref: https://platform.openai.com/docs/api-reference/chat
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// 기본 모델
const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI 채팅 구현체
///
/// 온도 0으로 고정해 같은 컨텍스트에 같은 답변을 유도합니다.
#[derive(Debug)]
pub struct OpenAiChat {
    api_key: String,
    client: reqwest::Client,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    /// 새 인스턴스 생성 (gpt-4o, 온도 0)
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_model(api_key, DEFAULT_MODEL.to_string(), 0.0)
    }

    /// 모델/온도를 지정하여 생성
    pub fn with_model(api_key: String, model: String, temperature: f32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RagError::Llm(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model,
            temperature,
        })
    }

    /// 환경변수(OPENAI_API_KEY)에서 API 키를 읽어 생성
    pub fn from_env() -> Result<Self> {
        Self::new(crate::embedding::get_api_key()?)
    }
}

/// Chat Completions 요청 본문
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat Completions 응답
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Llm(format!("failed to send request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::Llm(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(RagError::Llm(format!(
                    "OpenAI API error ({}): {}",
                    status, error.error.message
                )));
            }
            return Err(RagError::Llm(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Llm(format!("malformed chat response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RagError::Llm("empty choices in chat response".to_string()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "질문".to_string(),
            }],
            temperature: 0.0,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["temperature"], 0.0);
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "답변입니다."}, "finish_reason": "stop"}
            ],
            "model": "gpt-4o"
        }"#;

        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "답변입니다.");
    }
}
