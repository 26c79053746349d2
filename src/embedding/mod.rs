//! 임베딩 모듈 - OpenAI API를 통한 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 OpenAI 임베딩 프로바이더입니다.
//! 같은 모델/버전이면 같은 입력에 같은 벡터를 돌려줍니다 (결정적).
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OpenAiEmbedding::from_env()?;
//! let embedding = embedder.embed("청년 지원 정책").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다. 쿼리와 문서가
/// 같은 벡터 공간을 공유해야 하므로 하나의 프로바이더로 양쪽을
/// 모두 임베딩합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// OpenAI 임베딩 API 엔드포인트
/// ref: https://platform.openai.com/docs/api-reference/embeddings
const OPENAI_EMBED_URL: &str = "https://api.openai.com/v1/embeddings";

/// 기본 임베딩 모델
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// 기본 임베딩 차원 (text-embedding-3-small 최대값)
pub const DEFAULT_DIMENSION: usize = 1536;

/// 요청당 최대 입력 수
const MAX_BATCH_SIZE: usize = 100;

/// 배치 실패 시 1회 재시도 전 고정 백오프
const BATCH_RETRY_BACKOFF: Duration = Duration::from_secs(3);

/// 배치 요청 간 최소 딜레이 (버스트 방지)
const INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

/// OpenAI 임베딩 구현체
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    client: reqwest::Client,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedding {
    /// 새 OpenAI 임베딩 인스턴스 생성 (기본 차원)
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성
    ///
    /// text-embedding-3-small은 1 ~ 1536 범위의 출력 차원을 지원합니다.
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if dimension == 0 || dimension > DEFAULT_DIMENSION {
            return Err(RagError::Config(format!(
                "invalid embedding dimension: {}. Must be in 1..={}",
                dimension, DEFAULT_DIMENSION
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::Embedding(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model: DEFAULT_MODEL.to_string(),
            dimension,
        })
    }

    /// 환경변수(OPENAI_API_KEY)에서 API 키를 읽어 생성
    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    /// 환경변수에서 API 키를 읽어 차원 지정하여 생성
    pub fn from_env_with_dimension(dimension: usize) -> Result<Self> {
        Self::with_dimension(get_api_key()?, dimension)
    }

    /// 배치 하나를 API로 요청
    ///
    /// 빈 텍스트는 API로 보내지 않고 제로 벡터 슬롯으로 채웁니다.
    /// 프로바이더 에러는 제로 벡터로 숨기지 않고 그대로 전파됩니다.
    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = vec![vec![0.0; self.dimension]; texts.len()];

        let non_empty: Vec<(usize, &String)> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .collect();

        if non_empty.is_empty() {
            return Ok(out);
        }

        let request = EmbedRequest {
            model: self.model.clone(),
            input: non_empty.iter().map(|(_, t)| (*t).clone()).collect(),
            dimensions: Some(self.dimension),
        };

        let response = self
            .client
            .post(OPENAI_EMBED_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("failed to send request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::Embedding(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(RagError::Embedding(format!(
                    "OpenAI API error ({}): {}",
                    status, error.error.message
                )));
            }
            return Err(RagError::Embedding(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Embedding(format!("malformed embedding response: {}", e)))?;

        if parsed.data.len() != non_empty.len() {
            return Err(RagError::Embedding(format!(
                "embedding count mismatch: requested {}, got {}",
                non_empty.len(),
                parsed.data.len()
            )));
        }

        // index 필드 기준으로 요청 순서에 맞춘다
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        for ((slot, _), item) in non_empty.iter().zip(data) {
            if item.embedding.len() != self.dimension {
                return Err(RagError::Embedding(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    item.embedding.len()
                )));
            }
            out[*slot] = item.embedding;
        }

        Ok(out)
    }
}

/// OpenAI API 요청 본문
/// ref: https://platform.openai.com/docs/api-reference/embeddings/create
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// OpenAI API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI API 에러 응답
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let batch = [text.to_string()];
        let mut results = self.request_batch(&batch).await?;
        Ok(results.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (batch_no, batch) in texts.chunks(MAX_BATCH_SIZE).enumerate() {
            if batch_no > 0 {
                tokio::time::sleep(INTER_BATCH_DELAY).await;
            }
            tracing::debug!("embedding batch {} ({} texts)", batch_no + 1, batch.len());

            // 배치 실패는 고정 백오프 후 1회만 재시도하고 전파한다
            let embeddings = match self.request_batch(batch).await {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(
                        "batch embedding failed, retrying in {:?}: {}",
                        BATCH_RETRY_BACKOFF,
                        e
                    );
                    tokio::time::sleep(BATCH_RETRY_BACKOFF).await;
                    self.request_batch(batch).await?
                }
            };

            results.extend(embeddings);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (OPENAI_API_KEY 환경변수)
pub fn get_api_key() -> Result<String> {
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return Ok(key);
        }
    }

    Err(RagError::Config(
        "API key not found. Set OPENAI_API_KEY environment variable.\n\
         Get your API key at: https://platform.openai.com/api-keys"
            .to_string(),
    ))
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    std::env::var("OPENAI_API_KEY")
        .map(|key| !key.is_empty())
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================
