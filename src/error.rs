//! 에러 타입 정의
//!
//! 코어 모듈(검색, 그라운딩, 임베딩)은 구분 가능한 에러 변형을 반환합니다.
//! CLI 경계에서는 anyhow로 감싸서 처리합니다.

use thiserror::Error;

/// gov-policy-rag 코어 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 임베딩 프로바이더 실패 (네트워크 에러, 잘못된 응답 등)
    ///
    /// 제로 벡터로 대체하지 않고 호출자에게 그대로 전파됩니다.
    #[error("embedding provider failed: {0}")]
    Embedding(String),

    /// 잘못된 설정 (검증 단계에서 즉시 실패)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// 벡터 인덱스 조회/저장 실패
    #[error("vector index error: {0}")]
    Index(String),

    /// LLM 호출 실패
    #[error("llm request failed: {0}")]
    Llm(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// 코어 공용 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::Config("final_count > candidate_count".to_string());
        assert!(err.to_string().contains("invalid configuration"));

        let err = RagError::Embedding("timeout".to_string());
        assert!(err.to_string().contains("embedding provider failed"));
    }
}
