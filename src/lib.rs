//! gov-policy-rag - 정부 지원 정책 RAG 시스템
//!
//! MMR 다양성 검색과 문장 단위 그라운딩 체크를 중심으로 한
//! 정책 질문 답변 시스템입니다.
//!
//! - retrieval: 벡터 인덱스, MMR 검색, 그라운딩 체크
//! - embedding: OpenAI 임베딩 프로바이더
//! - llm: OpenAI 채팅 모델
//! - loader: gov24 정책 레코드 -> 검색 문서 변환
//! - qa: 검색 + 프롬프트 + LLM 답변 파이프라인

pub mod cli;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod loader;
pub mod qa;
pub mod retrieval;

// Re-exports
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, OpenAiEmbedding};
pub use error::{RagError, Result};
pub use llm::{ChatModel, OpenAiChat};
pub use loader::{load_policies, to_documents, PolicyRecord};
pub use qa::{ChatHistory, MarkdownFormatter, PolicyPrompt, PolicyQa, QaAnswer};
pub use retrieval::{
    cosine_similarity, distance_to_similarity, maximal_marginal_relevance, normalize,
    split_sentences, Candidate, DocMetadata, Document, GroundingChecker, GroundingRecord,
    MemoryVectorIndex, MmrConfig, MmrRetriever, VectorIndex, DEFAULT_GROUNDING_THRESHOLD,
};
