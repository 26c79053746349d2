//! Retrieval 모듈 - 다양성 검색 + 그라운딩 체크
//!
//! - vector: 문서/인덱스 트레이트와 코사인 유틸리티
//! - memory: 인메모리 선형 스캔 인덱스 (JSON 스냅샷 지원)
//! - mmr: MMR 다양성 검색기
//! - grounding: 답변 문장별 근거 검증

mod grounding;
mod memory;
mod mmr;
mod vector;

// Re-exports
pub use grounding::{
    split_sentences, GroundingChecker, GroundingRecord, DEFAULT_GROUNDING_THRESHOLD,
};
pub use memory::MemoryVectorIndex;
pub use mmr::{maximal_marginal_relevance, MmrConfig, MmrRetriever};
pub use vector::{
    cosine_similarity, distance_to_similarity, normalize, Candidate, DocMetadata, Document,
    VectorIndex,
};
