//! Vector Index - 벡터 검색 트레이트 및 유틸리티
//!
//! 정책 문서와 쿼리를 같은 벡터 공간에서 비교하기 위한
//! 공통 인터페이스와 코사인 유사도 유틸리티를 제공합니다.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 문서 메타데이터
///
/// 안정적인 식별자(서비스ID)와 조건 태그(boolean)를 가집니다.
/// ID의 유일성은 업스트림 파이프라인(수집/병합)의 책임입니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    /// 서비스 ID (gov24 serviceDetail 기준)
    #[serde(rename = "서비스ID", default)]
    pub service_id: String,
    /// 서비스명
    #[serde(rename = "서비스명", default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// 조건 태그 (예: "JA0101" -> true)
    #[serde(rename = "조건", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, bool>,
}

/// 검색 대상 문서
///
/// content + metadata 쌍이며 생성 후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// 본문 텍스트
    pub content: String,
    /// 메타데이터
    #[serde(default)]
    pub metadata: DocMetadata,
}

impl Document {
    /// 본문만으로 문서 생성
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: DocMetadata::default(),
        }
    }
}

/// 후보 문서: 인덱스가 반환하는 (문서, 거리) 쌍
///
/// 거리 의미론은 인덱스 구현이 정의합니다 (작을수록 가까움).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub document: Document,
    pub distance: f32,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 벡터 인덱스 트레이트 (async)
///
/// "벡터 하나를 주면 가장 가까운 k개의 저장 벡터를 돌려준다"는
/// 외부 능력을 추상화합니다. 테스트에서는 인메모리 선형 스캔
/// 구현으로 대체할 수 있습니다.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// k-최근접 검색
    ///
    /// 거리 오름차순으로 최대 k개를 반환합니다.
    /// 인덱스가 비어 있으면 빈 목록을 반환합니다 (에러 아님).
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>>;

    /// 저장된 문서 수
    async fn len(&self) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 빈 벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 벡터 단위 정규화
///
/// 정규화된 벡터끼리는 내적 = 코사인 유사도가 성립합니다.
/// 영벡터는 그대로 반환합니다.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// 거리 -> 유사도 변환
///
/// 인메모리 인덱스의 거리(1 - cosine, 범위 [0, 2])를 기준으로 한
/// 선형 변환입니다. 거리에 대해 단조 감소하며, 결과는 [0, 1]로
/// 클램프됩니다 (범위 밖 거리에서 음수 "유사도"가 나오지 않도록).
pub fn distance_to_similarity(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

// ============================================================================
// Tests
// ============================================================================
