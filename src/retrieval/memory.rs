//! 인메모리 벡터 인덱스 - 선형 스캔 코사인 검색
//!
//! 외부 벡터 DB 없이 동작하는 `VectorIndex` 구현입니다.
//! 저장 시 임베딩을 단위 정규화해 두고, 검색 시 내적만으로
//! 코사인 유사도를 계산합니다.
//!
//! 거리 의미론: `distance = 1 - cosine(query, doc)`, 범위 [0, 2].
//! 유사도 변환은 `distance_to_similarity` (1 - distance, [0, 1] 클램프)를
//! 사용합니다.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::vector::{normalize, Candidate, Document, VectorIndex};

// ============================================================================
// Types
// ============================================================================

/// 인덱스 엔트리 (문서 + 정규화된 임베딩)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    document: Document,
    embedding: Vec<f32>,
}

/// 디스크 스냅샷 포맷
///
/// 영속 엔진이 아니라 단순 JSON 파일입니다. 임베딩 재계산 비용을
/// 아끼기 위한 것으로, 증분 갱신은 지원하지 않습니다.
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    dimension: usize,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

// ============================================================================
// MemoryVectorIndex
// ============================================================================

/// 인메모리 선형 스캔 인덱스
pub struct MemoryVectorIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl MemoryVectorIndex {
    /// 빈 인덱스 생성
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    /// 문서와 임베딩 추가
    ///
    /// 임베딩은 저장 전에 단위 정규화됩니다.
    pub fn insert(&mut self, document: Document, embedding: Vec<f32>) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(RagError::Index(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }

        self.entries.push(IndexEntry {
            document,
            embedding: normalize(&embedding),
        });

        Ok(())
    }

    /// 문서 목록에서 인덱스 구축 (배치 임베딩)
    ///
    /// 본문이 빈 문서는 경고 로그와 함께 건너뜁니다.
    pub async fn from_documents(
        embedder: &dyn EmbeddingProvider,
        documents: Vec<Document>,
    ) -> Result<Self> {
        let mut valid = Vec::with_capacity(documents.len());
        for doc in documents {
            if doc.content.trim().is_empty() {
                tracing::warn!(
                    "skipping document with empty content (서비스ID: {})",
                    doc.metadata.service_id
                );
                continue;
            }
            valid.push(doc);
        }

        let texts: Vec<String> = valid.iter().map(|d| d.content.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        let mut index = Self::new(embedder.dimension());
        for (doc, embedding) in valid.into_iter().zip(embeddings) {
            index.insert(doc, embedding)?;
        }

        tracing::info!("built in-memory index with {} documents", index.entries.len());
        Ok(index)
    }

    /// 차원 수
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 비어 있는지 확인
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON 스냅샷 저장
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let snapshot = IndexSnapshot {
            dimension: self.dimension,
            created_at: Utc::now(),
            entries: self.entries.clone(),
        };

        let json = serde_json::to_string(&snapshot)?;
        std::fs::write(path, json)?;

        tracing::info!("saved index snapshot: {} ({} entries)", path.display(), self.entries.len());
        Ok(())
    }

    /// JSON 스냅샷 로드
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let snapshot: IndexSnapshot = serde_json::from_str(&json)?;

        tracing::info!(
            "loaded index snapshot: {} ({} entries, created {})",
            path.display(),
            snapshot.entries.len(),
            snapshot.created_at.format("%Y-%m-%d %H:%M")
        );

        Ok(Self {
            dimension: snapshot.dimension,
            entries: snapshot.entries,
        })
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let query = normalize(query);

        let mut scored: Vec<Candidate> = self
            .entries
            .iter()
            .map(|entry| {
                let sim: f32 = entry
                    .embedding
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| a * b)
                    .sum();
                Candidate {
                    document: entry.document.clone(),
                    distance: 1.0 - sim,
                }
            })
            .collect();

        // 안정 정렬이므로 같은 거리는 삽입 순서가 유지됩니다
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}

// ============================================================================
// Tests
// ============================================================================
