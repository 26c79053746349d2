//! MMR 다양성 검색 - Maximal Marginal Relevance
//!
//! 유사도 기준으로 넉넉한 후보 집합을 가져온 뒤, 탐욕적으로
//! 재순위화하여 관련성과 중복 억제를 동시에 잡습니다.
//!
//! ref: Carbonell & Goldstein, "The Use of MMR, Diversity-Based Reranking" (1998)

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::vector::{normalize, Document, VectorIndex};

// ============================================================================
// Configuration
// ============================================================================

/// MMR 검색 설정
///
/// `diversity_weight`가 1에 가까우면 순수 관련성, 0에 가까우면
/// 다양성을 우선합니다.
#[derive(Debug, Clone)]
pub struct MmrConfig {
    /// 1차 유사도 검색으로 가져올 후보 수
    pub candidate_count: usize,
    /// 최종 선택 수 (candidate_count 이하)
    pub final_count: usize,
    /// 관련성 가중치 λ (0.0 ~ 1.0)
    pub diversity_weight: f32,
}

impl Default for MmrConfig {
    fn default() -> Self {
        Self {
            candidate_count: 15,
            final_count: 5,
            diversity_weight: 0.5,
        }
    }
}

impl MmrConfig {
    /// 설정 검증
    ///
    /// 네트워크/인덱스 호출 전에 즉시 실패합니다.
    pub fn validate(&self) -> Result<()> {
        if self.candidate_count == 0 {
            return Err(RagError::Config(
                "candidate_count must be positive".to_string(),
            ));
        }
        if self.final_count == 0 {
            return Err(RagError::Config("final_count must be positive".to_string()));
        }
        if self.final_count > self.candidate_count {
            return Err(RagError::Config(format!(
                "final_count ({}) must not exceed candidate_count ({})",
                self.final_count, self.candidate_count
            )));
        }
        if !(0.0..=1.0).contains(&self.diversity_weight) {
            return Err(RagError::Config(format!(
                "diversity_weight ({}) must be in [0, 1]",
                self.diversity_weight
            )));
        }
        Ok(())
    }
}

// ============================================================================
// MMR Selection
// ============================================================================

/// 탐욕적 MMR 선택 (순수 함수)
///
/// 입력 벡터를 단위 정규화한 뒤:
/// - 첫 선택: 쿼리 유사도 최대 후보
/// - 이후: `λ * sim(q, x) - (1 - λ) * max_selected(sim(x, s))` 최대 후보
///
/// 동점은 먼저 나온 인덱스가 이깁니다 (안정 타이브레이크).
/// 반환값은 선택 순서의 인덱스 목록이며 최대 k개입니다.
pub fn maximal_marginal_relevance(
    query_embedding: &[f32],
    doc_embeddings: &[Vec<f32>],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    if doc_embeddings.is_empty() || k == 0 {
        return vec![];
    }

    let query = normalize(query_embedding);
    let docs: Vec<Vec<f32>> = doc_embeddings.iter().map(|d| normalize(d)).collect();

    // 쿼리 유사도는 한 번만 계산
    let sim_to_query: Vec<f32> = docs.iter().map(|d| dot(d, &query)).collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(docs.len()));
    let mut remaining: Vec<usize> = (0..docs.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let pick = if selected.is_empty() {
            // 첫 선택: 쿼리 유사도 최대 (동점이면 앞선 인덱스)
            let mut best = remaining[0];
            for &idx in &remaining[1..] {
                if sim_to_query[idx] > sim_to_query[best] {
                    best = idx;
                }
            }
            best
        } else {
            let mut best = remaining[0];
            let mut best_score = f32::NEG_INFINITY;

            for &idx in &remaining {
                let sim_to_selected = selected
                    .iter()
                    .map(|&s| dot(&docs[idx], &docs[s]))
                    .fold(f32::NEG_INFINITY, f32::max);
                let score = lambda * sim_to_query[idx] - (1.0 - lambda) * sim_to_selected;

                if score > best_score {
                    best_score = score;
                    best = idx;
                }
            }
            best
        };

        selected.push(pick);
        remaining.retain(|&idx| idx != pick);
    }

    selected
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ============================================================================
// MmrRetriever
// ============================================================================

/// 다양성 인식 검색기
///
/// 임베딩 프로바이더와 벡터 인덱스 능력 위에서 동작하며,
/// 특정 구현(OpenAI, 인메모리 등)에 의존하지 않습니다.
pub struct MmrRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: MmrConfig,
}

impl MmrRetriever {
    /// 검색기 생성 (설정은 즉시 검증)
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: MmrConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            embedder,
            index,
            config,
        })
    }

    /// 기본 설정 접근
    pub fn config(&self) -> &MmrConfig {
        &self.config
    }

    /// 기본 설정으로 다양성 검색
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let config = self.config.clone();
        self.retrieve_with(query, &config).await
    }

    /// 호출별 설정으로 다양성 검색
    ///
    /// 1. 쿼리 임베딩 후 `candidate_count`개 후보 검색
    /// 2. 후보 본문 재임베딩 (배치)
    /// 3. 탐욕적 MMR로 `final_count`개 선택
    ///
    /// 빈 인덱스 / 후보 없음은 빈 목록을 반환합니다.
    pub async fn retrieve_with(&self, query: &str, config: &MmrConfig) -> Result<Vec<Document>> {
        config.validate()?;

        let query_embedding = self.embedder.embed(query).await?;
        let candidates = self.index.nearest(&query_embedding, config.candidate_count).await?;

        if candidates.is_empty() {
            tracing::debug!("no candidates for query: {}", query);
            return Ok(vec![]);
        }

        // 본문 없는 문서는 건너뛴다 (검색 전체를 실패시키지 않음)
        let mut docs: Vec<Document> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.document.content.trim().is_empty() {
                tracing::warn!(
                    "skipping candidate with empty content (서비스ID: {})",
                    candidate.document.metadata.service_id
                );
                continue;
            }
            docs.push(candidate.document);
        }

        if docs.is_empty() {
            return Ok(vec![]);
        }

        let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let doc_embeddings = self.embedder.embed_batch(&texts).await?;

        let selected = maximal_marginal_relevance(
            &query_embedding,
            &doc_embeddings,
            config.final_count,
            config.diversity_weight,
        );

        Ok(selected.into_iter().map(|i| docs[i].clone()).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::memory::MemoryVectorIndex;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// 텍스트 -> 고정 벡터 매핑으로 동작하는 테스트용 임베더
    struct StaticEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        dimension: usize,
    }

    impl StaticEmbedder {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
            let dimension = pairs.first().map(|(_, v)| v.len()).unwrap_or(0);
            let vectors = pairs
                .iter()
                .map(|(t, v)| (t.to_string(), v.clone()))
                .collect();
            Self { vectors, dimension }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StaticEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.vectors
                .get(text)
                .cloned()
                .ok_or_else(|| RagError::Embedding(format!("unknown text: {}", text)))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "static-test-embedder"
        }
    }

    #[test]
    fn test_mmr_spec_scenario_tie_break() {
        // q=[1,0], A=[1,0], B=[0,1], C=[0.7,0.7], λ=0.5
        // 첫 선택은 A. 두 번째는 B와 C의 MMR 스코어가 모두 0으로
        // 동점이므로 먼저 나온 B가 선택되어야 한다.
        let query = vec![1.0, 0.0];
        let docs = vec![
            vec![1.0, 0.0],  // A
            vec![0.0, 1.0],  // B
            vec![0.7, 0.7],  // C
        ];

        let selected = maximal_marginal_relevance(&query, &docs, 2, 0.5);
        assert_eq!(selected, vec![0, 1]);
    }

    #[test]
    fn test_mmr_pure_relevance_at_lambda_one() {
        // λ=1.0이면 다양성 항의 가중치가 0이므로 쿼리 유사도
        // 내림차순과 동일한 순서여야 한다.
        let query = vec![1.0, 0.0];
        let docs = vec![
            vec![0.0, 1.0],  // sim 0.0
            vec![1.0, 0.0],  // sim 1.0
            vec![0.7, 0.7],  // sim ≈ 0.707
        ];

        let selected = maximal_marginal_relevance(&query, &docs, 3, 1.0);
        assert_eq!(selected, vec![1, 2, 0]);
    }

    #[test]
    fn test_mmr_single_candidate() {
        let query = vec![1.0, 0.0];
        let docs = vec![vec![0.0, 1.0]];

        for lambda in [0.0, 0.5, 1.0] {
            let selected = maximal_marginal_relevance(&query, &docs, 5, lambda);
            assert_eq!(selected, vec![0]);
        }
    }

    #[test]
    fn test_mmr_returns_exactly_k_distinct() {
        let query = vec![1.0, 0.0, 0.0];
        let docs = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.9, 0.1, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.5, 0.5, 0.0],
        ];

        let selected = maximal_marginal_relevance(&query, &docs, 3, 0.5);
        assert_eq!(selected.len(), 3);

        let mut dedup = selected.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), 3);
    }

    #[test]
    fn test_mmr_empty_candidates() {
        let selected = maximal_marginal_relevance(&[1.0, 0.0], &[], 3, 0.5);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_mmr_deterministic() {
        let query = vec![0.8, 0.2, 0.1];
        let docs = vec![
            vec![0.7, 0.3, 0.0],
            vec![0.1, 0.9, 0.2],
            vec![0.6, 0.1, 0.5],
            vec![0.4, 0.4, 0.4],
        ];

        let first = maximal_marginal_relevance(&query, &docs, 3, 0.6);
        for _ in 0..10 {
            assert_eq!(maximal_marginal_relevance(&query, &docs, 3, 0.6), first);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(MmrConfig::default().validate().is_ok());

        let bad = MmrConfig {
            candidate_count: 3,
            final_count: 5,
            diversity_weight: 0.5,
        };
        assert!(matches!(bad.validate(), Err(RagError::Config(_))));

        let bad = MmrConfig {
            candidate_count: 0,
            final_count: 0,
            diversity_weight: 0.5,
        };
        assert!(matches!(bad.validate(), Err(RagError::Config(_))));

        let bad = MmrConfig {
            candidate_count: 5,
            final_count: 3,
            diversity_weight: 1.5,
        };
        assert!(matches!(bad.validate(), Err(RagError::Config(_))));
    }

    fn test_setup() -> (Arc<StaticEmbedder>, Arc<MemoryVectorIndex>) {
        let embedder = Arc::new(StaticEmbedder::new(&[
            ("질문", vec![1.0, 0.0]),
            ("A", vec![1.0, 0.0]),
            ("B", vec![0.0, 1.0]),
            ("C", vec![0.7, 0.7]),
        ]));

        let mut index = MemoryVectorIndex::new(2);
        index.insert(Document::from_content("A"), vec![1.0, 0.0]).unwrap();
        index.insert(Document::from_content("B"), vec![0.0, 1.0]).unwrap();
        index.insert(Document::from_content("C"), vec![0.7, 0.7]).unwrap();

        (embedder, Arc::new(index))
    }

    #[tokio::test]
    async fn test_retriever_end_to_end() {
        let (embedder, index) = test_setup();
        let config = MmrConfig {
            candidate_count: 3,
            final_count: 2,
            diversity_weight: 0.5,
        };

        let retriever = MmrRetriever::new(embedder, index, config).unwrap();
        let results = retriever.retrieve("질문").await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "A");
        // 인덱스 nearest가 A, C, B 순으로 반환하므로 MMR 동점
        // (B=0, C=0)에서는 먼저 나온 C가 선택된다
        assert_eq!(results[1].content, "C");
    }

    #[tokio::test]
    async fn test_retriever_empty_index() {
        let embedder = Arc::new(StaticEmbedder::new(&[("질문", vec![1.0, 0.0])]));
        let index = Arc::new(MemoryVectorIndex::new(2));

        let retriever = MmrRetriever::new(embedder, index, MmrConfig::default()).unwrap();
        let results = retriever.retrieve("질문").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_retriever_rejects_invalid_config() {
        let (embedder, index) = test_setup();
        let bad = MmrConfig {
            candidate_count: 1,
            final_count: 2,
            diversity_weight: 0.5,
        };

        let result = MmrRetriever::new(embedder, index, bad);
        assert!(matches!(result, Err(RagError::Config(_))));
    }
}
