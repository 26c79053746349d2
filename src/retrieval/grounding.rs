//! 그라운딩 체크 - 답변 문장별 근거 검증
//!
//! 생성된 답변을 문장으로 쪼개고, 문장마다 가장 가까운 컨텍스트
//! 문서와의 임베딩 유사도를 임계값과 비교합니다.

use std::sync::Arc;

use regex::Regex;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

use super::vector::{cosine_similarity, distance_to_similarity, Document, VectorIndex};

/// 기본 그라운딩 임계값
pub const DEFAULT_GROUNDING_THRESHOLD: f32 = 0.75;

// ============================================================================
// Sentence Splitting
// ============================================================================

/// 문장 분리 (휴리스틱)
///
/// 문장 종결 구두점(`.` `!` `?`) 뒤 공백, 또는 줄바꿈을 경계로
/// 분리합니다. 공백 제거 후 빈 조각은 버립니다.
///
/// 완전한 문장 경계 탐지기가 아닙니다: 약어("Dr. Kim")나 인용부호
/// 속 구두점은 잘못 쪼개질 수 있으며, 이는 문서화된 한계입니다.
pub fn split_sentences(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return vec![];
    }

    let boundary = Regex::new(r"[.!?]\s+|\n+").unwrap();

    let mut sentences = Vec::new();
    let mut start = 0;

    for m in boundary.find_iter(text) {
        // 구두점 경계면 구두점까지 문장에 포함
        let end = if text[m.start()..].starts_with(['.', '!', '?']) {
            m.start() + 1
        } else {
            m.start()
        };

        push_trimmed(&mut sentences, &text[start..end]);
        start = m.end();
    }
    push_trimmed(&mut sentences, &text[start..]);

    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

// ============================================================================
// Types
// ============================================================================

/// 문장별 그라운딩 판정 결과
///
/// 답변마다 새로 계산되며 저장되지 않습니다.
#[derive(Debug, Clone)]
pub struct GroundingRecord {
    /// 검사한 문장
    pub sentence: String,
    /// 가장 유사한 컨텍스트 문서 본문
    pub matched_context: String,
    /// 유사도 (0.0 ~ 1.0, 소수점 3자리 반올림)
    pub similarity: f32,
    /// 임계값 이상 여부
    pub grounded: bool,
}

/// 검증 대상 컨텍스트 소스
enum ContextSource {
    /// 고정 문서 목록 (임베딩 사전 계산)
    Fixed(Vec<(Document, Vec<f32>)>),
    /// 라이브 인덱스 (top-1 최근접 조회)
    Index(Arc<dyn VectorIndex>),
}

// ============================================================================
// GroundingChecker
// ============================================================================

/// 그라운딩 체커
pub struct GroundingChecker {
    embedder: Arc<dyn EmbeddingProvider>,
    source: ContextSource,
    threshold: f32,
}

impl GroundingChecker {
    /// 고정 문서 목록을 컨텍스트로 사용
    ///
    /// 문서 본문을 미리 임베딩해 둡니다. 본문이 빈 문서는 경고와
    /// 함께 건너뜁니다.
    pub async fn with_documents(
        embedder: Arc<dyn EmbeddingProvider>,
        documents: Vec<Document>,
    ) -> Result<Self> {
        let mut valid = Vec::with_capacity(documents.len());
        for doc in documents {
            if doc.content.trim().is_empty() {
                tracing::warn!(
                    "skipping context document with empty content (서비스ID: {})",
                    doc.metadata.service_id
                );
                continue;
            }
            valid.push(doc);
        }

        let texts: Vec<String> = valid.iter().map(|d| d.content.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        Ok(Self {
            embedder,
            source: ContextSource::Fixed(valid.into_iter().zip(embeddings).collect()),
            threshold: DEFAULT_GROUNDING_THRESHOLD,
        })
    }

    /// 라이브 인덱스를 컨텍스트로 사용
    pub fn with_index(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            source: ContextSource::Index(index),
            threshold: DEFAULT_GROUNDING_THRESHOLD,
        }
    }

    /// 임계값 변경 (기본 0.75)
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// 답변 전체를 문장 단위로 검증
    ///
    /// 문장 순서대로 레코드를 반환합니다. 빈 답변은 빈 목록,
    /// 컨텍스트가 비어 있으면 해당 문장의 레코드를 만들지 않습니다
    /// (유사도를 지어내지 않음).
    pub async fn check(&self, answer: &str) -> Result<Vec<GroundingRecord>> {
        let sentences = split_sentences(answer);
        let mut records = Vec::with_capacity(sentences.len());

        for sentence in sentences {
            let embedding = self.embedder.embed(&sentence).await?;

            let matched = match &self.source {
                ContextSource::Fixed(docs) => docs
                    .iter()
                    .map(|(doc, doc_embedding)| {
                        (doc, cosine_similarity(&embedding, doc_embedding))
                    })
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(doc, sim)| (doc.content.clone(), sim.clamp(0.0, 1.0))),
                ContextSource::Index(index) => index
                    .nearest(&embedding, 1)
                    .await?
                    .into_iter()
                    .next()
                    .map(|c| (c.document.content, distance_to_similarity(c.distance))),
            };

            let Some((matched_context, similarity)) = matched else {
                tracing::debug!("no context candidate for sentence: {}", sentence);
                continue;
            };

            let similarity = (similarity * 1000.0).round() / 1000.0;

            records.push(GroundingRecord {
                grounded: similarity >= self.threshold,
                sentence,
                matched_context,
                similarity,
            });
        }

        Ok(records)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::retrieval::memory::MemoryVectorIndex;
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[test]
    fn test_split_sentences_mixed_delimiters() {
        let sentences = split_sentences("A. B! C?\nD");
        assert_eq!(sentences, vec!["A.", "B!", "C?", "D"]);
    }

    #[test]
    fn test_split_sentences_korean() {
        let sentences = split_sentences("청년수당은 서울시 정책입니다. 신청은 온라인으로 가능합니다.");
        assert_eq!(
            sentences,
            vec!["청년수당은 서울시 정책입니다.", "신청은 온라인으로 가능합니다."]
        );
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   \n\n  ").is_empty());
    }

    #[test]
    fn test_split_sentences_trailing_punctuation() {
        // 마지막 문장의 구두점 뒤에 공백이 없어도 유지된다
        let sentences = split_sentences("첫 문장입니다. 둘째 문장입니다.");
        assert_eq!(sentences, vec!["첫 문장입니다.", "둘째 문장입니다."]);
    }

    #[test]
    fn test_split_sentences_newline_runs() {
        let sentences = split_sentences("문단 하나\n\n\n문단 둘");
        assert_eq!(sentences, vec!["문단 하나", "문단 둘"]);
    }

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

    #[tokio::test]
    async fn test_identical_sentence_is_grounded() {
        let embedder = Arc::new(StaticEmbedder::new(&[(
            "A cat sat on a mat.",
            vec![1.0, 0.0],
        )]));

        let context = vec![Document::from_content("A cat sat on a mat.")];
        let checker = GroundingChecker::with_documents(embedder, context)
            .await
            .unwrap();

        let records = checker.check("A cat sat on a mat.").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].similarity - 1.0).abs() < 0.001);
        assert!(records[0].grounded);
    }

    #[tokio::test]
    async fn test_unrelated_sentence_is_not_grounded() {
        // cos ≈ 0.1이 되도록 벡터를 고정
        let embedder = Arc::new(StaticEmbedder::new(&[
            ("정책 문서 내용입니다.", vec![1.0, 0.0]),
            ("오늘 날씨가 좋습니다.", vec![0.1, 0.995]),
        ]));

        let context = vec![Document::from_content("정책 문서 내용입니다.")];
        let checker = GroundingChecker::with_documents(embedder, context)
            .await
            .unwrap();

        let records = checker.check("오늘 날씨가 좋습니다.").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].similarity < 0.2);
        assert!(!records[0].grounded);
    }

    #[tokio::test]
    async fn test_empty_answer_yields_no_records() {
        let embedder = Arc::new(StaticEmbedder::new(&[("컨텍스트", vec![1.0, 0.0])]));
        let context = vec![Document::from_content("컨텍스트")];
        let checker = GroundingChecker::with_documents(embedder, context)
            .await
            .unwrap();

        let records = checker.check("   \n  ").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_empty_context_skips_sentences() {
        let embedder = Arc::new(StaticEmbedder::new(&[("문장입니다.", vec![1.0, 0.0])]));
        let checker = GroundingChecker::with_documents(embedder, vec![])
            .await
            .unwrap();

        // 유사도를 지어내지 않고 레코드를 만들지 않는다
        let records = checker.check("문장입니다.").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_index_backed_checker() {
        let embedder = Arc::new(StaticEmbedder::new(&[
            ("청년수당 지원 대상은 만 19세 이상입니다.", vec![1.0, 0.0]),
        ]));

        let mut index = MemoryVectorIndex::new(2);
        index
            .insert(
                Document::from_content("청년수당 지원 대상은 만 19세 이상입니다."),
                vec![1.0, 0.0],
            )
            .unwrap();

        let checker = GroundingChecker::with_index(embedder, Arc::new(index));
        let records = checker
            .check("청년수당 지원 대상은 만 19세 이상입니다.")
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].grounded);
        assert!((records[0].similarity - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_index_backed_checker_empty_index() {
        let embedder = Arc::new(StaticEmbedder::new(&[("문장입니다.", vec![1.0, 0.0])]));
        let index = Arc::new(MemoryVectorIndex::new(2));

        let checker = GroundingChecker::with_index(embedder, index);
        let records = checker.check("문장입니다.").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_override() {
        let embedder = Arc::new(StaticEmbedder::new(&[
            ("컨텍스트 문장", vec![1.0, 0.0]),
            ("비슷한 문장입니다.", vec![0.9, 0.436]),
        ]));

        let context = vec![Document::from_content("컨텍스트 문장")];

        // cos ≈ 0.9: 기본 임계값 0.75에서는 grounded
        let checker = GroundingChecker::with_documents(embedder.clone(), context.clone())
            .await
            .unwrap();
        let records = checker.check("비슷한 문장입니다.").await.unwrap();
        assert!(records[0].grounded);

        // 임계값을 0.95로 올리면 탈락
        let strict = GroundingChecker::with_documents(embedder, context)
            .await
            .unwrap()
            .with_threshold(0.95);
        let records = strict.check("비슷한 문장입니다.").await.unwrap();
        assert!(!records[0].grounded);
    }
}
