//! 정책 문서 로더 - gov24 serviceDetail 레코드를 검색 문서로 변환
//!
//! 수집 파이프라인이 병합해 둔 JSON 배열 파일을 읽어, 정책 하나를
//! 항목(지원대상, 지원내용 등) 단위의 문서로 쪼갭니다. 항목 단위로
//! 쪼개면 한 정책의 서로 다른 측면이 독립적으로 검색됩니다.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::retrieval::{DocMetadata, Document};

// ============================================================================
// Types
// ============================================================================

/// gov24 serviceDetail 정책 레코드
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyRecord {
    #[serde(rename = "서비스ID", default)]
    pub service_id: String,
    #[serde(rename = "서비스명", default)]
    pub service_name: String,
    #[serde(rename = "지원대상", default)]
    pub target: Option<String>,
    #[serde(rename = "지원내용", default)]
    pub benefit: Option<String>,
    #[serde(rename = "신청방법", default)]
    pub application: Option<String>,
    #[serde(rename = "접수기관명", default)]
    pub agency: Option<String>,
    #[serde(rename = "선정기준", default)]
    pub criteria: Option<String>,
    #[serde(rename = "문의처", default)]
    pub contact: Option<String>,
    /// 지원 조건 태그 (예: "JA0101" -> true)
    #[serde(rename = "조건", default)]
    pub conditions: BTreeMap<String, bool>,
}

impl PolicyRecord {
    /// 문서화 대상 항목들 (라벨, 값) 순서 고정
    fn fields(&self) -> [(&'static str, &Option<String>); 6] {
        [
            ("지원대상", &self.target),
            ("지원내용", &self.benefit),
            ("신청방법", &self.application),
            ("접수기관명", &self.agency),
            ("선정기준", &self.criteria),
            ("문의처", &self.contact),
        ]
    }

    /// 레코드를 항목 단위 문서 목록으로 변환
    ///
    /// 비어 있거나 "nan"인 항목은 건너뜁니다. 각 문서의 본문은
    /// `[정책명: ...] [항목: ...]` 접두어를 가져 검색/그라운딩 시
    /// 출처가 드러납니다.
    pub fn field_documents(&self) -> Vec<Document> {
        let service_name = clean_text(&self.service_name);

        let metadata = DocMetadata {
            service_id: self.service_id.clone(),
            service_name: if service_name.is_empty() {
                None
            } else {
                Some(service_name.clone())
            },
            conditions: self.conditions.clone(),
        };

        let mut documents = Vec::new();

        for (label, value) in self.fields() {
            let Some(raw) = value else { continue };
            let cleaned = clean_text(raw);
            if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("nan") {
                continue;
            }

            documents.push(Document {
                content: format!("[정책명: {}] [항목: {}]\n{}", service_name, label, cleaned),
                metadata: metadata.clone(),
            });
        }

        documents
    }
}

// ============================================================================
// Loading
// ============================================================================

/// JSON 배열 파일에서 정책 레코드 로드
pub fn load_policies(path: &Path) -> Result<Vec<PolicyRecord>> {
    let json = std::fs::read_to_string(path)?;
    let records: Vec<PolicyRecord> = serde_json::from_str(&json)?;

    tracing::info!("loaded {} policy records from {}", records.len(), path.display());
    Ok(records)
}

/// 레코드 목록 전체를 문서 목록으로 변환
pub fn to_documents(records: &[PolicyRecord]) -> Vec<Document> {
    let documents: Vec<Document> = records
        .iter()
        .flat_map(|r| r.field_documents())
        .collect();

    tracing::info!(
        "converted {} records into {} field documents",
        records.len(),
        documents.len()
    );
    documents
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 정리
///
/// 줄바꿈을 공백으로 바꾸고 불릿 기호(○)를 제거합니다.
fn clean_text(text: &str) -> String {
    text.replace('\r', " ")
        .replace('\n', " ")
        .replace('○', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================
