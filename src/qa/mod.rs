//! QA 모듈 - 정책 질문 답변 파이프라인
//!
//! MMR 검색 -> 컨텍스트 조립 -> 프롬프트 -> LLM -> 마크다운 후처리.
//! 검색된 문서를 함께 돌려주므로 호출자가 그라운딩 체크를 이어서
//! 실행할 수 있습니다.

use std::sync::Arc;

use crate::error::Result;
use crate::llm::ChatModel;
use crate::retrieval::{Document, MmrRetriever};

// ============================================================================
// Prompt
// ============================================================================

/// 정책 답변 프롬프트 템플릿
const POLICY_PROMPT_TEMPLATE: &str = r#"You are an assistant for answering questions about Korean government support policies.
Use the following retrieved context to answer the user's question.
If none of the relevant information is found in the context, say "잘 모르겠습니다." Otherwise, do not include this phrase.

When answering, include:
- 지원대상 (who can apply)
- 지역 또는 관할기관 (where this applies / which region or city is responsible)
- 상세한 정책 설명 (혜택, 신청방법 등)

Use the following format for each policy:

사업명: ...

내용: 문장에서 핵심 내용뿐만 아니라 대상, 조건, 신청 방식 등을 가능한 자세히 설명하세요.

신청 URL 또는 문의처: ...

- 신청 URL이 있으면 "신청 URL: ..." 형식으로,
- 신청 URL이 없으면 반드시 "문의처: ..." 형식으로 포함하세요.

Respond in Korean.

# Context:
{context}

# Question:
{question}

# Answer:
"#;

/// 정책 답변 프롬프트
#[derive(Debug, Clone, Default)]
pub struct PolicyPrompt;

impl PolicyPrompt {
    /// 컨텍스트와 질문을 템플릿에 채움
    pub fn format(&self, context: &str, question: &str) -> String {
        POLICY_PROMPT_TEMPLATE
            .replace("{context}", context)
            .replace("{question}", question)
    }
}

// ============================================================================
// Markdown Formatter
// ============================================================================

/// 답변 마크다운 포매터
///
/// LLM 답변의 정해진 줄 패턴(사업명:, 내용:, 신청 URL, 문의처:)을
/// 마크다운으로 꾸밉니다. 패턴에 없는 줄은 그대로 둡니다.
#[derive(Debug, Clone, Default)]
pub struct MarkdownFormatter;

impl MarkdownFormatter {
    pub fn format(&self, text: &str) -> String {
        let mut md_lines: Vec<String> = Vec::new();

        for line in text.trim().lines() {
            if line.starts_with("사업명:") {
                md_lines.push(format!("**{}**", line));
            } else if line.starts_with("내용:") {
                md_lines.push(format!("📍 {}", line));
            } else if line.starts_with("신청 URL") {
                let url = line.splitn(2, ':').nth(1).map(str::trim).unwrap_or("");
                if !url.is_empty() && url != "잘 모르겠습니다." {
                    md_lines.push(format!("🔗 [신청 방법]({})", url));
                } else {
                    md_lines.push("📞 신청 URL이 없어 문의처를 확인해 주세요.".to_string());
                }
            } else if line.starts_with("문의처:") {
                let contacts = line.trim_start_matches("문의처:").trim();
                for contact in contacts.split("||") {
                    let contact = contact.trim();
                    if !contact.is_empty() {
                        md_lines.push(format!("📞 {}", contact));
                    }
                }
            } else {
                md_lines.push(line.to_string());
            }
        }

        md_lines.join("\n\n")
    }
}

// ============================================================================
// Chat History
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// 대화 메시지
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// 대화 히스토리 (턴 수 제한)
#[derive(Debug, Clone)]
pub struct ChatHistory {
    history_limit: usize,
    turns: Vec<ChatTurn>,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ChatHistory {
    /// 히스토리 생성 (limit = 질문/답변 쌍 수)
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit,
            turns: Vec::new(),
        }
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(ChatTurn {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(ChatTurn {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
        // user + assistant 쌍 기준이므로 * 2
        while self.turns.len() > self.history_limit * 2 {
            self.turns.remove(0);
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

// ============================================================================
// PolicyQa
// ============================================================================

/// QA 실행 결과
#[derive(Debug, Clone)]
pub struct QaAnswer {
    /// 마크다운 후처리된 답변
    pub answer: String,
    /// 답변에 사용된 검색 문서 (그라운딩 체크 입력)
    pub documents: Vec<Document>,
}

/// 정책 QA 파이프라인
pub struct PolicyQa {
    retriever: MmrRetriever,
    llm: Arc<dyn ChatModel>,
    prompt: PolicyPrompt,
    formatter: MarkdownFormatter,
}

impl PolicyQa {
    pub fn new(retriever: MmrRetriever, llm: Arc<dyn ChatModel>) -> Self {
        Self {
            retriever,
            llm,
            prompt: PolicyPrompt,
            formatter: MarkdownFormatter,
        }
    }

    /// 질문 하나에 대한 답변 생성
    pub async fn run(&self, question: &str) -> Result<QaAnswer> {
        // 1. MMR 다양성 검색
        let documents = self.retriever.retrieve(question).await?;
        tracing::debug!("retrieved {} documents for question", documents.len());

        // 2. 컨텍스트 조립
        let context = documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        // 3. 프롬프트 포맷 + LLM 호출
        let prompt = self.prompt.format(&context, question);
        let raw_answer = self.llm.complete(&prompt).await?;

        // 4. 마크다운 후처리
        let answer = self.formatter.format(&raw_answer);

        Ok(QaAnswer { answer, documents })
    }
}

// ============================================================================
// Tests
// ============================================================================
