//! CLI 모듈
//!
//! gov-policy-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::embedding::{has_api_key, OpenAiEmbedding};
use crate::llm::OpenAiChat;
use crate::loader::{load_policies, to_documents};
use crate::qa::{ChatHistory, PolicyQa, QaAnswer};
use crate::retrieval::{
    GroundingChecker, GroundingRecord, MemoryVectorIndex, MmrConfig, MmrRetriever, VectorIndex,
    DEFAULT_GROUNDING_THRESHOLD,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "gov-policy-rag")]
#[command(version, about = "정부 지원 정책 RAG 시스템", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 정책 JSON 파일에서 벡터 인덱스 구축
    Build {
        /// 정책 레코드 JSON 파일 (serviceDetail 배열)
        #[arg(short, long)]
        input: PathBuf,

        /// 인덱스 스냅샷 저장 경로 (기본: ~/.gov-policy-rag/index.json)
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// MMR 다양성 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 최종 선택 문서 수
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// 1차 유사도 후보 수
        #[arg(short, long, default_value = "15")]
        candidates: usize,

        /// 관련성 가중치 λ (0 ~ 1, 1에 가까울수록 순수 관련성)
        #[arg(long, default_value = "0.5")]
        lambda: f32,

        /// 인덱스 스냅샷 경로
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// 질문 하나에 답변 + 그라운딩 체크
    Ask {
        /// 질문
        question: String,

        /// 그라운딩 임계값
        #[arg(long, default_value_t = DEFAULT_GROUNDING_THRESHOLD)]
        threshold: f32,

        /// 인덱스 스냅샷 경로
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// 대화형 질문 루프 (exit/quit/종료 입력 시 종료)
    Chat {
        /// 그라운딩 임계값
        #[arg(long, default_value_t = DEFAULT_GROUNDING_THRESHOLD)]
        threshold: f32,

        /// 인덱스 스냅샷 경로
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build { input, index } => cmd_build(&input, index).await,
        Commands::Query {
            query,
            limit,
            candidates,
            lambda,
            index,
        } => cmd_query(&query, limit, candidates, lambda, index).await,
        Commands::Ask {
            question,
            threshold,
            index,
        } => cmd_ask(&question, threshold, index).await,
        Commands::Chat { threshold, index } => cmd_chat(threshold, index).await,
        Commands::Status => cmd_status().await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인덱스 구축 명령어 (build)
///
/// 정책 레코드를 항목 단위 문서로 쪼개고, 임베딩을 계산해
/// JSON 스냅샷으로 저장합니다.
async fn cmd_build(input: &Path, index: Option<PathBuf>) -> Result<()> {
    ensure_api_key()?;

    let index_path = index.unwrap_or_else(default_index_path);

    println!("[*] 정책 레코드 로드 중: {}", input.display());
    let records = load_policies(input).context("정책 파일 로드 실패")?;
    let documents = to_documents(&records);

    if documents.is_empty() {
        bail!("변환된 문서가 없습니다. 입력 파일을 확인하세요: {}", input.display());
    }

    println!("[*] 문서 {} 건 임베딩 생성 중...", documents.len());
    let embedder = OpenAiEmbedding::from_env().context("임베딩 프로바이더 생성 실패")?;
    let built = MemoryVectorIndex::from_documents(&embedder, documents)
        .await
        .context("인덱스 구축 실패")?;

    built.save(&index_path).context("인덱스 저장 실패")?;

    println!("[OK] 인덱스가 저장되었습니다: {}", index_path.display());
    Ok(())
}

/// 검색 명령어 (query)
///
/// MMR 다양성 검색만 수행하고 선택 순서대로 출력합니다.
async fn cmd_query(
    query: &str,
    limit: usize,
    candidates: usize,
    lambda: f32,
    index: Option<PathBuf>,
) -> Result<()> {
    ensure_api_key()?;

    let config = MmrConfig {
        candidate_count: candidates,
        final_count: limit,
        diversity_weight: lambda,
    };

    let (embedder, loaded) = open_index(index)?;
    let retriever = MmrRetriever::new(embedder, Arc::new(loaded), config)
        .context("검색기 초기화 실패")?;

    println!("[*] 검색 중: \"{}\"", query);
    let results = retriever.retrieve(query).await.context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    for (i, doc) in results.iter().enumerate() {
        println!("{}. [서비스ID: {}]", i + 1, doc.metadata.service_id);
        println!("   {}", truncate_text(&doc.content, 200));
        println!();
    }

    Ok(())
}

/// 질문 명령어 (ask)
///
/// MMR 검색 -> LLM 답변 -> 그라운딩 체크를 한 번에 실행합니다.
async fn cmd_ask(question: &str, threshold: f32, index: Option<PathBuf>) -> Result<()> {
    ensure_api_key()?;

    let (qa, checker) = setup_pipeline(threshold, index)?;
    answer_question(&qa, &checker, question).await
}

/// 대화 명령어 (chat)
async fn cmd_chat(threshold: f32, index: Option<PathBuf>) -> Result<()> {
    ensure_api_key()?;

    let (qa, checker) = setup_pipeline(threshold, index)?;
    let mut history = ChatHistory::default();

    println!("정부 지원 정책 질문 시스템입니다. 'exit' 입력 시 종료됩니다.\n");

    let stdin = std::io::stdin();
    loop {
        print!("질문: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if ["exit", "quit", "종료"].contains(&question.to_lowercase().as_str()) {
            println!("종료합니다.");
            break;
        }

        history.add_user_message(question);

        match answer_question(&qa, &checker, question).await {
            Ok(()) => {}
            Err(e) => {
                println!("[!] 답변 생성 실패: {:#}", e);
                continue;
            }
        }

        history.add_assistant_message("(답변 출력됨)");
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status() -> Result<()> {
    println!("gov-policy-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export OPENAI_API_KEY=your-key");
    }

    let index_path = default_index_path();
    if index_path.exists() {
        match MemoryVectorIndex::load(&index_path) {
            Ok(index) => {
                let count = index.len().await.unwrap_or(0);
                println!("[OK] 인덱스: {} 문서 ({})", count, index_path.display());
            }
            Err(e) => {
                println!("[!] 인덱스 로드 실패: {}", e);
            }
        }
    } else {
        println!("[!] 인덱스 없음: {}", index_path.display());
        println!("    생성: gov-policy-rag build --input policies.json");
    }

    Ok(())
}

// ============================================================================
// Pipeline Setup
// ============================================================================

/// QA 파이프라인과 그라운딩 체커 구성
///
/// 그라운딩 체커는 검색과 같은 인덱스를 컨텍스트 소스로 씁니다.
fn setup_pipeline(
    threshold: f32,
    index: Option<PathBuf>,
) -> Result<(PolicyQa, GroundingChecker)> {
    let (embedder, loaded) = open_index(index)?;
    let index: Arc<MemoryVectorIndex> = Arc::new(loaded);

    // 원 QA 파이프라인과 같은 설정 (후보 15, 최종 5, λ=0.7)
    let config = MmrConfig {
        candidate_count: 15,
        final_count: 5,
        diversity_weight: 0.7,
    };
    let retriever = MmrRetriever::new(embedder.clone(), index.clone(), config)
        .context("검색기 초기화 실패")?;

    let llm = Arc::new(OpenAiChat::from_env().context("LLM 클라이언트 생성 실패")?);
    let qa = PolicyQa::new(retriever, llm);

    let checker = GroundingChecker::with_index(embedder, index).with_threshold(threshold);

    Ok((qa, checker))
}

/// 질문 하나를 처리하고 답변과 그라운딩 결과를 출력
async fn answer_question(qa: &PolicyQa, checker: &GroundingChecker, question: &str) -> Result<()> {
    println!("[*] 답변 생성 중...");
    let QaAnswer { answer, documents } = qa.run(question).await.context("답변 생성 실패")?;

    println!("\n📌 챗봇 답변:\n");
    println!("{}", answer);

    let records = checker.check(&answer).await.context("그라운딩 체크 실패")?;
    print_grounding_report(&records);

    if !documents.is_empty() {
        println!("\n참고한 정책 ({} 건):", documents.len());
        for doc in &documents {
            println!(
                "  - {} ({})",
                doc.metadata.service_name.as_deref().unwrap_or("-"),
                doc.metadata.service_id
            );
        }
    }

    println!();
    Ok(())
}

/// 그라운딩 체크 결과 출력
fn print_grounding_report(records: &[GroundingRecord]) {
    println!("\n🧠 그라운딩 체크 결과:");

    if records.is_empty() {
        println!("그라운딩 체크 결과가 없습니다.");
        return;
    }

    for (idx, record) in records.iter().enumerate() {
        let verdict = if record.grounded {
            "✅ 근거 있음"
        } else {
            "⚠️ 근거 없음"
        };

        println!("\n[{}] 문장: {}", idx + 1, record.sentence);
        println!("    근거 문맥: {}", truncate_text(&record.matched_context, 100));
        println!("    유사도: {:.3} → {}", record.similarity, verdict);
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 데이터 디렉토리 경로 (~/.gov-policy-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gov-policy-rag")
}

/// 기본 인덱스 스냅샷 경로
fn default_index_path() -> PathBuf {
    get_data_dir().join("index.json")
}

/// 인덱스 스냅샷 로드 + 차원이 맞는 임베더 생성
fn open_index(index: Option<PathBuf>) -> Result<(Arc<OpenAiEmbedding>, MemoryVectorIndex)> {
    let index_path = index.unwrap_or_else(default_index_path);

    if !index_path.exists() {
        bail!(
            "인덱스가 없습니다: {}\n먼저 생성하세요: gov-policy-rag build --input policies.json",
            index_path.display()
        );
    }

    let loaded = MemoryVectorIndex::load(&index_path).context("인덱스 로드 실패")?;

    // 쿼리 임베딩은 인덱스와 같은 차원이어야 한다
    let embedder = OpenAiEmbedding::from_env_with_dimension(loaded.dimension())
        .context("임베딩 프로바이더 생성 실패")?;

    Ok((Arc::new(embedder), loaded))
}

/// API 키 확인
fn ensure_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export OPENAI_API_KEY=your-api-key\n\n\
             API 키 발급: https://platform.openai.com/api-keys"
        );
    }
    Ok(())
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        let truncated = truncate_text(korean, 5);
        assert_eq!(truncated, "안녕하세요...");
    }

    #[test]
    fn test_default_index_path() {
        let path = default_index_path();
        assert!(path.ends_with("index.json"));
        assert!(path.to_string_lossy().contains(".gov-policy-rag"));
    }
}
