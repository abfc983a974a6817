//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **组装依赖**：按子命令创建 LLM / Embedding 客户端、索引、各个服务
//! 2. **分发子命令**：extract / ingest / add-generated / generate / check-key
//! 3. **致命错误**：缺少 API Key、输入路径不存在，直接返回错误
//!
//! 其余错误（单份 PDF、单个题位、单道题入库）都在下层降级处理。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::cli::{AddGeneratedArgs, Commands, ExtractArgs, GenerateArgs, IngestArgs};
use crate::config::Config;
use crate::infrastructure::{
    ChatModel, Embedder, FlatIndex, OpenAiChat, OpenAiEmbedder, PdfReader, Prompt, VectorSearch,
};
use crate::models::{load_generated_questions, load_question_bank, SectionNormalizer};
use crate::orchestrator::batch_extractor::{collect_pdfs, BatchExtractor};
use crate::orchestrator::exam_builder::{write_exam, ExamBuilder};
use crate::services::{
    ExampleRetriever, ExtractionService, IngestService, QuestionCritic, QuestionGenerator,
    WarnWriter,
};
use crate::utils::logging;
use crate::workflow::SlotFlow;

/// 应用主结构
pub struct App {
    config: Config,
    normalizer: Arc<SectionNormalizer>,
}

impl App {
    pub fn new(config: Config) -> Self {
        let normalizer = Arc::new(SectionNormalizer::with_overrides(
            config.section_aliases.iter(),
            config.related_sections.iter(),
        ));
        Self { config, normalizer }
    }

    /// 执行子命令
    pub async fn run(&self, command: &Commands) -> Result<()> {
        logging::log_startup(command.name());

        match command {
            Commands::Extract(args) => self.extract(args).await,
            Commands::Ingest(args) => self.ingest(args).await,
            Commands::AddGenerated(args) => self.add_generated(args).await,
            Commands::Generate(args) => self.generate(args).await,
            Commands::CheckKey => self.check_key().await,
        }
    }

    // ========== 子命令 ==========

    async fn extract(&self, args: &ExtractArgs) -> Result<()> {
        let files = match &args.file {
            Some(file) => {
                if !file.is_file() {
                    bail!("PDF 文件不存在: {}", file.display());
                }
                vec![file.clone()]
            }
            None => {
                let dir = args
                    .input_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(&self.config.pdf_folder));
                collect_pdfs(&dir)?
            }
        };
        info!("📂 待处理 PDF: {} 份", files.len());

        let chat = if args.no_llm {
            info!("ℹ️ 已关闭 LLM：正则切题，不描述图片");
            None
        } else {
            Some(self.chat()?)
        };

        let output_dir = args
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.config.extraction_output_dir));
        let extractor = BatchExtractor::new(
            PdfReader::new(&self.config, args.ocr),
            ExtractionService::new(chat, self.config.describe_images),
            self.warn_writer(),
            &output_dir,
        );

        let stats = extractor.run(&files).await?;
        info!("📝 共提取 {} 道题", stats.questions);
        logging::print_final_stats(
            "PDF",
            stats.files_ok,
            stats.files_failed,
            stats.files_total,
            &output_dir.display().to_string(),
        );
        Ok(())
    }

    async fn ingest(&self, args: &IngestArgs) -> Result<()> {
        let bank = args
            .bank
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.config.question_bank_path));
        let embedder = self.embedder()?;

        let exams = load_question_bank(&bank).await?;
        if exams.is_empty() {
            bail!("题库中没有可用的试卷: {}", bank.display());
        }
        info!("✓ 加载 {} 份试卷", exams.len());

        // 重建集合
        let mut index = FlatIndex::create(&self.config.index_path, &self.config.collection_name);
        let stats = IngestService::new(embedder, self.normalizer.clone())
            .ingest_bank(&exams, &mut index)
            .await?;
        index.save()?;

        self.log_section_stats(&index);
        logging::print_final_stats(
            "题目",
            stats.added,
            stats.skipped,
            stats.added + stats.skipped,
            &index.path().display().to_string(),
        );
        Ok(())
    }

    async fn add_generated(&self, args: &AddGeneratedArgs) -> Result<()> {
        let embedder = self.embedder()?;
        let mut index = FlatIndex::open(&self.config.index_path, &self.config.collection_name)
            .context("请先运行 ingest 建立索引")?;
        info!("✓ 已打开集合 {}（{} 道题）", index.collection(), index.len());

        let questions = load_generated_questions(&args.file).await?;
        let stats = IngestService::new(embedder, self.normalizer.clone())
            .add_generated(&questions, &mut index)
            .await?;
        if stats.added > 0 {
            index.save()?;
        }

        logging::print_final_stats(
            "生成题",
            stats.added,
            stats.skipped,
            questions.len(),
            &index.path().display().to_string(),
        );
        Ok(())
    }

    async fn generate(&self, args: &GenerateArgs) -> Result<()> {
        let chat = self.chat()?;
        let retriever = self.open_retriever()?;

        let flow = SlotFlow::new(
            QuestionGenerator::new(chat.clone(), self.normalizer.clone(), &self.config),
            QuestionCritic::new(chat, &self.config),
            self.warn_writer(),
        );
        let builder = ExamBuilder::new(
            flow,
            retriever,
            self.normalizer.clone(),
            args.mix(&self.config),
        )
        .with_institution(&self.config.university, &self.config.faculty);

        let request = args.to_request(&self.config);
        let total_slots = request.question_count();
        let build = builder.build(&request).await?;
        write_exam(&build.exam, &args.output).await?;

        if build.forced_slots > 0 {
            warn!(
                "⚠️ {} 道题未通过评审但已用完重试次数，详见 {}",
                build.forced_slots, self.config.warn_file
            );
        }
        logging::print_final_stats(
            "题位",
            build.exam.questions.len(),
            build.failed_slots,
            total_slots,
            &args.output.display().to_string(),
        );
        Ok(())
    }

    async fn check_key(&self) -> Result<()> {
        let chat = OpenAiChat::new(&self.config)?;
        info!("🔑 使用模型 {} 检查 API Key...", chat.model_name());

        let reply = chat
            .complete(&Prompt::new("Reply with OK.").max_tokens(5).temperature(0.0))
            .await
            .context("API Key 检查失败")?;
        info!("✅ API Key 可用，回复: {}", reply.trim());
        Ok(())
    }

    // ========== 依赖组装 ==========

    fn chat(&self) -> Result<Arc<dyn ChatModel>> {
        let chat = OpenAiChat::new(&self.config)?;
        Ok(Arc::new(chat))
    }

    fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let embedder = OpenAiEmbedder::new(&self.config)?;
        Ok(Arc::new(embedder))
    }

    fn warn_writer(&self) -> WarnWriter {
        WarnWriter::with_path(&self.config.warn_file)
    }

    /// 索引不存在时不带示例生成
    fn open_retriever(&self) -> Result<Option<ExampleRetriever>> {
        let path = Path::new(&self.config.index_path);
        let Some(index) = FlatIndex::open_if_exists(path, &self.config.collection_name)
            .context("索引文件无法读取")?
        else {
            warn!(
                "⚠️ 索引 {} 不存在，将不带风格示例生成（可先运行 ingest）",
                path.display()
            );
            return Ok(None);
        };
        info!("✓ 已加载索引: {} 道题", index.len());
        let index: Arc<dyn VectorSearch> = Arc::new(index);

        Ok(Some(ExampleRetriever::new(
            self.embedder()?,
            index,
            self.normalizer.clone(),
            self.config.candidate_pool,
        )))
    }

    fn log_section_stats(&self, index: &FlatIndex) {
        let counts = self.normalizer.canonical_counts(&index.section_counts());
        info!("📊 章节分布:");
        for (section, count) in counts {
            info!("  - {}: {}", section, count);
        }
    }
}
