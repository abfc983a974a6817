//! 批量 PDF 提取器 - 编排层
//!
//! ## 职责
//!
//! 1. **扫描输入**：单个文件或整个目录下的 `*.pdf`
//! 2. **逐份处理**：读页面 → 读图片 → 描述图片 → 切题 → 找公式 → 挂载
//! 3. **输出**：每份 PDF 一个 `{stem}.json`，另有汇总的 `all_questions.json`
//! 4. **容错**：单份 PDF 失败写入 warn.txt 并跳过，不影响其它文件

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use crate::infrastructure::{PdfReader, TextSource};
use crate::models::ExtractedQuestion;
use crate::services::extraction_service::{attach_assets, find_equations};
use crate::services::{ExtractionService, WarnWriter};

/// 汇总文件名
pub const ALL_QUESTIONS_FILE: &str = "all_questions.json";

/// 批量提取统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub files_total: usize,
    pub files_ok: usize,
    pub files_failed: usize,
    pub questions: usize,
}

/// 批量 PDF 提取器
pub struct BatchExtractor {
    reader: PdfReader,
    service: ExtractionService,
    warn_writer: WarnWriter,
    output_dir: PathBuf,
}

impl BatchExtractor {
    pub fn new(
        reader: PdfReader,
        service: ExtractionService,
        warn_writer: WarnWriter,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reader,
            service,
            warn_writer,
            output_dir: output_dir.into(),
        }
    }

    /// 处理一批 PDF，返回统计
    pub async fn run(&self, files: &[PathBuf]) -> Result<ExtractionStats> {
        let mut stats = ExtractionStats {
            files_total: files.len(),
            ..Default::default()
        };
        if files.is_empty() {
            warn!("⚠️ 没有找到 PDF 文件");
            return Ok(stats);
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("无法创建输出目录: {}", self.output_dir.display()))?;

        let mut all_questions = Vec::new();
        for (i, path) in files.iter().enumerate() {
            info!("\n{}", "─".repeat(60));
            info!("📄 [{}/{}] {}", i + 1, files.len(), path.display());

            match self.extract_file(path).await {
                Ok(questions) => {
                    let out = self.output_dir.join(format!("{}.json", file_stem(path)));
                    write_json(&out, &questions).await?;
                    info!("✓ 提取 {} 道题 -> {}", questions.len(), out.display());
                    stats.files_ok += 1;
                    stats.questions += questions.len();
                    all_questions.extend(questions);
                }
                Err(e) => {
                    error!("❌ 处理失败，跳过: {:#}", e);
                    stats.files_failed += 1;
                    let scope = path.display().to_string();
                    if let Err(we) = self
                        .warn_writer
                        .write(&scope, "PDF 处理失败，已跳过", &format!("{:#}", e))
                        .await
                    {
                        warn!("⚠️ 写入警告文件失败: {:#}", we);
                    }
                }
            }
        }

        let summary = self.output_dir.join(ALL_QUESTIONS_FILE);
        write_json(&summary, &all_questions).await?;
        info!("✓ 汇总 {} 道题 -> {}", all_questions.len(), summary.display());

        Ok(stats)
    }

    /// 处理单份 PDF
    pub async fn extract_file(&self, path: &Path) -> Result<Vec<ExtractedQuestion>> {
        let source_file = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let pages = self.reader.read_pages(path).await?;
        let ocr_pages = pages.iter().filter(|p| p.source == TextSource::Ocr).count();
        info!("📖 {} 页（OCR {} 页）", pages.len(), ocr_pages);

        let images = match self.reader.read_images(path) {
            Ok(images) => images,
            Err(e) => {
                warn!("⚠️ 图片读取失败，按无图片处理: {}", e);
                Vec::new()
            }
        };
        let image_refs = self.service.describe(&images).await;

        let mut questions = self.service.split_questions(&pages, &source_file).await;
        let equations = find_equations(&pages);
        info!(
            "🔎 题目 {} / 图片 {} / 公式 {}",
            questions.len(),
            image_refs.len(),
            equations.len()
        );

        let orphans = attach_assets(&mut questions, image_refs, equations);
        if orphans > 0 {
            warn!("⚠️ {} 个图片或公式找不到所属题目，已丢弃", orphans);
        }

        Ok(questions)
    }
}

/// 列出目录下的 PDF（按文件名排序，不递归）
pub fn collect_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("PDF 目录不存在: {}", dir.display());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("无法读取目录: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string())
}

async fn write_json(path: &Path, questions: &[ExtractedQuestion]) -> Result<()> {
    let json = serde_json::to_string_pretty(questions).context("题目序列化失败")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("无法写入文件: {}", path.display()))
}
