//! 入库服务 - 业务能力层
//!
//! 把题库中的历史题、以及生成后回写的新题，向量化后写入索引。

use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::infrastructure::{Embedder, FlatIndex, IndexRecord, VectorSearch};
use crate::models::{
    Difficulty, Exam, GeneratedQuestion, QuestionMetadata, SectionNormalizer,
};
use crate::utils::truncate_text;

/// 超过十年的试卷日期分为 0
const DATE_HORIZON_DAYS: f32 = 3650.0;
/// 回写的生成题统一使用的相关度
const GENERATED_RELEVANCE: f32 = 0.5;
/// 元数据中题干保留的长度
const METADATA_TEXT_LIMIT: usize = 200;

const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d", "%m/%d/%Y"];

/// 入库统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub added: usize,
    pub skipped: usize,
}

/// 入库服务
///
/// 职责：
/// - 拼接向量化文本并调用 Embedder
/// - 计算相关度、难度等元数据
/// - 单题失败只跳过该题
pub struct IngestService {
    embedder: Arc<dyn Embedder>,
    normalizer: Arc<SectionNormalizer>,
    today: NaiveDate,
}

impl IngestService {
    pub fn new(embedder: Arc<dyn Embedder>, normalizer: Arc<SectionNormalizer>) -> Self {
        Self {
            embedder,
            normalizer,
            today: Local::now().date_naive(),
        }
    }

    /// 固定"今天"，相关度计算可复现
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// 把整份题库写入索引（调用方负责先清空集合）
    pub async fn ingest_bank(&self, exams: &[Exam], index: &mut FlatIndex) -> Result<IngestStats> {
        let mut stats = IngestStats::default();

        for (exam_idx, exam) in exams.iter().enumerate() {
            let exam_total = exam.total_marks();
            let meta = &exam.exam_metadata;
            info!(
                "[试卷 {}] 📄 {} {} - {} 道题",
                exam_idx,
                meta.course,
                meta.date,
                exam.questions.len()
            );

            for (q_idx, question) in exam.questions.iter().enumerate() {
                let document = embedding_text(
                    &question.section,
                    &question.text,
                    question.content_description.as_deref(),
                    &question.answer_choices,
                );
                let share = if exam_total == 0 {
                    0.0
                } else {
                    question.marks as f32 / exam_total as f32
                };
                let metadata = QuestionMetadata {
                    exam_date: meta.date.clone(),
                    course: meta.course.clone(),
                    section: question.section.clone(),
                    canonical_section: self.normalizer.normalize(&question.section),
                    marks: question.marks,
                    exam_total_marks: exam_total,
                    relevance_score: relevance_score(question.marks, exam_total, &meta.date, self.today),
                    question_number: question.question_number.clone(),
                    text: truncate_chars(&question.text, METADATA_TEXT_LIMIT),
                    answer_choices: question.answer_choices.clone(),
                    difficulty: Difficulty::from_mark_share(share),
                    quality_score: None,
                    is_generated: false,
                };

                let id = format!("exam_{}_q_{}", exam_idx, q_idx);
                if self.add_one(index, id, document, metadata).await {
                    stats.added += 1;
                } else {
                    stats.skipped += 1;
                }
            }
        }

        info!("✓ 入库完成: 新增 {} 道，跳过 {} 道", stats.added, stats.skipped);
        Ok(stats)
    }

    /// 把生成题回写到已有集合
    ///
    /// 只接受带生成标记的题目，缺少题干或章节的跳过。
    pub async fn add_generated(
        &self,
        questions: &[GeneratedQuestion],
        index: &mut FlatIndex,
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        let generated: Vec<&GeneratedQuestion> =
            questions.iter().filter(|q| q.looks_generated()).collect();
        stats.skipped += questions.len() - generated.len();

        if generated.is_empty() {
            warn!("⚠️ 没有找到生成题（需要 is_generated / generated_date / quality_score）");
            return Ok(stats);
        }
        info!("✓ 找到 {} 道生成题", generated.len());

        let start_count = index.len();
        let today = self.today.format("%Y-%m-%d").to_string();

        for (q_idx, question) in generated.into_iter().enumerate() {
            if question.text.trim().is_empty() || question.section.trim().is_empty() {
                warn!("⚠️ 第 {} 道生成题缺少题干或章节，跳过", q_idx + 1);
                stats.skipped += 1;
                continue;
            }

            let date = question.generated_date.clone().unwrap_or_else(|| today.clone());
            let document = embedding_text(&question.section, &question.text, None, &question.answer_choices);
            let metadata = QuestionMetadata {
                exam_date: date.clone(),
                course: String::new(),
                section: question.section.clone(),
                canonical_section: self.normalizer.normalize(&question.section),
                marks: question.marks,
                exam_total_marks: 0,
                relevance_score: GENERATED_RELEVANCE,
                question_number: question.question_number.clone(),
                text: truncate_chars(&question.text, METADATA_TEXT_LIMIT),
                answer_choices: question.answer_choices.clone(),
                difficulty: question.difficulty,
                quality_score: question.quality_score,
                is_generated: true,
            };

            let id = format!("generated_{}_{}_{}", date, q_idx, start_count + stats.added);
            if self.add_one(index, id, document, metadata).await {
                stats.added += 1;
            } else {
                stats.skipped += 1;
            }
        }

        info!("✓ 回写完成: 新增 {} 道，跳过 {} 道", stats.added, stats.skipped);
        Ok(stats)
    }

    async fn add_one(
        &self,
        index: &mut FlatIndex,
        id: String,
        document: String,
        metadata: QuestionMetadata,
    ) -> bool {
        let embedding = match self.embedder.embed(&document).await {
            Ok(v) => v,
            Err(e) => {
                warn!("⚠️ {} 向量化失败，跳过: {}", id, e);
                return false;
            }
        };
        debug!("{} <- {}", id, truncate_text(&document, 60));

        match index.add(IndexRecord {
            id: id.clone(),
            embedding,
            document,
            metadata,
        }) {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ {} 写入索引失败，跳过: {}", id, e);
                false
            }
        }
    }
}

/// 向量化文本：`Section: … | Question: … [| Description: …] [| Choices: …]`
pub fn embedding_text(
    section: &str,
    text: &str,
    description: Option<&str>,
    choices: &[String],
) -> String {
    let mut parts = vec![format!("Section: {}", section), format!("Question: {}", text)];
    if let Some(d) = description.filter(|d| !d.trim().is_empty()) {
        parts.push(format!("Description: {}", d));
    }
    if !choices.is_empty() {
        parts.push(format!("Choices: {}", choices.join(" ")));
    }
    parts.join(" | ")
}

/// 解析试卷日期，无法识别时按 2000-01-01 处理
pub fn parse_exam_date(raw: &str) -> NaiveDate {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| NaiveDate::from_ymd_opt(2000, 1, 1))
        .unwrap_or_default()
}

/// 相关度 = 0.6 × 分值占比 + 0.4 × 日期新鲜度
pub fn relevance_score(marks: u32, exam_total: u32, date: &str, today: NaiveDate) -> f32 {
    let mark_score = if exam_total == 0 {
        0.0
    } else {
        (marks as f32 / exam_total as f32).min(1.0)
    };
    let days_old = (today - parse_exam_date(date)).num_days() as f32;
    let date_score = (1.0 - days_old / DATE_HORIZON_DAYS).clamp(0.0, 1.0);
    0.6 * mark_score + 0.4 * date_score
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
