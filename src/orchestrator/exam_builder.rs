//! 试卷生成器 - 编排层
//!
//! ## 职责
//!
//! 1. **章节规划**：请求指定的章节优先，其次是索引中题量最多的章节，最后用默认章节
//! 2. **分值分配**：总分均分到每个题位，余数给前面的题位
//! 3. **逐题位调度**：检索示例 → `SlotFlow`（生成 → 评审 → 重试）
//! 4. **整卷评估与输出**：汇总评审结论，写出 JSON
//!
//! 单个题位失败只跳过该题位；一道题都没生成出来才算整卷失败。

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::models::{
    ExamGenerationRequest, ExamMetadata, GeneratedExam, MixPolicy, SectionNormalizer,
    StyleExampleSet, DEFAULT_SECTIONS,
};
use crate::services::{distribute_marks, ExamEvaluation, ExampleRetriever};
use crate::utils::logging;
use crate::workflow::{SlotCtx, SlotFlow};

/// 未指定章节时，从索引中选取的章节数上限
const MAX_INDEX_SECTIONS: usize = 8;

/// 一次生成的结果
#[derive(Debug)]
pub struct ExamBuild {
    pub exam: GeneratedExam,
    pub evaluation: ExamEvaluation,
    pub failed_slots: usize,
    pub forced_slots: usize,
}

/// 试卷生成器
pub struct ExamBuilder {
    flow: SlotFlow,
    /// 为 None 时没有索引，所有题位都没有风格示例
    retriever: Option<ExampleRetriever>,
    normalizer: Arc<SectionNormalizer>,
    mix: MixPolicy,
    university: String,
    faculty: String,
}

impl ExamBuilder {
    pub fn new(
        flow: SlotFlow,
        retriever: Option<ExampleRetriever>,
        normalizer: Arc<SectionNormalizer>,
        mix: MixPolicy,
    ) -> Self {
        Self {
            flow,
            retriever,
            normalizer,
            mix,
            university: String::new(),
            faculty: String::new(),
        }
    }

    /// 输出试卷的学校与学院
    pub fn with_institution(mut self, university: impl Into<String>, faculty: impl Into<String>) -> Self {
        self.university = university.into();
        self.faculty = faculty.into();
        self
    }

    /// 本次使用的章节（已规范化、去重、保持顺序）
    pub fn resolve_sections(&self, request: &ExamGenerationRequest) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let requested: Vec<String> = request
            .sections
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| self.normalizer.normalize(s))
            .filter(|s| seen.insert(s.clone()))
            .collect();
        if !requested.is_empty() {
            return requested;
        }

        if let Some(retriever) = &self.retriever {
            let mut counts: Vec<(String, usize)> = retriever.section_counts().into_iter().collect();
            counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            let from_index: Vec<String> = counts
                .into_iter()
                .take(MAX_INDEX_SECTIONS)
                .map(|(section, _)| section)
                .collect();
            if !from_index.is_empty() {
                return from_index;
            }
        }

        DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect()
    }

    /// 生成整份试卷
    pub async fn build(&self, request: &ExamGenerationRequest) -> Result<ExamBuild> {
        let sections = self.resolve_sections(request);
        let num_slots = request.question_count();
        let plan = assign_sections(&sections, num_slots);
        let marks = distribute_marks(request.target_marks, plan.len());

        info!(
            "📋 生成计划: {} 道题，总分 {}，难度 {}",
            plan.len(),
            request.target_marks,
            request.difficulty
        );
        info!("📚 章节: {}", sections.join(", "));
        info!(
            "🎯 示例配额: 同章节 {} / 相关 {} / 对比 {}",
            self.mix.same, self.mix.related, self.mix.contrasting
        );

        let mut questions = Vec::with_capacity(plan.len());
        let mut verdicts = Vec::with_capacity(plan.len());
        let mut source_ids = BTreeSet::new();
        let mut failed_slots = 0;
        let mut forced_slots = 0;

        for (i, (section, slot_marks)) in plan.iter().zip(marks.iter()).enumerate() {
            logging::log_slot_start(i + 1, plan.len(), section, *slot_marks);
            let ctx = SlotCtx::new(i + 1, plan.len(), section.clone(), *slot_marks);

            let examples = self.examples_for(&ctx, request).await;
            source_ids.extend(examples.ids());

            match self
                .flow
                .run(&ctx, &examples, request.difficulty, request.iterations)
                .await
            {
                Ok(outcome) => {
                    if outcome.forced {
                        forced_slots += 1;
                    }
                    info!(
                        "{} ✅ 完成 (尝试 {} 次，得分 {:.1})",
                        ctx, outcome.attempts, outcome.verdict.score
                    );
                    verdicts.push((outcome.question.question_number.clone(), outcome.verdict));
                    questions.push(outcome.question);
                }
                Err(e) => {
                    failed_slots += 1;
                    warn!("{} ❌ 题位跳过: {:#}", ctx, e);
                }
            }
        }

        if questions.is_empty() {
            bail!("没有生成任何题目（{} 个题位全部失败）", plan.len());
        }

        let course = if request.course.trim().is_empty() {
            "Unknown Course".to_string()
        } else {
            request.course.clone()
        };
        let exam = GeneratedExam {
            exam_metadata: ExamMetadata {
                university: self.university.clone(),
                faculty: self.faculty.clone(),
                course,
                date: format!("Generated {}", chrono::Local::now().format("%Y-%m-%d")),
                time: None,
                duration: Some("3 hours".to_string()),
                source_ids: Some(source_ids.into_iter().collect()),
            },
            questions,
        };

        let evaluation =
            ExamEvaluation::from_verdicts(verdicts, exam.total_marks(), request.target_marks);
        for line in evaluation.report().lines() {
            info!("{}", line);
        }

        Ok(ExamBuild {
            exam,
            evaluation,
            failed_slots,
            forced_slots,
        })
    }

    /// 检索失败不影响生成，只是没有示例
    async fn examples_for(&self, ctx: &SlotCtx, request: &ExamGenerationRequest) -> StyleExampleSet {
        let target = self.normalizer.normalize(&ctx.section);
        let Some(retriever) = &self.retriever else {
            return StyleExampleSet::empty(target);
        };

        match retriever
            .retrieve(
                &ctx.section,
                request.style_examples_count,
                &self.mix,
                request.difficulty,
                None,
            )
            .await
        {
            Ok(set) => set,
            Err(e) => {
                warn!("{} ⚠️ 示例检索失败，不带示例生成: {:#}", ctx, e);
                StyleExampleSet::empty(target)
            }
        }
    }
}

/// 把章节均匀分给题位，余数题位依次给前面的章节
///
/// 题位数少于章节数时只用前面的章节。
pub fn assign_sections(sections: &[String], slots: usize) -> Vec<String> {
    if sections.is_empty() || slots == 0 {
        return Vec::new();
    }
    let per_section = slots / sections.len();
    let remainder = slots % sections.len();

    let mut plan = Vec::with_capacity(slots);
    for section in sections {
        plan.extend(std::iter::repeat(section.clone()).take(per_section));
    }
    plan.extend(sections.iter().take(remainder).cloned());
    plan
}

/// 写出试卷 JSON（自动创建目录）
pub async fn write_exam(exam: &GeneratedExam, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("无法创建目录: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(exam).context("试卷序列化失败")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("无法写入文件: {}", path.display()))?;
    Ok(())
}
