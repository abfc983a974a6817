//! 题位处理流程 - 流程层
//!
//! 核心职责：定义"一个题位"的完整处理流程
//!
//! 流程是一个只有两个状态的状态机：
//! 1. Generating { attempt }：生成 → 评审，通过则进入 Accepted
//! 2. 被打回且还有次数：带着评审意见进入下一次 Generating
//! 3. 次数用完：无论结论如何，最后一次的题目直接 Accepted（写 warn.txt）

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use crate::models::{Difficulty, GeneratedQuestion, StyleExampleSet};
use crate::services::{QuestionCritic, QuestionGenerator, SlotRequest, Verdict, WarnWriter};
use crate::utils::truncate_text;
use crate::workflow::slot_ctx::SlotCtx;

/// 题位状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// 第 `attempt` 次生成（从 1 开始）
    Generating { attempt: usize },
    Accepted,
}

impl SlotState {
    /// 一次生成 + 评审之后的状态转移
    pub fn next(self, approved: bool, budget: usize) -> SlotState {
        match self {
            SlotState::Generating { attempt } if approved || attempt >= budget => SlotState::Accepted,
            SlotState::Generating { attempt } => SlotState::Generating {
                attempt: attempt + 1,
            },
            SlotState::Accepted => SlotState::Accepted,
        }
    }
}

/// 题位处理结果
#[derive(Debug, Clone)]
pub struct SlotOutcome {
    pub question: GeneratedQuestion,
    /// 被接受的那一次的评审结论
    pub verdict: Verdict,
    pub attempts: usize,
    /// 评审未通过、因次数用完而被接受
    pub forced: bool,
}

/// 题位处理流程
///
/// - 编排 生成 → 评审 → 重试
/// - 决定何时接受、何时兜底
/// - 只依赖业务能力（services）
pub struct SlotFlow {
    generator: QuestionGenerator,
    critic: QuestionCritic,
    warn_writer: WarnWriter,
}

impl SlotFlow {
    pub fn new(generator: QuestionGenerator, critic: QuestionCritic, warn_writer: WarnWriter) -> Self {
        Self {
            generator,
            critic,
            warn_writer,
        }
    }

    /// 运行一个题位
    ///
    /// `budget` 为最多生成次数（小于 1 时按 1 处理）。每一次生成都失败才返回错误。
    pub async fn run(
        &self,
        ctx: &SlotCtx,
        examples: &StyleExampleSet,
        difficulty: Difficulty,
        budget: usize,
    ) -> Result<SlotOutcome> {
        let budget = budget.max(1);
        let mut state = SlotState::Generating { attempt: 1 };
        let mut attempts = 0;
        let mut feedback: Option<String> = None;
        let mut last: Option<(GeneratedQuestion, Verdict)> = None;
        let mut last_error: Option<anyhow::Error> = None;

        while let SlotState::Generating { attempt } = state {
            attempts = attempt;
            info!("{} ✍️ 第 {}/{} 次生成...", ctx, attempt, budget);

            let request = SlotRequest {
                section: &ctx.section,
                marks: ctx.marks,
                difficulty,
                examples,
                feedback: feedback.as_deref(),
            };

            let approved = match self.generator.generate(&request).await {
                Ok(question) => {
                    self.log_question(ctx, &question);
                    let verdict = self.critic.review(&question, examples).await;
                    let approved = verdict.approved;
                    if approved {
                        info!("{} ✓ 评审通过 ({:.1}/10)", ctx, verdict.score);
                    } else {
                        info!(
                            "{} ✗ 评审未通过 ({:.1}/10，阈值 {:.1})",
                            ctx,
                            verdict.score,
                            self.critic.threshold()
                        );
                        feedback = Some(verdict.feedback.clone());
                    }
                    last = Some((question, verdict));
                    approved
                }
                Err(e) => {
                    warn!("{} ⚠️ 生成失败: {:#}", ctx, e);
                    last_error = Some(e);
                    false
                }
            };

            state = state.next(approved, budget);
        }

        let Some((mut question, verdict)) = last else {
            let err = last_error.unwrap_or_else(|| anyhow!("没有生成任何题目"));
            self.write_warn(ctx, "生成失败，题位跳过", &format!("{:#}", err)).await;
            return Err(err.context(format!("{} 生成失败 (已尝试 {} 次)", ctx, attempts)));
        };

        let forced = !verdict.approved;
        if forced {
            warn!(
                "{} ⚠️ {} 次均未通过评审，接受最后一次结果",
                ctx, attempts
            );
            self.write_warn(
                ctx,
                "超出重试次数，强制接受",
                &format!("score {:.1} | {}", verdict.score, truncate_text(&question.text, 80)),
            )
            .await;
        }

        question.question_number = ctx.question_number();
        question.quality_score = Some(verdict.score);

        Ok(SlotOutcome {
            question,
            verdict,
            attempts,
            forced,
        })
    }

    /// 写入警告日志，失败只记录不中断
    async fn write_warn(&self, ctx: &SlotCtx, reason: &str, detail: &str) {
        match self.warn_writer.write(&ctx.to_string(), reason, detail).await {
            Ok(()) => warn!("{} ⚠️ 已写入 {}: {}", ctx, self.warn_writer.path(), reason),
            Err(e) => warn!("{} ⚠️ 写入警告文件失败: {:#}", ctx, e),
        }
    }

    // ========== 日志辅助方法 ==========

    fn log_question(&self, ctx: &SlotCtx, question: &GeneratedQuestion) {
        info!("{} 题干: {}", ctx, truncate_text(&question.text, 80));
        if !question.answer_choices.is_empty() {
            info!("{} 选项数: {}", ctx, question.answer_choices.len());
        }
    }
}
