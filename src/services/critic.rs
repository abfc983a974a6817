//! 题目评审服务 - 业务能力层
//!
//! 第二次 LLM 调用：给生成的题目打分并给出修改意见。
//! 评审本身失败不会中断流程，而是视为"打回，附带错误说明"。

use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::infrastructure::{ChatModel, Prompt};
use crate::models::{GeneratedQuestion, StyleExampleSet};

/// 回复中找不到分数时的默认分
const DEFAULT_SCORE: f32 = 7.0;
/// 评审调用失败时的分数
const ERROR_SCORE: f32 = 5.0;
/// 总分与目标分允许的偏差
const MARK_TOLERANCE: u32 = 10;
/// 整卷通过所需的题目通过率
const EXAM_APPROVAL_RATE: f32 = 0.7;

/// 依次尝试的打分格式，第一个落在 0-10 的值生效
const SCORE_PATTERNS: &[&str] = &[
    r"(?i)(?:score|quality|rating)[:\s]+(\d+(?:\.\d+)?)\s*(?:/|out of)\s*10",
    r"(\d+(?:\.\d+)?)\s*/?\s*10",
    r"(?i)(?:overall|quality|score)[:\s]+(\d+(?:\.\d+)?)",
    r"(?i)(\d+(?:\.\d+)?)\s*(?:out of|/)\s*10",
];

/// 单题评审结论
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub score: f32,
    pub approved: bool,
    pub feedback: String,
}

/// 题目评审服务
///
/// 职责：
/// - 一次 LLM 调用得到分数和意见
/// - 分数达到阈值即通过
/// - 不决定是否重试
pub struct QuestionCritic {
    chat: Arc<dyn ChatModel>,
    threshold: f32,
    course: String,
}

impl QuestionCritic {
    pub fn new(chat: Arc<dyn ChatModel>, config: &Config) -> Self {
        Self {
            chat,
            threshold: config.approval_threshold,
            course: config.course.clone(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 评审一道题，调用失败时返回 5 分并打回
    pub async fn review(&self, question: &GeneratedQuestion, references: &StyleExampleSet) -> Verdict {
        let prompt = self.build_prompt(question, references);
        match self.chat.complete(&prompt).await {
            Ok(text) => {
                let score = parse_score(&text).unwrap_or(DEFAULT_SCORE);
                debug!("评审得分: {:.1} (阈值 {:.1})", score, self.threshold);
                Verdict {
                    score,
                    approved: score >= self.threshold,
                    feedback: text,
                }
            }
            Err(e) => {
                warn!("⚠️ 评审调用失败: {}", e);
                Verdict {
                    score: ERROR_SCORE,
                    approved: false,
                    feedback: format!("evaluation error: {}", e),
                }
            }
        }
    }

    fn build_prompt(&self, question: &GeneratedQuestion, references: &StyleExampleSet) -> Prompt {
        let system = format!(
            "You are an expert at evaluating programming exam questions.\n\
             Evaluate questions based on:\n\
             1. Clarity and understandability\n\
             2. Appropriateness for first-year engineering students\n\
             3. Alignment with {} course content\n\
             4. Specificity and testability\n\
             5. Style consistency with reference examples without copying them",
            self.course
        );

        let mut parts = vec![
            "Evaluate this exam question:".to_string(),
            format!("Section: {}", question.section),
            format!("Marks: {}", question.marks),
            format!("Intended difficulty: {}", question.difficulty),
            format!("Text: {}", question.text),
        ];
        for (i, choice) in question.answer_choices.iter().enumerate() {
            parts.push(format!("  {}) {}", letter(i), choice));
        }
        parts.extend([
            String::new(),
            "Provide:".to_string(),
            "1. Overall quality score (0-10), written as 'Score: N/10'".to_string(),
            "2. Specific feedback on what works well".to_string(),
            "3. Specific suggestions for improvement".to_string(),
            "4. Whether the question matches its section, marks and difficulty".to_string(),
        ]);

        let refs: Vec<_> = references.examples.iter().take(2).collect();
        if !refs.is_empty() {
            parts.push(String::new());
            parts.push("Reference questions for style comparison:".to_string());
            for (i, example) in refs.iter().enumerate() {
                let text: String = example.question.metadata.text.chars().take(200).collect();
                parts.push(format!("Reference {}: {}", i + 1, text));
            }
        }

        Prompt::new(parts.join("\n"))
            .system(system)
            .temperature(0.3)
            .max_tokens(400)
    }
}

/// 从评审回复中解析分数
pub fn parse_score(text: &str) -> Option<f32> {
    for pattern in SCORE_PATTERNS {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        let Some(value) = re
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f32>().ok())
        else {
            continue;
        };
        if (0.0..=10.0).contains(&value) {
            return Some(value);
        }
    }
    None
}

fn letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

/// 整卷评估
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamEvaluation {
    pub overall_score: f32,
    pub approval_rate: f32,
    pub approved_questions: usize,
    pub total_questions: usize,
    pub total_marks: u32,
    pub target_marks: u32,
    pub mark_distribution_ok: bool,
    pub exam_approved: bool,
    /// (题号, 最终评审结论)
    pub question_verdicts: Vec<(String, Verdict)>,
}

impl ExamEvaluation {
    pub fn from_verdicts(question_verdicts: Vec<(String, Verdict)>, total_marks: u32, target_marks: u32) -> Self {
        let total_questions = question_verdicts.len();
        let approved_questions = question_verdicts.iter().filter(|(_, v)| v.approved).count();
        let (overall_score, approval_rate) = if total_questions == 0 {
            (0.0, 0.0)
        } else {
            let sum: f32 = question_verdicts.iter().map(|(_, v)| v.score).sum();
            (
                sum / total_questions as f32,
                approved_questions as f32 / total_questions as f32,
            )
        };
        let mark_distribution_ok = total_marks.abs_diff(target_marks) <= MARK_TOLERANCE;

        Self {
            overall_score,
            approval_rate,
            approved_questions,
            total_questions,
            total_marks,
            target_marks,
            mark_distribution_ok,
            exam_approved: approval_rate >= EXAM_APPROVAL_RATE && mark_distribution_ok,
            question_verdicts,
        }
    }

    /// 人类可读的评估报告
    pub fn report(&self) -> String {
        let mut lines = vec![
            format!("总体得分: {:.1}/10", self.overall_score),
            format!("通过率: {:.1}%", self.approval_rate * 100.0),
            format!("通过题数: {}/{}", self.approved_questions, self.total_questions),
            format!("总分: {} (目标 {})", self.total_marks, self.target_marks),
            String::new(),
        ];

        if self.exam_approved {
            lines.push("✅ 试卷评审通过，可以使用".to_string());
        } else {
            lines.push("❌ 试卷需要改进".to_string());
            if self.approval_rate < EXAM_APPROVAL_RATE {
                lines.push("  - 未通过评审的题目过多".to_string());
            }
            if !self.mark_distribution_ok {
                lines.push("  - 总分与目标分相差过大".to_string());
            }
        }

        lines.push(String::new());
        lines.push("逐题意见:".to_string());
        for (number, verdict) in &self.question_verdicts {
            let status = if verdict.approved { "✓" } else { "✗" };
            let preview: String = verdict.feedback.chars().take(200).collect();
            lines.push(format!("{} 第 {} 题 ({:.1}/10): {}", status, number, verdict.score, preview));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(score: f32, approved: bool) -> Verdict {
        Verdict {
            score,
            approved,
            feedback: "fine".to_string(),
        }
    }

    #[test]
    fn test_parse_score_patterns() {
        assert_eq!(parse_score("Overall quality score: 8/10. Good."), Some(8.0));
        assert_eq!(parse_score("I would give it 6.5 out of 10"), Some(6.5));
        assert_eq!(parse_score("Overall: 9"), Some(9.0));
        assert_eq!(parse_score("Rating: 7.5 / 10"), Some(7.5));
        assert_eq!(parse_score("No numbers here"), None);
    }

    #[test]
    fn test_parse_score_skips_out_of_range() {
        assert_eq!(parse_score("Quality: 85"), None);
        assert_eq!(parse_score("Overall: 15 ... final 8/10"), Some(8.0));
    }

    #[test]
    fn test_exam_evaluation() {
        let eval = ExamEvaluation::from_verdicts(
            vec![
                ("1".to_string(), verdict(8.0, true)),
                ("2".to_string(), verdict(9.0, true)),
                ("3".to_string(), verdict(4.0, false)),
            ],
            95,
            100,
        );
        assert!((eval.overall_score - 7.0).abs() < 1e-6);
        assert_eq!(eval.approved_questions, 2);
        assert!(eval.mark_distribution_ok);
        assert!(!eval.exam_approved);
        assert!(eval.report().contains("未通过评审的题目过多"));
    }

    #[test]
    fn test_exam_evaluation_marks_off_target() {
        let eval = ExamEvaluation::from_verdicts(vec![("1".to_string(), verdict(9.0, true))], 60, 100);
        assert!(!eval.mark_distribution_ok);
        assert!(!eval.exam_approved);
    }

    #[test]
    fn test_empty_exam_evaluation() {
        let eval = ExamEvaluation::from_verdicts(Vec::new(), 0, 100);
        assert_eq!(eval.total_questions, 0);
        assert_eq!(eval.approval_rate, 0.0);
    }
}
