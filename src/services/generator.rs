//! 题目生成服务 - 业务能力层
//!
//! 只负责"为一个题位生成一道题"：拼提示词、调用 LLM、解析回复。
//! 不关心评审和重试。

use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::config::Config;
use crate::infrastructure::{ChatModel, Prompt};
use crate::models::{
    Difficulty, GeneratedQuestion, InclusionReason, SectionNormalizer, StyleExampleSet,
};
use crate::utils::truncate_text;

/// 示例题干在提示词中的最大长度
const EXAMPLE_TEXT_LIMIT: usize = 400;

/// 选项行：`A) ...` / `(b) ...` / `C. ...` / `d: ...`
const CHOICE_PATTERN: &str = r"^\s*\(?([A-Ha-h])[\).:]\s+(\S.*)$";

/// 一个题位的生成参数
#[derive(Debug, Clone, Copy)]
pub struct SlotRequest<'a> {
    /// 规范章节
    pub section: &'a str,
    pub marks: u32,
    pub difficulty: Difficulty,
    pub examples: &'a StyleExampleSet,
    /// 上一次被评审打回时的意见
    pub feedback: Option<&'a str>,
}

/// 题目生成服务
///
/// 职责：
/// - 把风格示例组装成提示词，并要求模型不要照抄示例
/// - 难度映射为采样温度
/// - 把回复解析成题目（解析失败时整段回复就是题干）
pub struct QuestionGenerator {
    chat: Arc<dyn ChatModel>,
    normalizer: Arc<SectionNormalizer>,
    course: String,
    max_tokens: u32,
}

impl QuestionGenerator {
    pub fn new(chat: Arc<dyn ChatModel>, normalizer: Arc<SectionNormalizer>, config: &Config) -> Self {
        Self {
            chat,
            normalizer,
            course: config.course.clone(),
            max_tokens: config.llm_max_tokens,
        }
    }

    /// 生成一道题，只有 LLM 调用失败才返回错误
    pub async fn generate(&self, slot: &SlotRequest<'_>) -> Result<GeneratedQuestion> {
        let prompt = self.build_prompt(slot);
        let raw = self
            .chat
            .complete(&prompt)
            .await
            .with_context(|| format!("生成题目失败: {} ({} 分)", slot.section, slot.marks))?;
        debug!("生成回复长度: {} 字符", raw.len());

        Ok(parse_response(&raw, slot.section, slot.marks, slot.difficulty))
    }

    pub fn build_prompt(&self, slot: &SlotRequest<'_>) -> Prompt {
        let section = slot.section;
        let description = self.normalizer.description(section);

        let system = format!(
            "You are an expert at creating programming exam questions for {course}.\n\n\
             CRITICAL: You MUST create a question for the \"{section}\" section.\n\
             - \"{section}\" questions focus on {description}\n\
             - Do NOT default to program comprehension unless that is the requested section\n\n\
             Your questions should be clear and unambiguous, appropriate for first-year \
             engineering students, and include concrete input/output examples where applicable.",
            course = self.course,
        );

        let mut parts = vec![
            format!(
                "Generate a {} difficulty question for the '{}' section worth {} marks.",
                slot.difficulty, section, slot.marks
            ),
            format!("Section '{}' focuses on: {}", section, description),
            String::new(),
            "Requirements:".to_string(),
            format!("- The question MUST test {} concepts", section),
            "- Specify any constraints or requirements".to_string(),
            "- If it is multiple choice, put each choice on its own line as A) ... B) ...".to_string(),
        ];

        for reason in [
            InclusionReason::SameSection,
            InclusionReason::RelatedSection,
            InclusionReason::ContrastingSection,
        ] {
            let examples: Vec<_> = slot.examples.with_reason(reason).collect();
            if examples.is_empty() {
                continue;
            }
            parts.push(String::new());
            parts.push(format!("{}:", reason.heading()));
            for (i, example) in examples.iter().enumerate() {
                let meta = &example.question.metadata;
                parts.push(format!(
                    "Example {} (Section: {}, Marks: {}):",
                    i + 1,
                    example.canonical_section,
                    meta.marks
                ));
                parts.push(format!("Text: {}", truncate_text(&meta.text, EXAMPLE_TEXT_LIMIT)));
            }
        }

        if !slot.examples.is_empty() {
            parts.push(String::new());
            parts.push(
                "IMPORTANT: The examples show style and format only. Write a NEW question: \
                 do not reuse their scenarios, data, variable names, or wording."
                    .to_string(),
            );
        }

        if let Some(feedback) = slot.feedback.filter(|f| !f.trim().is_empty()) {
            parts.push(String::new());
            parts.push("A reviewer rejected the previous attempt with this feedback:".to_string());
            parts.push(truncate_text(feedback, 600));
            parts.push("Address the feedback in the new question.".to_string());
        }

        parts.push(String::new());
        parts.push("Generate the question in this format:".to_string());
        parts.push("Section: [section name]".to_string());
        parts.push("Marks: [number]".to_string());
        parts.push("Text: [question text]".to_string());

        Prompt::new(parts.join("\n"))
            .system(system)
            .temperature(slot.difficulty.temperature())
            .max_tokens(self.max_tokens)
    }
}

/// 平均分配总分，余数从第一个题位开始每个加 1 分
pub fn distribute_marks(total: u32, slots: usize) -> Vec<u32> {
    if slots == 0 {
        return Vec::new();
    }
    let n = slots as u32;
    let base = total / n;
    let remainder = (total % n) as usize;
    (0..slots)
        .map(|i| base + u32::from(i < remainder))
        .collect()
}

/// 解析模型回复
///
/// 有 `Text:` 标记时取最后一个标记之后的内容；字母编号的选项行拆成选项。
/// 否则整段回复作为题干，没有选项。
pub fn parse_response(
    raw: &str,
    section: &str,
    marks: u32,
    difficulty: Difficulty,
) -> GeneratedQuestion {
    let mut question = GeneratedQuestion {
        section: section.to_string(),
        marks,
        difficulty,
        is_generated: true,
        generated_date: Some(chrono::Local::now().format("%Y-%m-%d").to_string()),
        ..Default::default()
    };

    let body = match find_marker(raw, "text:") {
        Some(pos) => &raw[pos + "text:".len()..],
        None => {
            question.text = raw.trim().to_string();
            return question;
        }
    };

    let (body, explanation) = match find_marker(body, "explanation:") {
        Some(pos) => (
            &body[..pos],
            Some(body[pos + "explanation:".len()..].trim().to_string()),
        ),
        None => (body, None),
    };
    question.explanation = explanation.filter(|e| !e.is_empty());

    let choice_line = Regex::new(CHOICE_PATTERN).ok();
    let mut text_lines = Vec::new();
    let mut choices = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.to_lowercase().starts_with("section:") && text_lines.is_empty() {
            continue;
        }
        match choice_line.as_ref().and_then(|re| re.captures(line)) {
            Some(caps) if is_next_letter(&caps[1], choices.len()) => {
                choices.push(caps[2].trim().to_string());
            }
            _ if !choices.is_empty() && !line.trim().is_empty() => {
                // 选项的续行
                if let Some(last) = choices.last_mut() {
                    last.push(' ');
                    last.push_str(line.trim());
                }
            }
            _ => text_lines.push(line),
        }
    }

    if choices.len() < 2 {
        text_lines = body.lines().collect();
        choices.clear();
    }

    let text = text_lines.join("\n").trim().to_string();
    if text.is_empty() {
        question.text = raw.trim().to_string();
        question.explanation = None;
        return question;
    }

    question.text = text;
    question.answer_choices = choices;
    question
}

/// 不区分大小写查找最后一个位于行首的标记，返回标记的字节偏移
fn find_marker(haystack: &str, marker: &str) -> Option<usize> {
    let lower = haystack.to_ascii_lowercase();
    let mut found = None;
    let mut offset = 0;
    for line in lower.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        if line[indent..].starts_with(marker) {
            found = Some(offset + indent);
        }
        offset += line.len();
    }
    found
}

/// 选项必须从 A 开始连续编号
fn is_next_letter(letter: &str, index: usize) -> bool {
    letter
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase() as usize == 'A' as usize + index)
        .unwrap_or(false)
}
