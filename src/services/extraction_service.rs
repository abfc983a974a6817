//! PDF 题目提取服务 - 业务能力层
//!
//! 输入是已经读出来的页面文本和图片，输出是题目记录：
//! - 题目切分：优先让 LLM 返回 JSON，失败时用正则按题号切分
//! - 公式：逐行匹配数学符号
//! - 图片：JPEG 交给视觉模型描述，失败时描述留空

use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::infrastructure::{ChatModel, EmbeddedImage, PageText, Prompt};
use crate::models::{EquationRef, ExtractedQuestion, ImageRef};

/// 题目开头：`1.` / `2)` / `Question 3` / `Q4:`
const QUESTION_START: &str = r"^\s*(?:(?:Question|Q)\s*(\d{1,3})\b[\s:.)\-]*|(\d{1,3})[.)]\s+)(.*)$";
/// 选项行：`a) ...` / `(B) ...` / `c. ...`
const CHOICE_LINE: &str = r"^\s*\(?([a-hA-H])[.)]\s+(\S.*)$";
/// 数学记号
const EQUATION_LINE: &str = r"[∑√≤≥≠±×÷π∫∞]|\w\s*\^\s*[\w(]|\b[a-zA-Z]\s*\(\s*[a-zA-Z]\s*\)\s*=";

const SPLIT_SYSTEM_PROMPT: &str = "You split exam pages into individual questions. \
Reply with a JSON array only. Each element has: \
\"question_number\" (string), \"question_text\" (string), \"answer_choices\" (array of strings, empty if none). \
Keep the original wording. Ignore headers, footers and instructions that are not questions.";

const IMAGE_PROMPT: &str = "Describe this image from a programming exam in 2-3 sentences. \
Mention code, diagrams, tables or values a student would need to answer the question.";

#[derive(Debug, Deserialize)]
struct LlmQuestion {
    #[serde(default)]
    question_number: serde_json::Value,
    #[serde(default)]
    question_text: String,
    #[serde(default)]
    answer_choices: Vec<String>,
}

/// 题目提取服务
///
/// 职责：
/// - 按页切分题目
/// - 识别公式、描述图片
/// - 把图片和公式挂到对应的题目上
pub struct ExtractionService {
    /// 为 None 时只用正则切分，也不描述图片
    chat: Option<Arc<dyn ChatModel>>,
    describe_images: bool,
}

impl ExtractionService {
    pub fn new(chat: Option<Arc<dyn ChatModel>>, describe_images: bool) -> Self {
        Self {
            chat,
            describe_images,
        }
    }

    /// 切分全部页面的题目
    pub async fn split_questions(&self, pages: &[PageText], source_file: &str) -> Vec<ExtractedQuestion> {
        let Some(chat) = &self.chat else {
            return split_questions_regex(pages, source_file);
        };

        let mut questions = Vec::new();
        for page in pages {
            if page.text.trim().is_empty() {
                continue;
            }
            match self.split_page_with_llm(chat.as_ref(), page, source_file).await {
                Ok(found) => {
                    debug!("第 {} 页 LLM 切分出 {} 道题", page.page, found.len());
                    questions.extend(found);
                }
                Err(e) => {
                    warn!("⚠️ 第 {} 页 LLM 切分失败，改用正则: {:#}", page.page, e);
                    questions.extend(split_questions_regex(std::slice::from_ref(page), source_file));
                }
            }
        }
        questions
    }

    async fn split_page_with_llm(
        &self,
        chat: &dyn ChatModel,
        page: &PageText,
        source_file: &str,
    ) -> Result<Vec<ExtractedQuestion>> {
        let prompt = Prompt::new(format!("Page {}:\n\n{}", page.page, page.text))
            .system(SPLIT_SYSTEM_PROMPT)
            .temperature(0.0)
            .max_tokens(4000);
        let reply = chat.complete(&prompt).await.context("LLM 调用失败")?;
        parse_llm_questions(&reply, page.page, source_file)
    }

    /// 描述图片，失败或非 JPEG 时描述为空
    pub async fn describe(&self, images: &[EmbeddedImage]) -> Vec<ImageRef> {
        let mut refs = Vec::with_capacity(images.len());
        for image in images {
            let description = match (&self.chat, self.describe_images, image.data_url()) {
                (Some(chat), true, Some(url)) => {
                    let prompt = Prompt::new(IMAGE_PROMPT).image(url).max_tokens(300);
                    match chat.complete(&prompt).await {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("⚠️ 第 {} 页第 {} 张图片描述失败: {}", image.page, image.index, e);
                            String::new()
                        }
                    }
                }
                _ => String::new(),
            };

            refs.push(ImageRef {
                description,
                page: Some(image.page),
                index: Some(image.index),
                width: Some(image.width),
                height: Some(image.height),
                filter: image.filter.clone(),
            });
        }
        refs
    }
}

/// 解析 LLM 返回的 JSON 数组（允许包在 ``` 代码块里）
pub fn parse_llm_questions(reply: &str, page: u32, source_file: &str) -> Result<Vec<ExtractedQuestion>> {
    let start = reply.find('[').context("回复中没有 JSON 数组")?;
    let end = reply.rfind(']').context("回复中没有 JSON 数组")?;
    if end < start {
        anyhow::bail!("回复中的 JSON 数组不完整");
    }

    let items: Vec<LlmQuestion> =
        serde_json::from_str(&reply[start..=end]).context("JSON 解析失败")?;

    Ok(items
        .into_iter()
        .filter(|q| !q.question_text.trim().is_empty())
        .map(|q| ExtractedQuestion {
            question_number: match q.question_number {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            },
            question_text: q.question_text.trim().to_string(),
            answer_choices: q.answer_choices,
            source_page: page,
            source_file: source_file.to_string(),
            images: Vec::new(),
            equations: Vec::new(),
        })
        .collect())
}

/// 按题号切分，题目可以跨页延续；第一道题之前的内容（卷头）丢弃
pub fn split_questions_regex(pages: &[PageText], source_file: &str) -> Vec<ExtractedQuestion> {
    let (Ok(start_re), Ok(choice_re)) = (Regex::new(QUESTION_START), Regex::new(CHOICE_LINE)) else {
        return Vec::new();
    };

    let mut questions: Vec<ExtractedQuestion> = Vec::new();
    for page in pages {
        for line in page.text.lines() {
            if let Some(caps) = start_re.captures(line) {
                let number = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                let first_line = caps.get(3).map(|m| m.as_str().trim()).unwrap_or_default();
                questions.push(ExtractedQuestion {
                    question_number: number,
                    question_text: first_line.to_string(),
                    answer_choices: Vec::new(),
                    source_page: page.page,
                    source_file: source_file.to_string(),
                    images: Vec::new(),
                    equations: Vec::new(),
                });
                continue;
            }

            let Some(current) = questions.last_mut() else {
                continue;
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(caps) = choice_re.captures(line) {
                current.answer_choices.push(caps[2].trim().to_string());
            } else if !current.question_text.is_empty() {
                current.question_text.push('\n');
                current.question_text.push_str(trimmed);
            } else {
                current.question_text.push_str(trimmed);
            }
        }
    }
    questions
}

/// 逐行查找公式（行号从 1 开始）
pub fn find_equations(pages: &[PageText]) -> Vec<EquationRef> {
    let Ok(re) = Regex::new(EQUATION_LINE) else {
        return Vec::new();
    };
    pages
        .iter()
        .flat_map(|page| {
            page.text
                .lines()
                .enumerate()
                .filter(|(_, line)| re.is_match(line))
                .map(|(i, line)| EquationRef {
                    description: line.trim().to_string(),
                    page: Some(page.page),
                    line: Some(i + 1),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// 把图片和公式挂到题目上
///
/// 公式优先挂到题干包含该行的题目；否则和图片一样，挂到该页或之前最后开始的一道题。
pub fn attach_assets(
    questions: &mut [ExtractedQuestion],
    images: Vec<ImageRef>,
    equations: Vec<EquationRef>,
) -> usize {
    let mut orphans = 0;

    for image in images {
        match owner_by_page(questions, image.page) {
            Some(i) => questions[i].images.push(image),
            None => orphans += 1,
        }
    }

    for equation in equations {
        let by_text = questions
            .iter()
            .position(|q| q.question_text.contains(equation.description.as_str()));
        match by_text.or_else(|| owner_by_page(questions, equation.page)) {
            Some(i) => questions[i].equations.push(equation),
            None => orphans += 1,
        }
    }

    orphans
}

fn owner_by_page(questions: &[ExtractedQuestion], page: Option<u32>) -> Option<usize> {
    let page = page?;
    questions.iter().rposition(|q| q.source_page <= page)
}
