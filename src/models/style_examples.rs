//! 风格示例集合
//!
//! 生成一道新题时喂给 LLM 的历史题目，每道都带有入选原因。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::question::ScoredQuestion;

/// 同章节 / 相关章节 / 对比章节的配额
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixPolicy {
    pub same: usize,
    pub related: usize,
    pub contrasting: usize,
}

impl Default for MixPolicy {
    fn default() -> Self {
        Self {
            same: 3,
            related: 1,
            contrasting: 1,
        }
    }
}

impl MixPolicy {
    pub fn new(same: usize, related: usize, contrasting: usize) -> Self {
        Self {
            same,
            related,
            contrasting,
        }
    }

    pub fn total(&self) -> usize {
        self.same + self.related + self.contrasting
    }
}

/// 入选原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionReason {
    SameSection,
    RelatedSection,
    ContrastingSection,
}

impl InclusionReason {
    /// 提示词中的分组标题
    pub fn heading(self) -> &'static str {
        match self {
            InclusionReason::SameSection => "Examples from the same section",
            InclusionReason::RelatedSection => "Examples from related sections",
            InclusionReason::ContrastingSection => "Examples from other sections (for contrast)",
        }
    }
}

impl fmt::Display for InclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InclusionReason::SameSection => "same",
            InclusionReason::RelatedSection => "related",
            InclusionReason::ContrastingSection => "contrasting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleExample {
    pub question: ScoredQuestion,
    /// 检索时计算出的规范章节
    pub canonical_section: String,
    pub reason: InclusionReason,
}

/// 一次请求的风格示例，按入选顺序排列
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StyleExampleSet {
    pub target_section: String,
    pub examples: Vec<StyleExample>,
}

impl StyleExampleSet {
    pub fn empty(target_section: impl Into<String>) -> Self {
        Self {
            target_section: target_section.into(),
            examples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn with_reason(&self, reason: InclusionReason) -> impl Iterator<Item = &StyleExample> {
        self.examples.iter().filter(move |e| e.reason == reason)
    }

    pub fn count(&self, reason: InclusionReason) -> usize {
        self.with_reason(reason).count()
    }

    pub fn ids(&self) -> Vec<String> {
        self.examples.iter().map(|e| e.question.id.clone()).collect()
    }
}
