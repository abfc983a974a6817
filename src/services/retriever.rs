//! 风格示例检索 - 业务能力层
//!
//! 只负责"为一个目标章节挑出一组风格示例"，不关心生成流程。
//!
//! 挑选规则：
//! 1. 向索引要 `n` 个最相似的候选（`n` 远大于 `k`）；其中对比章节的题不足 `k`
//!    道时，再在对比章节范围内单独检索一次并合并
//! 2. 按规范章节把候选分成 同章节 / 相关章节 / 对比章节 三组
//! 3. 按配额依次填充，同组内按相似度降序；对比组轮流从不同章节取题
//! 4. 某组不足时，缺口按 同 → 相关 → 对比 的顺序顺延，仍不足就少给
//!
//! 目标章节在候选中一道同章节题都没有时，整组示例都取自对比章节。

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::infrastructure::{Embedder, VectorSearch};
use crate::models::{
    Difficulty, InclusionReason, MixPolicy, QuestionMetadata, ScoredQuestion, SectionNormalizer,
    StyleExample, StyleExampleSet,
};

/// 风格示例检索服务
///
/// 职责：
/// - 生成查询向量并向索引请求候选
/// - 按章节关系分组并按配额挑选
/// - 不生成题目，不调用 LLM
pub struct ExampleRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorSearch>,
    normalizer: Arc<SectionNormalizer>,
    candidate_pool: usize,
}

impl ExampleRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorSearch>,
        normalizer: Arc<SectionNormalizer>,
        candidate_pool: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            normalizer,
            candidate_pool,
        }
    }

    /// 索引中各规范章节的题目数
    pub fn section_counts(&self) -> BTreeMap<String, usize> {
        let raw = self.index.section_counts();
        self.normalizer.canonical_counts(&raw)
    }

    /// 为目标章节挑选至多 `k` 道风格示例
    ///
    /// `draft` 不为空时用它作查询文本，否则用章节名 + 难度描述。
    pub async fn retrieve(
        &self,
        target_section: &str,
        k: usize,
        mix: &MixPolicy,
        difficulty: Difficulty,
        draft: Option<&str>,
    ) -> Result<StyleExampleSet> {
        let target = self.normalizer.normalize(target_section);
        if k == 0 || self.index.is_empty() {
            return Ok(StyleExampleSet::empty(target));
        }

        let query = match draft.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => d.to_string(),
            None => format!("Section: {} | {}", target, difficulty.query_hint()),
        };
        let vector = self
            .embedder
            .embed(&query)
            .await
            .with_context(|| format!("查询向量生成失败: {}", target))?;

        let n = (k * 4).max(self.candidate_pool);
        let mut candidates = self
            .index
            .search(&vector, n)
            .with_context(|| format!("索引检索失败: {}", target))?;
        debug!("章节 {} 检索到 {} 个候选", target, candidates.len());

        // 相似度前 n 名被同章节 / 相关章节占满时，到其余章节里单独补对比候选
        let contrasting = |m: &QuestionMetadata| {
            let canonical = self.normalizer.normalize(&m.section);
            canonical != target && !self.normalizer.related(&canonical, &target)
        };
        let in_pool = candidates.iter().filter(|c| contrasting(&c.metadata)).count();
        if in_pool < k {
            let extra = self
                .index
                .search_where(&vector, n, &contrasting)
                .with_context(|| format!("对比章节检索失败: {}", target))?;
            let known: HashSet<String> = candidates.iter().map(|c| c.id.clone()).collect();
            let before = candidates.len();
            candidates.extend(extra.into_iter().filter(|c| !known.contains(&c.id)));
            debug!("章节 {} 补充 {} 个对比候选", target, candidates.len() - before);
        }

        let set = select_examples(&target, candidates, k, mix, &self.normalizer);
        info!(
            "🔍 章节 {}: 同章节 {} / 相关 {} / 对比 {}",
            target,
            set.count(InclusionReason::SameSection),
            set.count(InclusionReason::RelatedSection),
            set.count(InclusionReason::ContrastingSection)
        );
        Ok(set)
    }
}

/// 候选分组 + 配额挑选（纯函数）
///
/// 集合大小不超过 `min(k, mix.total())`。
pub fn select_examples(
    target: &str,
    candidates: Vec<ScoredQuestion>,
    k: usize,
    mix: &MixPolicy,
    normalizer: &SectionNormalizer,
) -> StyleExampleSet {
    let mut same = Vec::new();
    let mut related = Vec::new();
    let mut contrasting = Vec::new();
    for candidate in candidates {
        let canonical = normalizer.normalize(&candidate.metadata.section);
        let bucket = if canonical == target {
            &mut same
        } else if normalizer.related(&canonical, target) {
            &mut related
        } else {
            &mut contrasting
        };
        bucket.push((canonical, candidate));
    }
    for bucket in [&mut same, &mut related, &mut contrasting] {
        bucket.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
    }

    let budget = k.min(mix.total());
    let mut set = StyleExampleSet::empty(target);

    if same.is_empty() {
        let picked = pick_diverse(contrasting, budget);
        let remaining = budget - picked.len();
        push_all(&mut set, picked, InclusionReason::ContrastingSection);
        if set.is_empty() {
            push_all(
                &mut set,
                related.into_iter().take(remaining).collect(),
                InclusionReason::RelatedSection,
            );
        }
        return set;
    }

    let (same_quota, related_quota, contrasting_quota) = trim_quotas(mix, budget);

    let take_same = same_quota.min(same.len());
    push_all(
        &mut set,
        same.into_iter().take(take_same).collect(),
        InclusionReason::SameSection,
    );

    let related_quota = related_quota + (same_quota - take_same);
    let take_related = related_quota.min(related.len());
    push_all(
        &mut set,
        related.into_iter().take(take_related).collect(),
        InclusionReason::RelatedSection,
    );

    let contrasting_quota = contrasting_quota + (related_quota - take_related);
    let picked = pick_diverse(contrasting, contrasting_quota);
    push_all(&mut set, picked, InclusionReason::ContrastingSection);

    set
}

/// `k` 小于配额总和时，先削对比、再削相关、最后削同章节
fn trim_quotas(mix: &MixPolicy, budget: usize) -> (usize, usize, usize) {
    let same = mix.same.min(budget);
    let related = mix.related.min(budget - same);
    let contrasting = mix.contrasting.min(budget - same - related);
    (same, related, contrasting)
}

/// 轮流从不同章节取题：先取每个章节得分最高的一道，再取第二道……
fn pick_diverse(
    candidates: Vec<(String, ScoredQuestion)>,
    quota: usize,
) -> Vec<(String, ScoredQuestion)> {
    let mut groups: Vec<(String, VecDeque<(String, ScoredQuestion)>)> = Vec::new();
    for (canonical, candidate) in candidates {
        match groups.iter_mut().find(|(section, _)| *section == canonical) {
            Some((_, queue)) => queue.push_back((canonical, candidate)),
            None => {
                let section = canonical.clone();
                groups.push((section, VecDeque::from([(canonical, candidate)])));
            }
        }
    }

    let mut picked = Vec::with_capacity(quota);
    while picked.len() < quota {
        let mut progressed = false;
        for (_, queue) in groups.iter_mut() {
            if picked.len() == quota {
                break;
            }
            if let Some(item) = queue.pop_front() {
                picked.push(item);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    picked
}

fn push_all(
    set: &mut StyleExampleSet,
    items: Vec<(String, ScoredQuestion)>,
    reason: InclusionReason,
) {
    set.examples
        .extend(items.into_iter().map(|(canonical_section, question)| StyleExample {
            question,
            canonical_section,
            reason,
        }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, section: &str, score: f32) -> ScoredQuestion {
        ScoredQuestion {
            id: id.to_string(),
            metadata: QuestionMetadata {
                section: section.to_string(),
                text: format!("question {}", id),
                ..Default::default()
            },
            score,
        }
    }

    #[test]
    fn test_trim_quotas_cuts_contrasting_first() {
        let mix = MixPolicy::new(3, 1, 1);
        assert_eq!(trim_quotas(&mix, 5), (3, 1, 1));
        assert_eq!(trim_quotas(&mix, 4), (3, 1, 0));
        assert_eq!(trim_quotas(&mix, 2), (2, 0, 0));
        assert_eq!(trim_quotas(&mix, 9), (3, 1, 1));
    }

    #[test]
    fn test_same_bucket_holds_exactly_its_quota_in_score_order() {
        let normalizer = SectionNormalizer::new();
        let candidates = vec![
            candidate("s1", "Functions", 0.50),
            candidate("s2", "Function", 0.90),
            candidate("s3", "Functions", 0.70),
            candidate("s4", "functions", 0.60),
            candidate("s5", "Functions", 0.80),
            candidate("r1", "Functions and 1D Arrays", 0.40),
            candidate("c1", "Robot Programming", 0.30),
        ];
        let set = select_examples("Functions", candidates, 5, &MixPolicy::new(3, 1, 1), &normalizer);

        let same: Vec<&str> = set
            .with_reason(InclusionReason::SameSection)
            .map(|e| e.question.id.as_str())
            .collect();
        assert_eq!(same, vec!["s2", "s5", "s3"]);
        assert_eq!(set.count(InclusionReason::RelatedSection), 1);
        assert_eq!(set.count(InclusionReason::ContrastingSection), 1);
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn test_zero_same_matches_uses_only_contrasting() {
        let normalizer = SectionNormalizer::new();
        let candidates = vec![
            candidate("a", "2D Arrays", 0.9),
            candidate("b", "Robot Programming", 0.8),
            candidate("c", "Algorithms", 0.7),
            candidate("d", "Robot Programming", 0.6),
        ];
        let set = select_examples(
            "Design Thinking",
            candidates,
            5,
            &MixPolicy::default(),
            &normalizer,
        );
        assert!(!set.is_empty());
        assert!(set
            .examples
            .iter()
            .all(|e| e.reason == InclusionReason::ContrastingSection));
        // Algorithms 与 Design Thinking 相关，不能出现在对比组中
        assert!(set.examples.iter().all(|e| e.question.id != "c"));
    }

    #[test]
    fn test_shortfall_moves_to_next_bucket() {
        let normalizer = SectionNormalizer::new();
        let candidates = vec![
            candidate("s1", "2D Arrays", 0.9),
            candidate("r1", "1D Arrays", 0.8),
            candidate("r2", "2D Arrays and Functions", 0.7),
            candidate("c1", "Robot Programming", 0.6),
            candidate("c2", "Program Comprehension", 0.5),
            candidate("c3", "Robot Programming", 0.4),
        ];
        let set = select_examples("2D Arrays", candidates, 5, &MixPolicy::new(3, 1, 1), &normalizer);

        assert_eq!(set.count(InclusionReason::SameSection), 1);
        // 同章节缺 2 道顺延给相关组，相关组只有 2 道，再缺 1 道顺延给对比组
        assert_eq!(set.count(InclusionReason::RelatedSection), 2);
        assert_eq!(set.count(InclusionReason::ContrastingSection), 2);
        let contrasting: Vec<&str> = set
            .with_reason(InclusionReason::ContrastingSection)
            .map(|e| e.canonical_section.as_str())
            .collect();
        assert_eq!(contrasting, vec!["Robot Programming", "Program Comprehension"]);
    }

    #[test]
    fn test_set_may_be_smaller_than_k() {
        let normalizer = SectionNormalizer::new();
        let candidates = vec![candidate("s1", "Functions", 0.9)];
        let set = select_examples("Functions", candidates, 5, &MixPolicy::default(), &normalizer);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_pick_diverse_round_robin() {
        let items = vec![
            ("A".to_string(), candidate("a1", "A", 0.9)),
            ("A".to_string(), candidate("a2", "A", 0.8)),
            ("B".to_string(), candidate("b1", "B", 0.7)),
            ("C".to_string(), candidate("c1", "C", 0.6)),
        ];
        let picked: Vec<String> = pick_diverse(items, 4)
            .into_iter()
            .map(|(_, q)| q.id)
            .collect();
        assert_eq!(picked, vec!["a1", "b1", "c1", "a2"]);
    }
}
