//! 向量索引 - 基础设施层
//!
//! 最简单的实现：所有记录放在内存里，暴力计算余弦相似度，整体序列化成一个
//! JSON 文件持久化。题库规模在几百道题的量级，这已经足够。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult, IndexError};
use crate::models::question::{QuestionMetadata, ScoredQuestion};

/// 相似度检索能力
pub trait VectorSearch: Send + Sync {
    /// 返回最相似的 `k` 条记录，按分数降序
    fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<ScoredQuestion>> {
        self.search_where(query, k, &|_| true)
    }

    /// 只在 `keep` 接受的记录中检索
    fn search_where(
        &self,
        query: &[f32],
        k: usize,
        keep: &dyn Fn(&QuestionMetadata) -> bool,
    ) -> AppResult<Vec<ScoredQuestion>>;

    /// 按原始章节标签统计题目数量
    fn section_counts(&self) -> BTreeMap<String, usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 索引中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    /// 向量化时使用的原文
    pub document: String,
    pub metadata: QuestionMetadata,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    collection: String,
    records: Vec<IndexRecord>,
}

/// 持久化为 JSON 的暴力检索索引
#[derive(Debug)]
pub struct FlatIndex {
    path: PathBuf,
    collection: String,
    records: Vec<IndexRecord>,
}

impl FlatIndex {
    /// 打开已有集合，文件不存在或集合名不一致都视为集合不存在
    pub fn open(path: impl AsRef<Path>, collection: &str) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.display().to_string();
        let not_found = || {
            AppError::from(IndexError::CollectionNotFound {
                collection: collection.to_string(),
                path: path_str.clone(),
            })
        };

        if !path.exists() {
            return Err(not_found());
        }
        let content =
            std::fs::read_to_string(&path).map_err(|e| AppError::file_read_failed(&path_str, e))?;
        let file: IndexFile =
            serde_json::from_str(&content).map_err(|e| AppError::json_parse_failed(&path_str, e))?;
        if file.collection != collection {
            return Err(not_found());
        }

        debug!("打开索引 {}：{} 条记录", path_str, file.records.len());
        Ok(Self {
            path,
            collection: file.collection,
            records: file.records,
        })
    }

    /// 集合不存在时返回 `None`；文件损坏等其他错误照常返回
    pub fn open_if_exists(path: impl AsRef<Path>, collection: &str) -> AppResult<Option<Self>> {
        match Self::open(path, collection) {
            Ok(index) => Ok(Some(index)),
            Err(AppError::Index(IndexError::CollectionNotFound { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 新建（或清空）集合，调用 `save` 之前不会写盘
    pub fn create(path: impl AsRef<Path>, collection: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            collection: collection.to_string(),
            records: Vec::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    /// 追加一条记录，同 id 的旧记录会被替换
    pub fn add(&mut self, record: IndexRecord) -> AppResult<()> {
        if let Some(first) = self.records.first() {
            if first.embedding.len() != record.embedding.len() {
                return Err(IndexError::DimensionMismatch {
                    expected: first.embedding.len(),
                    actual: record.embedding.len(),
                }
                .into());
            }
        }
        self.records.retain(|r| r.id != record.id);
        self.records.push(record);
        Ok(())
    }

    /// 写入磁盘，自动创建父目录
    pub fn save(&self) -> AppResult<()> {
        let path_str = self.path.display().to_string();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::file_write_failed(&path_str, e))?;
        }

        let file = IndexFile {
            collection: self.collection.clone(),
            records: self.records.clone(),
        };
        let json = serde_json::to_string(&file).map_err(|e| AppError::json_parse_failed(&path_str, e))?;
        std::fs::write(&self.path, json).map_err(|e| AppError::file_write_failed(&path_str, e))?;

        info!("💾 索引已保存: {} ({} 条记录)", path_str, self.records.len());
        Ok(())
    }
}

impl VectorSearch for FlatIndex {
    fn search_where(
        &self,
        query: &[f32],
        k: usize,
        keep: &dyn Fn(&QuestionMetadata) -> bool,
    ) -> AppResult<Vec<ScoredQuestion>> {
        if let Some(first) = self.records.first() {
            if first.embedding.len() != query.len() {
                return Err(IndexError::DimensionMismatch {
                    expected: first.embedding.len(),
                    actual: query.len(),
                }
                .into());
            }
        }

        let mut scored: Vec<ScoredQuestion> = self
            .records
            .iter()
            .filter(|r| keep(&r.metadata))
            .map(|r| ScoredQuestion {
                id: r.id.clone(),
                metadata: r.metadata.clone(),
                score: cosine_sim(query, &r.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(k);
        Ok(scored)
    }

    fn section_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.records {
            *counts.entry(r.metadata.section.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// 余弦相似度，任一向量为零向量时返回 0
pub fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0f32;
    let mut na = 0f32;
    let mut nb = 0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, section: &str, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            embedding,
            document: format!("Section: {}", section),
            metadata: QuestionMetadata {
                section: section.to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_cosine_sim() {
        assert!((cosine_sim(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_sim(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_sim(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_descending_score() {
        let mut index = FlatIndex::create("unused.json", "exam_questions");
        index.add(record("a", "Functions", vec![0.0, 1.0])).unwrap();
        index.add(record("b", "1D Arrays", vec![1.0, 0.0])).unwrap();
        index.add(record("c", "2D Arrays", vec![0.7, 0.7])).unwrap();

        let hits = index.search(&[1.0, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[1].id, "c");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_search_where_skips_rejected_records() {
        let mut index = FlatIndex::create("unused.json", "exam_questions");
        index.add(record("a", "Functions", vec![1.0, 0.0])).unwrap();
        index.add(record("b", "Functions", vec![0.9, 0.1])).unwrap();
        index.add(record("c", "Robot Programming", vec![0.0, 1.0])).unwrap();

        let hits = index
            .search_where(&[1.0, 0.0], 1, &|m| m.section != "Functions")
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c");
    }

    #[test]
    fn test_add_rejects_dimension_mismatch_and_replaces_same_id() {
        let mut index = FlatIndex::create("unused.json", "c");
        index.add(record("a", "Functions", vec![1.0, 0.0])).unwrap();
        assert!(index.add(record("b", "Functions", vec![1.0])).is_err());

        index.add(record("a", "Algorithms", vec![0.0, 1.0])).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.section_counts().get("Algorithms"), Some(&1));
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("index.json");

        let mut index = FlatIndex::create(&path, "exam_questions");
        index.add(record("a", "Functions", vec![1.0, 0.0])).unwrap();
        index.save().unwrap();

        let reopened = FlatIndex::open(&path, "exam_questions").unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(FlatIndex::open_if_exists(&path, "exam_questions").unwrap().is_some());
        assert!(FlatIndex::open_if_exists(&path, "other").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_index_is_not_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(FlatIndex::open_if_exists(&path, "exam_questions").is_err());
        assert!(FlatIndex::open_if_exists(dir.path().join("absent.json"), "exam_questions")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_open_missing_collection() {
        let err = FlatIndex::open("missing/index.json", "exam_questions").unwrap_err();
        assert!(err.to_string().contains("exam_questions"));
    }
}
