//! # Exam Generator
//!
//! 从历史试卷 PDF 中提取题目，建立向量索引，再按风格示例生成新的练习试卷
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有外部资源，只暴露能力
//! - `OpenAiChat` / `OpenAiEmbedder` - 对话与向量化接口
//! - `FlatIndex` - 落盘的向量索引
//! - `PdfReader` - 文本层、OCR、页面图片
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `ExtractionService` - 切题、找公式、描述图片
//! - `IngestService` - 题库与生成题入库
//! - `ExampleRetriever` - 按 同 / 相关 / 对比 章节配额挑选风格示例
//! - `QuestionGenerator` / `QuestionCritic` - 出题与评审
//! - `WarnWriter` - 写 warn.txt 能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个题位"的完整处理流程
//! - `SlotCtx` - 上下文封装（题位序号 + 章节 + 分值）
//! - `SlotFlow` - 生成 → 评审 → 带意见重试，次数用完强制接受
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 子命令分发与依赖组装
//! - `orchestrator/batch_extractor` - 批量 PDF 提取
//! - `orchestrator/exam_builder` - 整卷规划、调度与评估
//!
//! ## 模块结构

pub mod cli;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{
    Difficulty, ExamGenerationRequest, GeneratedExam, GeneratedQuestion, MixPolicy,
    SectionNormalizer, StyleExampleSet,
};
pub use orchestrator::{App, ExamBuilder};
pub use services::ExampleRetriever;
pub use workflow::{SlotCtx, SlotFlow, SlotOutcome};
