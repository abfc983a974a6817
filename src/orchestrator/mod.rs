//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责组装依赖和调度流程，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 按子命令创建客户端、索引和服务
//! - 区分致命错误（缺少 API Key、输入路径不存在）和可降级错误
//! - 输出全局统计信息
//!
//! ### `batch_extractor` - 批量 PDF 提取
//! - 遍历 PDF 文件，逐份提取题目、图片、公式
//! - 单份失败写入 warn.txt 并继续
//! - 输出每份 PDF 的 JSON 和汇总 JSON
//!
//! ### `exam_builder` - 试卷生成
//! - 规划章节和分值，逐题位检索示例
//! - 委托 `SlotFlow` 完成 生成 → 评审 → 重试
//! - 汇总整卷评估，写出试卷 JSON
//!
//! ## 层次关系
//!
//! ```text
//! app (处理子命令)
//!     ↓
//! batch_extractor (Vec<Pdf>)      exam_builder (Vec<Slot>)
//!     ↓                               ↓
//!     ↓                           workflow::SlotFlow (处理单个题位)
//!     ↓                               ↓
//! services (能力层：extraction / ingest / retriever / generator / critic / warn)
//!     ↓
//! infrastructure (基础设施：OpenAiChat / OpenAiEmbedder / FlatIndex / PdfReader)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：app 管依赖，batch_extractor 管 PDF，exam_builder 管整卷
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod app;
pub mod batch_extractor;
pub mod exam_builder;

// 重新导出主要类型
pub use app::App;
pub use batch_extractor::{collect_pdfs, BatchExtractor, ExtractionStats};
pub use exam_builder::{assign_sections, write_exam, ExamBuild, ExamBuilder};
