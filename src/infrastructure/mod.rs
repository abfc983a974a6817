//! 基础设施层
//!
//! 持有外部资源（HTTP 客户端、索引文件、PDF 文件、OCR 命令），只暴露能力，
//! 不认识试卷生成流程。

pub mod embedder;
pub mod llm_client;
pub mod pdf_reader;
pub mod vector_store;

pub use embedder::{Embedder, OpenAiEmbedder};
pub use llm_client::{ChatModel, OpenAiChat, Prompt};
pub use pdf_reader::{EmbeddedImage, PageText, PdfReader, TextSource};
pub use vector_store::{cosine_sim, FlatIndex, IndexRecord, VectorSearch};
