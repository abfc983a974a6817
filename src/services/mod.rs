pub mod critic;
pub mod extraction_service;
pub mod generator;
pub mod ingest_service;
pub mod retriever;
pub mod warn_writer;

pub use critic::{parse_score, ExamEvaluation, QuestionCritic, Verdict};
pub use extraction_service::ExtractionService;
pub use generator::{distribute_marks, QuestionGenerator, SlotRequest};
pub use ingest_service::{IngestService, IngestStats};
pub use retriever::{select_examples, ExampleRetriever};
pub use warn_writer::WarnWriter;
