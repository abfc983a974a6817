pub mod loaders;
pub mod question;
pub mod section;
pub mod style_examples;

pub use loaders::{load_generated_questions, load_question_bank};
pub use question::{
    Difficulty, EquationRef, Exam, ExamGenerationRequest, ExamMetadata, ExtractedQuestion,
    GeneratedExam, GeneratedQuestion, ImageRef, Question, QuestionMetadata, ScoredQuestion,
};
pub use section::{SectionNormalizer, DEFAULT_SECTIONS};
pub use style_examples::{InclusionReason, MixPolicy, StyleExample, StyleExampleSet};
