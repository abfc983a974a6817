pub mod json_loader;

pub use json_loader::{load_generated_questions, load_question_bank};
