//! 评分与重试：从评审文本提取分数、决定是否重做、整理图片变体

pub mod curation;
pub mod policy;

pub use curation::{trash_artifacts, CurationReport};
pub use policy::{
    aggregate, extract_grade, select_survivor, should_retry, AttemptGrades, GradingPolicy,
    RetryDecision, VariantGrade,
};
