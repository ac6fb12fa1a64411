//! 评分与重试策略（纯函数）
//!
//! - 评分：先匹配 `GRADE: n/100`，再退到宽松的 `grade: n`；超过 100 按 100 计
//! - 聚合：代码分与最佳图片分的整数平均（向下取整），只有一个时取该值
//! - 重试：本轮所有已评分图片变体都低于阈值，或聚合分低于阈值（且至少有一个分数）

use std::sync::OnceLock;

use regex::Regex;

use crate::config::GradingSection;

fn strict_grade() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"GRADE:\s*(\d{1,3})\s*/\s*100").expect("static regex"))
}

fn loose_grade() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)grade\s*[:=]?\s*(\d{1,3})").expect("static regex"))
}

/// 从评审文本中提取 0-100 分
pub fn extract_grade(text: &str) -> Option<u8> {
    let caps = strict_grade()
        .captures(text)
        .or_else(|| loose_grade().captures(text))?;
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(n.min(100) as u8)
}

/// 代码分与图片分的整数平均
pub fn aggregate(code: Option<u8>, art: Option<u8>) -> Option<u8> {
    match (code, art) {
        (Some(c), Some(a)) => Some(((c as u16 + a as u16) / 2) as u8),
        (Some(c), None) => Some(c),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

/// 一个图片变体及其评分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantGrade {
    pub path: String,
    pub grade: Option<u8>,
}

impl VariantGrade {
    pub fn new(path: impl Into<String>, grade: Option<u8>) -> Self {
        Self {
            path: path.into(),
            grade,
        }
    }
}

/// 一次尝试收集到的分数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptGrades {
    pub code: Option<u8>,
    pub variants: Vec<VariantGrade>,
}

impl AttemptGrades {
    pub fn best_art(&self) -> Option<u8> {
        self.variants.iter().filter_map(|v| v.grade).max()
    }

    pub fn aggregate(&self) -> Option<u8> {
        aggregate(self.code, self.best_art())
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.variants.is_empty()
    }
}

pub fn should_retry(grades: &AttemptGrades, threshold: u8) -> bool {
    let graded: Vec<u8> = grades.variants.iter().filter_map(|v| v.grade).collect();
    let all_variants_low = !graded.is_empty() && graded.iter().all(|g| *g < threshold);
    let aggregate_low = grades.aggregate().map(|a| a < threshold).unwrap_or(false);
    all_variants_low || aggregate_low
}

/// 得分最高的变体；并列取先出现的；全部未评分时取第一个
pub fn select_survivor(variants: &[VariantGrade]) -> Option<&VariantGrade> {
    let mut best: Option<&VariantGrade> = None;
    for v in variants {
        best = match best {
            None => Some(v),
            Some(b) if v.grade > b.grade => Some(v),
            keep => keep,
        };
    }
    best
}

/// 一轮评审结束后的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// 重做：本轮全部变体移入回收站
    Retry { trash: Vec<String> },
    /// 达标：只保留最佳变体
    Accept { keep: Option<String>, trash: Vec<String> },
    /// 次数用尽仍未达标：按现状接受并告警，同样只保留最佳变体
    Exhausted { keep: Option<String>, trash: Vec<String> },
}

impl RetryDecision {
    pub fn trash(&self) -> &[String] {
        match self {
            RetryDecision::Retry { trash }
            | RetryDecision::Accept { trash, .. }
            | RetryDecision::Exhausted { trash, .. } => trash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradingPolicy {
    pub threshold: u8,
    pub max_attempts: u32,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            threshold: 70,
            max_attempts: 3,
        }
    }
}

impl From<&GradingSection> for GradingPolicy {
    fn from(cfg: &GradingSection) -> Self {
        Self {
            threshold: cfg.threshold.min(100),
            max_attempts: cfg.max_attempts.max(1),
        }
    }
}

impl GradingPolicy {
    /// attempt 从 1 开始；artifacts 为本轮 coder 实际产出的图片，未被评分的也参与整理
    pub fn decide(&self, attempt: u32, grades: &AttemptGrades, artifacts: &[String]) -> RetryDecision {
        let mut candidates: Vec<VariantGrade> = artifacts
            .iter()
            .map(|path| {
                let grade = grades
                    .variants
                    .iter()
                    .find(|v| &v.path == path)
                    .and_then(|v| v.grade);
                VariantGrade::new(path.clone(), grade)
            })
            .collect();
        for v in &grades.variants {
            if !candidates.iter().any(|c| c.path == v.path) {
                candidates.push(v.clone());
            }
        }

        let all: Vec<String> = candidates.iter().map(|v| v.path.clone()).collect();
        let keep = select_survivor(&candidates).map(|v| v.path.clone());
        let others: Vec<String> = all
            .iter()
            .filter(|p| Some(*p) != keep.as_ref())
            .cloned()
            .collect();

        if !should_retry(grades, self.threshold) {
            return RetryDecision::Accept { keep, trash: others };
        }
        if attempt < self.max_attempts {
            RetryDecision::Retry { trash: all }
        } else {
            RetryDecision::Exhausted { keep, trash: others }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(grades: &[u8]) -> AttemptGrades {
        AttemptGrades {
            code: None,
            variants: grades
                .iter()
                .enumerate()
                .map(|(i, g)| VariantGrade::new(format!("v{}.png", i), Some(*g)))
                .collect(),
        }
    }

    #[test]
    fn test_extract_grade_patterns() {
        assert_eq!(extract_grade("Solid work.\nGRADE: 85/100"), Some(85));
        assert_eq!(extract_grade("GRADE: 85 / 100 but grade: 10"), Some(85));
        assert_eq!(extract_grade("Overall grade = 42"), Some(42));
        assert_eq!(extract_grade("Grade: 150"), Some(100));
        assert_eq!(extract_grade("looks fine"), None);
    }

    #[test]
    fn test_aggregate() {
        assert_eq!(aggregate(Some(80), None), Some(80));
        assert_eq!(aggregate(None, None), None);
        assert_eq!(aggregate(Some(60), Some(90)), Some(75));
        assert_eq!(aggregate(Some(70), Some(75)), Some(72));
    }

    #[test]
    fn test_should_retry_by_variants() {
        assert!(should_retry(&variants(&[50, 60, 65]), 70));
        assert!(!should_retry(&variants(&[50, 60, 75]), 70));
    }

    #[test]
    fn test_should_retry_by_aggregate() {
        let low = AttemptGrades {
            code: Some(40),
            variants: vec![VariantGrade::new("a.png", Some(90))],
        };
        assert!(should_retry(&low, 70));
        assert!(!should_retry(&AttemptGrades::default(), 70));
        let code_only = AttemptGrades {
            code: Some(69),
            variants: Vec::new(),
        };
        assert!(should_retry(&code_only, 70));
    }

    #[test]
    fn test_select_survivor_first_on_ties() {
        let v = variants(&[60, 80, 80]);
        assert_eq!(select_survivor(&v.variants).unwrap().path, "v1.png");
        assert!(select_survivor(&[]).is_none());
    }

    #[test]
    fn test_decide() {
        let policy = GradingPolicy::default();
        let low = variants(&[50, 60, 65]);
        assert_eq!(
            policy.decide(1, &low, &[]),
            RetryDecision::Retry {
                trash: vec!["v0.png".into(), "v1.png".into(), "v2.png".into()]
            }
        );
        assert_eq!(
            policy.decide(3, &low, &[]),
            RetryDecision::Exhausted {
                keep: Some("v2.png".into()),
                trash: vec!["v0.png".into(), "v1.png".into()]
            }
        );
        assert_eq!(
            policy.decide(1, &variants(&[50, 90]), &[]),
            RetryDecision::Accept {
                keep: Some("v1.png".into()),
                trash: vec!["v0.png".into()]
            }
        );
    }

    #[test]
    fn test_decide_covers_ungraded_artifacts() {
        let policy = GradingPolicy::default();
        let artifacts = vec!["a.png".to_string(), "b.png".to_string()];
        let code_low = AttemptGrades {
            code: Some(30),
            variants: Vec::new(),
        };
        assert_eq!(
            policy.decide(1, &code_low, &artifacts),
            RetryDecision::Retry {
                trash: artifacts.clone()
            }
        );

        let code_ok = AttemptGrades {
            code: Some(90),
            variants: Vec::new(),
        };
        assert_eq!(
            policy.decide(1, &code_ok, &artifacts),
            RetryDecision::Accept {
                keep: Some("a.png".into()),
                trash: vec!["b.png".into()]
            }
        );

        // 已评分的变体优先于未评分的
        let partly = AttemptGrades {
            code: None,
            variants: vec![VariantGrade::new("b.png", Some(80))],
        };
        assert_eq!(
            policy.decide(1, &partly, &artifacts),
            RetryDecision::Accept {
                keep: Some("b.png".into()),
                trash: vec!["a.png".into()]
            }
        );
    }
}
