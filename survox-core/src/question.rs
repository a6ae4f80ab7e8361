use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Answer value reserved for "unknown / decline to answer".
pub const UNKNOWN_ANSWER: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerType {
    Scale,
    YesNo,
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub value: i32,
    pub label: String,

    // Extra spoken phrases that count as selecting this option, on top of the
    // label itself and the polarity expansions the matcher infers.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl AnswerOption {
    pub fn new(value: i32, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyValue {
    One(i32),
    Any(Vec<i32>),
}

impl DependencyValue {
    pub fn accepts(&self, answer: i32) -> bool {
        match self {
            DependencyValue::One(v) => *v == answer,
            DependencyValue::Any(vs) => vs.contains(&answer),
        }
    }
}

/// A question is only administrable if the referenced question's recorded
/// answer matches `answer_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub target_id: u32,
    pub answer_value: DependencyValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: u32,
    pub category: String,
    pub answer_type: AnswerType,
    pub text: String,

    // Empty means "use the default scale option set".
    #[serde(default)]
    pub options: Vec<AnswerOption>,

    #[serde(default)]
    pub dependency: Option<Dependency>,

    // Scoring-direction flag; irrelevant to turn taking.
    #[serde(default)]
    pub is_reverse: bool,
}

impl QuestionRecord {
    pub fn effective_options(&self) -> &[AnswerOption] {
        if self.options.is_empty() {
            default_options()
        } else {
            &self.options
        }
    }
}

/// The 5-point scale plus the "unknown" entry, used when a question supplies
/// no option set of its own.
pub fn default_options() -> &'static [AnswerOption] {
    static OPTS: OnceLock<Vec<AnswerOption>> = OnceLock::new();
    OPTS.get_or_init(|| {
        vec![
            AnswerOption::new(1, "전혀 그렇지 않다"),
            AnswerOption::new(2, "거의 그렇지 않다"),
            AnswerOption::new(3, "가끔 그렇다"),
            AnswerOption::new(4, "자주 그렇다"),
            AnswerOption::new(5, "매우 그렇다"),
            AnswerOption::new(UNKNOWN_ANSWER, "잘 모르겠음"),
        ]
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BankError {
    #[error("question bank is empty")]
    Empty,

    #[error("duplicate question id {0}")]
    DuplicateId(u32),

    #[error("question {id} depends on unknown question {target}")]
    UnknownDependencyTarget { id: u32, target: u32 },

    #[error("question {id} depends on question {target} which comes after it")]
    ForwardDependency { id: u32, target: u32 },
}

/// The ordered, immutable question sequence for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBank {
    questions: Vec<QuestionRecord>,
}

impl QuestionBank {
    pub fn new(questions: Vec<QuestionRecord>) -> Result<Self, BankError> {
        if questions.is_empty() {
            return Err(BankError::Empty);
        }

        let mut seen: HashMap<u32, usize> = HashMap::new();
        for (pos, q) in questions.iter().enumerate() {
            if seen.insert(q.id, pos).is_some() {
                return Err(BankError::DuplicateId(q.id));
            }
        }

        for q in &questions {
            if let Some(dep) = &q.dependency {
                match seen.get(&dep.target_id) {
                    None => {
                        return Err(BankError::UnknownDependencyTarget {
                            id: q.id,
                            target: dep.target_id,
                        });
                    }
                    Some(&target_pos) if target_pos >= seen[&q.id] => {
                        return Err(BankError::ForwardDependency {
                            id: q.id,
                            target: dep.target_id,
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(Self { questions })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QuestionRecord> {
        self.questions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestionRecord> {
        self.questions.iter()
    }

    fn position_of(&self, id: u32) -> Option<usize> {
        self.questions.iter().position(|q| q.id == id)
    }

    /// Whether the question at `index` should be administered given the
    /// answers recorded so far. Pure and deterministic; re-evaluate whenever
    /// an answer changes.
    pub fn administrable(&self, answers: &[Option<i32>], index: usize) -> bool {
        let Some(q) = self.questions.get(index) else {
            return false;
        };
        let Some(dep) = &q.dependency else {
            return true;
        };
        let Some(target_pos) = self.position_of(dep.target_id) else {
            return false;
        };
        matches!(answers.get(target_pos), Some(Some(v)) if dep.answer_value.accepts(*v))
    }

    /// First administrable index strictly after `from`.
    pub fn next_administrable(&self, answers: &[Option<i32>], from: usize) -> Option<usize> {
        ((from + 1)..self.questions.len()).find(|&i| self.administrable(answers, i))
    }

    /// Last administrable index strictly before `from`.
    pub fn prev_administrable(&self, answers: &[Option<i32>], from: usize) -> Option<usize> {
        (0..from.min(self.questions.len()))
            .rev()
            .find(|&i| self.administrable(answers, i))
    }

    pub fn first_administrable(&self, answers: &[Option<i32>]) -> Option<usize> {
        (0..self.questions.len()).find(|&i| self.administrable(answers, i))
    }
}
