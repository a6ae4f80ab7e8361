use crate::question::{QuestionBank, QuestionRecord, UNKNOWN_ANSWER};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Mutable per-session answer sheet. One slot per question, positionally
/// aligned with the bank; `None` until the respondent answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: SessionId,
    pub answers: Vec<Option<i32>>,
    pub active: usize,
    pub live_transcript: String,
}

impl SessionState {
    pub fn new(question_count: usize) -> Self {
        Self {
            id: SessionId::new(),
            answers: vec![None; question_count],
            active: 0,
            live_transcript: String::new(),
        }
    }

    pub fn set_answer(&mut self, index: usize, value: i32) -> bool {
        match self.answers.get_mut(index) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    pub fn answer(&self, index: usize) -> Option<i32> {
        self.answers.get(index).copied().flatten()
    }

    /// Moving to a new question always clears the live transcript so stale
    /// speech never shows under the next question.
    pub fn set_active(&mut self, index: usize) {
        self.active = index;
        self.live_transcript.clear();
    }

    pub fn set_live_transcript(&mut self, text: impl Into<String>) {
        self.live_transcript = text.into();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyItem {
    pub index: usize,
    pub question_id: u32,
    pub category: String,
    pub text: String,
    pub answer: Option<i32>,
}

/// Aggregated outcome of a finished session. "Unknown" (-1) answers count as
/// answered but are excluded from both the sum and the mean denominator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResult {
    pub session_id: SessionId,
    pub total_questions: usize,
    pub answered_count: usize,
    pub sum: i64,
    pub mean: Option<f64>,
    pub per_question: Vec<SurveyItem>,
    pub raw_answers: Vec<Option<i32>>,
}

pub fn summarize(id: SessionId, bank: &QuestionBank, answers: &[Option<i32>]) -> SurveyResult {
    let mut answered_count = 0usize;
    let mut sum = 0i64;
    let mut scored = 0usize;

    for answer in answers.iter().copied().flatten() {
        answered_count += 1;
        if answer != UNKNOWN_ANSWER {
            sum += i64::from(answer);
            scored += 1;
        }
    }

    let per_question = bank
        .iter()
        .enumerate()
        .map(|(index, q): (usize, &QuestionRecord)| SurveyItem {
            index,
            question_id: q.id,
            category: q.category.clone(),
            text: q.text.clone(),
            answer: answers.get(index).copied().flatten(),
        })
        .collect();

    SurveyResult {
        session_id: id,
        total_questions: bank.len(),
        answered_count,
        sum,
        mean: (scored > 0).then(|| sum as f64 / scored as f64),
        per_question,
        raw_answers: answers.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{AnswerType, QuestionRecord};

    fn bank(n: u32) -> QuestionBank {
        QuestionBank::new(
            (1..=n)
                .map(|id| QuestionRecord {
                    id,
                    category: "general".into(),
                    answer_type: AnswerType::Scale,
                    text: format!("질문 {id}"),
                    options: Vec::new(),
                    dependency: None,
                    is_reverse: false,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn unknown_answers_count_as_answered_but_not_scored() {
        let bank = bank(4);
        let answers = vec![Some(4), Some(UNKNOWN_ANSWER), Some(2), None];
        let result = summarize(SessionId::new(), &bank, &answers);

        assert_eq!(result.answered_count, 3);
        assert_eq!(result.sum, 6);
        assert_eq!(result.mean, Some(3.0));
        assert_eq!(result.per_question.len(), 4);
        assert_eq!(result.per_question[3].answer, None);
    }

    #[test]
    fn all_unknown_yields_no_mean() {
        let bank = bank(2);
        let answers = vec![Some(UNKNOWN_ANSWER), Some(UNKNOWN_ANSWER)];
        let result = summarize(SessionId::new(), &bank, &answers);

        assert_eq!(result.answered_count, 2);
        assert_eq!(result.sum, 0);
        assert_eq!(result.mean, None);
    }

    #[test]
    fn changing_active_clears_live_transcript() {
        let mut s = SessionState::new(3);
        s.set_live_transcript("네 그렇습니다");
        s.set_active(1);
        assert!(s.live_transcript.is_empty());
        assert_eq!(s.active, 1);
    }

    #[test]
    fn set_answer_rejects_out_of_range() {
        let mut s = SessionState::new(2);
        assert!(s.set_answer(1, 5));
        assert!(!s.set_answer(2, 5));
        assert_eq!(s.answer(1), Some(5));
        assert_eq!(s.answer(0), None);
    }
}
