use crate::question::{AnswerOption, UNKNOWN_ANSWER};

/// Swappable voice-to-answer strategy. Implementations must be pure and
/// side-effect-free so they can be tested against literal transcripts.
pub trait MatchStrategy: Send + Sync {
    fn match_answer(&self, transcript: &str, options: &[AnswerOption]) -> Option<i32>;
}

// Spoken phrases naming an option by position, 0-based. STT frequently emits
// homophones ("일번" for "1번"), so each slot carries several spellings.
const ORDINALS: [&[&str]; 5] = [
    &["1번", "일번", "첫번째", "첫번", "하나", "원"],
    &["2번", "이번", "두번째", "두번", "둘", "투"],
    &["3번", "삼번", "세번째", "세번", "셋", "쓰리"],
    &["4번", "사번", "네번째", "네번", "넷", "포"],
    &["5번", "오번", "다섯번째", "다섯번", "다섯", "파이브"],
];

// "I don't know / pass" bucket. Maps to the -1 option when the question has
// one; otherwise it is not a match at all.
const UNKNOWN_PHRASES: &[&str] = &[
    "모름",
    "몰라",
    "마지막",
    "모르겠는데",
    "모르겠어",
    "모르겠",
    "잘모르",
    "전혀모르",
    "아직모르",
    "글쎄",
    "확실하지않",
    "확실치않",
    "기억안",
    "기억이안",
    "생각안",
    "가물가물",
    "패스",
    "넘어가",
    "답변불가",
    "알수없",
];

// Generic response banks pulled in by label polarity.
const NEGATIVE_RESPONSES: &[&str] = &[
    "아니", "아니요", "노", "no", "never", "아뇨", "안해", "안피워", "안펴", "끊었어", "없어",
    "안먹어",
];
const AFFIRMATIVE_RESPONSES: &[&str] = &[
    "네", "예", "응", "어", "yes", "맞아", "그렇", "오케이", "ok", "피워", "피움", "펴", "함",
    "해", "있어",
];
const SOMETIMES_RESPONSES: &[&str] = &["중간", "그저", "때때로"];
const OFTEN_RESPONSES: &[&str] = &["종종", "빈번", "많이"];

// Label fragments that trigger each expansion.
const NEGATIVE_LABEL_HINTS: &[&str] = &["않음", "없음", "안함", "비흡연", "전혀", "아니"];
const AFFIRMATIVE_LABEL_HINTS: &[&str] = &["피움", "흡연", "합니다", "있음", "매우", "자주"];

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Default keyword/substring matcher. Priority order: ordinal phrases first
/// (position beats label, so "2번" never accidentally hits a label), then the
/// unknown bucket, then per-option label/keyword sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMatcher;

impl MatchStrategy for KeywordMatcher {
    fn match_answer(&self, transcript: &str, options: &[AnswerOption]) -> Option<i32> {
        let text = normalize(transcript);
        if text.is_empty() || options.is_empty() {
            return None;
        }

        for (idx, phrases) in ORDINALS.iter().enumerate() {
            // Ordinal positions past the available options are ignored.
            if idx >= options.len() {
                continue;
            }
            if phrases.iter().any(|p| text.contains(p)) {
                return Some(options[idx].value);
            }
        }

        if UNKNOWN_PHRASES.iter().any(|p| text.contains(p)) {
            if let Some(opt) = options.iter().find(|o| o.value == UNKNOWN_ANSWER) {
                return Some(opt.value);
            }
        }

        for opt in options {
            if candidate_keywords(opt).iter().any(|k| text.contains(k)) {
                return Some(opt.value);
            }
        }

        None
    }
}

fn candidate_keywords(opt: &AnswerOption) -> Vec<String> {
    let label = normalize(&opt.label);
    let mut keywords = vec![label.clone()];
    keywords.extend(opt.keywords.iter().map(|k| normalize(k)));

    if NEGATIVE_LABEL_HINTS.iter().any(|h| label.contains(h)) {
        keywords.extend(NEGATIVE_RESPONSES.iter().map(|s| s.to_string()));
    }
    if AFFIRMATIVE_LABEL_HINTS.iter().any(|h| label.contains(h)) {
        keywords.extend(AFFIRMATIVE_RESPONSES.iter().map(|s| s.to_string()));
    }
    if label.contains("가끔") || label.contains("보통") {
        keywords.extend(SOMETIMES_RESPONSES.iter().map(|s| s.to_string()));
    }
    if label.contains("자주") {
        keywords.extend(OFTEN_RESPONSES.iter().map(|s| s.to_string()));
    }

    keywords.retain(|k| !k.is_empty());
    keywords
}

const NEXT_COMMANDS: &[&str] = &["다음", "넘어", "넥스트"];

/// Whether the transcript asks to advance to the next question. The caller
/// must apply any matched answer value before acting on this, so "4번 다음"
/// answers and advances in a single utterance.
pub fn contains_next_command(transcript: &str) -> bool {
    let text = normalize(transcript);
    NEXT_COMMANDS.iter().any(|c| text.contains(c))
}
