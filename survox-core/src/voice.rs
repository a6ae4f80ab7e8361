use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A synthesis voice as reported by the platform backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub lang: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderPreference {
    Any,
    Female,
    Male,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePreferences {
    pub lang: String,
    pub gender: GenderPreference,
    pub rate: f32,
    pub pitch: f32,
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self {
            lang: "ko-KR".to_string(),
            gender: GenderPreference::Female,
            rate: 1.0,
            pitch: 1.08,
        }
    }
}

fn preferred_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)wavenet|natural|neural").expect("valid voice quality regex"))
}

fn korean_hint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)korean|ko-kr|한국").expect("valid korean hint regex"))
}

fn avoid_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)robot|test|default").expect("valid avoid-list regex"))
}

fn female_hint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)female|여성|woman|girl|sunhi|yuna|narae|yujin|mina|jiyoon|heami")
            .expect("valid female hint regex")
    })
}

fn male_hint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)male|남성|man|boy|minsik|woo|jihun|jun").expect("valid male hint regex"))
}

fn lang_prefix(lang: &str) -> &str {
    lang.split(['-', '_']).next().unwrap_or(lang)
}

/// Quality/fit score for a candidate voice. Higher is better; used by
/// [`choose_voice`] and exposed for diagnostics.
pub fn score_voice(voice: &VoiceInfo, prefs: &VoicePreferences) -> i32 {
    let mut score = 0;

    if voice.lang.eq_ignore_ascii_case(&prefs.lang) {
        score += 10;
    } else if lang_prefix(&voice.lang).eq_ignore_ascii_case(lang_prefix(&prefs.lang)) {
        score += 6;
    }

    if preferred_name_re().is_match(&voice.name) {
        score += 6;
    }
    if korean_hint_re().is_match(&voice.name) {
        score += 3;
    }
    if avoid_name_re().is_match(&voice.name) {
        score -= 5;
    }

    match prefs.gender {
        GenderPreference::Female if female_hint_re().is_match(&voice.name) => score += 4,
        GenderPreference::Male if male_hint_re().is_match(&voice.name) => score += 4,
        _ => {}
    }

    score
}

/// Picks the best available voice for the preferences. Falls back to any
/// same-language voice, then to the first voice in the list; returns None
/// only when the list is empty.
pub fn choose_voice<'a>(voices: &'a [VoiceInfo], prefs: &VoicePreferences) -> Option<&'a VoiceInfo> {
    let mut ranked: Vec<&VoiceInfo> = voices.iter().collect();
    ranked.sort_by_key(|v| std::cmp::Reverse(score_voice(v, prefs)));

    ranked
        .iter()
        .find(|v| lang_prefix(&v.lang).eq_ignore_ascii_case(lang_prefix(&prefs.lang)))
        .copied()
        .or_else(|| ranked.first().copied())
}

fn leading_numbering_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\d.\s]+").expect("valid numbering regex"))
}

fn question_pause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(습니까|있습니까|있나요|했나요|했습니까)([^\s])").expect("valid pause regex"))
}

/// Sino-Korean numeral for the spoken question number.
pub fn korean_numeral(n: usize) -> String {
    const DIGITS: [&str; 10] = ["영", "일", "이", "삼", "사", "오", "육", "칠", "팔", "구"];
    match n {
        0..=9 => DIGITS[n].to_string(),
        10 => "십".to_string(),
        // Past ten the numeral compounds get irregular; digits read fine.
        _ => n.to_string(),
    }
}

/// Rewrites raw question text into a TTS-friendly utterance: strips any
/// numbering the text already carries, announces the question number, inserts
/// a breathing pause after interrogative endings, and closes with a period so
/// the engine drops its pitch at the end.
pub fn shape_utterance(text: &str, question_index: usize) -> String {
    let stripped = leading_numbering_re().replace(text.trim(), "");
    let paused = question_pause_re().replace_all(&stripped, "$1, $2");

    let mut shaped = format!("{}번 문항, {}", korean_numeral(question_index + 1), paused);
    if !shaped.ends_with(['.', '?', '!']) {
        shaped.push('.');
    }
    shaped
}
