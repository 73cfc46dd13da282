//! Allergen-notice splitting for raw ingredient text.
//!
//! Three stages, each conservative about what it removes:
//! 1. cut everything from the earliest sentence-style notice marker onward;
//! 2. strip a trailing "<allergen>[, <allergen>]* 함유/포함" clause, but only
//!    when a separator precedes it (an allergen word glued onto a real
//!    ingredient name is left alone);
//! 3. re-scan comma/slash tokens and drop a 함유/포함 token only when every
//!    remaining word is a known allergen term.

use regex::Regex;
use std::sync::OnceLock;

/// Sentence-style notice markers; the earliest occurrence cuts the text.
const CUT_MARKERS: [&str; 10] = [
    "알레르기",
    "알레르기 유발",
    "알레르기유발",
    "알레르겐",
    "이 제품은",
    "본 제품은",
    "같은 제조시설",
    "교차오염",
    "함유되어",
    "함유되어있",
];

/// Closed set of label allergen terms.
const ALLERGEN_WORDS: [&str; 23] = [
    "메밀", "밀", "대두", "호두", "땅콩", "잣", "계란", "난류", "우유", "토마토", "새우",
    "게", "오징어", "고등어", "조개류", "굴", "전복", "홍합", "복숭아", "돼지고기", "쇠고기",
    "닭고기", "아황산류",
];

fn tail_clause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let words = ALLERGEN_WORDS.join("|");
        let pattern = format!(
            r"(?:^|[,/]\s*)(?:{words})(?:\s*[,/]\s*(?:{words}))*\s*(?:함유|포함)\s*$",
            words = words
        );
        Regex::new(&pattern).unwrap()
    })
}

fn edge_char(c: char) -> bool {
    matches!(c, ' ' | ',' | '.' | ';' | ':' | '/')
}

/// Split raw ingredient text into (cleaned ingredients, allergen notice).
pub fn split_allergen_notice(text: Option<&str>) -> (Option<String>, Option<String>) {
    let original = text.map(str::trim).unwrap_or("");
    if original.is_empty() {
        return (None, None);
    }
    let mut value = original.to_string();

    let mut cut_idx: Option<usize> = None;
    for marker in CUT_MARKERS {
        if let Some(idx) = value.find(marker) {
            cut_idx = Some(cut_idx.map_or(idx, |earliest| earliest.min(idx)));
        }
    }
    let mut marker_removed: Option<String> = None;
    if let Some(idx) = cut_idx {
        let removed = value[idx..].trim_matches(edge_char).to_string();
        marker_removed = (!removed.is_empty()).then_some(removed);
        value = value[..idx].trim_end_matches(edge_char).to_string();
    }

    let mut tail_removed: Option<String> = None;
    if let Some(m) = tail_clause_re().find(&value) {
        let removed = value[m.start()..].trim_matches(edge_char).to_string();
        tail_removed = (!removed.is_empty()).then_some(removed);
        value = value[..m.start()].trim_end_matches(edge_char).to_string();
    }

    let mut kept: Vec<String> = Vec::new();
    let mut removed_tokens: Vec<String> = Vec::new();
    for part in value.split([',', '/']) {
        let token = part.trim();
        if token.is_empty() {
            continue;
        }
        let compact: String = token.chars().filter(|c| *c != ' ').collect();
        if compact.contains("함유") || compact.contains("포함") {
            // Digits, percentages, or parentheses mark a likely real
            // ingredient; keep it even with the suffix.
            let looks_real = compact.chars().any(|c| c.is_ascii_digit())
                || compact.contains('%')
                || compact.contains('(')
                || compact.contains(')');
            if !looks_real {
                let core = compact.replace("함유", "").replace("포함", "");
                let core_parts: Vec<&str> =
                    core.split('·').filter(|x| !x.is_empty()).collect();
                if !core_parts.is_empty()
                    && core_parts.iter().all(|x| ALLERGEN_WORDS.contains(x))
                {
                    removed_tokens.push(token.to_string());
                    continue;
                }
            }
        }
        kept.push(token.to_string());
    }

    let cleaned = kept.join(", ").trim_matches(|c| c == ' ' || c == ',').to_string();
    let removed_joined = removed_tokens.join(", ");
    let allergen_bits: Vec<&str> = [
        marker_removed.as_deref(),
        tail_removed.as_deref(),
        (!removed_joined.is_empty()).then_some(removed_joined.as_str()),
    ]
    .into_iter()
    .flatten()
    .collect();
    let mut allergen_text = allergen_bits.join(" | ");

    if allergen_text.is_empty() && cleaned != original {
        // Whatever disappeared during cleaning becomes the notice.
        let diff = original.replace(&cleaned, "");
        allergen_text = diff.trim_matches(edge_char).to_string();
    }

    (
        (!cleaned.is_empty()).then_some(cleaned),
        (!allergen_text.is_empty()).then_some(allergen_text),
    )
}
