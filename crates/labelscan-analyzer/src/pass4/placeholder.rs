//! Placeholder/dummy-text detection.
//!
//! Labels photographed from design proofs, masked samples, or test uploads
//! carry text that parses fine but is worthless downstream. A field that
//! trips any heuristic here is nulled out, with the reason code recorded on
//! the final record.

/// Which field is being screened; reason codes carry the field prefix and
/// token-diversity screening applies only to name-like fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Ingredients,
    ProductName,
    Nutrition,
}

impl FieldKind {
    fn prefix(self) -> &'static str {
        match self {
            FieldKind::Ingredients => "ingredients",
            FieldKind::ProductName => "product_name",
            FieldKind::Nutrition => "nutrition",
        }
    }

    fn screens_token_diversity(self) -> bool {
        matches!(self, FieldKind::Ingredients | FieldKind::ProductName)
    }
}

const PLACEHOLDER_KEYWORDS: [&str; 5] = ["sample", "test", "dummy", "샘플", "테스트"];

/// Redaction/masking glyphs commonly stamped over label photos.
const MASKING_SYMBOLS: [char; 9] = ['*', '●', '○', '■', '□', '▪', '#', '_', 'X'];

/// Fraction of masking glyphs above which a field counts as redacted.
const MASKING_RATIO: f64 = labelscan_core::defaults::MASKING_SYMBOL_RATIO;

/// Symbol-to-length ratio above which a field counts as garbage.
const SYMBOL_RATIO: f64 = labelscan_core::defaults::SYMBOL_RATIO_LIMIT;

fn longest_run(chars: impl Iterator<Item = char>) -> (char, usize) {
    let mut best = ('\0', 0);
    let mut current = ('\0', 0);
    for c in chars {
        if c == current.0 {
            current.1 += 1;
        } else {
            current = (c, 1);
        }
        if current.1 > best.1 {
            best = current;
        }
    }
    best
}

/// True when a digit string is one digit repeated across its full length.
pub fn is_repeated_digit_run(digits: &str) -> bool {
    let mut chars = digits.chars();
    match chars.next() {
        None => false,
        Some(first) => digits.len() > 1 && chars.all(|c| c == first),
    }
}

/// Screen a field for placeholder/dummy content. Returns the reason code to
/// record when the field should be rejected.
pub fn placeholder_reason(kind: FieldKind, text: &str) -> Option<String> {
    let value = text.trim();
    let prefix = kind.prefix();
    if value.is_empty() {
        return Some(format!("{}_empty", prefix));
    }

    let lower = value.to_lowercase();
    if PLACEHOLDER_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Some(format!("{}_contains_placeholder_keyword", prefix));
    }

    let visible: Vec<char> = value.chars().filter(|c| !c.is_whitespace()).collect();
    let masking = visible.iter().filter(|c| MASKING_SYMBOLS.contains(c)).count();
    if !visible.is_empty() && masking as f64 / visible.len() as f64 >= MASKING_RATIO {
        return Some(format!("{}_masked_text", prefix));
    }

    // Digit runs are screened separately via the report-number rule, so a
    // legitimate "10000mg" survives.
    let (run_char, run_len) = longest_run(value.chars().filter(|c| !c.is_ascii_digit()));
    if run_len >= 4 && !run_char.is_whitespace() {
        return Some(format!("{}_repeated_characters", prefix));
    }
    let (_, punct_run) = longest_run(value.chars().filter(|c| c.is_ascii_punctuation()));
    if punct_run >= 3 {
        return Some(format!("{}_repeated_punctuation", prefix));
    }

    if kind.screens_token_diversity() {
        let tokens: Vec<String> = value
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        let distinct: std::collections::HashSet<&str> =
            tokens.iter().map(String::as_str).collect();
        if distinct.is_empty() || (tokens.len() >= 3 && distinct.len() == 1) {
            return Some(format!("{}_low_token_diversity", prefix));
        }
    }

    let symbols = visible
        .iter()
        .filter(|c| !c.is_alphanumeric())
        .count();
    if !visible.is_empty() && symbols as f64 / visible.len() as f64 >= SYMBOL_RATIO {
        return Some(format!("{}_symbol_heavy", prefix));
    }

    None
}
