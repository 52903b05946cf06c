//! Text normalization for matching and file placement.
//!
//! Three distinct concerns live here, all pure and I/O-free:
//! - identity folding: reduce a display string to the form used for fuzzy
//!   comparison and cache keys (case-fold, diacritic strip, punctuation
//!   drop, whitespace collapse);
//! - base album names: strip trailing edition/remaster qualifiers so
//!   "Album" and "Album (Deluxe)" group together;
//! - filename sanitization: produce path components that are safe on every
//!   filesystem we care about, idempotently.

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Default edition-qualifier cores, matched case-insensitively in a
/// trailing "(...)", "[...]" or "- ..." position, each optionally followed
/// by "Edition" or "Version". Overridable via `[naming]` config.
pub const DEFAULT_EDITION_QUALIFIERS: &[&str] = &[
    r"(?:super\s+)?deluxe",
    r"expanded",
    r"(?:\d{1,3}(?:st|nd|rd|th)\s+)?anniversary",
    r"(?:\d{4}\s+)?(?:digital\s+)?remaster(?:ed)?(?:\s+\d{4})?",
    r"special",
    r"collector'?s?",
    r"legacy",
    r"bonus\s+tracks?",
    r"extended",
];

/// Characters that may not appear in a path component on the filesystems
/// we target (Windows being the strictest).
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Fold a display string into its comparison identity: NFKD-decompose and
/// drop combining marks, lowercase, keep alphanumerics as words, collapse
/// whitespace.
///
/// `fold_identity("Beyoncé!") == "beyonce"`, and folding is idempotent.
pub fn fold_identity(input: &str) -> String {
    let stripped: String = input
        .nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();

    let mut out = String::with_capacity(stripped.len());
    let mut pending_space = false;
    for c in stripped.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            // Punctuation and whitespace both act as word separators
            pending_space = true;
        }
    }
    out
}

/// True when the text is unusable as an identity: empty or one of the
/// placeholder names peers commonly put where metadata is missing.
pub fn is_placeholder(text: &str) -> bool {
    matches!(
        fold_identity(text).as_str(),
        "" | "unknown"
            | "unknown album"
            | "unknown artist"
            | "untitled"
            | "va"
            | "various"
            | "various artists"
    )
}

/// Collapse internal whitespace runs and trim, without touching case or
/// punctuation. Used to clean display text that stays human-facing.
pub fn clean_display(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compiled edition-qualifier rules.
///
/// The qualifier set is deliberately configuration, not a fixed list: the
/// phrasing of deluxe/remaster/anniversary suffixes varies too much to
/// guess once and forever.
pub struct EditionPatterns {
    /// Trailing "(qualifier)" or "[qualifier]".
    bracketed: Regex,
    /// Trailing "- qualifier".
    dashed: Regex,
}

impl EditionPatterns {
    /// Compile patterns from qualifier cores (regex fragments).
    pub fn from_qualifiers(qualifiers: &[String]) -> Result<Self, regex::Error> {
        let alternation = qualifiers.join("|");
        let core = format!(r"(?:{})(?:\s+(?:edition|version))?", alternation);
        let bracketed = Regex::new(&format!(r"(?i)\s*[\(\[](?:{})[\)\]]\s*$", core))?;
        let dashed = Regex::new(&format!(r"(?i)\s+[-–—]\s*(?:{})\s*$", core))?;
        Ok(Self { bracketed, dashed })
    }

    /// The built-in default qualifier set.
    pub fn default_set() -> &'static EditionPatterns {
        lazy_static! {
            static ref DEFAULT: EditionPatterns = EditionPatterns::from_qualifiers(
                &DEFAULT_EDITION_QUALIFIERS
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
            )
            .expect("default edition patterns must compile");
        }
        &DEFAULT
    }

    /// Strip trailing edition qualifiers until none remain.
    ///
    /// Stripping never produces an empty name: a title that consists of
    /// nothing but a qualifier keeps its original form.
    pub fn base_name(&self, name: &str) -> String {
        let mut current = name.trim().to_string();
        loop {
            let after_bracketed = self.bracketed.replace(&current, "").trim().to_string();
            let after_both = self.dashed.replace(&after_bracketed, "").trim().to_string();
            if after_both.is_empty() {
                return current;
            }
            if after_both == current {
                return current;
            }
            current = after_both;
        }
    }

    /// True when the name carries at least one trailing edition qualifier.
    pub fn has_qualifier(&self, name: &str) -> bool {
        self.base_name(name) != name.trim()
    }
}

lazy_static! {
    /// Control characters and anything else that must not survive into a
    /// path component.
    static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x1f\x7f]").unwrap();
}

/// Sanitize one path component: drop reserved and control characters,
/// collapse whitespace, cap length at `max_len` characters, and trim
/// trailing dots/spaces (which Windows silently strips on its own).
///
/// Idempotent: `sanitize_component(sanitize_component(x, n), n)` equals
/// `sanitize_component(x, n)` for all inputs.
pub fn sanitize_component(input: &str, max_len: usize) -> String {
    let without_control = CONTROL_CHARS.replace_all(input, " ");
    let without_reserved: String = without_control
        .chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { ' ' } else { c })
        .collect();

    let collapsed = clean_display(&without_reserved);
    let truncated: String = collapsed.chars().take(max_len.max(1)).collect();

    // Truncation can leave trailing whitespace; trailing dots are invalid
    // path components on Windows either way.
    truncated.trim_end_matches([' ', '.']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_identity_basic() {
        assert_eq!(fold_identity("Billie Eilish"), "billie eilish");
        assert_eq!(fold_identity("  The   Beatles "), "the beatles");
        assert_eq!(fold_identity("AC/DC"), "ac dc");
    }

    #[test]
    fn test_fold_identity_diacritics() {
        assert_eq!(fold_identity("Beyoncé"), "beyonce");
        assert_eq!(fold_identity("Sigur Rós"), "sigur ros");
        assert_eq!(fold_identity("Motörhead"), "motorhead");
    }

    #[test]
    fn test_fold_identity_punctuation() {
        assert_eq!(
            fold_identity("WHEN WE ALL FALL ASLEEP, WHERE DO WE GO?"),
            "when we all fall asleep where do we go"
        );
        assert_eq!(fold_identity("P!nk"), "p nk");
    }

    #[test]
    fn test_fold_identity_idempotent() {
        for input in ["Beyoncé!", "  a  b  ", "Sigur Rós (Live)", ""] {
            let once = fold_identity(input);
            assert_eq!(fold_identity(&once), once);
        }
    }

    #[test]
    fn test_is_placeholder() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("Unknown"));
        assert!(is_placeholder("UNKNOWN ALBUM"));
        assert!(is_placeholder("Various Artists"));
        assert!(!is_placeholder("Unknown Pleasures"));
        assert!(!is_placeholder("Thriller"));
    }

    #[test]
    fn test_base_name_deluxe() {
        let patterns = EditionPatterns::default_set();
        assert_eq!(patterns.base_name("Album (Deluxe)"), "Album");
        assert_eq!(patterns.base_name("Album (Deluxe Edition)"), "Album");
        assert_eq!(patterns.base_name("Album [Super Deluxe]"), "Album");
        assert_eq!(patterns.base_name("Album - Deluxe Edition"), "Album");
    }

    #[test]
    fn test_base_name_remaster_variants() {
        let patterns = EditionPatterns::default_set();
        assert_eq!(patterns.base_name("OK Computer (Remastered)"), "OK Computer");
        assert_eq!(
            patterns.base_name("OK Computer (Remastered 2011)"),
            "OK Computer"
        );
        assert_eq!(
            patterns.base_name("OK Computer (2011 Remaster)"),
            "OK Computer"
        );
        assert_eq!(
            patterns.base_name("Abbey Road - 2019 Digital Remaster"),
            "Abbey Road"
        );
    }

    #[test]
    fn test_base_name_anniversary() {
        let patterns = EditionPatterns::default_set();
        assert_eq!(
            patterns.base_name("The Wall (20th Anniversary Edition)"),
            "The Wall"
        );
        assert_eq!(patterns.base_name("The Wall (Anniversary)"), "The Wall");
    }

    #[test]
    fn test_base_name_stacked_qualifiers() {
        let patterns = EditionPatterns::default_set();
        assert_eq!(
            patterns.base_name("Album (Deluxe) (Remastered 2020)"),
            "Album"
        );
    }

    #[test]
    fn test_base_name_no_qualifier_untouched() {
        let patterns = EditionPatterns::default_set();
        assert_eq!(patterns.base_name("Thriller"), "Thriller");
        // Mid-name words are not qualifiers
        assert_eq!(
            patterns.base_name("Deluxe People Do Deluxe Things"),
            "Deluxe People Do Deluxe Things"
        );
    }

    #[test]
    fn test_base_name_never_empty() {
        let patterns = EditionPatterns::default_set();
        // A name that is nothing but a qualifier keeps its original form
        assert_eq!(patterns.base_name("(Deluxe)"), "(Deluxe)");
    }

    #[test]
    fn test_has_qualifier() {
        let patterns = EditionPatterns::default_set();
        assert!(patterns.has_qualifier("Album (Deluxe)"));
        assert!(patterns.has_qualifier("Album (Remastered 2011)"));
        assert!(!patterns.has_qualifier("Album"));
        assert!(!patterns.has_qualifier("Thriller"));
    }

    #[test]
    fn test_custom_qualifiers() {
        let patterns =
            EditionPatterns::from_qualifiers(&["tour\\s+edition".to_string()]).unwrap();
        assert_eq!(patterns.base_name("Album (Tour Edition)"), "Album");
        // Default qualifiers are not included in a custom set
        assert_eq!(patterns.base_name("Album (Deluxe)"), "Album (Deluxe)");
    }

    #[test]
    fn test_sanitize_removes_reserved_chars() {
        let out = sanitize_component("WHEN WE ALL FALL ASLEEP, WHERE DO WE GO?", 120);
        assert_eq!(out, "WHEN WE ALL FALL ASLEEP, WHERE DO WE GO");
        assert_eq!(sanitize_component("AC/DC", 120), "AC DC");
        assert_eq!(sanitize_component("a<b>c:d\"e|f*g", 120), "a b c d e f g");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        let out = sanitize_component(&long, 120);
        assert_eq!(out.chars().count(), 120);
    }

    #[test]
    fn test_sanitize_trims_trailing_dots_and_spaces() {
        assert_eq!(sanitize_component("Dr. Dre.", 120), "Dr. Dre");
        assert_eq!(sanitize_component("name   ", 120), "name");
    }

    #[test]
    fn test_sanitize_idempotent() {
        let inputs = [
            "WHEN WE ALL FALL ASLEEP, WHERE DO WE GO?",
            "AC/DC",
            "Dr. Dre.",
            "  lots   of \t whitespace  ",
            "\u{0007}bell",
            &"y".repeat(300),
        ];
        for input in inputs {
            let once = sanitize_component(input, 120);
            assert_eq!(sanitize_component(&once, 120), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_sanitize_control_chars() {
        assert_eq!(sanitize_component("a\x00b\x1fc", 120), "a b c");
    }

    #[test]
    fn test_clean_display() {
        assert_eq!(clean_display("  a   b\tc "), "a b c");
    }
}
