//! Pure functions for pulling season/episode numbers, bad-release markers and
//! alias/overall scores out of fansub release titles.
//!
//! Deterministic, regex-based, ordered by confidence. Grounded on the
//! original resolver's `matcher` module: explicit markers (`SxxEyy`, `EP xx`,
//! CJK episode markers) are tried before falling back to a bare standalone
//! integer, and a fixed set of resolution/codec numbers and plausible years
//! are excluded from that fallback so "1080p" or "2024" never parse as an
//! episode number.

use regex::Regex;
use std::sync::OnceLock;

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {{
        static CACHE: OnceLock<Regex> = OnceLock::new();
        CACHE.get_or_init(|| Regex::new($pattern).expect("static regex pattern is valid"))
    }};
}

/// Extracts a season number in `[1, 30]` from a title or alias.
pub fn extract_season_no(title: &str) -> Option<i32> {
    let patterns: &[&Regex] = &[
        cached_regex!(p1, r"(?i)\bS0?([1-9]\d?)E\d{1,3}\b"),
        cached_regex!(p2, r"(?i)\bS(?:EASON)?\s?0?([1-9]\d?)\b"),
        cached_regex!(p3, r"(?i)\b([1-9]\d?)(?:st|nd|rd|th)\s+season\b"),
        cached_regex!(p4, r"第\s?0?([1-9]\d?)\s?[季期]"),
    ];
    for re in patterns {
        if let Some(caps) = re.captures(title)
            && let Ok(s) = caps[1].parse::<i32>()
            && (1..=30).contains(&s)
        {
            return Some(s);
        }
    }
    None
}

const RESOLUTION_CODEC_NUMBERS: &[i32] = &[264, 265, 480, 540, 576, 720, 1080, 1440, 2160];

/// Extracts a single episode number in `[1, 300]`, in order of confidence.
pub fn extract_episode_no(title: &str) -> Option<i32> {
    let patterns: &[&Regex] = &[
        cached_regex!(q1, r"(?i)\bS\d{1,2}E(\d{1,3})\b"),
        cached_regex!(q2, r"(?i)\b(?:E|EP)\s?0?(\d{1,3})\b"),
        cached_regex!(q3, r"第\s?0?(\d{1,3})\s?[话話集]"),
        cached_regex!(q4, r"(?i)(?:\[|\s|-)0?(\d{1,3})(?:v\d+)?(?:\]|\s|$)"),
    ];
    for re in patterns {
        if let Some(caps) = re.captures(title)
            && let Ok(ep) = caps[1].parse::<i32>()
            && (1..=300).contains(&ep)
        {
            return Some(ep);
        }
    }

    let fallback = cached_regex!(q5, r"\b(\d{1,4})\b");
    for caps in fallback.captures_iter(title) {
        let Ok(n) = caps[1].parse::<i32>() else {
            continue;
        };
        if RESOLUTION_CODEC_NUMBERS.contains(&n) {
            continue;
        }
        if (1900..=2100).contains(&n) {
            continue;
        }
        if (1..=300).contains(&n) {
            return Some(n);
        }
    }
    None
}

/// Whether `title` carries an unambiguous episode marker — `SxxEyy`, `E`/`EP
/// xx`, or a CJK `第N话/話/集}` marker — as opposed to a bracketed/spaced
/// number or the last-resort standalone-integer fallback in
/// [`extract_episode_no`]. Used to gate "confident" classification: a bare
/// number next to a resolution tag is not enough to organize a file
/// automatically.
pub fn has_explicit_episode_signal(title: &str) -> bool {
    let patterns: &[&Regex] = &[
        cached_regex!(e1, r"(?i)\bS\d{1,2}E(\d{1,3})\b"),
        cached_regex!(e2, r"(?i)\b(?:E|EP)\s?0?(\d{1,3})\b"),
        cached_regex!(e3, r"第\s?0?(\d{1,3})\s?[话話集]"),
    ];
    patterns.iter().any(|re| {
        re.captures(title)
            .and_then(|caps| caps[1].parse::<i32>().ok())
            .is_some_and(|ep| (1..=300).contains(&ep))
    })
}

/// Extracts a batch-pack episode range such as `01-13` or `01~13`.
pub fn extract_episode_range(title: &str) -> Option<(i32, i32)> {
    let re = cached_regex!(r1, r"\b0?(\d{1,3})\s?[-~]\s?0?(\d{1,3})\b");
    let caps = re.captures(title)?;
    let lo: i32 = caps[1].parse().ok()?;
    let hi: i32 = caps[2].parse().ok()?;
    if lo >= 1 && hi >= lo && hi <= 300 {
        Some((lo, hi))
    } else {
        None
    }
}

const BAD_RELEASE_KEYWORDS: &[&str] = &[
    "camrip",
    "hdcam",
    "telesync",
    "ts ",
    "telecine",
    "screen record",
    "screenrec",
    "handcam",
    "fanart corner",
    "fanart",
    "creditless",
    "nced",
    "ncop",
    "preview",
    "pv ",
    " pv",
    "trailer",
    "cm ",
    " cm",
    "menu",
    "bonus",
    "extra",
    "special",
    "theaniplex.in",
    "ova ",
];

/// Flags titles that are never real episode releases: cams, previews,
/// specials and similar non-episodic artifacts.
pub fn is_bad_release(title: &str) -> bool {
    let t = title.to_lowercase();
    BAD_RELEASE_KEYWORDS.iter().any(|k| t.contains(k))
}

const TOKEN_STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "season", "part", "episode", "no", "ko",
];

/// Lowercases and collapses non-word/non-CJK runs to single spaces, with a
/// few season-token synonyms normalized first so "2nd Season" and "S2"
/// compare equal.
pub fn normalize_title(s: &str) -> String {
    let mut x = s.to_lowercase();
    for (from, to) in [
        ("2nd season", "s2"),
        ("3rd season", "s3"),
        ("second season", "s2"),
        ("third season", "s3"),
        ("第2季", "s2"),
        ("第二季", "s2"),
        ("第3季", "s3"),
        ("第三季", "s3"),
    ] {
        x = x.replace(from, to);
    }
    let non_word = cached_regex!(n1, r"[^\w一-鿿]+");
    let collapsed = non_word.replace_all(&x, " ");
    let whitespace = cached_regex!(n2, r"\s+");
    whitespace.replace_all(collapsed.trim(), " ").into_owned()
}

/// Scores how strongly a release `title` matches one of the show's known
/// `aliases`: 40 for a normalized-substring hit (shortest alias first, to
/// avoid a long alias swallowing a shorter, more specific match), 30 for a
/// conservative token-overlap fallback, 0 otherwise.
pub fn alias_match_score(title: &str, aliases: &[String]) -> i32 {
    let nt = normalize_title(title);
    let mut sorted_aliases: Vec<&String> = aliases.iter().collect();
    sorted_aliases.sort_by_key(|a| (a.len(), (*a).clone()));

    for alias in sorted_aliases {
        let na = normalize_title(alias);
        if na.is_empty() {
            continue;
        }
        if nt.contains(&na) {
            return 40;
        }

        let ta: std::collections::HashSet<&str> = na
            .split(' ')
            .filter(|tok| {
                tok.len() >= 3
                    && !TOKEN_STOPWORDS.contains(tok)
                    && !tok.chars().all(|c| c.is_ascii_digit())
            })
            .collect();
        if ta.len() < 2 {
            continue;
        }

        let tt: std::collections::HashSet<&str> = nt.split(' ').collect();
        let overlap = ta.intersection(&tt).count();
        if overlap >= 2 {
            return 30;
        }
    }
    0
}

/// Overall score for ranking a candidate release against a target episode.
pub fn score_release(
    title: &str,
    aliases: &[String],
    ep_no: i32,
    preferred_subgroups: &[String],
) -> i32 {
    let t = title.to_lowercase();
    let mut score = alias_match_score(title, aliases);
    if extract_episode_no(title) == Some(ep_no) {
        score += 40;
    }
    if preferred_subgroups
        .iter()
        .any(|sg| !sg.is_empty() && t.contains(&sg.to_lowercase()))
    {
        score += 20;
    }
    if t.contains("1080") {
        score += 10;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_patterns() {
        assert_eq!(extract_season_no("Sousou no Frieren Season 2"), Some(2));
        assert_eq!(extract_season_no("[Group] Show S02 MULTi 1080p"), Some(2));
        assert_eq!(extract_season_no("葬送的芙莉莲 第2季"), Some(2));
        assert_eq!(extract_season_no("Show"), None);
    }

    #[test]
    fn episode_no_rejects_season_token() {
        assert_eq!(extract_episode_no("[Group] Show S02 MULTi 1080p"), None);
    }

    #[test]
    fn episode_no_bracket_dash() {
        assert_eq!(
            extract_episode_no("[Group] Show - 12 [1080p].mkv"),
            Some(12)
        );
    }

    #[test]
    fn episode_no_explicit_markers() {
        assert_eq!(extract_episode_no("[Group] Show S01E07 1080p"), Some(7));
        assert_eq!(extract_episode_no("Show EP05"), Some(5));
        assert_eq!(extract_episode_no("Show 第3话"), Some(3));
    }

    #[test]
    fn explicit_episode_signal_excludes_bracket_fallback() {
        assert!(has_explicit_episode_signal("[Group] Show S01E07 1080p"));
        assert!(has_explicit_episode_signal("Show EP05"));
        assert!(has_explicit_episode_signal("Show 第3话"));
        assert!(!has_explicit_episode_signal("Ambiguous Show 03 [1080p].mkv"));
        assert!(!has_explicit_episode_signal("[Group] Show - 12 [1080p].mkv"));
    }

    #[test]
    fn episode_range() {
        assert_eq!(extract_episode_range("Show 01-13 [1080p]"), Some((1, 13)));
        assert_eq!(extract_episode_range("Show 01~13"), Some((1, 13)));
        assert_eq!(extract_episode_range("Show - 12 [1080p]"), None);
    }

    #[test]
    fn bad_release_keywords() {
        assert!(is_bad_release("[Group] Show Trailer [1080p]"));
        assert!(is_bad_release("Show NCOP"));
        assert!(!is_bad_release("[Group] Show - 12 [1080p]"));
    }

    #[test]
    fn alias_match_substring() {
        let aliases = vec!["Frieren".to_string()];
        assert_eq!(
            alias_match_score("[Group] Frieren - 12 [1080p]", &aliases),
            40
        );
    }

    #[test]
    fn alias_match_token_overlap() {
        let aliases = vec!["Sousou no Frieren".to_string()];
        assert_eq!(
            alias_match_score("[Group] Frieren Sousou Extended Cut - 12", &aliases),
            30
        );
    }

    #[test]
    fn overall_score_combines_signals() {
        let aliases = vec!["Frieren".to_string()];
        let subgroups = vec!["SubsPlease".to_string()];
        let score = score_release(
            "[SubsPlease] Frieren - 12 (1080p)",
            &aliases,
            12,
            &subgroups,
        );
        assert_eq!(score, 40 + 40 + 20 + 10);
    }
}
