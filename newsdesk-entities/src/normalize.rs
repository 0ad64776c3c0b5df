//! Person-name normalization.
//!
//! Rules are tried in order and the first match rewrites the name:
//!
//! 1. `"<Title> <First> <Last…>"` → `"<First> <Last…>"`
//! 2. `"<Last>, <First>"` → `"<First> <Last>"`
//! 3. `"<First> <M>. <Last…>"` → `"<First> <Last…>"`
//! 4. `"<First> <Last…> Jr.|Sr.|II|III|IV|V"` → `"<First> <Last…>"`
//!
//! A rewritten name is fed through the rules again until none applies, which
//! keeps `normalize` idempotent for stacked forms such as
//! `"President Joe R. Biden Jr."`.

use regex::Regex;
use std::sync::LazyLock;

/// Closed honorific set, lower-case, without trailing period.
///
/// Excludes words that also open organization or place names
/// ("General Motors", "Prince Edward Island").
const HONORIFICS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "mx", "dr", "prof", "professor", "sir", "dame", "president",
    "vice-president", "senator", "sen", "representative", "rep", "congressman", "congresswoman",
    "governor", "gov", "mayor", "judge", "justice", "minister", "chancellor", "ambassador",
    "commissioner", "speaker", "chairman", "chairwoman", "pope", "rev", "reverend", "rabbi",
    "imam", "gen", "col", "maj", "capt", "lt", "sgt", "adm", "detective", "sheriff",
];

const GENERATIONAL_SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "v"];

/// Trailing designators that make a comma part of an organization name.
const CORPORATE_DESIGNATORS: &[&str] = &[
    "inc", "llc", "ltd", "co", "corp", "plc", "gmbh", "ag", "sa", "lp", "llp",
];

static MIDDLE_INITIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+) [A-Za-z]\. (.+)$").unwrap());

fn bare(token: &str) -> String {
    token.trim_end_matches(['.', ',']).to_lowercase()
}

fn is_honorific(token: &str) -> bool {
    HONORIFICS.contains(&bare(token).as_str())
}

/// Roman numerals must be upper-case so "V" as a suffix isn't confused with
/// lower-case initials; "Jr"/"Sr" match in any case.
fn is_generational_suffix(token: &str) -> bool {
    let b = bare(token);
    match b.as_str() {
        "jr" | "sr" => true,
        _ => {
            GENERATIONAL_SUFFIXES.contains(&b.as_str())
                && token.trim_end_matches(['.', ',']).chars().all(|c| c.is_ascii_uppercase())
        }
    }
}

fn is_corporate_designator(token: &str) -> bool {
    CORPORATE_DESIGNATORS.contains(&bare(token).as_str())
}

fn strip_title(tokens: &[&str]) -> Option<String> {
    if tokens.len() >= 3 && is_honorific(tokens[0]) {
        Some(tokens[1..].join(" "))
    } else {
        None
    }
}

fn reorder_last_first(name: &str) -> Option<String> {
    let (last, first) = name.split_once(',')?;
    let (last, first) = (last.trim(), first.trim());
    if last.is_empty() || first.is_empty() || first.contains(',') {
        return None;
    }
    let first_tokens: Vec<&str> = first.split_whitespace().collect();
    if first_tokens
        .iter()
        .all(|t| is_generational_suffix(t) || is_corporate_designator(t))
    {
        return None;
    }
    Some(format!("{first} {last}"))
}

fn drop_middle_initial(collapsed: &str) -> Option<String> {
    let caps = MIDDLE_INITIAL.captures(collapsed)?;
    Some(format!("{} {}", &caps[1], &caps[2]))
}

fn drop_suffix(tokens: &[&str]) -> Option<String> {
    if tokens.len() < 3 || !is_generational_suffix(tokens[tokens.len() - 1]) {
        return None;
    }
    let mut kept: Vec<&str> = tokens[..tokens.len() - 1].to_vec();
    if let Some(last) = kept.last_mut() {
        *last = last.trim_end_matches(',');
    }
    Some(kept.join(" "))
}

/// Apply the first matching rule, if any.
fn rewrite_once(name: &str) -> Option<String> {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    let collapsed = tokens.join(" ");

    strip_title(&tokens)
        .or_else(|| reorder_last_first(&collapsed))
        .or_else(|| drop_middle_initial(&collapsed))
        .or_else(|| drop_suffix(&tokens))
}

/// Canonicalize a raw name string.
///
/// Deterministic and idempotent. Names no rule applies to are returned trimmed
/// but otherwise unchanged.
pub fn normalize(name: &str) -> String {
    let mut current = name.trim().to_string();
    while let Some(next) = rewrite_once(&current) {
        let next = next.trim().to_string();
        if next == current || next.is_empty() {
            break;
        }
        current = next;
    }
    current
}
