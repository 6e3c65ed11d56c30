//! Per-value string helpers behind the text operators that have no native
//! Polars counterpart.

use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;

static LOWER_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").expect("valid regex"));
static WORD_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.\s_-]+").expect("valid regex"));
static DOT_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_-]+").expect("valid regex"));

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

fn pig_latin_word(word: &str) -> String {
    let (content, punctuation) = match word.chars().last() {
        Some(last) if last.is_ascii_punctuation() => {
            (word.strip_suffix(last).unwrap_or(word), Some(last))
        }
        _ => (word, None),
    };
    let Some(first) = content.chars().next() else {
        return word.to_owned();
    };

    let mut out = if is_vowel(first) {
        format!("{content}way")
    } else {
        let split = content
            .char_indices()
            .find(|(_, c)| is_vowel(*c))
            .map_or(content.len(), |(i, _)| i);
        let (cluster, rest) = content.split_at(split);
        let moved = format!("{rest}{cluster}ay");
        if first.is_uppercase() {
            capitalize(&moved)
        } else {
            moved
        }
    };
    out.extend(punctuation);
    out
}

/// Translates every whitespace separated word into Pig Latin.
pub fn pig_latinnify(text: &str) -> String {
    text.split_whitespace()
        .map(pig_latin_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lower-cases the text, splits camelCase words and capitalises the first
/// letter of every sentence.
///
/// A sentence starts at the beginning of the text and after `.`, `!` or `?`
/// followed by whitespace.
pub fn sentence_case(text: &str) -> String {
    let lowered = LOWER_UPPER.replace_all(text, "$1 $2").to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut capitalize_next = true;
    let mut chars = lowered.chars().peekable();

    while let Some(c) = chars.next() {
        if capitalize_next && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }

        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while let Some(space) = chars.next_if(|n| n.is_whitespace()) {
                out.push(space);
            }
            capitalize_next = true;
        }
    }
    out
}

/// RaNDoM capitalisation, one coin flip per letter.
pub fn sponge_case(text: &str, rng: &mut impl Rng) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if !c.is_alphabetic() {
            out.push(c);
        } else if rng.random_bool(0.5) {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

pub fn swap_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_uppercase() {
            out.extend(c.to_lowercase());
        } else if c.is_lowercase() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Upper-cases the first letter of every alphanumeric run and lower-cases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Splits camelCase words and collapses `.`, whitespace, `_` and `-` runs
/// into `separator`.
fn delimited(text: &str, separator: &str, separators: &Regex) -> String {
    let split = LOWER_UPPER.replace_all(text, format!("${{1}}{separator}${{2}}"));
    let joined = separators.replace_all(&split, separator);
    joined
        .trim_matches(|c| separator.contains(c))
        .to_owned()
}

pub fn snake_case(text: &str) -> String {
    delimited(text, "_", &WORD_SEPARATORS).to_lowercase()
}

pub fn kebab_case(text: &str) -> String {
    delimited(text, "-", &WORD_SEPARATORS).to_lowercase()
}

pub fn constant_case(text: &str) -> String {
    delimited(text, "_", &WORD_SEPARATORS).to_uppercase()
}

/// Dots already in the text are kept as word boundaries.
pub fn dot_case(text: &str) -> String {
    delimited(text, ".", &DOT_SEPARATORS).to_lowercase()
}

pub fn pascal_case(text: &str) -> String {
    delimited(text, " ", &WORD_SEPARATORS)
        .split(' ')
        .map(|word| capitalize(&word.to_lowercase()))
        .collect()
}

pub fn camel_case(text: &str) -> String {
    let pascal = pascal_case(text);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn url_encode(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

/// Invalid escapes leave the text unchanged.
pub fn url_decode(text: &str) -> String {
    urlencoding::decode(text)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| text.to_owned())
}

/// Splits on any of `characters`, trims the parts and joins the non-empty
/// ones with a single space.
pub fn split_by_chars(text: &str, characters: &str) -> String {
    text.split(|c| characters.contains(c))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
