use crate::lang::Language;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

pub type TokenizeFn = fn(&str) -> Vec<String>;

/// ASCII punctuation, same set as Python's `string.punctuation`.
pub const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

pub fn is_punctuation(token: &str) -> bool {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => PUNCTUATION.contains(c),
        _ => false,
    }
}

/// Resolves a tokenizer for a language. Implementations may need to fetch
/// resources and are allowed to fail by returning `None`.
pub trait TokenizerLookup: Send + Sync {
    fn lookup(&self, language: &Language) -> Option<TokenizeFn>;
}

/// Word-boundary tokenizer for the languages that have a reliable
/// alphabetic word segmentation.
pub struct BuiltinTokenizers;

const SEGMENTED_LANGUAGES: &[&str] = &[
    "cs", "da", "de", "el", "en", "es", "et", "fi", "fr", "it", "nl", "no", "pl", "pt", "ru",
    "sl", "sv", "tr",
];

impl TokenizerLookup for BuiltinTokenizers {
    fn lookup(&self, language: &Language) -> Option<TokenizeFn> {
        if SEGMENTED_LANGUAGES.contains(&language.alpha_2) {
            Some(word_bound_tokenize)
        } else {
            None
        }
    }
}

pub fn resolve_tokenizer(lookup: &dyn TokenizerLookup, language: Option<&Language>) -> TokenizeFn {
    match language {
        Some(lang) => match lookup.lookup(lang) {
            Some(func) => func,
            None => {
                tracing::debug!(language = lang.name, "no tokenizer resource, using fallback");
                dumb_tokenize
            }
        },
        None => dumb_tokenize,
    }
}

pub fn default_tokenize_func(language: Option<&Language>) -> TokenizeFn {
    resolve_tokenizer(&BuiltinTokenizers, language)
}

pub fn word_bound_tokenize(text: &str) -> Vec<String> {
    text.split_word_bounds()
        .filter(|segment| !segment.trim().is_empty())
        .map(|segment| segment.to_string())
        .collect()
}

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        // patterns are compile-time constants
        pattern: Regex::new(pattern).expect("invalid tokenizer pattern"),
        replacement,
    }
}

static FALLBACK_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        // quotes and brackets are separated everywhere
        rule(r#"(["<>{}“”«»–|—„‚‘]|\[|\]|``|''|‘‘|\^)"#, " $1 "),
        rule(r"([;!()?#\$£%&*…]|--)", " $1 "),
        // hyphen, unless inside a word, part of --, or a unary minus
        rule(r"([^\-\w])-([^\-0-9])", "$1 - $2"),
        rule(r"([0-9]\s+)-([0-9])", "$1 - $2"),
        rule(r"([^\-])-([^\-\w])", "$1 - $2"),
        // plus, unless at the end of a word or a unary plus
        rule(r"(\w)\+(\w)", "$1 + $2"),
        rule(r"([0-9]\s*)\+([0-9])", "$1 + $2"),
        rule(r"\+([^\w\+])", "+ $1"),
        // apostrophes not inside words and not before digits ('60)
        rule(r"([^'’\w])(['’])([^'’\d])", "$1 $2 $3"),
        rule(r"([^'’])(['’])([^'’\w])", "$1 $2 $3"),
        // dot, comma, slash and colon unless between two numbers
        rule(r"(\D|^)([\.,:/])", "$1 $2"),
        rule(r"([\.,:/])(\D|$)", "$1 $2"),
        rule(r"\.\s*\.\s*\.", "..."),
        // contractions
        rule(r"(['’´])(s|m|d|ll|re|ve)\s", " $1$2 "),
        rule(r"(n['’´]t\s)", " $1 "),
        rule(r" ([Cc])annot\s", " ${1}an not "),
        rule(r" ([Dd])'ye\s", " ${1}' ye "),
        rule(r" ([Gg])imme\s", " ${1}im me "),
        rule(r" ([Gg])onna\s", " ${1}on na "),
        rule(r" ([Gg])otta\s", " ${1}ot ta "),
        rule(r" ([Ll])emme\s", " ${1}em me "),
        rule(r" ([Mm])ore'n\s", " ${1}ore 'n "),
        rule(r" '([Tt])is\s", " '${1} is "),
        rule(r" '([Tt])was\s", " '${1} was "),
        rule(r" ([Ww])anna\s", " ${1}an na "),
    ]
});

/// Language-agnostic failsafe tokenizer. Total: never fails, returns an
/// empty list for blank input.
pub fn dumb_tokenize(text: &str) -> Vec<String> {
    let mut toks = text.to_string();
    for rule in FALLBACK_RULES.iter() {
        toks = rule
            .pattern
            .replace_all(&toks, rule.replacement)
            .into_owned();
    }
    toks.split_whitespace().map(|tok| tok.to_string()).collect()
}
