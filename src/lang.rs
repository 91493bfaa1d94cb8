use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Language {
    pub alpha_2: &'static str,
    pub alpha_3: &'static str,
    pub name: &'static str,
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.alpha_2)
    }
}

// Languages that show up in the GEM dataset tables, plus the ones the
// sentence tokenizers traditionally ship models for.
static LANGUAGES: Lazy<Vec<Language>> = Lazy::new(|| {
    [
        ("ar", "ara", "Arabic"),
        ("cs", "ces", "Czech"),
        ("da", "dan", "Danish"),
        ("de", "deu", "German"),
        ("el", "ell", "Greek"),
        ("en", "eng", "English"),
        ("es", "spa", "Spanish"),
        ("et", "est", "Estonian"),
        ("fi", "fin", "Finnish"),
        ("fr", "fra", "French"),
        ("hi", "hin", "Hindi"),
        ("id", "ind", "Indonesian"),
        ("it", "ita", "Italian"),
        ("ja", "jpn", "Japanese"),
        ("ko", "kor", "Korean"),
        ("nl", "nld", "Dutch"),
        ("no", "nor", "Norwegian"),
        ("pl", "pol", "Polish"),
        ("pt", "por", "Portuguese"),
        ("ru", "rus", "Russian"),
        ("sl", "slv", "Slovenian"),
        ("sv", "swe", "Swedish"),
        ("sw", "swa", "Swahili"),
        ("th", "tha", "Thai"),
        ("tr", "tur", "Turkish"),
        ("vi", "vie", "Vietnamese"),
        ("zh", "zho", "Chinese"),
    ]
    .into_iter()
    .map(|(alpha_2, alpha_3, name)| Language {
        alpha_2,
        alpha_3,
        name,
    })
    .collect()
});

/// Resolve a language tag given as an ISO 639-1 code, an ISO 639-3 code or
/// an English language name.
pub fn resolve_language(tag: &str) -> Option<Language> {
    let tag = tag.trim();
    if tag.is_empty() {
        return None;
    }
    let by_name = tag.chars().count() > 3 || tag.chars().next().is_some_and(char::is_uppercase);
    LANGUAGES
        .iter()
        .find(|lang| {
            if by_name {
                lang.name.eq_ignore_ascii_case(tag)
            } else if tag.len() == 3 {
                lang.alpha_3.eq_ignore_ascii_case(tag)
            } else {
                lang.alpha_2.eq_ignore_ascii_case(tag)
            }
        })
        .copied()
}
