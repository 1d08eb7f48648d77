/*!
 * Outgoing text processing.
 *
 * Every user-visible string sent to a device goes through the driver's own
 * character filter, then emoji flattening for devices without emoji glyphs,
 * then the transliterators configured for that device.
 */
use tracing::warn;

/// Replace well-known emoji with ASCII emoticons and drop emoji modifiers
pub fn emoji_to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match emoticon(c) {
            Some(replacement) => out.push_str(replacement),
            None if is_emoji_modifier(c) => {}
            None => out.push(c),
        }
    }
    out
}

fn emoticon(c: char) -> Option<&'static str> {
    let s = match c {
        '😀' | '😃' | '😄' | '😁' | '😆' => ":D",
        '😂' | '🤣' => ":')",
        '🙂' | '😊' | '☺' => ":)",
        '😉' => ";)",
        '😍' | '😻' | '❤' | '💕' | '💖' => "<3",
        '💔' => "</3",
        '😘' | '😗' | '😚' => ":*",
        '😛' => ":P",
        '😜' | '😝' => ";P",
        '😢' | '😭' => ":'(",
        '😞' | '🙁' | '☹' | '😟' => ":(",
        '😮' | '😲' | '😯' => ":O",
        '😐' | '😑' => ":|",
        '😕' => ":/",
        '😎' => "B)",
        '😇' => "O:)",
        '😈' => ">:)",
        '😡' | '😠' => ">:(",
        '👍' => "(y)",
        '👎' => "(n)",
        '👋' => "o/",
        _ => return None,
    };
    Some(s)
}

fn is_emoji_modifier(c: char) -> bool {
    matches!(c, '\u{200D}' | '\u{FE0E}' | '\u{FE0F}' | '\u{1F3FB}'..='\u{1F3FF}')
}

/// Built-in transliteration tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// Umlauts and sharp s
    German,
    /// Cyrillic, Russian alphabet
    Russian,
    /// Cyrillic, Ukrainian alphabet
    Ukrainian,
    /// Greek alphabet
    Greek,
    /// Polish diacritics
    Polish,
    /// Typographic quotes, dashes and currency signs
    CommonSymbols,
    /// Ligatures and letters outside Latin-1 decomposition
    ExtendedAscii,
    /// Strip diacritics and drop anything that is still not ASCII
    FlattenToAscii,
}

impl Language {
    /// Look up a table by its preference name
    pub fn from_name(name: &str) -> Option<Self> {
        let language = match name.trim().to_ascii_lowercase().as_str() {
            "german" => Language::German,
            "russian" => Language::Russian,
            "ukrainian" | "ukranian" => Language::Ukrainian,
            "greek" => Language::Greek,
            "polish" => Language::Polish,
            "common_symbols" => Language::CommonSymbols,
            "extended_ascii" => Language::ExtendedAscii,
            _ => return None,
        };
        Some(language)
    }

    fn map(self, c: char) -> Option<&'static str> {
        match self {
            Language::German => german(c),
            Language::Russian => russian(c),
            Language::Ukrainian => ukrainian(c),
            Language::Greek => greek(c),
            Language::Polish => polish(c),
            Language::CommonSymbols => common_symbols(c),
            Language::ExtendedAscii => extended_ascii(c),
            Language::FlattenToAscii => None,
        }
    }

    fn apply(self, text: &str) -> String {
        if self == Language::FlattenToAscii {
            return flatten_to_ascii(text);
        }

        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match self.map(c) {
                Some(replacement) => out.push_str(replacement),
                None => match upper_mapping(self, c) {
                    Some(upper) => out.push_str(&upper),
                    None => out.push(c),
                },
            }
        }
        out
    }
}

// Tables hold lowercase letters; uppercase input maps through the lowercase
// entry with the first letter capitalised.
fn upper_mapping(language: Language, c: char) -> Option<String> {
    if !c.is_uppercase() {
        return None;
    }
    let lower = c.to_lowercase().next()?;
    let mapped = match language {
        Language::Russian => russian(lower),
        Language::Ukrainian => ukrainian(lower),
        Language::Greek => greek(lower),
        Language::Polish => polish(lower),
        Language::ExtendedAscii => extended_ascii(lower),
        _ => None,
    }?;
    let mut chars = mapped.chars();
    Some(match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    })
}

fn german(c: char) -> Option<&'static str> {
    let s = match c {
        'ä' => "ae",
        'ö' => "oe",
        'ü' => "ue",
        'Ä' => "Ae",
        'Ö' => "Oe",
        'Ü' => "Ue",
        'ß' => "ss",
        'ẞ' => "SS",
        _ => return None,
    };
    Some(s)
}

fn russian(c: char) -> Option<&'static str> {
    let s = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "jo",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "j",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "c",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shh",
        'ъ' => "",
        'ы' => "y",
        'ь' => "'",
        'э' => "je",
        'ю' => "ju",
        'я' => "ja",
        _ => return None,
    };
    Some(s)
}

fn ukrainian(c: char) -> Option<&'static str> {
    let s = match c {
        'г' => "h",
        'ґ' => "g",
        'е' => "e",
        'є' => "ie",
        'и' => "y",
        'і' => "i",
        'ї' => "i",
        'й' => "i",
        'х' => "kh",
        'ц' => "ts",
        'щ' => "shch",
        'ь' => "",
        'ю' => "iu",
        'я' => "ia",
        'ʼ' => "",
        other => return russian(other),
    };
    Some(s)
}

fn greek(c: char) -> Option<&'static str> {
    let s = match c {
        'α' | 'ά' => "a",
        'β' => "v",
        'γ' => "g",
        'δ' => "d",
        'ε' | 'έ' => "e",
        'ζ' => "z",
        'η' | 'ή' => "i",
        'θ' => "th",
        'ι' | 'ί' | 'ϊ' | 'ΐ' => "i",
        'κ' => "k",
        'λ' => "l",
        'μ' => "m",
        'ν' => "n",
        'ξ' => "x",
        'ο' | 'ό' => "o",
        'π' => "p",
        'ρ' => "r",
        'σ' | 'ς' => "s",
        'τ' => "t",
        'υ' | 'ύ' | 'ϋ' | 'ΰ' => "y",
        'φ' => "f",
        'χ' => "ch",
        'ψ' => "ps",
        'ω' | 'ώ' => "o",
        _ => return None,
    };
    Some(s)
}

fn polish(c: char) -> Option<&'static str> {
    let s = match c {
        'ą' => "a",
        'ć' => "c",
        'ę' => "e",
        'ł' => "l",
        'ń' => "n",
        'ó' => "o",
        'ś' => "s",
        'ź' | 'ż' => "z",
        _ => return None,
    };
    Some(s)
}

fn common_symbols(c: char) -> Option<&'static str> {
    let s = match c {
        '“' | '”' | '„' | '«' | '»' => "\"",
        '‘' | '’' | '‚' | '′' => "'",
        '–' | '—' | '‒' | '−' => "-",
        '…' => "...",
        '•' | '·' => "*",
        '€' => "EUR",
        '£' => "GBP",
        '©' => "(c)",
        '®' => "(R)",
        '™' => "TM",
        '×' => "x",
        '\u{00A0}' | '\u{2009}' | '\u{202F}' => " ",
        _ => return None,
    };
    Some(s)
}

fn extended_ascii(c: char) -> Option<&'static str> {
    let s = match c {
        'œ' => "oe",
        'æ' => "ae",
        'ø' => "o",
        'đ' | 'ð' => "d",
        'ħ' => "h",
        'ı' => "i",
        'ŀ' => "l",
        'þ' => "th",
        _ => return None,
    };
    Some(s)
}

fn strip_diacritic(c: char) -> Option<char> {
    let base = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ĥ' | 'ħ' => 'h',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
        'ĵ' => 'j',
        'ķ' => 'k',
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => 'l',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'ţ' | 'ť' | 'ŧ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ŵ' => 'w',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        _ => return None,
    };
    Some(base)
}

fn flatten_to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else if let Some(base) = strip_diacritic(c) {
            out.push(base);
        } else if let Some(base) = c.to_lowercase().next().and_then(strip_diacritic) {
            out.extend(base.to_uppercase());
        } else if c.is_whitespace() {
            out.push(' ');
        }
    }
    out
}

/// An ordered chain of transliteration tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transliterator {
    languages: Vec<Language>,
}

impl Transliterator {
    /// Build from a device's configured language names. Unknown names are
    /// logged and skipped. Devices without emoji glyphs also get a final
    /// ASCII flattening step.
    pub fn from_names<S: AsRef<str>>(names: &[S], unicode_emoji: bool) -> Option<Self> {
        let mut languages: Vec<Language> = Vec::new();
        for name in names {
            let name = name.as_ref();
            if name.trim().is_empty() {
                continue;
            }
            match Language::from_name(name) {
                Some(language) => languages.push(language),
                None => warn!(language = name, "Transliterator not found"),
            }
        }

        if names.iter().all(|n| n.as_ref().trim().is_empty()) {
            return None;
        }
        if !unicode_emoji {
            languages.push(Language::FlattenToAscii);
        }
        Some(Self { languages })
    }

    /// Tables applied, in order
    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    /// Run every table over `text`
    pub fn transliterate(&self, text: &str) -> String {
        self.languages
            .iter()
            .fold(text.to_string(), |acc, language| language.apply(&acc))
    }
}

/// Full pipeline for one device: character filter, emoji flattening, then
/// transliteration
pub fn sanitize(
    text: &str,
    filter: impl Fn(&str) -> String,
    unicode_emoji: bool,
    transliterator: Option<&Transliterator>,
) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut out = filter(text);
    if !unicode_emoji {
        out = emoji_to_ascii(&out);
    }
    match transliterator {
        Some(t) => t.transliterate(&out),
        None => out,
    }
}
