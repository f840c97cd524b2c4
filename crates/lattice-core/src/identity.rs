//! Layer 1: identity atoms.
//!
//! A thought's identity is its *normalized* text, not its display text:
//! "Apple ", "apple" and "Âpplé" are the same thought. Both indices are
//! keyed by the sha256 of a normal form, stable across process restarts.
//!
//! There is no defined resolution for a genuine hash collision between two
//! distinct normal forms; the auditor detects and flags, never merges.

use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::InvalidKey;

/// Separator used when hashing a context (an ordered list of ancestor
/// values). Every element is *prefixed* with NUL, so the join is injective
/// even for empty values: `[]` hashes "", `[""]` hashes "\0". NUL cannot
/// appear in thought text.
const CONTEXT_SEPARATOR: char = '\0';

/// Canonical, comparison-ready form of a thought value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalForm(String);

impl NormalForm {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The root context normalizes to the empty form.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NormalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalize a thought value: strip markup and entities, fold case and
/// diacritics, drop quote punctuation and a trailing colon, trim whitespace.
///
/// Meta attributes keep their leading `=` so `=archive` and `archive` stay
/// distinct identities.
pub fn normalize(value: &str) -> NormalForm {
    let stripped = strip_markup(value);
    let mut out = String::with_capacity(stripped.len());
    for ch in stripped.chars() {
        if matches!(ch, '"' | '\'' | '`' | '\u{201c}' | '\u{201d}' | '\u{2018}' | '\u{2019}') {
            continue;
        }
        let folded = fold_diacritic(ch);
        for lower in folded.to_lowercase() {
            out.push(lower);
        }
    }
    let trimmed = out.trim();
    let trimmed = trimmed.strip_suffix(':').unwrap_or(trimmed).trim_end();
    NormalForm(trimmed.to_string())
}

/// Whether a value is a meta attribute (`=archive`, `=sort`, dividers).
pub fn is_meta(value: &str) -> bool {
    value.trim_start().starts_with('=')
}

/// Whether two display values are the same identity.
pub fn same_value(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Remove `<...>` tag spans and decode the entities the editor emits.
fn strip_markup(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_tag = false;
    let mut chars = value.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            '&' => {
                let rest = &value[index..];
                if let Some((decoded, len)) = decode_entity(rest) {
                    if let Some(decoded) = decoded {
                        out.push(decoded);
                    }
                    // skip the entity body
                    for _ in 0..len - 1 {
                        chars.next();
                    }
                } else {
                    out.push('&');
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Decode a leading entity; returns (replacement, consumed chars).
fn decode_entity(rest: &str) -> Option<(Option<char>, usize)> {
    const ENTITIES: &[(&str, Option<char>)] = &[
        ("&amp;", Some('&')),
        ("&lt;", Some('<')),
        ("&gt;", Some('>')),
        ("&nbsp;", Some(' ')),
        ("&quot;", None),
        ("&#39;", None),
    ];
    for (entity, replacement) in ENTITIES {
        if rest.starts_with(entity) {
            return Some((*replacement, entity.chars().count()));
        }
    }
    None
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'à'..='å' | 'À'..='Å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'Ç' | 'ć' | 'č' => 'c',
        'è'..='ë' | 'È'..='Ë' | 'ē' | 'ė' | 'ę' => 'e',
        'ì'..='ï' | 'Ì'..='Ï' | 'ī' | 'į' => 'i',
        'ñ' | 'Ñ' | 'ń' => 'n',
        'ò'..='ö' | 'Ò'..='Ö' | 'ø' | 'Ø' | 'ō' => 'o',
        'ù'..='ü' | 'Ù'..='Ü' | 'ū' | 'ů' => 'u',
        'ý' | 'ÿ' | 'Ý' => 'y',
        'š' | 'ś' => 's',
        'ž' | 'ź' | 'ż' => 'z',
        _ => ch,
    }
}

/// Key of a Lexeme entry: sha256 of the normalized value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LexemeKey([u8; 32]);

impl LexemeKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn parse_str(s: &str) -> Result<Self, InvalidKey> {
        decode_hex(s).map(Self)
    }
}

impl fmt::Debug for LexemeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LexemeKey({}..)", &encode_hex(&self.0)[..8])
    }
}

impl fmt::Display for LexemeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", encode_hex(&self.0))
    }
}

impl TryFrom<String> for LexemeKey {
    type Error = InvalidKey;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        LexemeKey::parse_str(&s)
    }
}

impl From<LexemeKey> for String {
    fn from(key: LexemeKey) -> String {
        encode_hex(&key.0)
    }
}

/// Key of a Location entry: sha256 of the joined normalized context.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationKey([u8; 32]);

impl LocationKey {
    /// The root context (no ancestors).
    pub fn root() -> Self {
        location_key::<&str>(&[])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn parse_str(s: &str) -> Result<Self, InvalidKey> {
        decode_hex(s).map(Self)
    }
}

impl fmt::Debug for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocationKey({}..)", &encode_hex(&self.0)[..8])
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", encode_hex(&self.0))
    }
}

impl TryFrom<String> for LocationKey {
    type Error = InvalidKey;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        LocationKey::parse_str(&s)
    }
}

impl From<LocationKey> for String {
    fn from(key: LocationKey) -> String {
        encode_hex(&key.0)
    }
}

/// Key for a value's Lexeme entry.
pub fn lexeme_key(value: &str) -> LexemeKey {
    LexemeKey(sha256(normalize(value).as_str().as_bytes()))
}

/// Key for a context's Location entry.
pub fn location_key<S: AsRef<str>>(context: &[S]) -> LocationKey {
    let mut joined = String::new();
    for value in context {
        joined.push(CONTEXT_SEPARATOR);
        joined.push_str(normalize(value.as_ref()).as_str());
    }
    LocationKey(sha256(joined.as_bytes()))
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    buf
}

fn encode_hex(bytes: &[u8; 32]) -> String {
    let mut out = String::with_capacity(64);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn decode_hex(s: &str) -> Result<[u8; 32], InvalidKey> {
    if s.len() != 64 || !s.is_ascii() {
        return Err(InvalidKey {
            raw: s.to_string(),
            reason: "expected 64 hex characters",
        });
    }
    let mut buf = [0u8; 32];
    for (index, slot) in buf.iter_mut().enumerate() {
        let pair = &s[index * 2..index * 2 + 2];
        *slot = u8::from_str_radix(pair, 16).map_err(|_| InvalidKey {
            raw: s.to_string(),
            reason: "non-hex character",
        })?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_whitespace_and_diacritics() {
        assert_eq!(normalize("  Apple "), normalize("apple"));
        assert_eq!(normalize("Âpplé"), normalize("apple"));
        assert_eq!(normalize("résumé"), normalize("RESUME"));
        assert_ne!(normalize("apple"), normalize("apples"));
    }

    #[test]
    fn normalize_strips_quotes_tags_and_trailing_colon() {
        assert_eq!(normalize("\"apple\""), normalize("apple"));
        assert_eq!(normalize("<b>apple</b>"), normalize("apple"));
        assert_eq!(normalize("Projects:"), normalize("projects"));
        assert_eq!(normalize("a &amp; b"), normalize("a & b"));
    }

    #[test]
    fn meta_values_keep_their_marker() {
        assert_ne!(normalize("=archive"), normalize("archive"));
        assert!(is_meta("=archive"));
        assert!(!is_meta("archive"));
    }

    #[test]
    fn keys_are_stable_and_order_sensitive() {
        assert_eq!(lexeme_key("Apple"), lexeme_key("  apple "));
        assert_eq!(
            location_key(&["a", "b"]),
            location_key(&["A ", "b"]),
            "keys follow normalized values"
        );
        assert_ne!(location_key(&["a", "b"]), location_key(&["b", "a"]));
        assert_ne!(location_key(&["ab"]), location_key(&["a", "b"]));
        assert_eq!(LocationKey::root(), location_key::<&str>(&[]));
    }

    #[test]
    fn empty_values_do_not_alias_their_parent_context() {
        assert_ne!(location_key(&[""]), LocationKey::root());
        assert_ne!(location_key(&["a", ""]), location_key(&["a"]));
        assert_ne!(location_key(&["", "a"]), location_key(&["a"]));
    }

    #[test]
    fn key_hex_round_trips() {
        let key = lexeme_key("apple");
        let hex = String::from(key);
        assert_eq!(hex.len(), 64);
        assert_eq!(LexemeKey::parse_str(&hex).unwrap(), key);
        assert!(LexemeKey::parse_str("zz").is_err());
    }
}
