//! The person a request is about, and the cache identity derived from it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A free-text subject name with optional locality qualifiers.
///
/// Nothing here is validated: the name goes into prompts verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
}

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            province: None,
            municipality: None,
        }
    }

    pub fn with_locality(mut self, province: Option<String>, municipality: Option<String>) -> Self {
        self.province = province.filter(|p| !p.trim().is_empty());
        self.municipality = municipality.filter(|m| !m.trim().is_empty());
        self
    }

    /// Human-readable locality suffix for prompts, e.g. "from Taguig, Metro Manila".
    pub fn locality(&self) -> Option<String> {
        match (&self.municipality, &self.province) {
            (Some(m), Some(p)) => Some(format!("from {}, {}", m, p)),
            (Some(m), None) => Some(format!("from {}", m)),
            (None, Some(p)) => Some(format!("from {}", p)),
            (None, None) => None,
        }
    }

    /// Cache identity for this subject. Locality is not part of the key.
    pub fn cache_key(&self) -> String {
        cache_key(&self.name)
    }
}

/// Normalize a name to `[a-z0-9]*` and digest it.
///
/// Names that differ only by case, whitespace or punctuation collide on
/// purpose: "Juan Dela Cruz" and "juan-dela-cruz" are the same subject.
/// Distinct people whose names differ only by punctuation collide too.
pub fn cache_key(name: &str) -> String {
    sha256_hex(&normalize(name))
}

/// Lower-case and drop everything outside ASCII `[a-z0-9]`.
pub fn normalize(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

pub(crate) fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_case_space_and_punctuation() {
        assert_eq!(normalize("Juan Dela Cruz"), "juandelacruz");
        assert_eq!(normalize("  juan-dela_cruz!! "), "juandelacruz");
        assert_eq!(normalize("Ma. Leonor 2nd"), "maleonor2nd");
    }

    #[test]
    fn equivalent_names_share_a_key() {
        let keys = [
            cache_key("Juan Dela Cruz"),
            cache_key("juan-dela-cruz"),
            cache_key("JUAN  DELA.CRUZ"),
            cache_key("juandelacruz"),
        ];
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
        assert_ne!(keys[0], cache_key("Juan Dela Cruz Jr"));
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = cache_key("Juan Dela Cruz");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sha256_hex_matches_known_digests() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn locality_is_ignored_by_cache_key() {
        let a = Subject::new("Juan Dela Cruz").with_locality(Some("Cebu".into()), None);
        let b = Subject::new("Juan Dela Cruz").with_locality(Some("Leyte".into()), None);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn locality_phrase() {
        let s = Subject::new("X").with_locality(Some("Metro Manila".into()), Some("Taguig".into()));
        assert_eq!(s.locality().as_deref(), Some("from Taguig, Metro Manila"));
        let blank = Subject::new("X").with_locality(Some("  ".into()), None);
        assert_eq!(blank.locality(), None);
    }
}
