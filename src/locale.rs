//! Locale codes and the deduplicated locale set that drives static content builds.

use std::fmt;
use std::sync::Arc;

/// Locale every static content build includes
pub const DEFAULT_LOCALE: &str = "en_US";

/// Locale code (e.g., "en_US", "nl_NL", "sr_Latn_RS")
/// Newtype wrapper for type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocaleCode(Arc<str>);

impl LocaleCode {
    /// Create a new LocaleCode without validation.
    /// Values read from config are taken as-is; Magento decides what it accepts.
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// The fallback locale, `en_US`
    pub fn default_locale() -> Self {
        Self::new(DEFAULT_LOCALE)
    }

    /// Create a validated LocaleCode, returning error for invalid format
    /// Format must be xx_YY or xx_Xxxx_YY (e.g., en_US, zh_Hans_CN)
    pub fn validated(s: &str) -> Result<Self, String> {
        if Self::validate_format(s) {
            Ok(Self(Arc::from(s)))
        } else {
            Err(format!(
                "invalid locale format '{}': expected xx_YY (e.g., en_US)",
                s
            ))
        }
    }

    fn validate_format(s: &str) -> bool {
        let parts: Vec<&str> = s.split('_').collect();
        let language = |p: &str| {
            (2..=3).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_lowercase())
        };
        let region = |p: &str| p.len() == 2 && p.bytes().all(|b| b.is_ascii_uppercase());
        let script = |p: &str| {
            let b = p.as_bytes();
            b.len() == 4 && b[0].is_ascii_uppercase() && b[1..].iter().all(u8::is_ascii_lowercase)
        };
        match parts.as_slice() {
            [l, r] => language(l) && region(r),
            [l, s, r] => language(l) && script(s) && region(r),
            _ => false,
        }
    }

    /// Get the inner string reference
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this is a valid locale format
    #[inline]
    pub fn is_valid_format(&self) -> bool {
        Self::validate_format(&self.0)
    }
}

impl fmt::Display for LocaleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LocaleCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LocaleCode {
    fn from(s: String) -> Self {
        Self(Arc::from(s.as_str()))
    }
}

/// Ordered set of locales; keeps first-seen order so logs are reproducible
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleSet(Vec<LocaleCode>);

impl LocaleSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a locale unless already present. Blank codes are ignored.
    /// Returns whether the set changed.
    pub fn insert(&mut self, locale: impl Into<LocaleCode>) -> bool {
        let locale = locale.into();
        if locale.as_str().trim().is_empty() || self.0.contains(&locale) {
            return false;
        }
        self.0.push(locale);
        true
    }

    pub fn contains(&self, locale: &str) -> bool {
        self.0.iter().any(|l| l.as_str() == locale)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocaleCode> {
        self.0.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Codes joined by single spaces
    pub fn joined(&self) -> String {
        self.0
            .iter()
            .map(LocaleCode::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<L: Into<LocaleCode>> Extend<L> for LocaleSet {
    fn extend<I: IntoIterator<Item = L>>(&mut self, iter: I) {
        for locale in iter {
            self.insert(locale);
        }
    }
}

impl<L: Into<LocaleCode>> FromIterator<L> for LocaleSet {
    fn from_iter<I: IntoIterator<Item = L>>(iter: I) -> Self {
        let mut set = LocaleSet::new();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a LocaleSet {
    type Item = &'a LocaleCode;
    type IntoIter = std::slice::Iter<'a, LocaleCode>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== LocaleCode tests ====================

    #[test]
    fn test_locale_code_new() {
        let locale = LocaleCode::new("en_US");
        assert_eq!(locale.as_str(), "en_US");
    }

    #[test]
    fn test_locale_code_default() {
        assert_eq!(LocaleCode::default_locale().as_str(), DEFAULT_LOCALE);
    }

    #[test]
    fn test_locale_code_validated_success() {
        assert!(LocaleCode::validated("en_US").is_ok());
        assert!(LocaleCode::validated("nl_NL").is_ok());
        assert!(LocaleCode::validated("zh_Hans_CN").is_ok());
        assert!(LocaleCode::validated("sr_Latn_RS").is_ok());
    }

    #[test]
    fn test_locale_code_validated_failure() {
        assert!(LocaleCode::validated("english").is_err());
        assert!(LocaleCode::validated("en").is_err());
        assert!(LocaleCode::validated("").is_err());
        assert!(LocaleCode::validated("EN_US").is_err());
        assert!(LocaleCode::validated("en_us").is_err());
        assert!(LocaleCode::validated("zh_hans_CN").is_err());
    }

    #[test]
    fn test_locale_code_is_valid_format() {
        assert!(LocaleCode::new("de_DE").is_valid_format());
        assert!(!LocaleCode::new("--help").is_valid_format());
    }

    #[test]
    fn test_locale_code_display() {
        let locale = LocaleCode::new("de_DE");
        assert_eq!(format!("{}", locale), "de_DE");
    }

    #[test]
    fn test_locale_code_from_string() {
        let locale: LocaleCode = String::from("it_IT").into();
        assert_eq!(locale.as_str(), "it_IT");
    }

    // ==================== LocaleSet tests ====================

    #[test]
    fn test_locale_set_dedups_in_first_seen_order() {
        let set: LocaleSet = ["fr_FR", "en_US", "fr_FR", "de_DE", "en_US"]
            .into_iter()
            .collect();
        assert_eq!(set.joined(), "fr_FR en_US de_DE");
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_locale_set_ignores_blank() {
        let mut set = LocaleSet::new();
        assert!(!set.insert(""));
        assert!(!set.insert("  "));
        assert!(set.is_empty());
    }

    #[test]
    fn test_locale_set_insert_reports_change() {
        let mut set = LocaleSet::new();
        assert!(set.insert("en_US"));
        assert!(!set.insert("en_US"));
        assert!(set.contains("en_US"));
        assert!(!set.contains("fr_FR"));
    }
}
