use std::fmt;

/// Language used when neither the request nor the settings provide one.
pub const FALLBACK_LANGUAGE: &str = "zh";

/// Sentinel that asks the engine to detect the spoken language itself.
pub const AUTO_LANGUAGE: &str = "auto";

/// A requested transcription language.
///
/// Engines that accept "no hint" must use [`Language::hint`], which never yields the literal
/// `"auto"` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    Auto,
    Code(String),
}

impl Language {
    /// Parse a raw language value. Blank input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.eq_ignore_ascii_case(AUTO_LANGUAGE) {
            return Some(Self::Auto);
        }
        Some(Self::Code(trimmed.to_ascii_lowercase()))
    }

    /// Resolve the effective language.
    ///
    /// Priority: the request value, then the configured default, then [`FALLBACK_LANGUAGE`].
    pub fn resolve(requested: Option<&str>, default: Option<&str>) -> Self {
        requested
            .and_then(Self::parse)
            .or_else(|| default.and_then(Self::parse))
            .unwrap_or_else(|| Self::Code(FALLBACK_LANGUAGE.to_owned()))
    }

    /// The language hint to hand to an engine, `None` when it should auto-detect.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Auto => None,
            Self::Code(code) => Some(code),
        }
    }

    /// The wire representation (`"auto"` or the code).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Auto => AUTO_LANGUAGE,
            Self::Code(code) => code,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
