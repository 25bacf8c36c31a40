//! Semantic Text Extractor
//!
//! Converts rendered text ("Showing 1 to 20 of 5,519 records", "21 – 40 of
//! 41", "Pending: 12") into typed integers using an ordered set of named
//! patterns. The first pattern that matches wins.
//!
//! Digit parsing is base-10 and locale-invariant: group separators (`,` `.`
//! no-break space, narrow no-break space, and `'`) are stripped inside a
//! numeric token before parsing. A pattern can use the `{int}` placeholder for
//! such a token:
//!
//! ```rust,ignore
//! let pattern = ExtractionPattern::new("pending", r"Pending:\s*(?P<count>{int})")?;
//! ```
//!
//! Rendered colours are compared with a small per-channel tolerance, see
//! [`Rgb`].

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::config::DEFAULT_COLOR_TOLERANCE;
use crate::result::{HoldfastError, HoldfastResult};

/// Regex source for one integer token, with optional group separators
pub const INT_TOKEN: &str = r"\d{1,3}(?:[,.\x{a0}\x{202f}']\d{3})+|\d+";

/// Per-channel tolerance for rendered colour comparison
pub const COLOR_TOLERANCE: u8 = DEFAULT_COLOR_TOLERANCE;

// A plain space separates numbers and never groups digits
const SEPARATORS: [char; 5] = [',', '.', '\u{a0}', '\u{202f}', '\''];

fn int_regex() -> Option<&'static Regex> {
    static INT: OnceLock<Option<Regex>> = OnceLock::new();
    INT.get_or_init(|| Regex::new(INT_TOKEN).ok()).as_ref()
}

/// Parse one numeric token, stripping group separators
#[must_use]
pub fn parse_integer(token: &str) -> Option<u64> {
    let token = token.trim();
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit() || SEPARATORS.contains(&c)) {
        return None;
    }
    let digits: String = token.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// First integer token in `text` (status cards, badges)
#[must_use]
pub fn extract_count(text: &str) -> Option<u64> {
    int_regex()?
        .find(text)
        .and_then(|m| parse_integer(m.as_str()))
}

// =============================================================================
// Patterns
// =============================================================================

/// A named regex whose named capture groups become integer values
#[derive(Debug, Clone)]
pub struct ExtractionPattern {
    name: String,
    regex: Regex,
}

impl ExtractionPattern {
    /// Compile a pattern; `{int}` expands to [`INT_TOKEN`]
    ///
    /// # Errors
    ///
    /// Returns [`HoldfastError::InvalidPattern`] if the regex does not
    /// compile or has no named capture group
    pub fn new(name: impl Into<String>, pattern: &str) -> HoldfastResult<Self> {
        let source = pattern.replace("{int}", &format!("(?:{INT_TOKEN})"));
        let regex = Regex::new(&source).map_err(|e| HoldfastError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        if regex.capture_names().flatten().next().is_none() {
            return Err(HoldfastError::InvalidPattern {
                pattern: pattern.to_string(),
                message: "pattern has no named capture group".to_string(),
            });
        }
        Ok(Self {
            name: name.into(),
            regex,
        })
    }

    /// Pattern name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Named captures parsed as integers; `None` if the pattern does not
    /// match or a participating group is not numeric
    #[must_use]
    pub fn captures(&self, text: &str) -> Option<BTreeMap<String, u64>> {
        let caps = self.regex.captures(text)?;
        let mut values = BTreeMap::new();
        for name in self.regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                values.insert(name.to_string(), parse_integer(m.as_str())?);
            }
        }
        Some(values)
    }
}

/// Ordered, non-empty set of patterns
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<ExtractionPattern>,
}

impl PatternSet {
    /// Create a set; order is priority
    ///
    /// # Errors
    ///
    /// Returns [`HoldfastError::EmptyPatternSet`] for an empty list
    pub fn new(patterns: Vec<ExtractionPattern>) -> HoldfastResult<Self> {
        if patterns.is_empty() {
            return Err(HoldfastError::EmptyPatternSet);
        }
        Ok(Self { patterns })
    }

    /// Compile `(name, regex)` pairs
    ///
    /// # Errors
    ///
    /// Returns error if any pattern is invalid or the list is empty
    pub fn compile<'a>(sources: impl IntoIterator<Item = (&'a str, &'a str)>) -> HoldfastResult<Self> {
        let patterns = sources
            .into_iter()
            .map(|(name, pattern)| ExtractionPattern::new(name, pattern))
            .collect::<HoldfastResult<Vec<_>>>()?;
        Self::new(patterns)
    }

    /// Patterns in priority order
    pub fn iter(&self) -> impl Iterator<Item = &ExtractionPattern> {
        self.patterns.iter()
    }

    /// Number of patterns
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Always false; kept for API symmetry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Values produced by the first matching pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Name of the pattern that matched
    pub pattern: String,
    /// Named captures as integers
    pub values: BTreeMap<String, u64>,
}

impl Extracted {
    /// Value of one capture
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.get(name).copied()
    }
}

/// Apply `patterns` in order; `None` when nothing matches
#[must_use]
pub fn extract(text: &str, patterns: &PatternSet) -> Option<Extracted> {
    patterns.iter().find_map(|pattern| {
        pattern.captures(text).map(|values| Extracted {
            pattern: pattern.name().to_string(),
            values,
        })
    })
}

/// Like [`extract`], for callers that treat no match as failure
///
/// # Errors
///
/// Returns [`HoldfastError::ExtractionFailed`] carrying the inspected text
pub fn try_extract(text: &str, patterns: &PatternSet) -> HoldfastResult<Extracted> {
    extract(text, patterns).ok_or_else(|| HoldfastError::ExtractionFailed {
        text: text.to_string(),
    })
}

// =============================================================================
// Pagination ranges
// =============================================================================

/// "Showing {start} to {end} of {total}" as integers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRange {
    /// First row shown (1-based, 0 for an empty table)
    pub start: u64,
    /// Last row shown
    pub end: u64,
    /// Total rows across all pages
    pub total: u64,
}

impl PageRange {
    /// Built-in range patterns, highest priority first
    #[must_use]
    pub fn patterns() -> Option<&'static PatternSet> {
        static RANGES: OnceLock<Option<PatternSet>> = OnceLock::new();
        RANGES
            .get_or_init(|| {
                PatternSet::compile([
                    (
                        "showing",
                        r"(?i)showing\s+(?P<start>{int})\s+to\s+(?P<end>{int})\s+of\s+(?P<total>{int})\s+(?:records|entries)",
                    ),
                    (
                        "dashed",
                        r"(?P<start>{int})\s*[–—-]\s*(?P<end>{int})\s+of\s+(?P<total>{int})",
                    ),
                    ("empty", r"^\s*(?P<total>0)\s+of\s+0\s*$"),
                ])
                .ok()
            })
            .as_ref()
    }

    /// Parse a paginator label
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let extracted = extract(text, Self::patterns()?)?;
        let range = Self {
            start: extracted.get("start").unwrap_or(0),
            end: extracted.get("end").unwrap_or(0),
            total: extracted.get("total")?,
        };
        range.is_consistent().then_some(range)
    }

    /// `start <= end <= total`, with `start == 0` only for an empty range
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        if self.start == 0 {
            return self.end == 0;
        }
        self.start <= self.end && self.end <= self.total
    }

    /// Rows shown on this page; 0 for an empty or reversed range
    #[must_use]
    pub const fn rows_on_page(&self) -> u64 {
        if self.start == 0 || self.start > self.end {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// Whether this page shows the last row
    #[must_use]
    pub const fn is_last_page(&self) -> bool {
        self.end >= self.total
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Showing {} to {} of {} records",
            self.start, self.end, self.total
        )
    }
}

// =============================================================================
// Colours
// =============================================================================

/// An opaque RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

impl Rgb {
    /// Create a colour
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `rgb(r, g, b)`, `rgba(r, g, b, a)`, `#rrggbb` or `#rgb`.
    /// Alpha is ignored.
    #[must_use]
    pub fn parse(css: &str) -> Option<Self> {
        let css = css.trim();
        if let Some(hex) = css.strip_prefix('#') {
            return Self::from_hex_digits(hex);
        }
        static FUNCTIONAL: OnceLock<Option<Regex>> = OnceLock::new();
        let regex = FUNCTIONAL
            .get_or_init(|| {
                Regex::new(
                    r"(?i)^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*[\d.]+%?\s*)?\)$",
                )
                .ok()
            })
            .as_ref()?;
        let caps = regex.captures(css)?;
        let channel = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u8>().ok());
        Some(Self::new(channel(1)?, channel(2)?, channel(3)?))
    }

    fn from_hex_digits(hex: &str) -> Option<Self> {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match hex.len() {
            6 => Some(Self::new(
                u8::from_str_radix(&hex[0..2], 16).ok()?,
                u8::from_str_radix(&hex[2..4], 16).ok()?,
                u8::from_str_radix(&hex[4..6], 16).ok()?,
            )),
            3 => {
                let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
                Some(Self::new(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            _ => None,
        }
    }

    /// Lowercase `#rrggbb`
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Every channel differs by at most `tolerance`
    #[must_use]
    pub const fn within_tolerance(&self, other: &Self, tolerance: u8) -> bool {
        self.r.abs_diff(other.r) <= tolerance
            && self.g.abs_diff(other.g) <= tolerance
            && self.b.abs_diff(other.b) <= tolerance
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Whether a computed CSS colour matches `expected_hex` within
/// [`COLOR_TOLERANCE`]. Unparseable input never matches.
#[must_use]
pub fn color_matches(actual: &str, expected_hex: &str) -> bool {
    color_matches_within(actual, expected_hex, COLOR_TOLERANCE)
}

/// [`color_matches`] with an explicit tolerance
#[must_use]
pub fn color_matches_within(actual: &str, expected_hex: &str, tolerance: u8) -> bool {
    match (Rgb::parse(actual), Rgb::parse(expected_hex)) {
        (Some(a), Some(e)) => a.within_tolerance(&e, tolerance),
        _ => false,
    }
}
