//! Boolean checks commonly fed into a [`Verification`](super::Verification).

use crate::extract::color_matches;

/// Rows rendered on a page equal `min(page_size, total)`
#[must_use]
pub fn row_count_matches(rows: usize, page_size: usize, total: u64) -> bool {
    let expected = u64::try_from(page_size).map_or(total, |size| size.min(total));
    u64::try_from(rows).is_ok_and(|rows| rows == expected)
}

/// Every value equals `expected` after trimming. An empty column never
/// passes, since "every row says X" over zero rows is almost always a
/// loading race.
#[must_use]
pub fn all_equal<S: AsRef<str>>(values: &[S], expected: &str) -> bool {
    !values.is_empty() && values.iter().all(|v| v.as_ref().trim() == expected.trim())
}

/// Status label text equals `expected_name` (case-insensitive, trimmed) and
/// its rendered colour is within tolerance of `expected_hex`
#[must_use]
pub fn label_matches(name: &str, color: &str, expected_name: &str, expected_hex: &str) -> bool {
    name.trim().eq_ignore_ascii_case(expected_name.trim()) && color_matches(color, expected_hex)
}
