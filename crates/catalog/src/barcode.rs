//! Barcode normalization and tolerant matching.
//!
//! Scanners and manual entry disagree on padding: the same EAN may arrive as
//! `"0007894900011"`, `"7894900011"` or with stray separators. Matching is done
//! on the digits-only projection, first exactly, then with leading zeros
//! stripped from both sides.

/// Strip every non-digit character.
pub fn normalize_barcode(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Precomputed match keys for one barcode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BarcodeKey {
    digits: String,
}

impl BarcodeKey {
    /// Returns `None` when the input has no digits at all.
    pub fn new(raw: &str) -> Option<Self> {
        let digits = normalize_barcode(raw);
        if digits.is_empty() {
            None
        } else {
            Some(Self { digits })
        }
    }

    /// Digits-only form.
    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Digits with leading zeros removed; empty for an all-zero code.
    pub fn unpadded(&self) -> &str {
        self.digits.trim_start_matches('0')
    }

    /// Rule (a): identical digit strings.
    pub fn matches_exact(&self, other: &BarcodeKey) -> bool {
        self.digits == other.digits
    }

    /// Rule (b): identical once leading zeros are dropped.
    ///
    /// All-zero codes never match under this rule.
    pub fn matches_unpadded(&self, other: &BarcodeKey) -> bool {
        let ours = self.unpadded();
        !ours.is_empty() && ours == other.unpadded()
    }
}

/// Find the first candidate matching `raw`. An exact digit match anywhere in
/// `candidates` beats a match that ignores leading zeros.
pub fn find_match<'a, T, F>(raw: &str, candidates: &'a [T], key_of: F) -> Option<&'a T>
where
    F: Fn(&T) -> Option<&BarcodeKey>,
{
    let wanted = BarcodeKey::new(raw)?;

    candidates
        .iter()
        .find(|&c| key_of(c).is_some_and(|k| k.matches_exact(&wanted)))
        .or_else(|| {
            candidates
                .iter()
                .find(|&c| key_of(c).is_some_and(|k| k.matches_unpadded(&wanted)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(codes: &[&str]) -> Vec<Option<BarcodeKey>> {
        codes.iter().map(|c| BarcodeKey::new(c)).collect()
    }

    #[test]
    fn normalize_strips_non_digits() {
        assert_eq!(normalize_barcode("78-9490 0011"), "7894900011");
        assert_eq!(normalize_barcode("abc123"), "123");
        assert_eq!(normalize_barcode("abc"), "");
    }

    #[test]
    fn no_digits_no_key() {
        assert!(BarcodeKey::new("  --  ").is_none());
    }

    #[test]
    fn leading_zero_tolerance() {
        let stored = keys(&["7894900011"]);
        let hit = find_match("007894900011", &stored, |k| k.as_ref());
        assert_eq!(hit.and_then(|k| k.as_ref()).map(|k| k.digits()), Some("7894900011"));
    }

    #[test]
    fn exact_match_wins_over_unpadded() {
        let stored = keys(&["0123", "123"]);
        let hit = find_match("123", &stored, |k| k.as_ref()).unwrap();
        assert_eq!(hit.as_ref().unwrap().digits(), "123");
    }

    #[test]
    fn garbage_matches_digit_projection_only() {
        let stored = keys(&["1234", "123"]);
        let hit = find_match("abc123", &stored, |k| k.as_ref()).unwrap();
        assert_eq!(hit.as_ref().unwrap().digits(), "123");

        let stored = keys(&["1234"]);
        assert!(find_match("abc123", &stored, |k| k.as_ref()).is_none());
    }

    #[test]
    fn all_zero_codes_only_match_exactly() {
        let stored = keys(&["000"]);
        assert!(find_match("0", &stored, |k| k.as_ref()).is_none());
        assert!(find_match("000", &stored, |k| k.as_ref()).is_some());
    }

    #[test]
    fn items_without_barcode_are_skipped() {
        let stored = vec![None, BarcodeKey::new("55")];
        assert!(find_match("055", &stored, |k| k.as_ref()).is_some());
        assert!(find_match("", &stored, |k| k.as_ref()).is_none());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: any zero padding of a stored code still finds it.
            #[test]
            fn padding_is_tolerated(code in "[1-9][0-9]{0,13}", pad in 0usize..6) {
                let stored = keys(&[code.as_str()]);
                let padded = format!("{}{}", "0".repeat(pad), code);
                prop_assert!(find_match(&padded, &stored, |k| k.as_ref()).is_some());
            }

            /// Property: normalization is idempotent and digits-only.
            #[test]
            fn normalize_is_idempotent(raw in ".{0,32}") {
                let once = normalize_barcode(&raw);
                prop_assert!(once.chars().all(|c| c.is_ascii_digit()));
                prop_assert_eq!(normalize_barcode(&once), once);
            }
        }
    }
}
