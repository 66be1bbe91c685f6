//! Case permutations of a header name.
//!
//! API Gateway collapses repeated response headers in its single-value
//! shape, but it treats names that differ only in case as distinct keys.
//! Every repeated value therefore gets its own casing of the name.

/// Lazy, finite sequence of the case variants of a name.
///
/// The n-th variant uppercases the k-th ASCII letter of the name when bit k
/// of n is set, so the sequence starts with the all-lowercase name, then
/// flips the first letter, then the second, and so on. Non-letters never
/// change. Clone an unstarted sequence to replay it.
#[derive(Debug, Clone)]
pub struct CaseVariants {
    chars: Vec<char>,
    letters: Vec<usize>,
    next: u64,
    total: u64,
}

/// Builds the case-variant sequence for `name`.
#[must_use]
pub fn case_variants(name: &str) -> CaseVariants {
    let chars: Vec<char> = name.chars().collect();
    let letters: Vec<usize> = chars
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_ascii_alphabetic())
        .map(|(i, _)| i)
        .collect();
    // Names with 64+ letters have more variants than any response can use.
    let total = u32::try_from(letters.len())
        .ok()
        .and_then(|n| 1u64.checked_shl(n))
        .unwrap_or(u64::MAX);

    CaseVariants {
        chars,
        letters,
        next: 0,
        total,
    }
}

impl CaseVariants {
    /// Number of distinct variants the name has in total.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    fn render(&self, index: u64) -> String {
        let mut chars = self.chars.clone();
        for (bit, &position) in self.letters.iter().enumerate() {
            let upper = u32::try_from(bit)
                .ok()
                .and_then(|b| index.checked_shr(b))
                .is_some_and(|shifted| shifted & 1 == 1);
            chars[position] = if upper {
                chars[position].to_ascii_uppercase()
            } else {
                chars[position].to_ascii_lowercase()
            };
        }
        chars.into_iter().collect()
    }
}

impl Iterator for CaseVariants {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let variant = self.render(self.next);
        self.next += 1;
        Some(variant)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.total - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_first_variants_of_set_cookie() {
        let variants: Vec<String> = case_variants("Set-Cookie").take(4).collect();
        assert_eq!(
            variants,
            vec!["set-cookie", "Set-cookie", "sEt-cookie", "SEt-cookie"]
        );
    }

    #[test]
    fn test_all_variants_are_distinct() {
        let variants: Vec<String> = case_variants("x-id").collect();
        assert_eq!(variants.len(), 8);
        let unique: HashSet<&String> = variants.iter().collect();
        assert_eq!(unique.len(), 8);
        assert!(variants.iter().all(|v| v.eq_ignore_ascii_case("x-id")));
    }

    #[test]
    fn test_name_without_letters_has_one_variant() {
        let variants: Vec<String> = case_variants("1-2").collect();
        assert_eq!(variants, vec!["1-2"]);
    }

    #[test]
    fn test_empty_name() {
        let mut variants = case_variants("");
        assert_eq!(variants.total(), 1);
        assert_eq!(variants.next(), Some(String::new()));
        assert_eq!(variants.next(), None);
    }

    #[test]
    fn test_sequence_is_restartable_by_clone() {
        let variants = case_variants("Vary");
        let first: Vec<String> = variants.clone().collect();
        let second: Vec<String> = variants.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_very_long_name_saturates_total() {
        let name = "a".repeat(80);
        let mut variants = case_variants(&name);
        assert_eq!(variants.total(), u64::MAX);
        assert_eq!(variants.next(), Some(name));
    }
}
