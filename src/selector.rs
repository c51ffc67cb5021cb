// Player index selectors such as "1-5,7,9-11".

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::BotError;

/// Upper bound on how many indices one selector may expand to.
pub const MAX_SELECTED: usize = 1000;

/// An ordered set of distinct, positive (1-based) roster indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSelector(BTreeSet<u32>);

impl IndexSelector {
    /// Parse a selector.
    ///
    /// Tokens are separated by `,` or the full-width `，`; each token is
    /// either `N` or an inclusive range `N-M` with `1 <= N <= M`.
    pub fn parse(input: &str) -> Result<Self, BotError> {
        let mut indices = BTreeSet::new();
        for raw in input.split([',', '，']) {
            let token = raw.trim();
            if token.is_empty() {
                return Err(invalid(raw));
            }
            let (lo, hi) = match token.split_once('-') {
                Some((a, b)) => (parse_index(a, token)?, parse_index(b, token)?),
                None => {
                    let n = parse_index(token, token)?;
                    (n, n)
                }
            };
            if lo > hi {
                return Err(invalid(token));
            }
            if (hi - lo) as usize >= MAX_SELECTED {
                return Err(invalid(token));
            }
            indices.extend(lo..=hi);
            if indices.len() > MAX_SELECTED {
                return Err(invalid(token));
            }
        }
        Ok(Self(indices))
    }

    /// Indices `1..=n`, capped at `MAX_SELECTED`.
    pub fn first(n: usize) -> Self {
        Self((1..=n.min(MAX_SELECTED) as u32).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, index: u32) -> bool {
        self.0.contains(&index)
    }
}

fn parse_index(part: &str, token: &str) -> Result<u32, BotError> {
    let part = part.trim();
    // u32::from_str accepts a leading '+', which is not part of the grammar.
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(token));
    }
    match part.parse::<u32>() {
        Ok(0) | Err(_) => Err(invalid(token)),
        Ok(n) => Ok(n),
    }
}

fn invalid(token: &str) -> BotError {
    BotError::InvalidSelector {
        token: token.trim().to_string(),
    }
}

impl FromStr for IndexSelector {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Normalized form: ascending, runs of two or more collapsed to `a-b`.
impl fmt::Display for IndexSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut iter = self.0.iter().copied().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if end > start {
                write!(f, "{start}-{end}")?;
            } else {
                write!(f, "{start}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(s: &str) -> Vec<u32> {
        IndexSelector::parse(s).unwrap().iter().collect()
    }

    fn rejected_token(s: &str) -> String {
        match IndexSelector::parse(s) {
            Err(BotError::InvalidSelector { token }) => token,
            other => panic!("expected InvalidSelector for {s:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_ranges_and_singles() {
        assert_eq!(indices("1-3,5,7-9"), vec![1, 2, 3, 5, 7, 8, 9]);
    }

    #[test]
    fn test_whitespace_and_fullwidth_comma() {
        assert_eq!(indices(" 2 , 4-5 ，7"), vec![2, 4, 5, 7]);
    }

    #[test]
    fn test_duplicates_collapse_and_sort() {
        assert_eq!(indices("5,1-3,2,5"), vec![1, 2, 3, 5]);
    }

    #[test]
    fn test_degenerate_range() {
        assert_eq!(indices("4-4"), vec![4]);
    }

    #[test]
    fn test_reversed_range_rejected() {
        assert_eq!(rejected_token("5-2"), "5-2");
    }

    #[test]
    fn test_non_integer_rejected() {
        assert_eq!(rejected_token("abc"), "abc");
        assert_eq!(rejected_token("1,x-3"), "x-3");
        assert_eq!(rejected_token("+3"), "+3");
    }

    #[test]
    fn test_zero_and_negative_rejected() {
        assert_eq!(rejected_token("0"), "0");
        assert_eq!(rejected_token("1,-2"), "-2");
        assert_eq!(rejected_token("0-3"), "0-3");
    }

    #[test]
    fn test_empty_input_and_tokens_rejected() {
        assert!(IndexSelector::parse("").is_err());
        assert!(IndexSelector::parse("1,,2").is_err());
        assert!(IndexSelector::parse("1,").is_err());
    }

    #[test]
    fn test_expansion_is_capped() {
        assert!(IndexSelector::parse("1-1000").is_ok());
        assert!(IndexSelector::parse("1-1001").is_err());
        assert!(IndexSelector::parse("1-4294967295").is_err());
        assert!(IndexSelector::parse("1-600,700-1200").is_err());
    }

    #[test]
    fn test_normalized_form() {
        let sel = IndexSelector::parse("9,8,7,5,3,2,1").unwrap();
        assert_eq!(sel.to_string(), "1-3,5,7-9");
        let sel = IndexSelector::parse("1,3,4").unwrap();
        assert_eq!(sel.to_string(), "1,3-4");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for input in ["1-3,5,7-9", "10,2,3,4,11", "1", "100-120,1"] {
            let once = IndexSelector::parse(input).unwrap();
            let twice: IndexSelector = once.to_string().parse().unwrap();
            assert_eq!(once, twice);
            assert_eq!(once.to_string(), twice.to_string());
        }
    }
}
