//! Name and value normalisation.
//!
//! Every comparison of names against names (grouping, lookups against
//! spreadsheet exports, similarity search) goes through this module so that
//! all call sites agree on one set of rules.
//!
//! | Function | Use |
//! |----------|-----|
//! | [`casefold`] | grouping keys and exact name filters |
//! | [`comparison_key`] | fuzzy matching across spelling variants |
//! | [`normalize_username`] | the `NormBenutzername` uniqueness key |

use unicode_normalization::{UnicodeNormalization as _, char::is_combining_mark};

/// Trimmed, lowercased form of `s`.
pub fn casefold(s: &str) -> String { s.trim().to_lowercase() }

/// The `NormBenutzername` value for a login name.
pub fn normalize_username(s: &str) -> String { casefold(s) }

/// Canonical comparison key for a raw name.
///
/// Applies NFKC, lowercases, strips diacritics, folds letters that have no
/// decomposition (`ß`, `đ`, `ı`, `ł`, `ø`, `æ`) and collapses whitespace.
/// `"  Müller-Lüdenscheidt "` and `"Muller-ludenscheidt"` share one key.
pub fn comparison_key(s: &str) -> String {
  let lowered = s.nfkc().collect::<String>().to_lowercase();
  let mut folded = String::with_capacity(lowered.len());
  for c in lowered.nfd().filter(|c| !is_combining_mark(*c)) {
    match c {
      'ß' => folded.push_str("ss"),
      'đ' => folded.push('d'),
      'ı' => folded.push('i'),
      'ł' => folded.push('l'),
      'ø' => folded.push('o'),
      'æ' => folded.push_str("ae"),
      other => folded.push(other),
    }
  }
  folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The leading `YYYY-MM-DD` of a date string such as `"2012-05-01 00:00:00"`.
pub fn short_date(s: &str) -> Option<&str> {
  let s = s.trim();
  let head = s.get(..10)?;
  let well_formed = head.bytes().enumerate().all(|(i, b)| match i {
    4 | 7 => b == b'-',
    _ => b.is_ascii_digit(),
  });
  well_formed.then_some(head)
}

/// Escape regular-expression metacharacters so `s` matches literally inside
/// a MongoDB `$regex`.
pub fn escape_regex(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    if matches!(
      c,
      '.' | '*' | '+' | '?' | '^' | '$' | '{' | '}' | '(' | ')' | '|' | '[' | ']' | '\\'
    ) {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

/// The first `n` characters of `s`.
pub fn prefix(s: &str, n: usize) -> &str {
  match s.char_indices().nth(n) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

/// A person's name reduced to comparison keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameKey {
  pub family: String,
  pub given:  String,
}

impl NameKey {
  pub fn new(family: &str, given: &str) -> Self {
    Self {
      family: comparison_key(family),
      given:  comparison_key(given),
    }
  }

  /// Whether `candidate` names the same person as `self`.
  ///
  /// Family names must be equal. The candidate's given name must equal this
  /// one or start with it, so a query for "Anna" finds "Anna Lena" but not
  /// the other way round.
  pub fn matches(&self, candidate: &NameKey) -> bool {
    !self.family.is_empty()
      && !self.given.is_empty()
      && self.family == candidate.family
      && candidate.given.starts_with(&self.given)
  }
}
