use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::rules::TIGRule;

/// A trie over the lexical anchors of the grammar's rules.
///
/// Following the anchors `a1 .. an` from the root leads to the node holding exactly
/// the rules anchored by `[a1, .., an]`. Only the root carries start symbols.
#[derive(Debug, Default)]
pub struct Lexicon {
  content: Vec<Arc<TIGRule>>,
  entries: HashMap<String, Lexicon>,
  start_symbols: HashSet<String>,
}

impl Lexicon {
  pub fn new() -> Self {
    Default::default()
  }

  /// Files a rule under its anchor sequence. Rules without anchors can never be
  /// triggered by the input, so they are dropped.
  pub fn add(&mut self, rule: Arc<TIGRule>) {
    if rule.lexical_anchors().is_empty() {
      debug!(rule = rule.index(), "dropping rule without lexical anchors");
      return;
    }

    let mut node = self;
    for anchor in rule.lexical_anchors() {
      node = node.entries.entry(anchor.clone()).or_default();
    }
    node.content.push(rule);
  }

  /// Rules anchored by exactly `tokens[start..]`. Empty if there are none.
  pub fn find<T: AsRef<str>>(&self, tokens: &[T], start: usize) -> &[Arc<TIGRule>] {
    let mut node = self;
    for token in tokens.get(start..).unwrap_or(&[]) {
      match node.entries.get(token.as_ref()) {
        Some(next) => node = next,
        None => return &[],
      }
    }
    &node.content
  }

  /// Every anchor sequence that starts at `tokens[start]`, as (window length, rules).
  /// Walks the trie once, so this is linear in the longest match.
  pub fn matches<'a, T: AsRef<str>>(
    &'a self,
    tokens: &[T],
    start: usize,
  ) -> Vec<(usize, &'a [Arc<TIGRule>])> {
    let mut found = Vec::new();
    let mut node = self;
    for (offset, token) in tokens.iter().skip(start).enumerate() {
      match node.entries.get(token.as_ref()) {
        Some(next) => node = next,
        None => break,
      }
      if !node.content.is_empty() {
        found.push((offset + 1, node.content.as_slice()));
      }
    }
    found
  }

  pub fn set_start_symbols(&mut self, start_symbols: HashSet<String>) {
    self.start_symbols = start_symbols;
  }

  pub fn start_symbols(&self) -> &HashSet<String> {
    &self.start_symbols
  }

  pub fn is_start_symbol(&self, symbol: &str) -> bool {
    self.start_symbols.contains(symbol)
  }

  /// Number of rules stored in this node and everything below it
  pub fn size(&self) -> usize {
    self.content.len() + self.entries.values().map(Lexicon::size).sum::<usize>()
  }

  fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    let mut keys = self.entries.keys().collect::<Vec<_>>();
    keys.sort();
    for key in keys {
      let sub = &self.entries[key];
      write!(f, "{}'{}' [", "\t".repeat(depth), key)?;
      for (idx, rule) in sub.content.iter().enumerate() {
        if idx > 0 {
          write!(f, ", ")?;
        }
        write!(f, "{}", rule.index())?;
      }
      write!(f, "]")?;
      if !sub.entries.is_empty() {
        write!(f, ":")?;
      }
      writeln!(f)?;
      sub.fmt_depth(f, depth + 1)?;
    }
    Ok(())
  }
}

impl fmt::Display for Lexicon {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut starts = self.start_symbols.iter().collect::<Vec<_>>();
    starts.sort();
    write!(f, "Lexicon: {{start symbols: ")?;
    for (idx, s) in starts.iter().enumerate() {
      if idx > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", s)?;
    }
    writeln!(f, "}}<")?;
    self.fmt_depth(f, 0)?;
    write!(f, ">")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rules::{Entry, Layer};

  fn rule(index: u64, anchors: &[&str]) -> Arc<TIGRule> {
    let mut entries = vec![Entry::nonterminal("S")];
    entries.extend(anchors.iter().map(|a| Entry::terminal(*a)));
    Arc::new(TIGRule::new(
      index,
      vec![Layer::new(vec![0], entries)],
      anchors.iter().map(|a| a.to_string()).collect(),
      1,
      1.0,
      None,
    ))
  }

  #[test]
  fn test_find_added_rules() {
    let rules = vec![
      rule(0, &["dog"]),
      rule(1, &["dog", "barks"]),
      rule(2, &["dog"]),
      rule(3, &["cat", "sleeps", "soundly"]),
    ];

    let mut lexicon = Lexicon::new();
    for r in rules.iter() {
      lexicon.add(r.clone());
    }

    for r in rules.iter() {
      assert!(lexicon.find(r.lexical_anchors(), 0).contains(r));
    }
    assert_eq!(lexicon.size(), rules.len());
    assert_eq!(lexicon.find(&["dog"], 0).len(), 2);
    assert_eq!(lexicon.find(&["the", "dog"], 1).len(), 2);
  }

  #[test]
  fn test_rules_without_anchors_are_dropped() {
    let mut lexicon = Lexicon::new();
    lexicon.add(rule(0, &[]));
    lexicon.add(rule(1, &["dog"]));

    assert_eq!(lexicon.size(), 1);
    assert!(lexicon.find::<&str>(&[], 0).is_empty());
  }

  #[test]
  fn test_misses_are_empty() {
    let mut lexicon = Lexicon::new();
    lexicon.add(rule(0, &["cat", "sleeps"]));

    assert!(lexicon.find(&["dog"], 0).is_empty());
    // a partial anchor sequence ends on an inner node with no rules
    assert!(lexicon.find(&["cat"], 0).is_empty());
    assert!(lexicon.find(&["cat", "sleeps", "now"], 0).is_empty());
  }

  #[test]
  fn test_matches_every_window() {
    let mut lexicon = Lexicon::new();
    lexicon.add(rule(0, &["new"]));
    lexicon.add(rule(1, &["new", "york"]));
    lexicon.add(rule(2, &["york"]));

    let input = ["in", "new", "york"];
    let found = lexicon
      .matches(&input, 1)
      .into_iter()
      .map(|(len, rules)| (len, rules.iter().map(|r| r.index()).collect::<Vec<_>>()))
      .collect::<Vec<_>>();
    assert_eq!(found, vec![(1, vec![0]), (2, vec![1])]);
    assert!(lexicon.matches(&input, 0).is_empty());
  }

  #[test]
  fn test_display() {
    let mut lexicon = Lexicon::new();
    lexicon.add(rule(0, &["dog", "barks"]));
    lexicon.add(rule(1, &["dog"]));
    lexicon.set_start_symbols(["S".to_string()].into_iter().collect());

    assert_eq!(
      lexicon.to_string(),
      "Lexicon: {start symbols: S}<\n'dog' [1]:\n\t'barks' [0]\n>"
    );
  }
}
