use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::GrammarError;
use crate::lexicon::Lexicon;
use crate::rules::TIGRule;
use crate::Err;

/// A validated grammar: the rules, indexed by their anchors, plus the start symbols.
/// Immutable after construction, so a single grammar can serve parses on many threads.
#[derive(Debug)]
pub struct Grammar {
  rules: Vec<Arc<TIGRule>>,
  lexicon: Lexicon,
}

impl fmt::Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut starts = self.start_symbols().iter().collect::<Vec<_>>();
    starts.sort();
    write!(f, "start")?;
    for (idx, s) in starts.iter().enumerate() {
      write!(f, "{} {}", if idx > 0 { "," } else { "" }, s)?;
    }
    writeln!(f, ";")?;

    for rule in self.rules.iter() {
      writeln!(f, "\n{}", rule)?;
    }

    Ok(())
  }
}

impl Grammar {
  /// Validates every rule and builds the lexicon. Fails on the first malformed rule.
  pub fn new<I>(rules: I, start_symbols: HashSet<String>) -> Result<Self, GrammarError>
  where
    I: IntoIterator<Item = TIGRule>,
  {
    let mut seen = HashSet::new();
    let mut lexicon = Lexicon::new();
    let mut loaded = Vec::new();

    for rule in rules {
      rule.validate()?;
      if !seen.insert(rule.index()) {
        return Err(GrammarError::DuplicateIndex(rule.index()));
      }
      let rule = Arc::new(rule);
      lexicon.add(rule.clone());
      loaded.push(rule);
    }
    lexicon.set_start_symbols(start_symbols);

    debug!(
      rules = loaded.len(),
      lexicon = lexicon.size(),
      "loaded grammar"
    );

    Ok(Self {
      rules: loaded,
      lexicon,
    })
  }

  pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, Err> {
    fs::read_to_string(path)?.parse()
  }

  pub fn rules(&self) -> &[Arc<TIGRule>] {
    &self.rules
  }

  pub fn lexicon(&self) -> &Lexicon {
    &self.lexicon
  }

  pub fn start_symbols(&self) -> &HashSet<String> {
    self.lexicon.start_symbols()
  }

  pub fn is_start_symbol(&self, symbol: &str) -> bool {
    self.lexicon.is_start_symbol(symbol)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rules::{Entry, Layer};

  fn rule(index: u64, word: &str) -> TIGRule {
    TIGRule::new(
      index,
      vec![Layer::new(vec![0], vec![Entry::nonterminal("S"), Entry::terminal(word)])],
      vec![word.to_string()],
      1,
      1.0,
      None,
    )
  }

  #[test]
  fn test_duplicate_indices_are_rejected() {
    let starts = ["S".to_string()].into_iter().collect::<HashSet<_>>();
    let err = Grammar::new(vec![rule(0, "a"), rule(0, "b")], starts).unwrap_err();
    assert_eq!(err, GrammarError::DuplicateIndex(0));
  }

  #[test]
  fn test_malformed_rule_fails_loading() {
    let empty = TIGRule::new(3, Vec::new(), vec!["a".to_string()], 1, 1.0, None);
    let err = Grammar::new(vec![rule(0, "a"), empty], HashSet::new()).unwrap_err();
    assert_eq!(err, GrammarError::NoLayers { rule: 3 });
  }

  #[test]
  fn test_grammar_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Grammar>();
  }
}
