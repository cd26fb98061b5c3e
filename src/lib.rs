#[macro_use]
extern crate lazy_static;

pub mod activated;
pub mod earley;
pub mod error;
pub mod forest;
pub mod grammar;
pub mod lexicon;
pub mod parse_grammar;
pub mod rules;
pub mod utils;

use crate::earley::{parse_chart, Chart};
use crate::forest::{readings, DerivationTree};
pub use crate::error::GrammarError;
pub use crate::grammar::Grammar;
pub use crate::rules::{AuxiliaryKind, Entry, GornNumber, Layer, NodeType, TIGRule};
pub use crate::utils::Err;

impl Grammar {
  pub fn parse_chart<T: AsRef<str>>(&self, input: &[T]) -> Chart {
    parse_chart(self, input)
  }

  /// The packed forest of every analysis of `input`. Empty if the input is rejected.
  pub fn parse_forest<T: AsRef<str>>(&self, input: &[T]) -> DerivationTree {
    DerivationTree::from(&self.parse_chart(input))
  }

  /// One derivation tree per analysis of `input`
  pub fn parse<T: AsRef<str>>(&self, input: &[T]) -> Vec<DerivationTree> {
    readings(&self.parse_chart(input))
  }
}

#[cfg(test)]
const GRAMMAR: &str = r#"
  start S;

  rule 0 [the cat] { 0: NP -> the cat; }
  rule 1 [the dog] { 0: NP -> the dog; }
  rule 2 [saw] {
    0: S -> NP! VP;
    0.2: VP -> saw NP!;
  }
  rule 3 [on monday] prob 0.5 spine 0 {
    0: VP -> VP* ADV;
    0.2: ADV -> on monday;
  }
  rule 4 [with] spine 0 {
    0: NP -> NP* PP;
    0.2: PP -> with NP!;
  }
  rule 5 [telescope] { 0: NP -> a telescope; }
  rule 6 [with] spine 0 {
    0: VP -> VP* PP;
    0.2: PP -> with NP!;
  }
"#;

#[test]
fn test_substitution_and_adjunction() {
  let g: Grammar = GRAMMAR.parse().unwrap();
  let readings = g.parse(&["the", "cat", "saw", "the", "dog", "on", "monday"]);
  assert_eq!(readings.len(), 1);

  let reading = &readings[0];
  assert_eq!(reading.len(), 4);
  let adjunction = reading.edges().iter().find(|e| e.is_adjunction()).unwrap();
  assert_eq!(adjunction.first().root_symbol(), "S");
  assert_eq!(adjunction.second().rule().index(), 3);
  assert_eq!(adjunction.connector(), &GornNumber::root());
  let forest::DerivationEdge::Adjunction { site, .. } = adjunction else {
    unreachable!()
  };
  assert_eq!(site, &GornNumber::new(vec![0, 2]));

  let chart = g.parse_chart(&["the", "cat", "saw", "the", "dog", "on", "monday"]);
  let root = chart.accepting().next().unwrap();
  assert_eq!(root.probability(), 0.5);
}

#[test]
fn test_pp_attachment_ambiguity() {
  let g: Grammar = GRAMMAR.parse().unwrap();
  let input = "the cat saw the dog with a telescope"
    .split(' ')
    .collect::<Vec<_>>();

  let readings = g.parse(&input);
  assert_eq!(readings.len(), 2);
  let hosts = readings
    .iter()
    .map(|r| {
      let pp = r
        .edges()
        .iter()
        .find(|e| e.is_adjunction())
        .unwrap();
      pp.first().root_symbol().to_string()
    })
    .collect::<Vec<_>>();
  assert!(hosts.contains(&"S".to_string()));
  assert!(hosts.contains(&"NP".to_string()));

  // both readings share one packed forest
  let forest = g.parse_forest(&input);
  assert_eq!(forest.edges().iter().filter(|e| e.is_adjunction()).count(), 2);
}

#[test]
fn test_rejected_input_has_empty_forest() {
  let g: Grammar = GRAMMAR.parse().unwrap();
  let input = ["saw", "the", "cat"];
  assert!(!g.parse_chart(&input).is_accepted());
  assert!(g.parse_forest(&input).is_empty());
  assert!(g.parse(&input).is_empty());
}

#[test]
fn test_parallel_parses_share_grammar() {
  let g: Grammar = GRAMMAR.parse().unwrap();
  let sentences = [
    "the cat saw the dog",
    "the dog saw the cat on monday",
    "the cat saw the dog with a telescope",
    "the cat the dog",
  ];

  let counts = std::thread::scope(|scope| {
    let handles = sentences
      .iter()
      .map(|s| {
        let g = &g;
        scope.spawn(move || g.parse(&s.split(' ').collect::<Vec<_>>()).len())
      })
      .collect::<Vec<_>>();
    handles
      .into_iter()
      .map(|h| h.join().unwrap())
      .collect::<Vec<_>>()
  });

  assert_eq!(counts, vec![1, 1, 2, 0]);
}

#[test]
fn test_modifiers_on_both_sides() {
  let g: Grammar = include_str!("../grammars/modifiers.tig").parse().unwrap();
  let input = "the big old dog saw mary with a telescope on monday"
    .split(' ')
    .collect::<Vec<_>>();

  let readings = g.parse(&input);
  assert_eq!(readings.len(), 2);
  for reading in readings.iter() {
    let adjoined = reading
      .edges()
      .iter()
      .filter(|e| e.is_adjunction())
      .map(|e| e.second().rule().index())
      .collect::<Vec<_>>();
    assert_eq!(adjoined.len(), 4);
    for index in [30, 31, 42] {
      assert!(adjoined.contains(&index), "missing rule {index}");
    }
  }
}
