use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use tracing::warn;

use crate::error::GrammarError;
use crate::lexicon::Lexicon;
use crate::rules::{AuxiliaryKind, GornNumber, Layer, TIGRule};

/// One grammar rule instantiated for one parse, anchored at a concrete input position.
///
/// Identity is the per-parse `id`: the same rule anchored at two positions gives two
/// distinct instances.
#[derive(Debug)]
pub struct ActivatedTIGRule {
  id: usize,
  rule: Arc<TIGRule>,
  anchor_pos: usize,
  root_symbol: String,
}

impl ActivatedTIGRule {
  pub fn new(id: usize, rule: Arc<TIGRule>, anchor_pos: usize) -> Result<Self, GrammarError> {
    let root_symbol = rule.root_symbol()?.to_string();
    Ok(Self {
      id,
      rule,
      anchor_pos,
      root_symbol,
    })
  }

  pub fn id(&self) -> usize {
    self.id
  }

  pub fn rule(&self) -> &Arc<TIGRule> {
    &self.rule
  }

  pub fn root_symbol(&self) -> &str {
    &self.root_symbol
  }

  /// Input position of the first anchor
  pub fn anchor_pos(&self) -> usize {
    self.anchor_pos
  }

  /// One past the input position of the last anchor
  pub fn anchor_end(&self) -> usize {
    self.anchor_pos + self.rule.lexical_anchors().len()
  }

  pub fn is_initial(&self) -> bool {
    self.rule.is_initial()
  }

  pub fn is_auxiliary(&self) -> bool {
    self.rule.is_auxiliary()
  }

  pub fn auxiliary_kind(&self) -> Option<AuxiliaryKind> {
    self.rule.auxiliary_kind()
  }

  pub fn layers(&self) -> &[Layer] {
    self.rule.layers()
  }

  /// The layer at `address`, or None if this tree has no node there
  pub fn get_layer(&self, address: &GornNumber) -> Option<&Layer> {
    self.rule.layer(address)
  }

  pub fn layer_index(&self, address: &GornNumber) -> Option<usize> {
    self.rule.layer_index(address)
  }
}

impl PartialEq for ActivatedTIGRule {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for ActivatedTIGRule {}

impl Hash for ActivatedTIGRule {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

impl fmt::Display for ActivatedTIGRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}@{}", self.root_symbol, self.rule.index(), self.anchor_pos)
  }
}

/// Every tree instance the lexicon produced for one input, grouped by root symbol
#[derive(Debug, Default)]
pub struct Activations {
  trees: Vec<Rc<ActivatedTIGRule>>,
  initial: HashMap<String, Vec<Rc<ActivatedTIGRule>>>,
  auxiliary: HashMap<String, Vec<Rc<ActivatedTIGRule>>>,
}

impl Activations {
  pub fn activate<T: AsRef<str>>(lexicon: &Lexicon, input: &[T]) -> Self {
    let mut activations = Self::default();

    for pos in 0..input.len() {
      for (_, rules) in lexicon.matches(input, pos) {
        for rule in rules {
          let id = activations.trees.len();
          match ActivatedTIGRule::new(id, rule.clone(), pos) {
            Ok(tree) => activations.push(Rc::new(tree)),
            Err(e) => warn!(rule = rule.index(), pos, "cannot activate rule: {}", e),
          }
        }
      }
    }

    activations
  }

  fn push(&mut self, tree: Rc<ActivatedTIGRule>) {
    let table = if tree.is_auxiliary() {
      &mut self.auxiliary
    } else {
      &mut self.initial
    };
    table
      .entry(tree.root_symbol().to_string())
      .or_default()
      .push(tree.clone());
    self.trees.push(tree);
  }

  /// Every instance, in order of anchor position
  pub fn trees(&self) -> &[Rc<ActivatedTIGRule>] {
    &self.trees
  }

  pub fn len(&self) -> usize {
    self.trees.len()
  }

  pub fn is_empty(&self) -> bool {
    self.trees.is_empty()
  }

  pub fn initial(&self, root: &str) -> &[Rc<ActivatedTIGRule>] {
    self.initial.get(root).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn auxiliary(&self, root: &str) -> &[Rc<ActivatedTIGRule>] {
    self.auxiliary.get(root).map(Vec::as_slice).unwrap_or(&[])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rules::Entry;

  fn lexicon() -> Lexicon {
    let np = TIGRule::new(
      0,
      vec![Layer::new(vec![0], vec![Entry::nonterminal("NP"), Entry::terminal("dog")])],
      vec!["dog".to_string()],
      1,
      1.0,
      None,
    );
    let s = TIGRule::new(
      1,
      vec![
        Layer::new(
          vec![0],
          vec![
            Entry::nonterminal("S"),
            Entry::substitution("NP"),
            Entry::nonterminal("VP"),
          ],
        ),
        Layer::new(vec![0, 2], vec![Entry::nonterminal("VP"), Entry::terminal("barks")]),
      ],
      vec!["barks".to_string()],
      1,
      1.0,
      None,
    );
    let adv = TIGRule::new(
      2,
      vec![
        Layer::new(
          vec![0],
          vec![Entry::nonterminal("VP"), Entry::foot("VP"), Entry::nonterminal("ADV")],
        ),
        Layer::new(vec![0, 2], vec![Entry::nonterminal("ADV"), Entry::terminal("loudly")]),
      ],
      vec!["loudly".to_string()],
      1,
      1.0,
      Some(GornNumber::root()),
    );

    let mut lexicon = Lexicon::new();
    for r in [np, s, adv] {
      lexicon.add(Arc::new(r));
    }
    lexicon
  }

  #[test]
  fn test_activate_per_position() {
    let lexicon = lexicon();
    let activations = Activations::activate(&lexicon, &["dog", "barks", "dog", "loudly"]);

    assert_eq!(activations.len(), 4);
    let dogs = activations.initial("NP");
    assert_eq!(
      dogs.iter().map(|t| t.anchor_pos()).collect::<Vec<_>>(),
      vec![0, 2]
    );
    assert_ne!(dogs[0], dogs[1]);
    assert_eq!(dogs[0].rule(), dogs[1].rule());

    assert_eq!(activations.initial("S").len(), 1);
    assert!(activations.initial("VP").is_empty());
    let adv = &activations.auxiliary("VP")[0];
    assert!(adv.is_auxiliary());
    assert_eq!(adv.auxiliary_kind(), Some(AuxiliaryKind::Right));
    assert_eq!(adv.anchor_end(), 4);
  }

  #[test]
  fn test_get_layer() {
    let lexicon = lexicon();
    let activations = Activations::activate(&lexicon, &["barks"]);
    let s = &activations.initial("S")[0];
    assert!(s.is_initial());

    let vp = GornNumber::root().child(2);
    assert_eq!(s.get_layer(&vp).map(|l| &l.gorn), Some(&vp));
    // the substitution site has no layer of its own
    assert!(s.get_layer(&GornNumber::root().child(1)).is_none());
    assert!(s.get_layer(&vp.child(1)).is_none());
  }
}
