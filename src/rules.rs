use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::GrammarError;

/// The role a symbol plays inside an elementary tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
  /// A word that must match the input, usually one of the rule's anchors
  Terminal,
  /// An internal node, expanded by a child layer of the same tree
  Nonterminal,
  /// A frontier node that an initial tree is substituted into
  Substitution,
  /// The frontier node of an auxiliary tree that the host node ends up under
  Foot,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
  pub label: String,
  pub node_type: NodeType,
}

impl Entry {
  pub fn new(label: impl Into<String>, node_type: NodeType) -> Self {
    Self {
      label: label.into(),
      node_type,
    }
  }

  pub fn terminal(label: impl Into<String>) -> Self {
    Self::new(label, NodeType::Terminal)
  }

  pub fn nonterminal(label: impl Into<String>) -> Self {
    Self::new(label, NodeType::Nonterminal)
  }

  pub fn substitution(label: impl Into<String>) -> Self {
    Self::new(label, NodeType::Substitution)
  }

  pub fn foot(label: impl Into<String>) -> Self {
    Self::new(label, NodeType::Foot)
  }

  pub fn is_terminal(&self) -> bool {
    self.node_type == NodeType::Terminal
  }

  pub fn is_foot(&self) -> bool {
    self.node_type == NodeType::Foot
  }
}

/// Writes a word bare if the grammar reader would read it back as a terminal, quoted otherwise
pub(crate) fn fmt_word(f: &mut fmt::Formatter<'_>, word: &str) -> fmt::Result {
  let bare = word.chars().next().is_some_and(|c| c.is_lowercase())
    && word
      .chars()
      .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
  if bare {
    write!(f, "{}", word)
  } else {
    write!(f, "\"{}\"", word)
  }
}

impl fmt::Display for Entry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.node_type {
      NodeType::Terminal => fmt_word(f, &self.label),
      NodeType::Nonterminal => write!(f, "{}", self.label),
      NodeType::Substitution => write!(f, "{}!", self.label),
      NodeType::Foot => write!(f, "{}*", self.label),
    }
  }
}

/// Address of a node inside an elementary tree: the root layer is `0`, and the
/// layer expanding entry `i` of layer `g` is `g.i`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GornNumber(Vec<usize>);

impl GornNumber {
  pub fn new(path: Vec<usize>) -> Self {
    Self(path)
  }

  pub fn root() -> Self {
    Self(vec![0])
  }

  pub fn path(&self) -> &[usize] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn is_root(&self) -> bool {
    self.0 == [0]
  }

  pub fn child(&self, idx: usize) -> Self {
    let mut path = Vec::with_capacity(self.0.len() + 1);
    path.extend_from_slice(&self.0);
    path.push(idx);
    Self(path)
  }

  /// None for the root (and for the empty address)
  pub fn parent(&self) -> Option<Self> {
    if self.0.len() > 1 {
      Some(Self(self.0[..self.0.len() - 1].to_vec()))
    } else {
      None
    }
  }

  pub fn last(&self) -> Option<usize> {
    self.0.last().copied()
  }
}

impl From<Vec<usize>> for GornNumber {
  fn from(path: Vec<usize>) -> Self {
    Self(path)
  }
}

impl fmt::Display for GornNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (idx, n) in self.0.iter().enumerate() {
      if idx > 0 {
        write!(f, ".")?;
      }
      write!(f, "{}", n)?;
    }
    Ok(())
  }
}

/// One level of an elementary tree, written as a context-free production.
/// `entries[0]` is the parent, the rest are its children in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layer {
  pub gorn: GornNumber,
  pub entries: Vec<Entry>,
}

impl Layer {
  pub fn new(gorn: impl Into<GornNumber>, entries: Vec<Entry>) -> Self {
    Self {
      gorn: gorn.into(),
      entries,
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn entry(&self, idx: usize) -> Option<&Entry> {
    self.entries.get(idx)
  }

  pub fn lhs(&self) -> Option<&Entry> {
    self.entries.first()
  }

  pub fn rhs(&self) -> &[Entry] {
    self.entries.get(1..).unwrap_or(&[])
  }
}

impl fmt::Display for Layer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:", self.gorn)?;
    if let Some(lhs) = self.lhs() {
      write!(f, " {} ->", lhs)?;
    }
    for e in self.rhs() {
      write!(f, " {}", e)?;
    }
    Ok(())
  }
}

/// Which side of its host an auxiliary tree adds material to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuxiliaryKind {
  /// Foot is the rightmost leaf, everything else lands left of the host
  Left,
  /// Foot is the leftmost leaf, everything else lands right of the host
  Right,
}

/// An elementary tree of the grammar, flattened into its layers.
///
/// Rules are immutable once built. Two rules are the same rule iff their indices are
/// equal, so indices have to be unique within a grammar (`Grammar::new` checks this).
#[derive(Debug, Clone)]
pub struct TIGRule {
  index: u64,
  layers: Vec<Layer>,
  anchors: Vec<String>,
  freq: u64,
  prob: f64,
  spine: Option<GornNumber>,
  by_gorn: HashMap<GornNumber, usize>,
  kind: Option<AuxiliaryKind>,
}

impl TIGRule {
  pub fn new(
    index: u64,
    layers: Vec<Layer>,
    anchors: Vec<String>,
    freq: u64,
    prob: f64,
    spine: Option<GornNumber>,
  ) -> Self {
    let mut by_gorn = HashMap::with_capacity(layers.len());
    for (idx, layer) in layers.iter().enumerate() {
      by_gorn.entry(layer.gorn.clone()).or_insert(idx);
    }

    let mut rule = Self {
      index,
      layers,
      anchors,
      freq,
      prob,
      spine,
      by_gorn,
      kind: None,
    };
    rule.kind = rule.check_spine().ok().flatten();
    rule
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn layers(&self) -> &[Layer] {
    &self.layers
  }

  pub fn lexical_anchors(&self) -> &[String] {
    &self.anchors
  }

  pub fn freq(&self) -> u64 {
    self.freq
  }

  pub fn prob(&self) -> f64 {
    self.prob
  }

  pub fn spine(&self) -> Option<&GornNumber> {
    self.spine.as_ref()
  }

  pub fn is_auxiliary(&self) -> bool {
    self.spine.is_some()
  }

  pub fn is_initial(&self) -> bool {
    !self.is_auxiliary()
  }

  /// None for initial trees, and for auxiliary trees that fail validation
  pub fn auxiliary_kind(&self) -> Option<AuxiliaryKind> {
    self.kind
  }

  /// The label on the left-hand side of the root layer
  pub fn root_symbol(&self) -> Result<&str, GrammarError> {
    let root = self
      .layers
      .first()
      .ok_or(GrammarError::NoLayers { rule: self.index })?;
    root
      .lhs()
      .map(|e| e.label.as_str())
      .ok_or_else(|| GrammarError::MissingLeftHandSide {
        rule: self.index,
        gorn: root.gorn.clone(),
      })
  }

  pub fn layer_index(&self, gorn: &GornNumber) -> Option<usize> {
    self.by_gorn.get(gorn).copied()
  }

  pub fn layer(&self, gorn: &GornNumber) -> Option<&Layer> {
    self.layer_index(gorn).map(|idx| &self.layers[idx])
  }

  /// Checks the structural invariants the parser relies on
  pub fn validate(&self) -> Result<(), GrammarError> {
    let rule = self.index;
    let root = self.layers.first().ok_or(GrammarError::NoLayers { rule })?;
    if !root.gorn.is_root() {
      return Err(GrammarError::RootNotFirst {
        rule,
        gorn: root.gorn.clone(),
      });
    }

    if self.by_gorn.len() != self.layers.len() {
      let mut seen = HashSet::new();
      for layer in self.layers.iter() {
        if !seen.insert(&layer.gorn) {
          return Err(GrammarError::DuplicateLayer {
            rule,
            gorn: layer.gorn.clone(),
          });
        }
      }
    }

    for layer in self.layers.iter() {
      let lhs = layer
        .lhs()
        .ok_or_else(|| GrammarError::MissingLeftHandSide {
          rule,
          gorn: layer.gorn.clone(),
        })?;
      if layer.gorn.is_root() {
        continue;
      }

      let orphan = || GrammarError::OrphanLayer {
        rule,
        gorn: layer.gorn.clone(),
      };
      let parent = layer
        .gorn
        .parent()
        .and_then(|p| self.layer(&p))
        .ok_or_else(orphan)?;
      let slot = layer
        .gorn
        .last()
        .filter(|&idx| idx >= 1)
        .and_then(|idx| parent.entry(idx))
        .ok_or_else(orphan)?;
      if slot.node_type != NodeType::Nonterminal || slot.label != lhs.label {
        return Err(orphan());
      }
    }

    self.check_spine().map(|_| ())
  }

  /// Finds the foot and works out which side of the tree it sits on
  fn check_spine(&self) -> Result<Option<AuxiliaryKind>, GrammarError> {
    let rule = self.index;
    let bad = |reason| GrammarError::BadSpine { rule, reason };

    let feet = self
      .layers
      .iter()
      .flat_map(|layer| {
        layer
          .entries
          .iter()
          .enumerate()
          .skip(1)
          .filter(|(_, e)| e.is_foot())
          .map(move |(idx, e)| (layer, idx, e))
      })
      .collect::<Vec<_>>();

    let Some(spine) = &self.spine else {
      return if feet.is_empty() {
        Ok(None)
      } else {
        Err(bad("initial tree contains a foot node"))
      };
    };

    let [(foot_layer, foot_idx, foot)] = feet.as_slice() else {
      return Err(bad("auxiliary tree needs exactly one foot node"));
    };
    if foot_layer.gorn != *spine {
      return Err(bad("foot node is not in the spine layer"));
    }
    if foot.label != self.root_symbol()? {
      return Err(bad("foot label differs from the root label"));
    }

    let mut leftmost = *foot_idx == 1;
    let mut rightmost = foot_idx + 1 == foot_layer.len();
    let path = spine.path();
    for depth in 1..path.len() {
      let layer = self
        .layer(&GornNumber::new(path[..depth].to_vec()))
        .ok_or(bad("spine passes through a missing layer"))?;
      leftmost &= path[depth] == 1;
      rightmost &= path[depth] + 1 == layer.len();
    }

    match (leftmost, rightmost) {
      (true, false) => Ok(Some(AuxiliaryKind::Right)),
      (false, true) => Ok(Some(AuxiliaryKind::Left)),
      (true, true) => Err(bad("auxiliary tree has nothing besides its foot")),
      (false, false) => Err(bad("foot is neither the leftmost nor the rightmost leaf")),
    }
  }
}

impl PartialEq for TIGRule {
  fn eq(&self, other: &Self) -> bool {
    self.index == other.index
  }
}

impl Eq for TIGRule {}

impl Hash for TIGRule {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.index.hash(state);
  }
}

impl fmt::Display for TIGRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "rule {} [", self.index)?;
    for (idx, anchor) in self.anchors.iter().enumerate() {
      if idx > 0 {
        write!(f, " ")?;
      }
      fmt_word(f, anchor)?;
    }
    write!(f, "] freq {} prob {}", self.freq, self.prob)?;
    if let Some(spine) = &self.spine {
      write!(f, " spine {}", spine)?;
    }
    writeln!(f, " {{")?;
    for layer in self.layers.iter() {
      writeln!(f, "  {};", layer)?;
    }
    write!(f, "}}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rule(index: u64, layers: Vec<Layer>, spine: Option<Vec<usize>>) -> TIGRule {
    TIGRule::new(
      index,
      layers,
      vec!["w".to_string()],
      1,
      1.0,
      spine.map(GornNumber::new),
    )
  }

  #[test]
  fn test_gorn_numbers() {
    let root = GornNumber::root();
    let child = root.child(2);
    assert_eq!(child.path(), &[0, 2]);
    assert_eq!(child.parent(), Some(root.clone()));
    assert_eq!(child.last(), Some(2));
    assert_eq!(root.parent(), None);
    assert_eq!(child.to_string(), "0.2");
  }

  #[test]
  fn test_root_symbol() {
    let r = rule(
      0,
      vec![Layer::new(vec![0], vec![Entry::nonterminal("S"), Entry::terminal("w")])],
      None,
    );
    assert_eq!(r.root_symbol(), Ok("S"));

    let empty = rule(1, Vec::new(), None);
    assert_eq!(empty.root_symbol(), Err(GrammarError::NoLayers { rule: 1 }));

    let no_lhs = rule(2, vec![Layer::new(vec![0], Vec::new())], None);
    assert!(matches!(
      no_lhs.root_symbol(),
      Err(GrammarError::MissingLeftHandSide { rule: 2, .. })
    ));
  }

  #[test]
  fn test_child_layers_extend_parent_gorn() {
    let r = rule(
      0,
      vec![
        Layer::new(
          vec![0],
          vec![
            Entry::nonterminal("S"),
            Entry::substitution("NP"),
            Entry::nonterminal("VP"),
          ],
        ),
        Layer::new(vec![0, 2], vec![Entry::nonterminal("VP"), Entry::terminal("w")]),
      ],
      None,
    );
    assert!(r.validate().is_ok());

    for layer in r.layers() {
      for (idx, e) in layer.entries.iter().enumerate().skip(1) {
        if let Some(child) = r.layer(&layer.gorn.child(idx)) {
          assert_eq!(child.gorn.parent().as_ref(), Some(&layer.gorn));
          assert_eq!(child.lhs(), Some(&Entry::nonterminal(e.label.clone())));
        }
      }
    }
  }

  #[test]
  fn test_validation_errors() {
    assert_eq!(
      rule(0, Vec::new(), None).validate(),
      Err(GrammarError::NoLayers { rule: 0 })
    );

    let not_root = rule(
      1,
      vec![Layer::new(vec![0, 1], vec![Entry::nonterminal("S")])],
      None,
    );
    assert!(matches!(
      not_root.validate(),
      Err(GrammarError::RootNotFirst { .. })
    ));

    let dup = rule(
      2,
      vec![
        Layer::new(vec![0], vec![Entry::nonterminal("S"), Entry::nonterminal("A")]),
        Layer::new(vec![0, 1], vec![Entry::nonterminal("A"), Entry::terminal("w")]),
        Layer::new(vec![0, 1], vec![Entry::nonterminal("A"), Entry::terminal("w")]),
      ],
      None,
    );
    assert!(matches!(
      dup.validate(),
      Err(GrammarError::DuplicateLayer { .. })
    ));

    // layer 0.1 would expand a terminal
    let orphan = rule(
      3,
      vec![
        Layer::new(vec![0], vec![Entry::nonterminal("S"), Entry::terminal("w")]),
        Layer::new(vec![0, 1], vec![Entry::nonterminal("A"), Entry::terminal("w")]),
      ],
      None,
    );
    assert!(matches!(
      orphan.validate(),
      Err(GrammarError::OrphanLayer { .. })
    ));

    let foot_in_initial = rule(
      4,
      vec![Layer::new(
        vec![0],
        vec![Entry::nonterminal("N"), Entry::terminal("w"), Entry::foot("N")],
      )],
      None,
    );
    assert!(matches!(
      foot_in_initial.validate(),
      Err(GrammarError::BadSpine { .. })
    ));
  }

  #[test]
  fn test_auxiliary_kind() {
    let right = rule(
      0,
      vec![
        Layer::new(
          vec![0],
          vec![Entry::nonterminal("VP"), Entry::foot("VP"), Entry::nonterminal("ADV")],
        ),
        Layer::new(vec![0, 2], vec![Entry::nonterminal("ADV"), Entry::terminal("w")]),
      ],
      Some(vec![0]),
    );
    assert!(right.validate().is_ok());
    assert_eq!(right.auxiliary_kind(), Some(AuxiliaryKind::Right));

    let left = rule(
      1,
      vec![
        Layer::new(
          vec![0],
          vec![Entry::nonterminal("N"), Entry::nonterminal("ADJ"), Entry::nonterminal("N")],
        ),
        Layer::new(vec![0, 1], vec![Entry::nonterminal("ADJ"), Entry::terminal("w")]),
        Layer::new(vec![0, 2], vec![Entry::nonterminal("N"), Entry::foot("N")]),
      ],
      Some(vec![0, 2]),
    );
    assert!(left.validate().is_ok());
    assert_eq!(left.auxiliary_kind(), Some(AuxiliaryKind::Left));

    let wrapping = rule(
      2,
      vec![Layer::new(
        vec![0],
        vec![
          Entry::nonterminal("X"),
          Entry::terminal("w"),
          Entry::foot("X"),
          Entry::terminal("w"),
        ],
      )],
      Some(vec![0]),
    );
    assert!(matches!(
      wrapping.validate(),
      Err(GrammarError::BadSpine { .. })
    ));
    assert_eq!(wrapping.auxiliary_kind(), None);

    let wrong_label = rule(
      3,
      vec![Layer::new(
        vec![0],
        vec![Entry::nonterminal("X"), Entry::foot("Y"), Entry::terminal("w")],
      )],
      Some(vec![0]),
    );
    assert!(wrong_label.validate().is_err());
  }

  #[test]
  fn test_rule_equality_is_by_index() {
    let a = rule(
      7,
      vec![Layer::new(vec![0], vec![Entry::nonterminal("S"), Entry::terminal("a")])],
      None,
    );
    let b = rule(
      7,
      vec![Layer::new(vec![0], vec![Entry::nonterminal("T"), Entry::terminal("b")])],
      None,
    );
    assert_eq!(a, b);
  }
}
