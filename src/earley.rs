use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::activated::{ActivatedTIGRule, Activations};
use crate::grammar::Grammar;
use crate::rules::{AuxiliaryKind, Entry, Layer, NodeType};

/// Index of an item in its chart
pub type ItemId = usize;

/// The root layer is always the first layer of a validated rule
const ROOT_LAYER: usize = 0;

/// One way an item came to be. An item with several derivations packs several
/// analyses of the same chart cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemDerivation {
  /// Opened by a prediction, or seeded for a start symbol
  Predicted,
  Scan { from: ItemId },
  /// Moved over the foot of an auxiliary tree
  Foot { from: ItemId },
  /// A child layer of the same tree was recognized
  Complete { parent: ItemId, child: ItemId },
  /// An initial tree was recognized at a substitution site
  Substitution { parent: ItemId, child: ItemId },
  /// An auxiliary tree was spliced in at the host node
  Adjunction { host: ItemId, auxiliary: ItemId },
}

impl ItemDerivation {
  pub fn antecedents(&self) -> Vec<ItemId> {
    match *self {
      Self::Predicted => Vec::new(),
      Self::Scan { from } | Self::Foot { from } => vec![from],
      Self::Complete { parent, child } | Self::Substitution { parent, child } => {
        vec![parent, child]
      }
      Self::Adjunction { host, auxiliary } => vec![host, auxiliary],
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ItemKey {
  tree: usize,
  layer: usize,
  dot: usize,
  left: usize,
  right: usize,
  left_adjoined: bool,
}

/// A dotted layer of an activated tree over the input span `[left, right)`.
///
/// Entries before the dot are recognized. Entry 0 is the layer's own left-hand side,
/// so the parser opens layers with the dot at 1.
#[derive(Debug, Clone)]
pub struct Item {
  left: usize,
  right: usize,
  dot: usize,
  layer: usize,
  tree: Rc<ActivatedTIGRule>,
  probability: f64,
  id: ItemId,
  /// Set once a left auxiliary tree has been adjoined. Right adjunctions come first,
  /// so such an item can't host any more of them.
  left_adjoined: bool,
  derivations: Vec<ItemDerivation>,
}

impl Item {
  /// `layer` indexes into `tree.layers()`
  pub fn new(
    left: usize,
    right: usize,
    dot: usize,
    layer: usize,
    tree: Rc<ActivatedTIGRule>,
    probability: f64,
    id: ItemId,
  ) -> Self {
    Self {
      left,
      right,
      dot,
      layer,
      tree,
      probability,
      id,
      left_adjoined: false,
      derivations: Vec::new(),
    }
  }

  pub fn add_derivation(&mut self, derivation: ItemDerivation) -> bool {
    if self.derivations.contains(&derivation) {
      false
    } else {
      self.derivations.push(derivation);
      true
    }
  }

  pub fn add_derivations<I>(&mut self, derivations: I)
  where
    I: IntoIterator<Item = ItemDerivation>,
  {
    for d in derivations {
      self.add_derivation(d);
    }
  }

  /// Moves the dot past the next entry. Does nothing once the layer is recognized.
  pub fn advance_dot(&mut self) {
    if self.is_active() {
      self.dot += 1;
    }
  }

  pub fn is_active(&self) -> bool {
    self.dot < self.layer().len()
  }

  pub fn is_passive(&self) -> bool {
    !self.is_active()
  }

  pub fn left(&self) -> usize {
    self.left
  }

  pub fn right(&self) -> usize {
    self.right
  }

  pub fn dot_position(&self) -> usize {
    self.dot
  }

  pub fn id(&self) -> ItemId {
    self.id
  }

  /// The value fixed when the item was built
  pub fn probability(&self) -> f64 {
    self.probability
  }

  pub fn derivations(&self) -> &[ItemDerivation] {
    &self.derivations
  }

  pub fn tree(&self) -> &Rc<ActivatedTIGRule> {
    &self.tree
  }

  pub fn layer(&self) -> &Layer {
    &self.tree.layers()[self.layer]
  }

  pub fn layer_index(&self) -> usize {
    self.layer
  }

  pub fn is_left_adjoined(&self) -> bool {
    self.left_adjoined
  }

  pub fn is_root_layer(&self) -> bool {
    self.layer().gorn.is_root()
  }

  /// Whether this node may have an auxiliary tree adjoined to it. Everything but the
  /// root of an auxiliary tree can.
  pub fn is_adjunction_site(&self) -> bool {
    self.tree.is_initial() || !self.is_root_layer()
  }

  pub fn has_initial_type_tree(&self) -> bool {
    self.tree.is_initial()
  }

  pub fn left_hand_side(&self) -> Option<&Entry> {
    self.layer().lhs()
  }

  pub fn right_hand_side(&self) -> &[Entry] {
    self.layer().rhs()
  }

  pub fn next_entry(&self) -> Option<&Entry> {
    self.layer().entry(self.dot)
  }

  pub fn next_entry_type(&self) -> Option<NodeType> {
    self.next_entry().map(|e| e.node_type)
  }

  /// The layer expanding the entry under the dot, if the tree has one
  pub fn next_layer(&self) -> Option<&Layer> {
    self.tree.get_layer(&self.layer().gorn.child(self.dot))
  }

  /// True if `other`'s layer sits directly below this item's layer
  pub fn has_parent_gorn_number(&self, other: &Item) -> bool {
    other
      .layer()
      .gorn
      .parent()
      .is_some_and(|parent| parent == self.layer().gorn)
  }

  fn key(&self) -> ItemKey {
    ItemKey {
      tree: self.tree.id(),
      layer: self.layer,
      dot: self.dot,
      left: self.left,
      right: self.right,
      left_adjoined: self.left_adjoined,
    }
  }

  fn has_lhs(&self, label: &str) -> bool {
    self.left_hand_side().is_some_and(|e| e.label == label)
  }

  pub fn dotted_rule(&self) -> String {
    let layer = self.layer();
    let mut s = String::new();
    if let Some(lhs) = layer.lhs() {
      s.push_str(&format!("{} →", lhs));
    }
    for idx in 1..layer.len() {
      if idx == self.dot {
        s.push_str(" ・");
      }
      s.push_str(&format!(" {}", layer.entries[idx]));
    }
    if !self.is_active() {
      s.push_str(" ・");
    }
    s
  }
}

impl fmt::Display for Item {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}..{}: {} [{} {}{}] #{}",
      self.left,
      self.right,
      self.dotted_rule(),
      self.tree,
      self.layer().gorn,
      if self.left_adjoined { "+" } else { "" },
      self.id
    )
  }
}

/// Why something was predicted at a position; repeated when a left auxiliary
/// tree moves the host's start
#[derive(Debug, Clone, PartialEq)]
enum Want {
  /// An interior node of a tree
  Layer {
    tree: Rc<ActivatedTIGRule>,
    layer: usize,
  },
  /// A substitution site or a start symbol
  Initial,
}

#[derive(Debug)]
pub struct Chart {
  items: Vec<Item>,
  /// Item ids by right boundary
  sets: Vec<Vec<ItemId>>,
  index: HashMap<ItemKey, ItemId>,
  wants: HashMap<(usize, String), Vec<Want>>,
  activations: Activations,
  accepting: Vec<ItemId>,
}

impl Chart {
  fn new(length: usize, activations: Activations) -> Self {
    Self {
      items: Vec::new(),
      sets: vec![Vec::new(); length],
      index: HashMap::new(),
      wants: HashMap::new(),
      activations,
      accepting: Vec::new(),
    }
  }

  /// Number of chart positions, one more than the input length
  pub fn len(&self) -> usize {
    self.sets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn input_len(&self) -> usize {
    self.len().saturating_sub(1)
  }

  pub fn len_at(&self, k: usize) -> usize {
    self.sets[k].len()
  }

  pub fn items(&self) -> &[Item] {
    &self.items
  }

  pub fn item(&self, id: ItemId) -> &Item {
    &self.items[id]
  }

  /// Items ending at position `k`
  pub fn set(&self, k: usize) -> impl Iterator<Item = &Item> {
    self.sets[k].iter().map(move |&id| &self.items[id])
  }

  pub fn activations(&self) -> &Activations {
    &self.activations
  }

  /// Passive start-symbol tree roots covering the whole input
  pub fn accepting(&self) -> impl Iterator<Item = &Item> {
    self.accepting.iter().map(move |&id| &self.items[id])
  }

  pub fn is_accepted(&self) -> bool {
    !self.accepting.is_empty()
  }

  /// Adds `item`, or merges its derivation into the item already in that cell
  fn add(&mut self, mut item: Item, derivation: ItemDerivation) -> ItemId {
    let key = item.key();
    if let Some(&id) = self.index.get(&key) {
      self.items[id].add_derivation(derivation);
      return id;
    }

    let id = self.items.len();
    item.id = id;
    item.derivations.clear();
    item.add_derivation(derivation);
    self.sets[item.right].push(id);
    self.index.insert(key, id);
    self.items.push(item);
    id
  }

  /// Get an owned copy of an item without its derivations, so that passing around
  /// &mut chart stays ergonomic
  fn snapshot(&self, id: ItemId) -> Item {
    let item = &self.items[id];
    Item {
      tree: item.tree.clone(),
      derivations: Vec::new(),
      ..*item
    }
  }

  /// Ids in set `k` whose items satisfy `pred`
  fn select(&self, k: usize, pred: impl Fn(&Item) -> bool) -> Vec<ItemId> {
    self.sets[k]
      .iter()
      .copied()
      .filter(|&id| pred(&self.items[id]))
      .collect()
  }
}

impl fmt::Display for Chart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for k in 0..self.len() {
      writeln!(f, "State {}:", k)?;
      for item in self.set(k) {
        writeln!(f, "  {}", item)?;
      }
    }
    Ok(())
  }
}

pub fn parse_chart<T: AsRef<str>>(g: &Grammar, input: &[T]) -> Chart {
  let activations = Activations::activate(g.lexicon(), input);
  let mut chart = Chart::new(input.len() + 1, activations);

  let mut starts = g.start_symbols().iter().collect::<Vec<_>>();
  starts.sort();
  for start in starts {
    want(&mut chart, 0, start, Want::Initial);
  }

  for k in 0..chart.len() {
    // need to use while loop because the number of items at k can expand during the loop
    let mut idx = 0;
    while idx < chart.len_at(k) {
      let item = chart.snapshot(chart.sets[k][idx]);
      idx += 1;
      trace!(%item, "processing");

      match item.next_entry_type() {
        None => completer(&mut chart, &item),
        Some(NodeType::Terminal) => scanner(&mut chart, &item, input),
        Some(NodeType::Nonterminal) => predict_layer(&mut chart, &item),
        Some(NodeType::Substitution) => predict_substitution(&mut chart, &item),
        Some(NodeType::Foot) => skip_foot(&mut chart, &item),
      }
    }
  }

  let n = input.len();
  chart.accepting = chart
    .items
    .iter()
    .filter(|item| {
      item.is_passive()
        && item.left == 0
        && item.right == n
        && item.is_root_layer()
        && item.tree.is_initial()
        && g.is_start_symbol(item.tree.root_symbol())
    })
    .map(|item| item.id)
    .collect();

  debug!(
    tokens = n,
    trees = chart.activations.len(),
    items = chart.items.len(),
    accepting = chart.accepting.len(),
    "parsed chart"
  );

  chart
}

/// Copies `item` with the dot moved on, now ending at `right`
fn advance(
  chart: &mut Chart,
  item: &Item,
  right: usize,
  probability: f64,
  derivation: ItemDerivation,
) -> ItemId {
  let mut next = item.clone();
  next.advance_dot();
  next.right = right;
  next.probability = probability;
  chart.add(next, derivation)
}

/// Records that a `label` node is needed at `pos` and predicts whatever can build it
fn want(chart: &mut Chart, pos: usize, label: &str, reason: Want) {
  let wants = chart.wants.entry((pos, label.to_string())).or_default();
  if wants.contains(&reason) {
    return;
  }
  let first = wants.is_empty();
  wants.push(reason.clone());

  match reason {
    Want::Layer { tree, layer } => {
      // the rule's own probability is carried by its root layer
      chart.add(
        Item::new(pos, pos, 1, layer, tree, 1.0, 0),
        ItemDerivation::Predicted,
      );
    }
    Want::Initial => {
      let trees = chart
        .activations
        .initial(label)
        .iter()
        .filter(|t| t.anchor_pos() >= pos)
        .cloned()
        .collect::<Vec<_>>();
      for tree in trees {
        trace!(%tree, pos, "predict initial tree");
        let probability = tree.rule().prob();
        chart.add(
          Item::new(pos, pos, 1, ROOT_LAYER, tree, probability, 0),
          ItemDerivation::Predicted,
        );
      }
    }
  }

  if first {
    predict_auxiliary(chart, pos, label, AuxiliaryKind::Left);
  }
}

fn predict_auxiliary(chart: &mut Chart, pos: usize, label: &str, kind: AuxiliaryKind) {
  let trees = chart
    .activations
    .auxiliary(label)
    .iter()
    .filter(|t| t.auxiliary_kind() == Some(kind) && t.anchor_pos() >= pos)
    .cloned()
    .collect::<Vec<_>>();

  for tree in trees {
    trace!(%tree, pos, ?kind, "predict auxiliary tree");
    let probability = tree.rule().prob();
    chart.add(
      Item::new(pos, pos, 1, ROOT_LAYER, tree, probability, 0),
      ItemDerivation::Predicted,
    );
  }
}

fn scanner<T: AsRef<str>>(chart: &mut Chart, item: &Item, input: &[T]) {
  assert!(item.is_active(), "tried to scan passive item");

  let k = item.right;
  let Some(entry) = item.next_entry() else {
    return;
  };
  // anchors only match the words the tree was activated for
  let anchor = item.tree.rule().lexical_anchors().contains(&entry.label);
  let in_window = item.tree.anchor_pos() <= k && k < item.tree.anchor_end();
  if (in_window || !anchor) && input.get(k).is_some_and(|t| t.as_ref() == entry.label) {
    advance(chart, item, k + 1, item.probability, ItemDerivation::Scan {
      from: item.id,
    });
  }
}

/// The foot covers whatever the host node covers, so it's passed over without consuming input
fn skip_foot(chart: &mut Chart, item: &Item) {
  advance(chart, item, item.right, item.probability, ItemDerivation::Foot {
    from: item.id,
  });
}

fn predict_layer(chart: &mut Chart, item: &Item) {
  assert!(item.is_active(), "tried to predict from passive item");

  let Some(label) = item.next_entry().map(|e| e.label.clone()) else {
    return;
  };
  let address = item.layer().gorn.child(item.dot);
  let Some(layer) = item.tree.layer_index(&address) else {
    trace!(tree = %item.tree, %address, "no layer to expand");
    return;
  };

  want(chart, item.right, &label, Want::Layer {
    tree: item.tree.clone(),
    layer,
  });

  // a child that was already recognized without consuming anything won't be
  // completed again, so pick it up here
  let empty = ItemKey {
    tree: item.tree.id(),
    layer,
    dot: item.tree.layers()[layer].len(),
    left: item.right,
    right: item.right,
    left_adjoined: false,
  };
  if let Some(&child) = chart.index.get(&empty) {
    let child = chart.snapshot(child);
    let probability = item.probability * child.probability;
    advance(chart, item, child.right, probability, ItemDerivation::Complete {
      parent: item.id,
      child: child.id,
    });
  }
}

fn predict_substitution(chart: &mut Chart, item: &Item) {
  assert!(item.is_active(), "tried to predict from passive item");

  if let Some(label) = item.next_entry().map(|e| e.label.clone()) {
    want(chart, item.right, &label, Want::Initial);
  }
}

fn completer(chart: &mut Chart, item: &Item) {
  assert!(!item.is_active(), "tried to complete active item");

  if !item.is_root_layer() {
    // an interior node: advance the layer of the same tree that was waiting for it
    let slot = item.layer().gorn.last();
    let parents = chart.select(item.left, |p| {
      p.tree == item.tree && p.has_parent_gorn_number(item) && Some(p.dot) == slot
    });
    for parent in parents {
      let parent = chart.snapshot(parent);
      trace!(%parent, child = %item, "complete");
      let probability = parent.probability * item.probability;
      advance(chart, &parent, item.right, probability, {
        ItemDerivation::Complete {
          parent: parent.id,
          child: item.id,
        }
      });
    }
  } else if item.tree.is_initial() {
    substitute(chart, item);
  }

  if item.is_adjunction_site() {
    adjoin_to_host(chart, item);
  } else {
    adjoin_auxiliary(chart, item);
  }
}

/// A recognized initial tree fills every substitution site waiting for it
fn substitute(chart: &mut Chart, item: &Item) {
  let label = item.tree.root_symbol();
  let parents = chart.select(item.left, |p| {
    p.tree != item.tree
      && p
        .next_entry()
        .is_some_and(|e| e.node_type == NodeType::Substitution && e.label == label)
  });

  for parent in parents {
    let parent = chart.snapshot(parent);
    trace!(%parent, child = %item, "substitute");
    let probability = parent.probability * item.probability;
    advance(chart, &parent, item.right, probability, {
      ItemDerivation::Substitution {
        parent: parent.id,
        child: item.id,
      }
    });
  }
}

/// `host` is a recognized node. Right auxiliary trees may follow it, and left
/// auxiliary trees that ended where it starts are spliced in.
fn adjoin_to_host(chart: &mut Chart, host: &Item) {
  let Some(label) = host.left_hand_side().map(|e| e.label.clone()) else {
    return;
  };

  if !host.left_adjoined {
    predict_auxiliary(chart, host.right, &label, AuxiliaryKind::Right);
  }

  let auxiliaries = chart.select(host.left, |a| {
    is_recognized_auxiliary(a, &label, AuxiliaryKind::Left)
  });
  for aux in auxiliaries {
    let aux = chart.snapshot(aux);
    combine(chart, host, &aux, AuxiliaryKind::Left);
  }
}

/// `aux` is a recognized auxiliary tree. Splice it into the hosts it borders.
fn adjoin_auxiliary(chart: &mut Chart, aux: &Item) {
  let label = aux.tree.root_symbol().to_string();

  match aux.tree.auxiliary_kind() {
    Some(AuxiliaryKind::Right) => {
      let hosts = chart.select(aux.left, |h| {
        h.is_passive() && h.is_adjunction_site() && !h.left_adjoined && h.has_lhs(&label)
      });
      for host in hosts {
        let host = chart.snapshot(host);
        combine(chart, &host, aux, AuxiliaryKind::Right);
      }
    }
    Some(AuxiliaryKind::Left) => {
      // the host now starts where this tree ends, so predict it again there
      let wants = chart
        .wants
        .get(&(aux.left, label.clone()))
        .cloned()
        .unwrap_or_default();
      for w in wants {
        want(chart, aux.right, &label, w);
      }

      let hosts = chart.select(aux.right, |h| {
        h.left == aux.right && h.is_passive() && h.is_adjunction_site() && h.has_lhs(&label)
      });
      for host in hosts {
        let host = chart.snapshot(host);
        combine(chart, &host, aux, AuxiliaryKind::Left);
      }
    }
    None => {}
  }
}

fn is_recognized_auxiliary(item: &Item, label: &str, kind: AuxiliaryKind) -> bool {
  item.is_passive()
    && item.is_root_layer()
    && item.tree.auxiliary_kind() == Some(kind)
    && item.tree.root_symbol() == label
}

/// The host node with the auxiliary tree's material added on one side
fn combine(chart: &mut Chart, host: &Item, aux: &Item, kind: AuxiliaryKind) -> ItemId {
  let mut combined = host.clone();
  match kind {
    AuxiliaryKind::Right => combined.right = aux.right,
    AuxiliaryKind::Left => {
      combined.left = aux.left;
      combined.left_adjoined = true;
    }
  }
  combined.probability = host.probability * aux.probability;
  trace!(%host, %aux, "adjoin");

  chart.add(combined, ItemDerivation::Adjunction {
    host: host.id,
    auxiliary: aux.id,
  })
}
