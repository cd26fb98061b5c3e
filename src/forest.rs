use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::activated::ActivatedTIGRule;
use crate::earley::{Chart, ItemDerivation, ItemId};
use crate::rules::GornNumber;
use crate::utils::combinations;

/// A combination of two tree instances in the derivation forest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DerivationEdge {
  /// `second`, an initial tree, was substituted at `connector` in `first`
  Substitution {
    first: Rc<ActivatedTIGRule>,
    second: Rc<ActivatedTIGRule>,
    connector: GornNumber,
  },
  /// `second`, an auxiliary tree with spine `connector`, was adjoined at the node
  /// `site` of `first`
  Adjunction {
    first: Rc<ActivatedTIGRule>,
    second: Rc<ActivatedTIGRule>,
    connector: GornNumber,
    site: GornNumber,
  },
}

impl DerivationEdge {
  pub fn first(&self) -> &Rc<ActivatedTIGRule> {
    match self {
      Self::Substitution { first, .. } | Self::Adjunction { first, .. } => first,
    }
  }

  pub fn second(&self) -> &Rc<ActivatedTIGRule> {
    match self {
      Self::Substitution { second, .. } | Self::Adjunction { second, .. } => second,
    }
  }

  pub fn connector(&self) -> &GornNumber {
    match self {
      Self::Substitution { connector, .. } | Self::Adjunction { connector, .. } => connector,
    }
  }

  pub fn is_adjunction(&self) -> bool {
    matches!(self, Self::Adjunction { .. })
  }
}

impl fmt::Display for DerivationEdge {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Substitution {
        first,
        second,
        connector,
      } => write!(f, "{} <-[{}]- {}", first, connector, second),
      Self::Adjunction {
        first,
        second,
        connector,
        site,
      } => write!(f, "{} <=[{} spine {}]= {}", first, site, connector, second),
    }
  }
}

/// Receives the nodes and edges of a forest. The forest stores whatever handle the
/// renderer hands back for each node.
pub trait ForestRenderer {
  type Handle;

  fn node(&mut self, tree: &ActivatedTIGRule) -> Self::Handle;
  fn edge(&mut self, edge: &DerivationEdge, from: &Self::Handle, to: &Self::Handle);
}

/// Tree instances and the derivation edges between them, plus an optional
/// rendering handle per instance.
///
/// Built from a chart this is the packed forest holding every analysis at once;
/// [`readings`] splits it into one tree per analysis.
#[derive(Debug, Clone)]
pub struct DerivationTree<H = ()> {
  nodes: Vec<(Rc<ActivatedTIGRule>, Option<H>)>,
  /// instance id -> index into `nodes`
  positions: HashMap<usize, usize>,
  edges: Vec<DerivationEdge>,
}

impl<H> Default for DerivationTree<H> {
  fn default() -> Self {
    Self {
      nodes: Vec::new(),
      positions: HashMap::new(),
      edges: Vec::new(),
    }
  }
}

impl<H> DerivationTree<H> {
  pub fn new() -> Self {
    Default::default()
  }

  /// Number of nodes
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn nodes(&self) -> impl Iterator<Item = &Rc<ActivatedTIGRule>> {
    self.nodes.iter().map(|(tree, _)| tree)
  }

  pub fn edges(&self) -> &[DerivationEdge] {
    &self.edges
  }

  pub fn contains(&self, tree: &ActivatedTIGRule) -> bool {
    self.positions.contains_key(&tree.id())
  }

  /// The handle set by the last `render`, if any
  pub fn handle(&self, tree: &ActivatedTIGRule) -> Option<&H> {
    self
      .positions
      .get(&tree.id())
      .and_then(|&idx| self.nodes[idx].1.as_ref())
  }

  /// Returns false if the instance was already a node
  pub fn add_node(&mut self, tree: Rc<ActivatedTIGRule>) -> bool {
    if self.contains(&tree) {
      return false;
    }
    self.positions.insert(tree.id(), self.nodes.len());
    self.nodes.push((tree, None));
    true
  }

  /// Adds the edge and any endpoint that isn't a node yet. Returns false if the
  /// edge was already present.
  pub fn add_derivation(&mut self, edge: DerivationEdge) -> bool {
    if self.edges.contains(&edge) {
      return false;
    }
    self.add_node(edge.first().clone());
    self.add_node(edge.second().clone());
    self.edges.push(edge);
    true
  }

  /// Drops one edge. Nodes stay, even if nothing connects to them anymore.
  pub fn remove_derivation(&mut self, edge: &DerivationEdge) -> bool {
    match self.edges.iter().position(|e| e == edge) {
      Some(idx) => {
        self.edges.remove(idx);
        true
      }
      None => false,
    }
  }

  pub fn reset_handles(&mut self) {
    for (_, handle) in self.nodes.iter_mut() {
      *handle = None;
    }
  }

  /// The same nodes and edges, with no handles
  pub fn detached<H2>(&self) -> DerivationTree<H2> {
    DerivationTree {
      nodes: self.nodes.iter().map(|(tree, _)| (tree.clone(), None)).collect(),
      positions: self.positions.clone(),
      edges: self.edges.clone(),
    }
  }

  /// Hands every node, then every edge to `renderer`. Edges go out ordered by where
  /// their second instance is anchored.
  pub fn render<R>(&mut self, renderer: &mut R)
  where
    R: ForestRenderer<Handle = H>,
  {
    self.reset_handles();
    for (tree, handle) in self.nodes.iter_mut() {
      *handle = Some(renderer.node(tree));
    }

    let mut edges = self.edges.iter().collect::<Vec<_>>();
    edges.sort_by_key(|e| e.second().anchor_pos());
    for edge in edges {
      if let (Some(from), Some(to)) = (self.handle(edge.first()), self.handle(edge.second())) {
        renderer.edge(edge, from, to);
      }
    }
  }

  pub fn to_dot(&self) -> String {
    let mut detached: DerivationTree<String> = self.detached();
    let mut dot = DotRenderer::new();
    detached.render(&mut dot);
    dot.finish()
  }
}

impl<H: Clone> DerivationTree<H> {
  /// An independent copy: edits to either side never show up in the other
  pub fn copy(&self) -> Self {
    self.clone()
  }

  /// Replaces this forest's content with a copy of `other`'s
  pub fn copy_from(&mut self, other: &Self) {
    self.clone_from(other);
  }
}

impl<H> From<&Chart> for DerivationTree<H> {
  /// The packed forest of every accepting item. Each chart item is visited once, so
  /// shared sub-analyses aren't walked again.
  fn from(chart: &Chart) -> Self {
    let mut forest = Self::new();
    let mut visited = HashSet::new();
    let mut stack = Vec::new();

    for item in chart.accepting() {
      forest.add_node(item.tree().clone());
      stack.push(item.id());
    }

    while let Some(id) = stack.pop() {
      if !visited.insert(id) {
        continue;
      }
      for derivation in chart.item(id).derivations() {
        if let Some(edge) = derivation_edge(chart, derivation) {
          forest.add_derivation(edge);
        }
        stack.extend(derivation.antecedents());
      }
    }

    debug!(
      nodes = forest.len(),
      edges = forest.edges.len(),
      items = visited.len(),
      "built forest"
    );

    forest
  }
}

impl<H> fmt::Display for DerivationTree<H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "nodes:")?;
    for tree in self.nodes() {
      write!(f, " {}", tree)?;
    }
    writeln!(f)?;
    for edge in self.edges.iter() {
      writeln!(f, "  {}", edge)?;
    }
    Ok(())
  }
}

/// The forest edge recorded by one chart step, if the step combined two trees
fn derivation_edge(chart: &Chart, derivation: &ItemDerivation) -> Option<DerivationEdge> {
  match *derivation {
    ItemDerivation::Substitution { parent, child } => {
      let parent = chart.item(parent);
      Some(DerivationEdge::Substitution {
        first: parent.tree().clone(),
        second: chart.item(child).tree().clone(),
        connector: parent.layer().gorn.child(parent.dot_position()),
      })
    }
    ItemDerivation::Adjunction { host, auxiliary } => {
      let host = chart.item(host);
      let auxiliary = chart.item(auxiliary);
      Some(DerivationEdge::Adjunction {
        first: host.tree().clone(),
        second: auxiliary.tree().clone(),
        connector: auxiliary.tree().rule().spine()?.clone(),
        site: host.layer().gorn.clone(),
      })
    }
    _ => None,
  }
}

/// Every distinct analysis of the chart, one derivation tree each
pub fn readings(chart: &Chart) -> Vec<DerivationTree> {
  let mut memo = HashMap::new();
  let mut readings = Vec::new();

  for item in chart.accepting() {
    for edges in unpack(chart, item.id(), &mut memo, &mut HashSet::new()) {
      let mut tree = DerivationTree::new();
      tree.add_node(item.tree().clone());
      for edge in edges {
        tree.add_derivation(edge);
      }
      readings.push(tree);
    }
  }

  debug!(readings = readings.len(), "unpacked forest");
  readings
}

/// All edge sets that can build item `id`, one per analysis
fn unpack(
  chart: &Chart,
  id: ItemId,
  memo: &mut HashMap<ItemId, Vec<Vec<DerivationEdge>>>,
  in_progress: &mut HashSet<ItemId>,
) -> Vec<Vec<DerivationEdge>> {
  if let Some(done) = memo.get(&id) {
    return done.clone();
  }
  if !in_progress.insert(id) {
    return Vec::new();
  }

  let mut alternatives = Vec::new();
  for derivation in chart.item(id).derivations() {
    let parts = derivation
      .antecedents()
      .into_iter()
      .map(|a| unpack(chart, a, memo, in_progress))
      .collect::<Vec<_>>();
    let own = derivation_edge(chart, derivation);

    let choices = if parts.is_empty() {
      vec![Vec::new()]
    } else {
      combinations(&parts)
    };
    for choice in choices {
      let mut edges = choice.concat();
      edges.extend(own.clone());
      alternatives.push(edges);
    }
  }

  in_progress.remove(&id);
  memo.insert(id, alternatives.clone());
  alternatives
}

/// Writes a forest as a Graphviz digraph. Substitutions are solid edges,
/// adjunctions dashed.
#[derive(Debug, Default)]
pub struct DotRenderer {
  body: String,
}

impl DotRenderer {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn finish(self) -> String {
    format!("digraph forest {{\n{}}}\n", self.body)
  }
}

impl ForestRenderer for DotRenderer {
  type Handle = String;

  fn node(&mut self, tree: &ActivatedTIGRule) -> String {
    let name = format!("t{}", tree.id());
    self
      .body
      .push_str(&format!("  {} [label=\"{}\"];\n", name, tree));
    name
  }

  fn edge(&mut self, edge: &DerivationEdge, from: &String, to: &String) {
    let style = if edge.is_adjunction() { "dashed" } else { "solid" };
    self.body.push_str(&format!(
      "  {} -> {} [label=\"{}\", style={}];\n",
      from,
      to,
      edge.connector(),
      style
    ));
  }
}

#[cfg(test)]
fn chart_for(grammar: &str, input: &str) -> Chart {
  let g: crate::grammar::Grammar = grammar.parse().unwrap();
  let input = input.split(' ').collect::<Vec<_>>();
  crate::earley::parse_chart(&g, &input)
}

#[cfg(test)]
const SUBSTITUTION: &str = r#"
  start S;
  rule 0 [dog] { 0: NP -> dog; }
  rule 1 [barks] { 0: S -> NP! barks; }
"#;

#[cfg(test)]
const ATTACHMENT: &str = r#"
  start NP;
  rule 0 [dog] { 0: NP -> dog; }
  rule 1 [with] spine 0 {
    0: NP -> NP* PP;
    0.2: PP -> with NP!;
  }
"#;

#[test]
fn test_single_tree_forest() {
  let chart = chart_for("start S; rule 0 [dog barks] { 0: S -> dog barks; }", "dog barks");
  let forest = DerivationTree::<()>::from(&chart);

  assert_eq!(forest.len(), 1);
  assert!(forest.edges().is_empty());
  assert_eq!(readings(&chart).len(), 1);
}

#[test]
fn test_substitution_edge() {
  let chart = chart_for(SUBSTITUTION, "dog barks");
  let forest = DerivationTree::<()>::from(&chart);

  assert_eq!(forest.len(), 2);
  assert_eq!(forest.edges().len(), 1);
  let edge = &forest.edges()[0];
  assert!(!edge.is_adjunction());
  assert_eq!(edge.first().root_symbol(), "S");
  assert_eq!(edge.second().root_symbol(), "NP");
  assert_eq!(edge.connector(), &GornNumber::new(vec![0, 1]));
}

#[test]
fn test_packed_forest_and_readings() {
  let chart = chart_for(ATTACHMENT, "dog with dog with dog");
  let forest = DerivationTree::<()>::from(&chart);

  assert_eq!(forest.len(), 5);
  // both attachments of the second "with" are in the packed forest
  let adjunctions = forest.edges().iter().filter(|e| e.is_adjunction()).count();
  assert_eq!(adjunctions, 3);
  assert_eq!(forest.edges().len(), 5);

  let readings = readings(&chart);
  assert_eq!(readings.len(), 2);
  for reading in readings.iter() {
    assert_eq!(reading.len(), 5);
    assert_eq!(reading.edges().len(), 4);
  }
  assert_ne!(readings[0].edges(), readings[1].edges());
}

#[test]
fn test_copy_is_independent() {
  let chart = chart_for(ATTACHMENT, "dog with dog with dog");
  let mut forest = DerivationTree::<()>::from(&chart);
  let original_edges = forest.edges().to_vec();

  let mut copy = forest.copy();
  let edge = copy.edges()[0].clone();
  assert!(copy.remove_derivation(&edge));
  assert!(!copy.remove_derivation(&edge));
  assert_eq!(copy.edges().len(), original_edges.len() - 1);
  assert_eq!(forest.edges(), original_edges.as_slice());
  // removing an edge keeps its nodes
  assert!(copy.contains(edge.first()) && copy.contains(edge.second()));

  assert!(!forest.add_derivation(original_edges[0].clone()));
  assert!(copy.add_derivation(edge.clone()));
  assert_eq!(copy.edges().len(), original_edges.len());

  forest.remove_derivation(&edge);
  assert!(copy.edges().contains(&edge));

  copy.copy_from(&forest);
  assert_eq!(copy.edges(), forest.edges());
}

#[test]
fn test_dot_output() {
  let chart = chart_for(SUBSTITUTION, "dog barks");
  let forest = DerivationTree::<()>::from(&chart);

  assert_eq!(
    forest.to_dot(),
    "digraph forest {\n  t1 [label=\"S#1@1\"];\n  t0 [label=\"NP#0@0\"];\n  t1 -> t0 [label=\"0.1\", style=solid];\n}\n"
  );
}

#[test]
fn test_render_sets_handles() {
  struct Counter(usize);
  impl ForestRenderer for Counter {
    type Handle = usize;
    fn node(&mut self, _: &ActivatedTIGRule) -> usize {
      self.0 += 1;
      self.0
    }
    fn edge(&mut self, _: &DerivationEdge, from: &usize, to: &usize) {
      assert_ne!(from, to);
    }
  }

  let chart = chart_for(ATTACHMENT, "dog with dog");
  let mut forest = DerivationTree::<usize>::from(&chart);
  let trees = forest.nodes().cloned().collect::<Vec<_>>();
  assert!(trees.iter().all(|t| forest.handle(t).is_none()));

  forest.render(&mut Counter(0));
  let handles = trees.iter().filter_map(|t| forest.handle(t)).collect::<Vec<_>>();
  assert_eq!(handles, vec![&1, &2, &3]);

  forest.reset_handles();
  assert!(trees.iter().all(|t| forest.handle(t).is_none()));
}
