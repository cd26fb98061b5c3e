use thiserror::Error;

use crate::rules::GornNumber;

/// A structural problem with a grammar rule. These are raised while a grammar is
/// loaded and never during parsing: a grammar that made it into a `Grammar` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
  #[error("rule {rule} has no production layers")]
  NoLayers { rule: u64 },

  #[error("rule {rule}: layer {gorn} has no left-hand side")]
  MissingLeftHandSide { rule: u64, gorn: GornNumber },

  #[error("rule {rule}: first layer must be the root layer 0, found {gorn}")]
  RootNotFirst { rule: u64, gorn: GornNumber },

  #[error("rule {rule}: layer {gorn} is defined more than once")]
  DuplicateLayer { rule: u64, gorn: GornNumber },

  #[error("rule {rule}: layer {gorn} does not expand a nonterminal of its parent layer")]
  OrphanLayer { rule: u64, gorn: GornNumber },

  #[error("rule {rule}: bad spine: {reason}")]
  BadSpine { rule: u64, reason: &'static str },

  #[error("rule index {0} is used by more than one rule")]
  DuplicateIndex(u64),
}
