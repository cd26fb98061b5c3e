//! Simple recursive-descent parsing of grammar files

use regex::Regex;
use std::collections::HashSet;
use std::str::FromStr;

use crate::grammar::Grammar;
use crate::rules::{Entry, GornNumber, Layer, TIGRule};
use crate::Err;

/// Parses a grammar made of `start` and `rule` statements.
/// Errors if the grammar doesn't parse or is malformed
impl FromStr for Grammar {
  type Err = Err;

  /// Without a `start` statement the first rule's root is the start symbol.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let ((starts, rules), s) = parse_statements(s)?;
    if !s.is_empty() {
      return Err(format!("unexpected input at {}", s).into());
    }

    let Some(first) = rules.first() else {
      return Err("empty ruleset".into());
    };
    let starts = match starts {
      Some(starts) => starts,
      None => [first.root_symbol()?.to_string()].into_iter().collect(),
    };

    Ok(Self::new(rules, starts)?)
  }
}

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), Err>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Try to consume a regex, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => {
      let (_, rest) = s.split_at(m.end());
      (Some(m.as_str()), rest)
    }
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", re, s).into())
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", c, s).into())
  }
}

/// Skips whitespace and // comments, if there are any
fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"(?:\s|//[^\n]*)*");
  optional_re(&WHITESPACE_OR_COMMENT, s).1
}

/// Tries to parse a name made of letters, numbers, - and _
fn parse_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(NAME, r"[\p{Alphabetic}0-9\-_]+");
  needed_re(&NAME, s).map_err(|err| format!("name: {}", err).into())
}

fn parse_integer<T>(s: &str) -> ParseResult<'_, T>
where
  T: FromStr,
  T::Err: std::error::Error + 'static,
{
  regex_static!(INTEGER, r"[0-9]+");
  let (digits, s) = needed_re(&INTEGER, s)?;
  Ok((digits.parse()?, s))
}

fn parse_float(s: &str) -> ParseResult<'_, f64> {
  regex_static!(FLOAT, r"[0-9]+(\.[0-9]+)?([eE][-+]?[0-9]+)?");
  let (digits, s) = needed_re(&FLOAT, s)?;
  Ok((digits.parse()?, s))
}

/// A Gorn number written with dots: 0.2.1
fn parse_gorn(s: &str) -> ParseResult<'_, GornNumber> {
  regex_static!(DOTTED, r"[0-9]+(\.[0-9]+)*");
  let (dotted, s) = needed_re(&DOTTED, s).map_err(|e| format!("gorn number: {}", e))?;
  let path = dotted
    .split('.')
    .map(|n| n.parse::<usize>())
    .collect::<Result<Vec<_>, _>>()?;
  Ok((GornNumber::new(path), s))
}

/// A bare name or a "quoted string"
fn parse_word(s: &str) -> ParseResult<'_, String> {
  regex_static!(QUOTED, r#""[^"]*""#);
  if s.starts_with('"') {
    let (quoted, s) = needed_re(&QUOTED, s).map_err(|e| format!("quoted word: {}", e))?;
    Ok((quoted[1..quoted.len() - 1].to_string(), s))
  } else {
    let (name, s) = parse_name(s)?;
    Ok((name.to_string(), s))
  }
}

/// `dog`, `"Dog"`: terminals; `NP!`: substitution site; `NP*`: foot; `NP`: nonterminal
fn parse_entry(s: &str) -> ParseResult<'_, Entry> {
  if s.starts_with('"') {
    let (word, s) = parse_word(s)?;
    return Ok((Entry::terminal(word), s));
  }

  let (name, s) = parse_name(s)?;
  if let (Some(_), s) = optional_char('!', s) {
    Ok((Entry::substitution(name), s))
  } else if let (Some(_), s) = optional_char('*', s) {
    Ok((Entry::foot(name), s))
  } else if name.chars().next().is_some_and(char::is_lowercase) {
    Ok((Entry::terminal(name), s))
  } else {
    Ok((Entry::nonterminal(name), s))
  }
}

/// `0.2: VP -> saw NP!;`
fn parse_layer(s: &str) -> ParseResult<'_, Layer> {
  #![allow(clippy::trivial_regex)]
  regex_static!(ARROW, "->");

  let (gorn, s) = parse_gorn(s)?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char(':', s)?;
  let s = skip_whitespace(s);
  let (lhs, s) = parse_name(s).map_err(|e| -> Err { format!("layer {}: {}", gorn, e).into() })?;
  let s = skip_whitespace(s);
  let (_, s) =
    needed_re(&ARROW, s).map_err(|e| -> Err { format!("layer {} arrow: {}", gorn, e).into() })?;

  let mut entries = vec![Entry::nonterminal(lhs)];
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), s) = optional_char(';', rem) {
      return Ok((Layer::new(gorn, entries), s));
    }
    let (entry, s) =
      parse_entry(rem).map_err(|e| -> Err { format!("layer {} entry: {}", gorn, e).into() })?;
    entries.push(entry);
    rem = s;
  }
}

/// After the `rule` keyword: `0 [anchors] freq 1 prob 0.5 spine 0 { layers }`
fn parse_rule(s: &str) -> ParseResult<'_, TIGRule> {
  let (index, s) = parse_integer::<u64>(s).map_err(|e| format!("rule index: {}", e))?;
  let s = skip_whitespace(s);

  let mut anchors = Vec::new();
  let mut rem = needed_char('[', s)?.1;
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), s) = optional_char(']', rem) {
      rem = s;
      break;
    }
    let (word, s) =
      parse_word(rem).map_err(|e| -> Err { format!("rule {} anchor: {}", index, e).into() })?;
    anchors.push(word);
    rem = s;
  }

  let mut freq = 0;
  let mut prob = 1.0;
  let mut spine = None;
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), s) = optional_char('{', rem) {
      rem = s;
      break;
    }
    let (attr, s) = parse_name(rem)?;
    let s = skip_whitespace(s);
    rem = match attr {
      "freq" => {
        let (v, s) = parse_integer(s)?;
        freq = v;
        s
      }
      "prob" => {
        let (v, s) = parse_float(s)?;
        prob = v;
        s
      }
      "spine" => {
        let (v, s) = parse_gorn(s)?;
        spine = Some(v);
        s
      }
      other => return Err(format!("rule {}: unknown attribute {}", index, other).into()),
    };
  }

  let mut layers = Vec::new();
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), s) = optional_char('}', rem) {
      rem = s;
      break;
    }
    let (layer, s) =
      parse_layer(rem).map_err(|e| -> Err { format!("rule {}: {}", index, e).into() })?;
    layers.push(layer);
    rem = s;
  }

  Ok((TIGRule::new(index, layers, anchors, freq, prob, spine), rem))
}

/// After the `start` keyword: `S, NP;`
fn parse_start(s: &str) -> ParseResult<'_, Vec<String>> {
  let mut symbols = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), s) = optional_char(';', rem) {
      return Ok((symbols, s));
    }
    if !symbols.is_empty() {
      rem = skip_whitespace(needed_char(',', rem)?.1);
    }
    let (name, s) = parse_name(rem).map_err(|e| format!("start symbol: {}", e))?;
    symbols.push(name.to_string());
    rem = s;
  }
}

type Statements = (Option<HashSet<String>>, Vec<TIGRule>);

fn parse_statements(s: &str) -> ParseResult<'_, Statements> {
  let mut starts: Option<HashSet<String>> = None;
  let mut rules = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() {
      return Ok(((starts, rules), rem));
    }

    let (keyword, s) = parse_name(rem)?;
    let s = skip_whitespace(s);
    rem = match keyword {
      "start" => {
        let (symbols, s) = parse_start(s)?;
        starts.get_or_insert_with(HashSet::new).extend(symbols);
        s
      }
      "rule" => {
        let (rule, s) = parse_rule(s)?;
        rules.push(rule);
        s
      }
      other => return Err(format!("expected start or rule, got {}", other).into()),
    };
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rules::{AuxiliaryKind, NodeType};

  macro_rules! grammar_file {
    ($filename:expr) => {
      (
        $filename,
        include_str!(concat!("../grammars/", $filename)),
      )
    };
  }

  #[test]
  fn smoke_test_grammar_files() {
    let grammars = [
      grammar_file!("basic.tig"),
      grammar_file!("modifiers.tig"),
    ];

    for (filename, src) in grammars {
      let parsed = src.parse::<Grammar>();
      assert!(parsed.is_ok(), "failed to parse {filename}: {:?}", parsed.err());
    }
  }

  #[test]
  fn test_parse_rules() {
    let g: Grammar = r#"
      // a tiny grammar
      start S, NP;

      rule 0 [dog] freq 4 prob 0.25 { 0: NP -> dog; }
      rule 1 [barks] {
        0: S -> NP! VP;   // subject is substituted
        0.2: VP -> barks;
      }
      rule 2 [very "Loud"] spine 0.2 {
        0: ADV -> very ADV; 0.2: ADV -> "Loud" ADV*;
      }
    "#
    .parse()
    .unwrap();

    let mut starts = g.start_symbols().iter().cloned().collect::<Vec<_>>();
    starts.sort();
    assert_eq!(starts, vec!["NP", "S"]);
    assert_eq!(g.rules().len(), 3);

    let dog = &g.rules()[0];
    assert_eq!(dog.index(), 0);
    assert_eq!(dog.freq(), 4);
    assert_eq!(dog.prob(), 0.25);
    assert!(dog.is_initial());

    let s = &g.rules()[1];
    assert_eq!(s.freq(), 0);
    assert_eq!(s.prob(), 1.0);
    assert_eq!(
      s.layers()[0].rhs(),
      &[Entry::substitution("NP"), Entry::nonterminal("VP")]
    );
    assert_eq!(s.layers()[1].gorn, GornNumber::new(vec![0, 2]));
    assert_eq!(s.layers()[1].rhs()[0].node_type, NodeType::Terminal);

    let adv = &g.rules()[2];
    assert_eq!(adv.lexical_anchors(), &["very".to_string(), "Loud".to_string()]);
    assert_eq!(adv.layers()[1].rhs()[0], Entry::terminal("Loud"));
    assert_eq!(adv.spine(), Some(&GornNumber::new(vec![0, 2])));
    assert_eq!(adv.auxiliary_kind(), Some(AuxiliaryKind::Left));
  }

  #[test]
  fn test_first_root_is_default_start() {
    let g: Grammar = "rule 3 [a] { 0: A -> a; } rule 4 [b] { 0: B -> b; }"
      .parse()
      .unwrap();
    assert_eq!(g.start_symbols().len(), 1);
    assert!(g.is_start_symbol("A"));
  }

  #[test]
  fn test_errors() {
    assert_eq!(
      "// nothing here\n".parse::<Grammar>().unwrap_err().to_string(),
      "empty ruleset"
    );
    assert!("start S;".parse::<Grammar>().is_err());
    assert!("rule x [a] { 0: S -> a; }".parse::<Grammar>().is_err());
    assert!("rule 0 [a] { 0: S -> a }".parse::<Grammar>().is_err());
    assert!("rule 0 [a] color 1 { 0: S -> a; }".parse::<Grammar>().is_err());
    assert!("start S rule 0 [a] { 0: S -> a; }".parse::<Grammar>().is_err());
    assert!("stuff".parse::<Grammar>().is_err());
    // parses, but the tree has a foot and no spine
    assert!("rule 0 [a] { 0: S -> a S*; }".parse::<Grammar>().is_err());
  }

  #[test]
  fn test_display_reparses() {
    let src = r#"
      start S;
      rule 0 [dog] freq 2 prob 0.5 { 0: NP -> dog; }
      rule 1 [barks] { 0: S -> NP! barks; }
      rule 2 [loudly "!"] spine 0 { 0: S -> S* ADV; 0.2: ADV -> loudly "!"; }
    "#;
    let g: Grammar = src.parse().unwrap();
    let printed = g.to_string();
    let reparsed: Grammar = printed.parse().unwrap();

    assert_eq!(reparsed.to_string(), printed);
    assert_eq!(reparsed.rules()[2].layers(), g.rules()[2].layers());
    assert_eq!(reparsed.rules()[0].freq(), 2);
  }
}
