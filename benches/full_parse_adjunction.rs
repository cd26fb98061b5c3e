use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tigparse::Grammar;

const GRAMMAR_SRC: &str = include_str!("../grammars/modifiers.tig");

fn parse(g: &Grammar, input: &[&str]) -> usize {
  g.parse(input).len()
}

fn criterion_benchmark(c: &mut Criterion) {
  let grammar = GRAMMAR_SRC.parse::<Grammar>().unwrap();
  let simple_input = "mary saw the dog".split(' ').collect::<Vec<_>>();
  let complex_input = "the big old dog saw mary with a telescope on monday"
    .split(' ')
    .collect::<Vec<_>>();

  c.bench_function("parse simple", |b| {
    b.iter(|| parse(black_box(&grammar), black_box(&simple_input)))
  });

  c.bench_function("parse stacked adjunction", |b| {
    b.iter(|| parse(black_box(&grammar), black_box(&complex_input)))
  });

  c.bench_function("chart only", |b| {
    b.iter(|| black_box(&grammar).parse_chart(black_box(&complex_input)).len())
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
