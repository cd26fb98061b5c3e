use std::env;
use std::io;
use std::io::Write;
use std::process;

use tigparse::forest::{readings, DerivationTree};
use tigparse::{Err, Grammar};
use tracing_subscriber::EnvFilter;

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} FILE [options]

Options:
  -h, --help      Print this message
  -c, --chart     Print the parse chart (defaults to not printing)
  -f, --forest    Print the packed derivation forest (defaults to not printing)
  -r, --readings  Print every reading (defaults to only counting them)
  -d, --dot       Print the forest as a Graphviz digraph (defaults to not printing)

Log output is controlled with RUST_LOG, e.g. RUST_LOG=tigparse=debug",
    prog_name
  )
}

fn parse(g: &Grammar, sentence: &str, opts: &Args) -> Result<(), Err> {
  let sentence = sentence.split_whitespace().collect::<Vec<_>>();

  let chart = g.parse_chart(&sentence);

  if opts.print_chart {
    println!("chart:\n{}\n", chart);
  }

  let forest = DerivationTree::<()>::from(&chart);
  if opts.print_forest {
    println!("forest:\n{}", forest);
  }
  if opts.print_dot {
    println!("{}", forest.to_dot());
  }

  let readings = readings(&chart);
  println!(
    "Parsed {} reading{}",
    readings.len(),
    if readings.len() == 1 { "" } else { "s" }
  );

  if opts.print_readings {
    for (idx, reading) in readings.iter().enumerate() {
      println!("reading {}:\n{}", idx + 1, reading);
    }
  }

  Ok(())
}

struct Args {
  filename: String,
  print_chart: bool,
  print_forest: bool,
  print_readings: bool,
  print_dot: bool,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    let mut iter = v.into_iter();
    let Some(prog_name) = iter.next() else {
      return Err(Self::make_error_message("bad argument vector", "tigparse"));
    };

    let mut filename: Option<String> = None;
    let mut print_chart = false;
    let mut print_forest = false;
    let mut print_readings = false;
    let mut print_dot = false;

    for o in iter {
      match o.as_str() {
        "-h" | "--help" => {
          println!("{}", usage(&prog_name));
          process::exit(0);
        }
        "-c" | "--chart" => print_chart = true,
        "-f" | "--forest" => print_forest = true,
        "-r" | "--readings" => print_readings = true,
        "-d" | "--dot" => print_dot = true,
        _ if filename.is_none() && !o.starts_with('-') => filename = Some(o),
        _ => return Err(Self::make_error_message("invalid arguments", prog_name)),
      }
    }

    if let Some(filename) = filename {
      Ok(Self {
        filename,
        print_chart,
        print_forest,
        print_readings,
        print_dot,
      })
    } else {
      Err(Self::make_error_message("missing filename", prog_name))
    }
  }
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let g = Grammar::read_from_file(&opts.filename)?;

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    match io::stdin().read_line(&mut input) {
      Ok(_) => {
        if input.is_empty() {
          // ctrl+d
          return Ok(());
        }
        parse(&g, input.trim(), &opts)?;
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}
