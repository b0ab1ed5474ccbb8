//! Exercise the expression engine from the command line, without a real
//! mail-filter host behind it.
//!
//! Atoms are single ASCII letters (`A`..`Z`); their truth values come from
//! `key=value` pairs given on the command line, `key` being the letter and
//! `value` any float the engine's comparisons can use. Anything not
//! assigned defaults to `0.0`.
//!
//! ```text
//! cargo run --example repl -- 'A & B | C >= 2' A=1 B=0 C=3
//! ```

use std::collections::HashMap;
use std::error::Error as StdError;

use predexpr::{Expr, Flags, Subr};

struct Letters;

impl<'a> Subr<'a> for Letters {
    type Atom = char;
    type Runtime = HashMap<char, f64>;

    fn parse(
        &mut self,
        input: &'a str,
    ) -> Result<(char, usize), Box<dyn StdError + Send + Sync + 'static>> {
        let c = input.chars().next().ok_or("expected an atom letter")?;
        if !c.is_ascii_alphabetic() {
            return Err(format!("'{c}' is not a letter atom").into());
        }
        Ok((c, c.len_utf8()))
    }

    fn process(&self, atom: &mut char, runtime: &mut HashMap<char, f64>) -> f64 {
        *runtime.get(atom).unwrap_or(&0.0)
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let Some(source) = args.next() else {
        eprintln!("usage: repl '<expression>' [A=1.0 B=0.0 ...]");
        std::process::exit(2);
    };

    let mut runtime = HashMap::new();
    for binding in args {
        let Some((key, value)) = binding.split_once('=') else {
            eprintln!("ignoring malformed binding: {binding}");
            continue;
        };
        let Some(letter) = key.chars().next() else {
            continue;
        };
        match value.parse::<f64>() {
            Ok(v) => {
                runtime.insert(letter, v);
            }
            Err(e) => eprintln!("ignoring binding for {letter}: {e}"),
        }
    }

    let mut expr = match Expr::parse(Letters, &source) {
        Ok(expr) => expr,
        Err(err) => {
            eprintln!("parse error at byte {}: {err}", err.offset());
            std::process::exit(1);
        }
    };

    println!("canonical: {}", expr.to_text());

    let (result, trace) = expr.eval_track(&mut runtime, Flags::default());
    println!("result: {result}");
    println!("fired atoms: {}", trace.join(", "));
}
