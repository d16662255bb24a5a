//! Picking which partitions/images a workflow should touch.
//!
//! The workflows only ever ask "which of these candidates?"; how the answer is obtained is up
//! to the [Chooser] they're given.

use std::io::{self, BufRead, Write};

use anyhow::bail;

/// Chooses a subset of candidates
pub trait Chooser {
    /// Return the chosen candidates. Anything returned must be one of `candidates`.
    fn choose(&mut self, prompt: &str, candidates: &[String]) -> anyhow::Result<Vec<String>>;
}

/// A choice made up front (e.g. on the command line).
///
/// Candidates are kept in their offered order. Names that aren't offered are ignored.
#[derive(Debug, Clone)]
pub enum Preselected {
    All,
    Only(Vec<String>),
}

impl Chooser for Preselected {
    fn choose(&mut self, _prompt: &str, candidates: &[String]) -> anyhow::Result<Vec<String>> {
        Ok(match self {
            Preselected::All => candidates.to_vec(),
            Preselected::Only(names) => candidates
                .iter()
                .filter(|x| names.contains(*x))
                .cloned()
                .collect(),
        })
    }
}

/// Asks on the terminal, accepting numbers and/or names, or "all"
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Chooser for ConsolePrompt<R, W> {
    fn choose(&mut self, prompt: &str, candidates: &[String]) -> anyhow::Result<Vec<String>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        writeln!(self.output, "{prompt}")?;
        for (i, candidate) in candidates.iter().enumerate() {
            writeln!(self.output, "{:3}) {candidate}", i + 1)?;
        }

        let mut line = String::new();
        loop {
            write!(self.output, "Selection (e.g. \"1 3\", \"boot,lk\", \"all\"): ")?;
            self.output.flush()?;

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                bail!("input closed while waiting for a selection");
            }

            match parse_selection(&line, candidates) {
                Ok(chosen) => return Ok(chosen),
                Err(error) => writeln!(self.output, "{error}")?,
            }
        }
    }
}

/// Parse a selection line against the candidate list, keeping the candidates' order
pub fn parse_selection(line: &str, candidates: &[String]) -> anyhow::Result<Vec<String>> {
    let line = line.trim();
    if line.eq_ignore_ascii_case("all") {
        return Ok(candidates.to_vec());
    }

    let mut picked = vec![false; candidates.len()];
    for token in line.split(|c: char| c == ',' || c.is_whitespace()) {
        if token.is_empty() {
            continue;
        }

        let index = match token.parse::<usize>() {
            Ok(n) if (1..=candidates.len()).contains(&n) => n - 1,
            Ok(n) => bail!("{n} is not in the list"),
            Err(_) => match candidates.iter().position(|x| x == token) {
                Some(i) => i,
                None => bail!("unknown choice `{token}`"),
            },
        };
        picked[index] = true;
    }

    Ok(candidates
        .iter()
        .zip(picked)
        .filter_map(|(candidate, picked)| picked.then(|| candidate.clone()))
        .collect())
}

#[cfg(test)]
fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|x| x.to_string()).collect()
}

#[test]
fn test_preselected() -> anyhow::Result<()> {
    let candidates = names(&["preloader", "lk", "tee", "boot"]);
    assert_eq!(Preselected::All.choose("", &candidates)?, candidates);
    assert_eq!(
        Preselected::Only(names(&["boot", "lk", "nonsense"])).choose("", &candidates)?,
        names(&["lk", "boot"])
    );
    Ok(())
}

#[test]
fn test_parse_selection() -> anyhow::Result<()> {
    let candidates = names(&["frp", "boot", "recovery"]);
    assert_eq!(parse_selection("all\n", &candidates)?, candidates);
    assert_eq!(parse_selection("3 1", &candidates)?, names(&["frp", "recovery"]));
    assert_eq!(parse_selection("boot,3", &candidates)?, names(&["boot", "recovery"]));
    assert_eq!(parse_selection("  \n", &candidates)?, names(&[]));
    assert!(parse_selection("4", &candidates).is_err());
    assert!(parse_selection("0", &candidates).is_err());
    assert!(parse_selection("system", &candidates).is_err());
    Ok(())
}

#[test]
fn test_console_prompt_retries() -> anyhow::Result<()> {
    let candidates = names(&["lk", "boot"]);
    let mut output = Vec::new();
    let mut prompt = ConsolePrompt::new(&b"bogus\n2\n"[..], &mut output);
    assert_eq!(prompt.choose("Flash what?", &candidates)?, names(&["boot"]));

    let output = String::from_utf8(output)?;
    assert!(output.starts_with("Flash what?\n  1) lk\n  2) boot\n"));
    assert!(output.contains("unknown choice `bogus`"));

    let mut prompt = ConsolePrompt::new(&b""[..], Vec::new());
    assert!(prompt.choose("Flash what?", &candidates).is_err());
    Ok(())
}
