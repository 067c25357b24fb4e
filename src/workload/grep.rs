//! A MapReduce-compatible implementation of `grep`.
//!

use crate::*;
use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(no_binary_name = true)]
struct Args {
    #[clap(short, long, value_parser)]
    term: String,
}

/// One matching line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepHit {
    pub line: u64,
    pub text: String,
}

/// Emits a [`GrepHit`] under the file path for every line containing the
/// search term.
#[derive(Clone, Debug)]
pub struct Grep {
    term: String,
}

impl Grep {
    pub fn new(term: impl Into<String>) -> Self {
        Self { term: term.into() }
    }

    /// Parses the auxiliary workload arguments, e.g. `--term foo`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let args = Args::try_parse_from(args)?;
        Ok(Self::new(args.term))
    }
}

#[async_trait]
impl Mapper for Grep {
    type Value = GrepHit;

    async fn map(&self, io: &mut MapIo<GrepHit>) -> Result<()> {
        let path = io.map_key().to_string();
        let s = tokio::fs::read_to_string(&path).await?;
        let hits = s
            .lines()
            .enumerate()
            .filter(|(_, s)| s.contains(&self.term))
            .map(|(i, s)| GrepHit {
                line: i as u64 + 1,
                text: s.to_string(),
            })
            .collect::<Vec<_>>();

        for hit in hits {
            io.emit(path.clone(), hit).await;
        }
        Ok(())
    }
}

/// Outputs `file:line:: text` for every hit of a file, in line order.
#[derive(Clone, Copy, Debug, Default)]
pub struct GrepReduce;

#[async_trait]
impl Reducer<GrepHit> for GrepReduce {
    type Output = String;

    async fn reduce(&self, io: &mut ReduceIo<GrepHit, String>) -> Result<()> {
        let filename = io.reduce_key().to_string();
        let mut hits = Vec::new();
        while let Some(hit) = io.next_value().await {
            hits.push(hit);
        }
        hits.sort_by_key(|hit| hit.line);
        for hit in hits {
            let line = format!("{}:{}:: {}", filename, hit.line, hit.text);
            io.output(filename.clone(), line).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{collect, key_source};
    use tokio::sync::mpsc;

    #[test]
    fn parses_term_from_args() {
        let grep = Grep::from_args(&["--term".to_string(), "needle".to_string()]).unwrap();
        assert_eq!(grep.term, "needle");
        assert!(Grep::from_args(&[]).is_err());
    }

    #[tokio::test]
    async fn reports_matching_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hay.txt");
        std::fs::write(&path, "needle one\nhay\nneedle two\n").unwrap();
        let key = path.display().to_string();

        let (out_tx, out_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::channel(1);
        MapReduce::new(Grep::new("needle"), GrepReduce)
            .run(key_source(vec![key.clone()], 1), out_tx, err_tx)
            .await;

        let lines = collect(out_rx)
            .await
            .into_iter()
            .map(KeyValue::into_value)
            .collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                format!("{key}:1:: needle one"),
                format!("{key}:3:: needle two"),
            ]
        );
    }
}
