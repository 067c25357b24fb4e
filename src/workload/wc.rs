//! A MapReduce-compatible implementation of word count.
//!

use crate::*;
use anyhow::Result;
use async_trait::async_trait;
use itertools::Itertools;

/// Reads the file named by the input key and emits `(word, count)` for
/// every distinct lowercased alphabetic word in it.
#[derive(Clone, Copy, Debug, Default)]
pub struct WordCount;

#[async_trait]
impl Mapper for WordCount {
    type Value = u64;

    async fn map(&self, io: &mut MapIo<u64>) -> Result<()> {
        let s = tokio::fs::read_to_string(io.map_key()).await?;
        let counts = s
            .split(|c: char| !c.is_alphabetic())
            .filter(|s| !s.is_empty())
            .map(|word| word.to_lowercase())
            .counts();

        for (word, count) in counts.into_iter().sorted() {
            io.emit(word, count as u64).await;
        }
        Ok(())
    }
}

/// Sums the per-file counts of a word.
#[derive(Clone, Copy, Debug, Default)]
pub struct SumCounts;

#[async_trait]
impl Reducer<u64> for SumCounts {
    type Output = u64;

    async fn reduce(&self, io: &mut ReduceIo<u64, u64>) -> Result<()> {
        let mut total = 0;
        while let Some(count) = io.next_value().await {
            total += count;
        }
        let word = io.reduce_key().to_string();
        io.output(word, total).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{collect, key_source};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn counts_words_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "The cat, the HAT.").unwrap();
        std::fs::write(&b, "a cat\n").unwrap();
        let keys = [a, b].map(|p| p.display().to_string());

        let perf = Arc::new(PerfStats::new());
        let (out_tx, out_rx) = mpsc::channel(16);
        let (err_tx, err_rx) = mpsc::channel(4);
        MapReduce::new(WordCount, SumCounts)
            .with_perf_stats(perf.clone())
            .run(key_source(keys, 1), out_tx, err_tx)
            .await;

        let out = collect(out_rx)
            .await
            .into_iter()
            .map(KeyValue::into_parts)
            .sorted()
            .collect::<Vec<_>>();
        assert_eq!(
            out,
            vec![
                ("a".to_string(), 1),
                ("cat".to_string(), 2),
                ("hat".to_string(), 1),
                ("the".to_string(), 2),
            ]
        );
        assert!(collect(err_rx).await.is_empty());
        assert_eq!(perf.cache_misses(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_a_map_error() {
        let (out_tx, out_rx) = mpsc::channel(1);
        let (err_tx, err_rx) = mpsc::channel(1);
        let keys = vec!["/definitely/not/here.txt".to_string()];
        MapReduce::new(WordCount, SumCounts)
            .run(key_source(keys, 1), out_tx, err_tx)
            .await;

        assert!(collect(out_rx).await.is_empty());
        let errs = collect(err_rx).await;
        assert_eq!(errs.len(), 1);
        assert!(errs[0]
            .to_string()
            .starts_with("failed to map /definitely/not/here.txt: "));
    }

    #[tokio::test]
    async fn emits_one_count_per_distinct_word_of_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "the cat saw the other cat and the dog").unwrap();
        let key = path.display().to_string();

        let cache = Arc::new(MappingCache::<u64>::new());
        let (out_tx, out_rx) = mpsc::channel(16);
        let (err_tx, _err_rx) = mpsc::channel(1);
        MapReduce::new(WordCount, SumCounts)
            .with_cache(cache.clone())
            .run(key_source(vec![key.clone()], 1), out_tx, err_tx)
            .await;
        assert_eq!(collect(out_rx).await.len(), 6);

        // The cached entry is what the mapper emitted, in word order.
        let emitted = cache
            .get(&key)
            .unwrap()
            .map(|kv| kv.unwrap().into_parts())
            .collect::<Vec<_>>();
        assert_eq!(
            emitted,
            vec![
                ("and".to_string(), 1),
                ("cat".to_string(), 2),
                ("dog".to_string(), 1),
                ("other".to_string(), 1),
                ("saw".to_string(), 1),
                ("the".to_string(), 3),
            ]
        );
    }
}
