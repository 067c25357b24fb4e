use anyhow::{Context, Result};
use clap::Parser;
use glob::glob;
use itertools::Itertools;
use mrcache::cmd::standalone::{Args, Job};
use mrcache::workload::{grep, wc, Workload};
use mrcache::*;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .init();
}

fn load_cache<V: Value>(job: &Job) -> Result<Arc<MappingCache<V>>> {
    let cache = match &job.cache {
        Some(path) if path.exists() => MappingCache::load(path)
            .with_context(|| format!("failed to load cache {}", path.display()))?,
        _ => MappingCache::new(),
    };
    Ok(Arc::new(cache))
}

async fn run_standalone_mr_job<M, R>(job: &Job, mapper: M, reducer: R) -> Result<()>
where
    M: Mapper,
    R: Reducer<M::Value>,
    R::Output: Display,
{
    // Input keys are the matching file paths.
    let keys = glob(&job.input)?
        .flatten()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>();
    info!(files = keys.len(), input = %job.input, "starting job");

    let cache = load_cache::<M::Value>(job)?;
    let perf = Arc::new(PerfStats::new());
    let engine = MapReduce::new(mapper, reducer)
        .with_cache(cache.clone())
        .with_perf_stats(perf.clone())
        .with_config(EngineConfig::default().with_accumulator_capacity(job.capacity));

    let (out_tx, out_rx) = mpsc::channel(64);
    let (err_tx, mut err_rx) = mpsc::channel(64);
    let errors = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(err) = err_rx.recv().await {
            error!("{err}");
            count += 1;
        }
        count
    });
    let outputs = tokio::spawn(utils::collect(out_rx));

    engine
        .run(utils::key_source(keys, 64), out_tx, err_tx)
        .await;
    let outputs = outputs.await?;
    let failures = errors.await?;

    std::fs::create_dir_all(&job.output)?;
    let out_pathspec = job.output.join("mr-out");
    let content = outputs
        .into_iter()
        .sorted_by(|a, b| a.key.cmp(&b.key))
        .map(|kv| format!("{} {}\n", kv.key, kv.value))
        .collect::<String>();
    std::fs::write(&out_pathspec, content)?;
    info!(path = %out_pathspec.display(), stats = %perf.snapshot(), "job done");

    if let Some(path) = &job.cache {
        cache
            .save(path)
            .with_context(|| format!("failed to save cache {}", path.display()))?;
    }
    if failures > 0 {
        warn!(failures, "job finished with errors");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let job = Job::from(args.command);

    match workload::named(&job.workload)? {
        Workload::WordCount => run_standalone_mr_job(&job, wc::WordCount, wc::SumCounts).await,
        Workload::Grep => {
            let app = grep::Grep::from_args(&job.args)?;
            run_standalone_mr_job(&job, app, grep::GrepReduce).await
        }
    }
}
