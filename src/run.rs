use bucketsweep::bucket;
use bucketsweep::config::Config;
use bucketsweep::indexer::{IndexJob, Indexer, IndexerOptions, ResumeHint, Summary};
use bucketsweep::observability::ProgressReporter;
use bucketsweep::sink::FileSinkFactory;
use bucketsweep::worker::HttpFetcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cli::{IndexArgs, ResolveArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{count} of {total} URLs could not be resolved")]
    Unresolved { count: usize, total: usize },

    #[error(
        "run incomplete: {failed} failed, {interrupted} interrupted, {pending} not started (resume file: {resume_file})"
    )]
    Incomplete {
        failed: usize,
        interrupted: usize,
        pending: usize,
        resume_file: String,
    },
}

pub fn load_config(path: Option<PathBuf>) -> Result<Config, AnyError> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

/// `index` command: sweep one bucket, a list of buckets, or a resume file
pub async fn index(args: IndexArgs, mut config: Config) -> Result<(), AnyError> {
    apply_overrides(&args, &mut config);
    config.validate()?;

    let jobs = collect_jobs(&args).await?;
    if jobs.is_empty() {
        warn!("Nothing to index");
        return Ok(());
    }

    let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
    let sinks = Arc::new(FileSinkFactory::new(
        config.indexer.output_dir.clone(),
        config.indexer.append,
    ));
    let options = IndexerOptions::builder()
        .concurrency(config.indexer.concurrency)
        .format(config.indexer.format)
        .build();
    let indexer = Indexer::new(fetcher, sinks, options);

    info!(
        jobs = jobs.len(),
        concurrency = config.indexer.concurrency,
        output_dir = %config.indexer.output_dir.display(),
        append = config.indexer.append,
        "Starting sweep"
    );

    let handle = indexer.shutdown_handle();
    let listener = tokio::spawn(async move {
        shutdown_signal().await;
        handle.trigger().await;
    });

    let reporter = (config.indexer.show_progress && !args.no_progress).then(|| {
        ProgressReporter::start(
            indexer.progress(),
            config.indexer.progress_interval.as_duration(),
        )
    });

    let summary = indexer.run(jobs).await;

    listener.abort();
    if let Some(reporter) = reporter {
        reporter.stop().await;
    }

    finish(&args, &summary).await
}

fn apply_overrides(args: &IndexArgs, config: &mut Config) {
    if let Some(concurrency) = args.concurrency {
        config.indexer.concurrency = concurrency;
    }
    if let Some(format) = args.format {
        config.indexer.format = format;
    }
    if let Some(dir) = &args.output_dir {
        config.indexer.output_dir = dir.clone();
    }
    // Resumed sweeps extend what was already written
    if args.append || args.resume.is_some() {
        config.indexer.append = true;
    }
}

async fn collect_jobs(args: &IndexArgs) -> Result<Vec<IndexJob>, AnyError> {
    if let Some(url) = &args.url {
        // Single target: any resolve error is fatal
        let mut job = IndexJob::resolve(url)?;
        if let Some(token) = &args.start_key {
            job = job.with_start_token(token.clone());
        }
        if let Some(outfile) = &args.outfile {
            let path = std::path::absolute(outfile)?;
            job = job.with_sink_name(path.to_string_lossy().into_owned());
        }
        return Ok(vec![job]);
    }

    if let Some(input) = &args.input {
        let content = tokio::fs::read_to_string(input).await?;
        return batch_jobs(&content);
    }

    if let Some(resume) = &args.resume {
        return resume_jobs(resume).await;
    }

    Ok(Vec::new())
}

/// One URL per line; blank lines and `#` comments are skipped
fn batch_jobs(content: &str) -> Result<Vec<IndexJob>, AnyError> {
    let entries: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    let mut jobs = Vec::with_capacity(entries.len());
    let mut unresolved = 0;
    for (i, entry) in entries.iter().enumerate() {
        match IndexJob::resolve(entry) {
            Ok(job) => jobs.push(job.indexed(i + 1)),
            Err(e) => {
                unresolved += 1;
                warn!(line = i + 1, url = %entry, error = %e, "Skipping unresolvable URL");
            }
        }
    }

    if jobs.is_empty() && unresolved > 0 {
        return Err(RunError::Unresolved {
            count: unresolved,
            total: entries.len(),
        }
        .into());
    }
    Ok(jobs)
}

async fn resume_jobs(path: &Path) -> Result<Vec<IndexJob>, AnyError> {
    let content = tokio::fs::read_to_string(path).await?;
    let hints: Vec<ResumeHint> = serde_json::from_str(&content)?;
    info!(path = %path.display(), hints = hints.len(), "Resuming");

    let mut jobs = Vec::with_capacity(hints.len());
    for hint in &hints {
        match IndexJob::from_hint(hint) {
            Ok(job) => jobs.push(job),
            Err(e) => warn!(source = %hint.source, error = %e, "Skipping unresolvable resume entry"),
        }
    }
    Ok(jobs)
}

async fn finish(args: &IndexArgs, summary: &Summary) -> Result<(), AnyError> {
    for failure in &summary.failed {
        error!(
            source = %failure.source,
            sink = %failure.sink,
            token = %failure.token,
            error = %failure.error,
            "Bucket failed"
        );
    }

    let mut hints = summary.resume_hints();
    hints.extend(summary.failed.iter().map(|failure| ResumeHint {
        source: failure.source.clone(),
        sink: failure.sink.clone(),
        token: failure.token.clone(),
        interrupted_at: chrono::Utc::now(),
    }));

    info!(
        keys = summary.total_keys,
        completed = summary.completed,
        failed = summary.failed.len(),
        "Sweep finished"
    );

    if hints.is_empty() {
        // A fully resumed run leaves nothing to pick up again
        if args.resume.as_deref() == Some(args.resume_out.as_path()) {
            let _ = tokio::fs::remove_file(&args.resume_out).await;
        }
        return Ok(());
    }

    write_resume_file(&args.resume_out, &hints).await?;
    for hint in &summary.interrupted {
        info!(
            sink = %hint.sink,
            token = %hint.token,
            "Interrupted; rerun with --resume {} to continue",
            args.resume_out.display()
        );
    }

    Err(RunError::Incomplete {
        failed: summary.failed.len(),
        interrupted: summary.interrupted.len(),
        pending: summary.pending.len(),
        resume_file: args.resume_out.display().to_string(),
    }
    .into())
}

async fn write_resume_file(path: &Path, hints: &[ResumeHint]) -> Result<(), AnyError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_string_pretty(hints)?;
    tokio::fs::write(path, json).await?;
    info!(path = %path.display(), entries = hints.len(), "Wrote resume file");
    Ok(())
}

/// `resolve` command: print provider, output name and listing URL per input
pub fn resolve(args: ResolveArgs) -> Result<(), AnyError> {
    let mut failed = 0;
    for url in &args.urls {
        match bucket::resolve(url) {
            Ok(bucket) => println!(
                "{}\t{}\t{}",
                bucket.provider(),
                bucket.name(),
                bucket.listing_url("")
            ),
            Err(e) => {
                failed += 1;
                error!(%url, error = %e, "Failed to resolve");
            }
        }
    }

    if failed > 0 {
        return Err(RunError::Unresolved {
            count: failed,
            total: args.urls.len(),
        }
        .into());
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_skips_comments_and_bad_lines() {
        let content = "\n# buckets\nhttps://a.storage.googleapis.com/\n\n::not a url::\nhttps://firebasestorage.googleapis.com/v0/b/app/o\n";
        let jobs = batch_jobs(content).unwrap();

        let names: Vec<&str> = jobs.iter().map(|j| j.sink_name.as_str()).collect();
        assert_eq!(names, vec!["1-a.txt", "3-app.txt"]);
    }

    #[test]
    fn test_batch_all_unresolvable_is_an_error() {
        assert!(batch_jobs("::x::\n").is_err());
        assert!(batch_jobs("# only comments\n").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_file_round_trip() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("state/resume.json");
        let hints = vec![ResumeHint {
            source: "https://a.storage.googleapis.com/".to_string(),
            sink: "1-a.txt".to_string(),
            token: "k/7".to_string(),
            interrupted_at: chrono::Utc::now(),
        }];

        write_resume_file(&path, &hints).await.unwrap();
        let jobs = resume_jobs(&path).await.unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].sink_name, "1-a.txt");
        assert_eq!(jobs[0].start_token, "k/7");
    }
}
