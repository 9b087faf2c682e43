use std::sync::Arc;

use console::{Term, style};
use harvester::clone::{
    CloneOptions, ClonePipeline, CloneSummary, GitCloner, JOB_CHANNEL_BUFFER_SIZE,
    jobs_from_descriptors, prepare_output_dir,
};
use harvester::github::short_error_message;
use harvester::{LogSink, SearchPager, SearchQuery};
use tokio::sync::mpsc;

use super::shared::{build_client, criteria_from, require_positive};
use crate::CloneArgs;
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::{is_shutdown_requested, shutdown_flag};

/// Stream search results straight into the clone pool.
///
/// Everything that can be misconfigured (worker count, client settings, the
/// output directory, the CSV log) is checked before the first request.
pub(crate) async fn handle_clone(
    args: CloneArgs,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let concurrency = require_positive(
        "concurrency",
        args.concurrency.unwrap_or(config.clone.concurrency),
    )?;
    let client_config = config.client_config(args.token);
    client_config.validate()?;
    let auth_token = client_config.token.clone();

    prepare_output_dir(&args.output_dir).await?;
    let csv_file = args.csv_file.unwrap_or_else(|| config.clone.csv_file.clone());
    let sink = Arc::new(LogSink::open(&csv_file).await?);

    let reporter = Arc::new(ProgressReporter::new());
    let on_progress = reporter.as_callback();
    let client = build_client(client_config, &on_progress)?;

    let criteria = criteria_from(&args.filters);
    let query = SearchQuery::for_today(&criteria);
    let is_tty = Term::stdout().is_term();
    if is_tty {
        println!("Searching: {}\n", style(query.to_human()).cyan());
    }
    let pager = SearchPager::new(client, query).with_shutdown_flag(shutdown_flag());

    let options = CloneOptions {
        output_dir: args.output_dir.clone(),
        auth_token,
        depth: args.depth.or(config.clone.depth),
        branch: args.branch,
        overwrite: args.overwrite,
    };
    let (descriptor_tx, descriptor_rx) = mpsc::channel(JOB_CHANNEL_BUFFER_SIZE);
    let jobs = jobs_from_descriptors(descriptor_rx, options);
    let pipeline = ClonePipeline::new(Arc::new(GitCloner::new()), concurrency)
        .with_sink(Arc::clone(&sink))
        .with_progress(Arc::clone(&on_progress));

    let (discovered, run) = tokio::join!(
        pager.discover_streaming(descriptor_tx, Some(&*on_progress)),
        pipeline.run_streaming(jobs)
    );
    sink.close().await?;
    reporter.finish();

    print_summary(&run.summary, &csv_file, is_tty);
    if is_shutdown_requested() {
        reporter.println("Stopped early on request");
    }

    match discovered {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "Discovery stopped");
            Err(format!("discovery failed: {}", short_error_message(&e)).into())
        }
    }
}

fn print_summary(summary: &CloneSummary, csv_file: &std::path::Path, is_tty: bool) {
    if is_tty {
        println!();
        println!(
            "{} cloned, {} skipped, {} failed",
            style(summary.cloned).green(),
            style(summary.skipped).yellow(),
            if summary.has_failures() {
                style(summary.failed).red()
            } else {
                style(summary.failed)
            }
        );
        for (repo, error) in &summary.failures {
            println!("  {} {}: {}", style("✗").red(), repo, error);
        }
        println!("Log: {}", csv_file.display());
    } else {
        for (repo, error) in &summary.failures {
            tracing::warn!(repo = %repo, error = %error, "Clone failed");
        }
        tracing::info!(
            cloned = summary.cloned,
            skipped = summary.skipped,
            failed = summary.failed,
            log = %csv_file.display(),
            "Clone run finished"
        );
    }
    println!("Failures: {}", summary.failed);
}
