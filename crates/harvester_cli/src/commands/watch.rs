use std::sync::Arc;
use std::time::Duration;

use console::{Term, style};
use harvester::watch::{WatchReport, WatchSession};
use harvester::{FilterCriteria, LogSink};

use super::shared::{build_client, criteria_from, require_positive};
use crate::WatchArgs;
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::shutdown_flag;

/// Watch-only predicates layered over the search filters.
fn watch_criteria(args: &WatchArgs) -> FilterCriteria {
    let mut criteria = criteria_from(&args.filters);
    criteria.specific = args.specific.clone();
    criteria.names = args
        .names
        .iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    criteria.topics.extend(
        args.tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
    );
    criteria.has_issues = args.has_issues;
    criteria
}

pub(crate) async fn handle_watch(
    args: WatchArgs,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let max_in_flight = require_positive(
        "max_in_flight",
        args.max_in_flight.unwrap_or(config.watch.max_in_flight),
    )?;
    let duration = Duration::from_secs(args.minutes * 60);
    let criteria = watch_criteria(&args);
    let client_config = config.client_config(args.token);
    client_config.validate()?;

    let log_file = args
        .log_file
        .unwrap_or_else(|| config.watch.log_file.clone());
    let sink = Arc::new(LogSink::open(&log_file).await?);

    let reporter = Arc::new(ProgressReporter::new());
    let on_progress = reporter.as_callback();
    let client = build_client(client_config, &on_progress)?;

    let session = WatchSession::new(client, criteria, duration, Arc::clone(&sink))
        .with_display(args.display_active)
        .with_max_in_flight(max_in_flight)
        .with_shutdown_flag(shutdown_flag())
        .with_progress(on_progress);

    let report = match session.run().await {
        Ok(report) => report,
        Err(e) => {
            reporter.finish();
            // The session never started, so the sink is still open.
            sink.close().await?;
            return Err(format!("cannot resolve watched repositories: {e}").into());
        }
    };
    reporter.finish();

    print_report(&report, &log_file, Term::stdout().is_term());
    Ok(())
}

fn print_report(report: &WatchReport, log_file: &std::path::Path, is_tty: bool) {
    if is_tty {
        println!();
        println!(
            "Watched {} repositories for {}s: {} polls, {} changes, {} failed polls",
            report.resources.len(),
            report.elapsed.as_secs(),
            report.polls(),
            style(report.changes()).green(),
            report.failures()
        );
        for resource in report.resources.iter().filter(|r| r.changes > 0) {
            println!(
                "  {} {} ({} changes)",
                style("●").green(),
                resource.full_name,
                resource.changes
            );
        }
        println!("Log: {}", log_file.display());
    } else {
        tracing::info!(
            session = %report.session_id,
            resources = report.resources.len(),
            polls = report.polls(),
            changes = report.changes(),
            failed = report.failures(),
            log = %log_file.display(),
            "Watch session finished"
        );
    }
    println!("Failures: {}", report.failures());
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::{Cli, Commands};

    fn parse(args: &[&str]) -> WatchArgs {
        let mut argv = vec!["harvester", "watch", "--minutes", "2"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Watch(args) => args,
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_tags_join_topics_and_names_are_trimmed() {
        let args = parse(&[
            "--topic",
            "cli",
            "--tags",
            "rust, async,",
            "--names",
            " octo/a ,b",
            "--has-issues",
            "--specific",
            "octo/c",
        ]);

        let criteria = watch_criteria(&args);

        assert_eq!(
            criteria.topics.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["async", "cli", "rust"]
        );
        assert_eq!(criteria.names, vec!["octo/a", "b"]);
        assert_eq!(criteria.specific.as_deref(), Some("octo/c"));
        assert!(criteria.has_issues);
        assert_eq!(criteria.direct_targets(), vec!["octo/c", "octo/a"]);
    }

    #[tokio::test]
    async fn test_zero_in_flight_fails_before_opening_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("changes.csv");
        let log_arg = log.to_string_lossy().into_owned();
        let args = parse(&["--max-in-flight", "0", "--log-file", &log_arg]);

        let result = handle_watch(args, &Config::default()).await;

        assert!(result.is_err());
        assert!(!log.exists());
    }
}
