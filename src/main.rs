//! xcollect - X timeline collector CLI
//!
//! Main entry point for the xcollect command-line tool.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::process::ExitCode;
use std::time::Duration;

use xcollect::logging::{OperationGuard, init_cli_logging};
use xcollect::parser::clean_username;
use xcollect::pipeline;
use xcollect::*;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_cli_logging(cli.quiet, cli.verbose);

    let result = match &cli.command {
        Commands::Collect(args) => cmd_fetch(&cli, args, RunMode::Full).await,
        Commands::Pages(args) => cmd_fetch(&cli, args, RunMode::PagesOnly).await,
        Commands::Backfill(args) => cmd_backfill(&cli, args).await,
        Commands::Process(args) => cmd_process(&cli, args),
        Commands::Config(args) => cmd_config(&cli, args),
        Commands::Completions(args) => {
            cmd_completions(args);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn report_error(err: &anyhow::Error) {
    let (explanation, suggestions): (String, Vec<&str>) = match err.downcast_ref::<CollectError>() {
        Some(e) => (
            if e.is_resumable() {
                "Pages fetched before the failure were kept in the raw file.".to_string()
            } else {
                String::new()
            },
            e.suggestion().into_iter().collect(),
        ),
        None => (
            err.chain()
                .skip(1)
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(": "),
            Vec::new(),
        ),
    };
    eprintln!(
        "{}",
        format_error(&err.to_string(), &explanation, &suggestions)
    );
}

/// Config from file and environment, with CLI flags on top.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir = Some(dir.clone());
    }
    Ok(config)
}

fn spinner(cli: &Cli, message: String) -> ProgressBar {
    if cli.quiet || cli.format == OutputFormat::Json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn finish(
    cli: &Cli,
    guard: OperationGuard,
    pb: &ProgressBar,
    result: xcollect::Result<RunOutcome>,
) -> Result<()> {
    pb.finish_and_clear();
    match result {
        Ok(outcome) => {
            guard.complete();
            print_outcome(cli, &outcome)
        }
        Err(e) => {
            guard.fail(&e);
            Err(e.into())
        }
    }
}

async fn cmd_fetch(cli: &Cli, args: &UserArgs, mode: RunMode) -> Result<()> {
    let mut config = load_config(cli)?;
    if args.max_pages.is_some() {
        config.fetch.max_pages = args.max_pages;
    }
    let api_key = config.require_api_key()?.to_string();
    let client = RapidApiClient::new(&config.provider, &api_key)?;
    let ctx = RunContext::new(config);

    let handle = clean_username(&args.username);
    let pb = spinner(cli, format!("Collecting @{handle} ({mode})"));
    let guard = OperationGuard::new(format!("{mode} @{handle}"));
    let result = match mode {
        RunMode::PagesOnly => pipeline::run_pages_only(&ctx, &client, &args.username).await,
        _ => pipeline::run_full(&ctx, &client, &args.username).await,
    };
    finish(cli, guard, &pb, result)
}

async fn cmd_backfill(cli: &Cli, args: &RawFileArgs) -> Result<()> {
    let config = load_config(cli)?;
    let api_key = config.require_api_key()?.to_string();
    let client = RapidApiClient::new(&config.provider, &api_key)?;
    let ctx = RunContext::new(config);

    let pb = spinner(cli, format!("Backfilling {}", args.raw_file.display()));
    let guard = OperationGuard::new(format!("backfill {}", args.raw_file.display()));
    let result = pipeline::run_backfill_only(&ctx, &client, &args.raw_file).await;
    finish(cli, guard, &pb, result)
}

fn cmd_process(cli: &Cli, args: &RawFileArgs) -> Result<()> {
    let ctx = RunContext::new(load_config(cli)?);
    let pb = spinner(cli, format!("Processing {}", args.raw_file.display()));
    let guard = OperationGuard::new(format!("process {}", args.raw_file.display()));
    let result = pipeline::run_process_only(&ctx, &args.raw_file);
    finish(cli, guard, &pb, result)
}

fn print_outcome(cli: &Cli, outcome: &RunOutcome) -> Result<()> {
    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    println!(
        "{} @{} ({})",
        "✓".green().bold(),
        outcome.username.bold(),
        outcome.mode
    );
    println!("  Raw file:        {}", outcome.raw_file.display());
    if let Some(rich) = &outcome.rich_file {
        println!("  Rich output:     {}", rich.display());
    }
    if let Some(reduced) = &outcome.reduced_file {
        println!("  Reduced output:  {}", reduced.display());
    }

    let mut pages = format_number_usize(outcome.pages_fetched);
    if let Some(reason) = outcome.stop_reason {
        pages = format!("{pages} (stopped: {reason})");
    }
    println!("  Pages:           {pages}");

    let Some(summary) = &outcome.summary else {
        return Ok(());
    };
    if summary.malformed_pages > 0 {
        println!(
            "  {} {} malformed page(s) skipped",
            "!".yellow(),
            summary.malformed_pages
        );
    }
    println!(
        "  Tweets:          {} ({} from pages, {} backfilled)",
        format_number_usize(summary.total_tweets).cyan(),
        format_number_usize(summary.tweets_from_pagination),
        format_number_usize(summary.backfilled)
    );
    println!(
        "  Breakdown:       {} originals, {} replies, {} quotes",
        format_number_usize(summary.tweet_breakdown.originals),
        format_number_usize(summary.tweet_breakdown.replies),
        format_number_usize(summary.tweet_breakdown.quotes)
    );
    println!(
        "  Threads:         {}",
        format_number_usize(summary.thread_count).cyan()
    );
    println!(
        "  Missing refs:    {} found, {} unresolved",
        format_number_usize(summary.missing_ids),
        format_number_usize(summary.unresolved_ids.len())
    );
    if summary.skipped_batches > 0 {
        println!(
            "  {} {} lookup batch(es) skipped ({} ids)",
            "!".yellow(),
            summary.skipped_batches,
            summary.skipped_ids
        );
    }
    if summary.orphan_reply_count > 0 {
        println!(
            "  Orphan replies:  {}",
            format_number_usize(summary.orphan_reply_count).yellow()
        );
    }
    println!(
        "  Likes / views:   {} / {}",
        format_number_u64(summary.engagement_totals.like_count_total),
        format_number_u64(summary.engagement_totals.view_count_total)
    );
    Ok(())
}

fn cmd_config(cli: &Cli, args: &ConfigArgs) -> Result<()> {
    if args.path {
        match Config::user_config_path() {
            Some(path) => println!("{}", path.display()),
            None => println!("(no configuration directory on this platform)"),
        }
        return Ok(());
    }
    if args.default {
        print!("{}", Config::default_config_content());
        return Ok(());
    }

    let config = load_config(cli)?;
    let output_dir = config.output_dir();
    let shown = config.redacted();
    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
    } else {
        println!("{}", "Effective Configuration".bold().cyan());
        println!("  Output directory: {}", output_dir.display());
        println!();
        print!(
            "{}",
            toml::to_string_pretty(&shown).context("Failed to render configuration")?
        );
    }
    Ok(())
}

fn cmd_completions(args: &CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "xcollect", &mut io::stdout());
}
