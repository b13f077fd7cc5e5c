use clap::Parser;
use report_merge::{
    CliArgs, LoggingConfig, MergeConfig, MergeOutcome, exit_code_for, init_logging, run,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logging_config = LoggingConfig::from_env();
    let guard = init_logging(logging_config)?;

    let cli = CliArgs::parse();
    let result = merge_from_cli(cli).await;

    match result {
        Ok(outcome) => {
            println!(
                "merged {} reports: {} work directories, {} test results, {} conflicts",
                outcome.inputs.len(),
                outcome.work_dirs,
                outcome.results_written,
                outcome.conflicts.len(),
            );
            for (status, count) in &outcome.status_counts {
                println!("  {status}: {count}");
            }
            for conflict in &outcome.conflicts {
                println!("  kept {} from {}", conflict.url, conflict.winner);
            }
            Ok(())
        }
        Err(error) => {
            eprintln!("report-merge: {error:#}");
            // flush buffered logs before exiting
            drop(guard);
            std::process::exit(exit_code_for(&error));
        }
    }
}

async fn merge_from_cli(cli: CliArgs) -> anyhow::Result<MergeOutcome> {
    let config = MergeConfig::from_args(cli)?;
    // fail before touching any report
    config.validate()?;
    run(config).await
}
