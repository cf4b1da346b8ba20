use islet_host_val::{Fixture, Verdict};

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli
{
    /// Scenario fixtures (JSON) to run against the scripted monitor
    #[arg(required = true)]
    fixtures: Vec<PathBuf>,

    /// Logs every RMI call (same as RUST_LOG=trace)
    #[arg(short, long)]
    verbose: bool,

    /// Treats skipped scenarios as failures
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>>
{
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Trace);
    }
    builder.init();

    let mut failed = 0;
    for path in &cli.fixtures {
        let fixture = Fixture::load(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        let (report, _) = fixture.run();
        println!("{}", report);

        match report.verdict {
            Verdict::Pass => {}
            Verdict::Skip if !cli.strict => {}
            _ => failed += 1,
        }
    }

    println!("{} of {} scenario(s) failed", failed, cli.fixtures.len());
    Ok(match failed {
        0 => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
