//! Check command - type check the project once or in watch mode.

use std::path::PathBuf;

use clap::Args;
use kiln_check::{CheckError, CheckSummary, CheckerOptions, CheckerTool};
use kiln_source::path::normalize;

#[derive(Args)]
pub struct CheckArgs {
    /// Program entry point, relative to the project root
    #[arg(default_value = "src/index.ts")]
    pub entry: PathBuf,

    /// Project root directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// tsconfig.json path (defaults to <root>/tsconfig.json)
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Glob pattern(s) for component sources
    #[arg(long = "components", default_value = "src/**/*.vue")]
    pub component_globs: Vec<String>,

    /// Watch the source tree and recheck on changes
    #[arg(short, long)]
    pub watch: bool,

    /// Quiet mode - only show the summary
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn run(args: CheckArgs) {
    // One task for everything: watch callbacks, the debounce timer, and
    // check passes interleave as turns, never in parallel.
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("\x1b[31mError:\x1b[0m failed to start runtime: {error}");
            std::process::exit(1);
        }
    };

    if let Err(error) = runtime.block_on(run_check(args)) {
        eprintln!("\x1b[31mError:\x1b[0m {error}");
        std::process::exit(1);
    }
}

async fn run_check(args: CheckArgs) -> Result<(), CheckError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let project_root = if args.root.is_absolute() {
        normalize(&args.root)
    } else {
        normalize(&cwd.join(&args.root))
    };

    let mut checker = CheckerTool::setup(CheckerOptions {
        project_root,
        entry: args.entry.clone(),
        config_path: args.project.clone(),
        exotic_globs: args.component_globs.clone(),
    })
    .await?;

    checker.on_errors_found(|count| {
        if count == 1 {
            eprintln!("\x1b[33mYou have one check error!\x1b[0m");
        } else {
            eprintln!("\x1b[33mYou have {count} check errors!\x1b[0m");
        }
    });

    let summary = checker.type_check()?;
    if args.quiet {
        report_quiet(&summary);
    } else {
        checker.report(&summary);
    }

    if args.watch {
        let mut globs = vec!["src/**/*.ts".to_string(), "src/**/*.tsx".to_string()];
        globs.extend(args.component_globs.iter().cloned());
        checker.watch(&globs).await?;
        return Ok(());
    }

    if summary.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn report_quiet(summary: &CheckSummary) {
    let status = if summary.has_errors() { "\x1b[31m✗\x1b[0m" } else { "\x1b[32m✓\x1b[0m" };
    println!(
        "{} Type checked {} files in {:.2?}: {} error(s)",
        status, summary.checked_file_count, summary.duration, summary.error_count
    );
}
