use std::process::ExitCode;

use anyhow::Result;
use console::style;

use yapcli::args::Args;
use yapcli::config::{Context, LayoutRoots, ResolverInputs, Setting};
use yapcli::exit_code::{self, Termination};

#[tokio::main]
async fn main() -> ExitCode {
    let args = yapcli::args::parse();
    match run(args).await {
        Ok(termination) => termination.into(),
        Err(err) => {
            // No-op if startup failed before logging was set up, the message still goes to stderr
            log::error!("{err:#}");
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code::for_error(&err))
        }
    }
}

async fn run(args: Args) -> Result<Termination> {
    let roots = LayoutRoots::detect()?;
    let inputs = ResolverInputs::from_process(args.config_overrides(), &roots);
    let context = Context::resolve(&inputs, roots);
    yapcli::logging::init(
        context.layout().ok().map(|layout| layout.log_dir.as_path()),
        args.command.name(),
        context.config.get_non_empty(Setting::LogLevel),
    );
    for warning in context.config.warnings() {
        log::warn!("{warning}");
    }
    log::debug!(
        "Resolved configuration: {}",
        context
            .config
            .iter()
            .map(|(setting, resolved)| format!("{setting} from {}", resolved.source))
            .collect::<Vec<_>>()
            .join(", ")
    );
    yapcli::cli::main(args, context).await
}
