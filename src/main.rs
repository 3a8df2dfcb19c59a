//! roomdeck - a room dashboard for Home Assistant in the terminal

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use roomdeck::cli::{Cli, Command};
use roomdeck::commands::{self, control::Action};
use roomdeck::config::RuntimeContext;

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(io::stderr(), "Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = RuntimeContext::new(&cli.global)?;
    ctx.init_logging()?;

    log::debug!("Config loaded from: {:?}", ctx.config_path());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_command(&ctx, cli.command))
}

async fn run_command(ctx: &RuntimeContext, command: Command) -> Result<()> {
    match command {
        Command::Rooms(args) => commands::rooms::run(ctx, args).await,
        Command::Room { name, all } => commands::rooms::show(ctx, &name, all).await,
        Command::Watch { room } => commands::watch::run(ctx, room).await,
        Command::Toggle { target } => commands::control::run(ctx, Action::Toggle, &target).await,
        Command::On { target } => commands::control::run(ctx, Action::On, &target).await,
        Command::Off { target } => commands::control::run(ctx, Action::Off, &target).await,
        Command::Dim { target, value } => commands::control::dim(ctx, &target, &value).await,
        Command::Order { command } => commands::order::run(ctx, command).await,
        Command::Hide(args) => commands::order::visibility(ctx, args, true).await,
        Command::Unhide(args) => commands::order::visibility(ctx, args, false).await,
        Command::Setup { skip_check } => commands::setup::run(ctx, skip_check).await,
        Command::Domains { command } => commands::domains::run(ctx, command),
        Command::Config { command } => commands::config::run(ctx, command),
        Command::Completions { shell } => commands::completions::run(shell),
    }
}
