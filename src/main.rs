mod cli;
mod commands;
mod config;
mod engine;
mod launcher;
mod resource;
mod runner;
mod settings;
mod state;
mod ui;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use log::LevelFilter;
use settings::Settings;

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(log_level(cli.log_level, cli.verbose, cli.quiet))
        .format_timestamp(None)
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let settings = Settings::from_args(&cli.boot)?;
    settings.validate()?;
    log::debug!("{settings:#?}");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => commands::boot::run(&settings, true),
        Command::Reconcile => commands::boot::run(&settings, false),
        Command::Plan(args) => commands::plan::run(&settings, args.json),
    }
}

/// `base` raised one step per `-v`; `-q` wins and keeps only errors
fn log_level(base: LevelFilter, verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    let index = (base as usize + usize::from(verbose)).min(LevelFilter::max() as usize);
    LevelFilter::iter().nth(index).unwrap_or(LevelFilter::Trace)
}
