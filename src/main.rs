use clap::Parser;
use console::{Term, style};
use log::{info, warn};
use media_segmenter::cli::{self, Cli};
use media_segmenter::config::Config;
use media_segmenter::context::RunContext;
use media_segmenter::init;
use media_segmenter::menu::show_main_menu;
use media_segmenter::signal::setup_shutdown_signal;
use rust_i18n::t;
use std::process::ExitCode;

#[macro_use]
extern crate rust_i18n;

i18n!("locales", fallback = "en-US");

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_path(&Config::resolve_path(cli.config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {e}", style(t!("common.error_prefix")).red().bold());
            return ExitCode::from(e.exit_code());
        }
    };
    rust_i18n::set_locale(config.settings.language.as_str());

    let shutdown_signal = match setup_shutdown_signal() {
        Ok(signal) => signal,
        Err(e) => {
            eprintln!("{} {e}", style(t!("common.error_prefix")).red().bold());
            return ExitCode::from(e.exit_code());
        }
    };
    let ctx = RunContext::new(shutdown_signal);

    match cli.command {
        Some(command) => ExitCode::from(cli::dispatch(command, config.settings, &ctx)),
        None => run_menu(config, &ctx),
    }
}

fn run_menu(mut config: Config, ctx: &RunContext) -> ExitCode {
    init::init(None);
    let term = Term::stdout();

    loop {
        match show_main_menu(&term, ctx, &mut config) {
            Ok(true) => {}
            Ok(false) => {
                let _ = term.clear_screen();
                println!("\n{}", style(t!("main_menu.goodbye")).green().bold());
                info!("Program exited normally");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                warn!("Program error: {e}");
                eprintln!("{} {e}", style(t!("common.error_prefix")).red().bold());
                return ExitCode::FAILURE;
            }
        }
    }
}
