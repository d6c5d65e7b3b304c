use crate::cli::{
    self, BatchArgs, Commands, OverrideArgs, RunArgs, RunTarget, SampleArgs, TileArgs, VerifyArgs,
};
use crate::config::Config;
use crate::context::RunContext;
use crate::pause;
use anyhow::Result;
use console::{Term, style};
use dialoguer::Input;
use dialoguer::theme::ColorfulTheme;
use rust_i18n::t;
use std::path::PathBuf;

/// 讀取一行輸入；空白表示取消
fn prompt_text(term: &Term, prompt: &str) -> Result<Option<String>> {
    let value: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text_on(term)?;

    let value = value.trim().trim_matches('"').to_string();
    Ok((!value.is_empty()).then_some(value))
}

fn execute(term: &Term, command: Commands, config: &Config, ctx: &RunContext) -> Result<()> {
    let code = cli::dispatch(command, config.settings.clone(), ctx);
    if code != 0 {
        println!("{}", style(t!("common.exit_code", code = code)).dim());
    }

    pause(term)?;
    Ok(())
}

pub fn run_single_asset(term: &Term, ctx: &RunContext, config: &Config) -> Result<()> {
    let Some(input) = prompt_text(term, &t!("handlers.asset_prompt"))? else {
        return Ok(());
    };

    let target = if input.starts_with("http://") || input.starts_with("https://") {
        RunTarget {
            url: Some(input),
            file: None,
        }
    } else {
        RunTarget {
            url: None,
            file: Some(PathBuf::from(input)),
        }
    };

    let command = Commands::Run(RunArgs {
        target,
        overrides: OverrideArgs::default(),
    });
    execute(term, command, config, ctx)
}

pub fn run_batch_file(term: &Term, ctx: &RunContext, config: &Config) -> Result<()> {
    let Some(input) = prompt_text(term, &t!("handlers.batch_prompt"))? else {
        return Ok(());
    };

    let command = Commands::Batch(BatchArgs {
        input_file: PathBuf::from(input),
        overrides: OverrideArgs::default(),
    });
    execute(term, command, config, ctx)
}

pub fn run_frame_sampler(term: &Term, ctx: &RunContext, config: &Config) -> Result<()> {
    let Some(input) = prompt_text(term, &t!("handlers.video_prompt"))? else {
        return Ok(());
    };

    let command = Commands::Sample(SampleArgs {
        video: PathBuf::from(input),
        output_dir: None,
        interval: None,
        jpeg_quality: None,
    });
    execute(term, command, config, ctx)
}

pub fn run_image_tiler(term: &Term, ctx: &RunContext, config: &Config) -> Result<()> {
    let Some(input) = prompt_text(term, &t!("handlers.image_prompt"))? else {
        return Ok(());
    };

    let command = Commands::Tile(TileArgs {
        image: PathBuf::from(input),
        output_dir: None,
        tile_height: None,
        tile_width: None,
        overlap: None,
    });
    execute(term, command, config, ctx)
}

pub fn run_verifier(term: &Term, ctx: &RunContext, config: &Config) -> Result<()> {
    let Some(input) = prompt_text(term, &t!("handlers.run_dir_prompt"))? else {
        return Ok(());
    };

    let command = Commands::Verify(VerifyArgs {
        run_dir: PathBuf::from(input),
    });
    execute(term, command, config, ctx)
}
