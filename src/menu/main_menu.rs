use crate::config::{Config, Language, VideoQuality};
use crate::context::RunContext;
use crate::menu::handlers::{
    run_batch_file, run_frame_sampler, run_image_tiler, run_single_asset, run_verifier,
};
use anyhow::{Context, Result};
use console::{Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use rust_i18n::t;
use std::fmt::Display;

pub fn show_main_menu(term: &Term, ctx: &RunContext, config: &mut Config) -> Result<bool> {
    term.clear_screen()?;

    println!("{}", style(t!("main_menu.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let options = vec![
        t!("main_menu.opt_run"),
        t!("main_menu.opt_batch"),
        t!("main_menu.opt_sample"),
        t!("main_menu.opt_tile"),
        t!("main_menu.opt_verify"),
        t!("main_menu.opt_settings"),
        t!("main_menu.exit"),
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("main_menu.prompt"))
        .items(&options)
        .default(0)
        .interact_on_opt(term)?;

    match selection {
        Some(0) => run_single_asset(term, ctx, config)?,
        Some(1) => run_batch_file(term, ctx, config)?,
        Some(2) => run_frame_sampler(term, ctx, config)?,
        Some(3) => run_image_tiler(term, ctx, config)?,
        Some(4) => run_verifier(term, ctx, config)?,
        Some(5) => show_settings_menu(term, config)?,
        Some(6) | None => return Ok(false), // ESC 也視為離開
        _ => unreachable!(),
    }

    Ok(true)
}

/// 設定選單
fn show_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    loop {
        term.clear_screen()?;

        println!("{}", style(t!("settings.title")).cyan().bold());
        println!("{}", style(t!("common.esc_hint")).dim());

        let options = vec![
            t!("settings.opt_sampling"),
            t!("settings.opt_tiling"),
            t!("settings.opt_quality"),
            t!("settings.opt_language"),
            t!("settings.back"),
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("settings.prompt"))
            .items(&options)
            .default(0)
            .interact_on_opt(term)?;

        match selection {
            Some(0) => show_sampling_settings_menu(term, config)?,
            Some(1) => show_tiling_settings_menu(term, config)?,
            Some(2) => show_quality_menu(term, config)?,
            Some(3) => show_language_menu(term, config)?,
            Some(4) | None => break,
            _ => unreachable!(),
        }
    }

    Ok(())
}

fn print_header(term: &Term, title: &str, current: impl Display) -> Result<()> {
    term.clear_screen()?;
    println!("{}", style(title).cyan().bold());
    println!(
        "\n{} {current}",
        style(t!("settings.current")).dim()
    );
    println!();
    Ok(())
}

fn save_and_report(config: &Config, value: impl Display) -> Result<()> {
    config
        .save()
        .with_context(|| format!("無法儲存設定 {}", config.settings_path.display()))?;
    println!("\n{} {value}", style(t!("settings.saved")).green());
    std::thread::sleep(std::time::Duration::from_secs(1));
    Ok(())
}

/// 影格擷取間隔
fn show_sampling_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    let current = config.settings.sampling.interval_seconds;
    print_header(term, &t!("settings.sampling.title"), format!("{current}s"))?;

    let interval: f64 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.sampling.prompt"))
        .default(current)
        .validate_with(|value: &f64| -> Result<(), String> {
            if value.is_finite() && *value >= 0.0 {
                Ok(())
            } else {
                Err(t!("settings.invalid_value").to_string())
            }
        })
        .interact_text_on(term)?;

    if (interval - current).abs() > f64::EPSILON {
        config.settings.sampling.interval_seconds = interval;
        save_and_report(config, format!("{interval}s"))?;
    }

    Ok(())
}

/// 切圖高度與重疊
fn show_tiling_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    let current = config.settings.tiling;
    print_header(
        term,
        &t!("settings.tiling.title"),
        format!("{}px / {}px", current.tile_height, current.overlap),
    )?;

    let tile_height: u32 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.tiling.height_prompt"))
        .default(current.tile_height)
        .validate_with(|value: &u32| -> Result<(), String> {
            if *value > 0 {
                Ok(())
            } else {
                Err(t!("settings.invalid_value").to_string())
            }
        })
        .interact_text_on(term)?;

    let overlap: u32 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.tiling.overlap_prompt"))
        .default(current.overlap.min(tile_height.saturating_sub(1)))
        .validate_with(|value: &u32| -> Result<(), String> {
            if *value < tile_height {
                Ok(())
            } else {
                Err(t!("settings.invalid_value").to_string())
            }
        })
        .interact_text_on(term)?;

    if tile_height != current.tile_height || overlap != current.overlap {
        config.settings.tiling.tile_height = tile_height;
        config.settings.tiling.overlap = overlap;
        save_and_report(config, format!("{tile_height}px / {overlap}px"))?;
    }

    Ok(())
}

/// 下載畫質
fn show_quality_menu(term: &Term, config: &mut Config) -> Result<()> {
    print_header(
        term,
        &t!("settings.quality.title"),
        config.settings.download.quality,
    )?;

    let qualities = [
        VideoQuality::Uhd4k,
        VideoQuality::P1080,
        VideoQuality::P720,
        VideoQuality::P480,
        VideoQuality::P360,
    ];
    let items: Vec<String> = qualities.iter().map(ToString::to_string).collect();

    let default_index = qualities
        .iter()
        .position(|&q| q == config.settings.download.quality)
        .unwrap_or(1);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.quality.prompt"))
        .items(&items)
        .default(default_index)
        .interact_on_opt(term)?;

    let Some(selection) = selection else {
        return Ok(());
    };

    let selected = qualities[selection];
    if selected != config.settings.download.quality {
        config.settings.download.quality = selected;
        save_and_report(config, selected)?;
    }

    Ok(())
}

/// 語言設定選單
fn show_language_menu(term: &Term, config: &mut Config) -> Result<()> {
    term.clear_screen()?;

    println!("{}", style(t!("settings.language.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let languages = [Language::EnUs, Language::ZhTw];
    let items: Vec<String> = languages.iter().map(ToString::to_string).collect();

    let default_index = languages
        .iter()
        .position(|&l| l == config.settings.language)
        .unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.language.prompt"))
        .items(&items)
        .default(default_index)
        .interact_on_opt(term)?;

    let Some(selection) = selection else {
        return Ok(());
    };

    let selected_lang = languages[selection];
    if selected_lang != config.settings.language {
        config.settings.language = selected_lang;
        rust_i18n::set_locale(selected_lang.as_str());
        save_and_report(config, selected_lang)?;
    }

    Ok(())
}
