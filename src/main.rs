/*
 *  main.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	LyRadar entry point - one animated radar panel per configured view
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use env_logger::Env;
use log::{error, info};
use std::sync::Arc;

#[cfg(unix)] // Only compile this block on Unix-like systems
use tokio::signal::unix::{signal, SignalKind};

use lyradar::config;
use lyradar::radar::RadarPanel;
use lyradar::sink::PngFileSink;
use lyradar::tiles::HttpImageSource;
use lyradar::RadarError;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Waits for SIGINT, SIGTERM or SIGHUP and logs which one arrived.
#[cfg(unix)]
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received. Initiating graceful shutdown.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // CLI + YAML, exits here on --dump-config
    let cfg = config::load()?;

    let level = cfg.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("This {} worth the Squeeze", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let source = Arc::new(HttpImageSource::new(cfg.tile_timeout()).map_err(RadarError::from)?);
    let out_dir = cfg.output_dir();

    let mut panels = Vec::new();
    for settings in cfg.panel_settings()? {
        let (w, h) = (settings.viewport.width_px(), settings.viewport.height_px());
        let sink = PngFileSink::new(&out_dir, &settings.name, w, h).map_err(RadarError::from)?;
        info!(
            "panel {} {}x{} centred {} zoom {}, first refresh in {:.1}s -> {}",
            settings.name,
            w,
            h,
            settings.viewport.center(),
            settings.viewport.zoom(),
            settings.first_refresh.as_secs_f32(),
            sink.path().display()
        );
        let panel = RadarPanel::new(settings, Arc::clone(&source), Box::new(sink))?;
        panels.push(panel.start());
    }

    if let Err(e) = signal_handler().await {
        error!("signal handling failed: {e}");
    }

    for handle in panels {
        if let Some(panel) = handle.stop().await {
            info!("panel {} stopped with {} frames", panel.name(), panel.cache().len());
        }
    }
    info!("{} done", env!("CARGO_PKG_NAME"));
    Ok(())
}
