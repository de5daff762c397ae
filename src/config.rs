use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

use crate::basemap::{parse_color, BaseMapProvider, Marker, MarkerSize};
use crate::compositor::DEFAULT_ATTRIBUTION;
use crate::frame_cache::DEFAULT_SPAN_SLOTS;
use crate::pacer::start_jitter;
use crate::playback::DEFAULT_DWELL_TICKS;
use crate::projection::{GeoPoint, ProjectionError, MAX_ZOOM};
use crate::radar::PanelSettings;
use crate::tilegrid::Viewport;
use crate::tiles::{decode_png, TileUrl, DEFAULT_TILE_BASE};

pub const DEFAULT_REFRESH_MINS: u64 = 10;
pub const DEFAULT_TICK_MS: u64 = 200;
pub const DEFAULT_MAX_LAYER_FETCHES: usize = 2;
pub const DEFAULT_TILE_TIMEOUT_MS: u64 = 5000;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Panel '{0}': {1}")]
    Projection(String, ProjectionError),
}

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub radar: Option<RadarConfig>,
    pub basemap: Option<BaseMapConfig>,
    pub panels: Option<Vec<PanelConfig>>,
}

/// Settings shared by every panel.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RadarConfig {
    pub refresh_mins: Option<u64>,
    pub span_slots: Option<u32>,
    pub tick_ms: Option<u64>,
    pub dwell_ticks: Option<u32>,
    pub max_layer_fetches: Option<usize>,
    pub tile_base_url: Option<String>,
    pub tile_timeout_ms: Option<u64>,
    pub attribution: Option<String>,
    pub dim_color: Option<String>,  // e.g. "#00000060" darkens bedside panels
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BaseMapConfig {
    pub provider: Option<BaseMapKind>,
    pub style: Option<String>,      // mapbox style id
    pub maptype: Option<String>,    // google map type
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseMapKind {
    Mapbox,
    Google,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub center: GeoPoint,
    pub zoom: u8,
    pub color: Option<u8>,
    pub smooth: Option<u8>,
    pub snow: Option<u8>,
    pub legacy_color: Option<bool>,
    pub markers: Option<Vec<MarkerConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    pub location: GeoPoint,
    pub color: Option<String>,
    pub size: Option<MarkerSize>,
    pub visible: Option<bool>,
    pub image: Option<PathBuf>,     // PNG pin, tinted by `color`
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "lyradar", version, about = "LyRadar animated radar panels", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, short = 'c', value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Enable debug log level
    #[arg(long, short = 'v', alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub refresh_mins: Option<u64>,
    #[arg(long)]
    pub span_slots: Option<u32>,
    #[arg(long)]
    pub tick_ms: Option<u64>,
    /// Where the panel PNGs are written
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,
    /// Centre latitude for a single panel (replaces the first configured one)
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub lng: Option<f64>,
    #[arg(long)]
    pub zoom: Option<u8>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = load_with(&cli)?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }
    Ok(cfg)
}

pub fn load_with(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;
    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/lyradar/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/lyradar/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/lyradar.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["lyradar.yaml", "config.yaml", "config/lyradar.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

pub fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    let cfg: Config = serde_yaml::from_str(s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    // top-level
    if src.log_level.is_some()      { dst.log_level = src.log_level; }
    if src.panels.is_some()         { dst.panels = src.panels; }
    // radar
    match (&mut dst.radar, src.radar) {
        (None, Some(r)) => dst.radar = Some(r),
        (Some(d), Some(s)) => merge_radar(d, s),
        _ => {}
    }
    match (&mut dst.basemap, src.basemap) {
        (None, Some(b)) => dst.basemap = Some(b),
        (Some(d), Some(s)) => merge_basemap(d, s),
        _ => {}
    }
}

fn merge_radar(dst: &mut RadarConfig, src: RadarConfig) {
    if src.refresh_mins.is_some()      { dst.refresh_mins = src.refresh_mins; }
    if src.span_slots.is_some()        { dst.span_slots = src.span_slots; }
    if src.tick_ms.is_some()           { dst.tick_ms = src.tick_ms; }
    if src.dwell_ticks.is_some()       { dst.dwell_ticks = src.dwell_ticks; }
    if src.max_layer_fetches.is_some() { dst.max_layer_fetches = src.max_layer_fetches; }
    if src.tile_base_url.is_some()     { dst.tile_base_url = src.tile_base_url; }
    if src.tile_timeout_ms.is_some()   { dst.tile_timeout_ms = src.tile_timeout_ms; }
    if src.attribution.is_some()       { dst.attribution = src.attribution; }
    if src.dim_color.is_some()         { dst.dim_color = src.dim_color; }
    if src.output_dir.is_some()        { dst.output_dir = src.output_dir; }
}

fn merge_basemap(dst: &mut BaseMapConfig, src: BaseMapConfig) {
    if src.provider.is_some() { dst.provider = src.provider; }
    if src.style.is_some()    { dst.style = src.style; }
    if src.maptype.is_some()  { dst.maptype = src.maptype; }
    if src.api_key.is_some()  { dst.api_key = src.api_key; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()       { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                     { cfg.log_level = Some("debug".to_string()); }

    let any_radar = cli.refresh_mins.is_some()
        || cli.span_slots.is_some()
        || cli.tick_ms.is_some()
        || cli.output_dir.is_some();
    if any_radar && cfg.radar.is_none() {
        cfg.radar = Some(RadarConfig::default());
    }
    if let Some(radar) = cfg.radar.as_mut() {
        if cli.refresh_mins.is_some() { radar.refresh_mins = cli.refresh_mins; }
        if cli.span_slots.is_some()   { radar.span_slots = cli.span_slots; }
        if cli.tick_ms.is_some()      { radar.tick_ms = cli.tick_ms; }
        if cli.output_dir.is_some()   { radar.output_dir = cli.output_dir.clone(); }
    }

    // a centre on the command line describes a single panel
    if let (Some(lat), Some(lng)) = (cli.lat, cli.lng) {
        let panels = cfg.panels.get_or_insert_with(Vec::new);
        if panels.is_empty() {
            panels.push(PanelConfig {
                name: Some("radar1".to_string()),
                width: 640,
                height: 480,
                center: GeoPoint::new(lat, lng),
                zoom: 7,
                color: None,
                smooth: None,
                snow: None,
                legacy_color: None,
                markers: Some(vec![MarkerConfig {
                    location: GeoPoint::new(lat, lng),
                    color: Some("red".to_string()),
                    size: Some(MarkerSize::Small),
                    visible: None,
                    image: None,
                }]),
            });
        } else {
            panels[0].center = GeoPoint::new(lat, lng);
        }
    }
    if let Some(first) = cfg.panels.as_mut().and_then(|p| p.first_mut()) {
        if let Some(zoom) = cli.zoom     { first.zoom = zoom; }
        if let Some(width) = cli.width   { first.width = width; }
        if let Some(height) = cli.height { first.height = height; }
    }
}

/// Put any invariants here (required fields, ranges, etc.)
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let panels = cfg.panels.as_deref().unwrap_or_default();
    if panels.is_empty() {
        return Err(ConfigError::Validation("no radar panels configured (add `panels:` or pass --lat/--lng)".into()));
    }
    for (i, p) in panels.iter().enumerate() {
        let name = panel_name(p, i);
        if p.width == 0 || p.height == 0 {
            return Err(ConfigError::Validation(format!("panel '{name}' width/height must be > 0")));
        }
        if p.zoom > MAX_ZOOM {
            return Err(ConfigError::Validation(format!("panel '{name}' zoom must be 0..={MAX_ZOOM}")));
        }
        Viewport::new(p.width, p.height, p.center, p.zoom).map_err(|e| ConfigError::Projection(name.clone(), e))?;
        for m in p.markers.as_deref().unwrap_or_default() {
            if let Some(c) = m.color.as_deref() {
                if parse_color(c).is_none() {
                    return Err(ConfigError::Validation(format!("panel '{name}' marker colour '{c}' not understood")));
                }
            }
        }
    }
    if let Some(radar) = cfg.radar.as_ref() {
        if radar.refresh_mins == Some(0) {
            return Err(ConfigError::Validation("radar refresh_mins must be > 0".into()));
        }
        if radar.span_slots == Some(0) {
            return Err(ConfigError::Validation("radar span_slots must be > 0".into()));
        }
        if radar.tick_ms == Some(0) {
            return Err(ConfigError::Validation("radar tick_ms must be > 0".into()));
        }
        if radar.dwell_ticks == Some(0) {
            return Err(ConfigError::Validation("radar dwell_ticks must be > 0".into()));
        }
        if radar.max_layer_fetches == Some(0) {
            return Err(ConfigError::Validation("radar max_layer_fetches must be > 0".into()));
        }
        if let Some(c) = radar.dim_color.as_deref() {
            if parse_color(c).is_none() {
                return Err(ConfigError::Validation(format!("radar dim_color '{c}' not understood")));
            }
        }
    }
    if let Some(b) = cfg.basemap.as_ref() {
        if b.provider == Some(BaseMapKind::Mapbox) && b.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Validation("mapbox base map needs an api_key".into()));
        }
    }
    Ok(())
}

fn read_marker_image(path: &Path) -> Result<tiny_skia::Pixmap, ConfigError> {
    let bytes = fs::read(path)?;
    decode_png(&bytes).map_err(|e| ConfigError::Validation(format!("marker image {}: {}", path.display(), e)))
}

fn panel_name(p: &PanelConfig, i: usize) -> String {
    p.name.clone().unwrap_or_else(|| format!("radar{}", i + 1))
}

impl Config {
    pub fn tile_timeout(&self) -> Duration {
        let ms = self.radar.as_ref().and_then(|r| r.tile_timeout_ms).unwrap_or(DEFAULT_TILE_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.radar
            .as_ref()
            .and_then(|r| r.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn basemap_provider(&self) -> BaseMapProvider {
        let Some(b) = self.basemap.as_ref() else { return BaseMapProvider::None };
        let key = b.api_key.clone().unwrap_or_default();
        match b.provider {
            Some(BaseMapKind::Mapbox) => BaseMapProvider::Mapbox {
                style: b.style.clone().unwrap_or_else(|| "mapbox/satellite-streets-v10".to_string()),
                token: key,
            },
            Some(BaseMapKind::Google) => BaseMapProvider::Google {
                key,
                maptype: b.maptype.clone().unwrap_or_else(|| "hybrid".to_string()),
            },
            Some(BaseMapKind::None) | None => BaseMapProvider::None,
        }
    }

    /// Runtime settings for every panel, defaults filled in. Each panel gets
    /// its own start offset so their first fetches are staggered.
    pub fn panel_settings(&self) -> Result<Vec<PanelSettings>, ConfigError> {
        validate(self)?;
        let radar = self.radar.clone().unwrap_or_default();
        let dim = radar.dim_color.as_deref().and_then(parse_color);
        let basemap = self.basemap_provider();

        let mut out = Vec::new();
        for (i, p) in self.panels.as_deref().unwrap_or_default().iter().enumerate() {
            let name = panel_name(p, i);
            let viewport = Viewport::new(p.width, p.height, p.center, p.zoom)
                .map_err(|e| ConfigError::Projection(name.clone(), e))?;
            let defaults = TileUrl::default();
            let tile_url = TileUrl {
                base: radar.tile_base_url.clone().unwrap_or_else(|| DEFAULT_TILE_BASE.to_string()),
                color: p.color.unwrap_or(defaults.color),
                smooth: p.smooth.unwrap_or(defaults.smooth),
                snow: p.snow.unwrap_or(defaults.snow),
                legacy_color: p.legacy_color.unwrap_or(false),
            };
            let mut markers = Vec::new();
            for m in p.markers.as_deref().unwrap_or_default().iter().filter(|m| m.visible.unwrap_or(true)) {
                markers.push(Marker {
                    location: m.location,
                    color: m.color.as_deref().and_then(parse_color).unwrap_or(tiny_skia::Color::from_rgba8(255, 0, 0, 255)),
                    size: m.size.unwrap_or_default(),
                    image: m.image.as_deref().map(read_marker_image).transpose()?,
                });
            }

            out.push(PanelSettings {
                name,
                viewport,
                tile_url,
                basemap: basemap.clone(),
                markers,
                dim,
                attribution: radar.attribution.clone().unwrap_or_else(|| DEFAULT_ATTRIBUTION.to_string()),
                span_slots: radar.span_slots.unwrap_or(DEFAULT_SPAN_SLOTS),
                refresh: Duration::from_secs(radar.refresh_mins.unwrap_or(DEFAULT_REFRESH_MINS) * 60),
                tick: Duration::from_millis(radar.tick_ms.unwrap_or(DEFAULT_TICK_MS)),
                dwell_ticks: radar.dwell_ticks.unwrap_or(DEFAULT_DWELL_TICKS),
                max_layer_fetches: radar.max_layer_fetches.unwrap_or(DEFAULT_MAX_LAYER_FETCHES),
                first_refresh: start_jitter(3.0..10.0),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRASBOURG: &str = r##"
log_level: info
radar:
  refresh_mins: 10
  dim_color: "#00000040"
basemap:
  provider: google
  maptype: hybrid
panels:
  - name: regional
    width: 300
    height: 275
    center: { lat: 48.5734, lng: 7.7521 }
    zoom: 7
    markers:
      - location: { lat: 48.5734, lng: 7.7521 }
        color: red
        size: small
  - width: 300
    height: 275
    center: { lat: 48.5734, lng: 7.7521 }
    zoom: 11
    color: 4
    legacy_color: true
    markers:
      - location: { lat: 48.5734, lng: 7.7521 }
        visible: false
"##;

    #[test]
    fn test_parse_and_resolve_panels() {
        let cfg = parse_yaml(STRASBOURG).unwrap();
        let panels = cfg.panel_settings().unwrap();
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].name, "regional");
        assert_eq!(panels[1].name, "radar2");
        assert_eq!(panels[0].markers.len(), 1);
        assert_eq!(panels[0].markers[0].size, MarkerSize::Small);
        assert!(panels[1].markers.is_empty());
        assert!(panels[1].tile_url.legacy_color);
        assert_eq!(panels[1].tile_url.color, 4);
        assert_eq!(panels[0].refresh, Duration::from_secs(600));
        assert_eq!(panels[0].span_slots, DEFAULT_SPAN_SLOTS);
        assert_eq!(panels[0].tick, Duration::from_millis(DEFAULT_TICK_MS));
        assert!(panels[0].dim.is_some());
        assert!(matches!(panels[0].basemap, BaseMapProvider::Google { .. }));
        assert!(panels[0].first_refresh >= Duration::from_secs(3));
    }

    #[test]
    fn test_bad_latitude_rejected_at_config_time() {
        let mut cfg = parse_yaml(STRASBOURG).unwrap();
        cfg.panels.as_mut().unwrap()[0].center = GeoPoint::new(88.0, 0.0);
        match validate(&cfg) {
            Err(ConfigError::Projection(name, ProjectionError::OutOfRange(_))) => assert_eq!(name, "regional"),
            other => panic!("expected projection error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(validate(&Config::default()), Err(ConfigError::Validation(_))));

        let mut cfg = parse_yaml(STRASBOURG).unwrap();
        cfg.radar.as_mut().unwrap().span_slots = Some(0);
        assert!(validate(&cfg).is_err());

        let mut cfg = parse_yaml(STRASBOURG).unwrap();
        cfg.panels.as_mut().unwrap()[1].width = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = parse_yaml(STRASBOURG).unwrap();
        cfg.basemap = Some(BaseMapConfig { provider: Some(BaseMapKind::Mapbox), ..Default::default() });
        assert!(validate(&cfg).is_err());

        let mut cfg = parse_yaml(STRASBOURG).unwrap();
        cfg.radar.as_mut().unwrap().dim_color = Some("not-a-colour".into());
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut cfg = parse_yaml(STRASBOURG).unwrap();
        let cli = Cli::try_parse_from([
            "lyradar", "--debug", "--lat", "-33.86", "--lng", "151.2", "--zoom", "9", "--span-slots", "7",
        ])
        .unwrap();
        apply_cli_overrides(&mut cfg, &cli);
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        let first = &cfg.panels.as_ref().unwrap()[0];
        assert_eq!(first.center, GeoPoint::new(-33.86, 151.2));
        assert_eq!(first.zoom, 9);
        assert_eq!(cfg.radar.as_ref().unwrap().span_slots, Some(7));
    }

    #[test]
    fn test_cli_creates_single_panel() {
        let mut cfg = Config::default();
        let cli = Cli::try_parse_from(["lyradar", "--lat", "44.97", "--lng", "-93.24"]).unwrap();
        apply_cli_overrides(&mut cfg, &cli);
        assert!(validate(&cfg).is_ok());
        let panels = cfg.panel_settings().unwrap();
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0].viewport.width_px(), 640);
        assert_eq!(panels[0].markers.len(), 1);
        assert!(matches!(panels[0].basemap, BaseMapProvider::None));
    }

    #[test]
    fn test_marker_image_loaded_from_png() {
        let dir = std::env::temp_dir().join(format!("lyradar-marker-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pin.png");
        let mut pin = tiny_skia::Pixmap::new(12, 24).unwrap();
        pin.fill(tiny_skia::Color::WHITE);
        pin.save_png(&path).unwrap();

        let mut cfg = parse_yaml(STRASBOURG).unwrap();
        cfg.panels.as_mut().unwrap()[0].markers.as_mut().unwrap()[0].image = Some(path.clone());
        let panels = cfg.panel_settings().unwrap();
        let image = panels[0].markers[0].image.as_ref().unwrap();
        assert_eq!((image.width(), image.height()), (12, 24));

        cfg.panels.as_mut().unwrap()[0].markers.as_mut().unwrap()[0].image = Some(dir.join("missing.png"));
        assert!(matches!(cfg.panel_settings(), Err(ConfigError::Io(_))));

        fs::write(&path, b"not a png").unwrap();
        cfg.panels.as_mut().unwrap()[0].markers.as_mut().unwrap()[0].image = Some(path);
        assert!(matches!(cfg.panel_settings(), Err(ConfigError::Validation(_))));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut dst = parse_yaml(STRASBOURG).unwrap();
        let src = parse_yaml("radar:\n  tick_ms: 100\n").unwrap();
        merge(&mut dst, src);
        let radar = dst.radar.unwrap();
        assert_eq!(radar.tick_ms, Some(100));
        assert_eq!(radar.refresh_mins, Some(10));
        assert_eq!(dst.panels.unwrap().len(), 2);
    }
}
