/*
 *  basemap.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Static map underlay, marker pins and dimming overlay for radar panels
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
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tiny_skia::{
    Color, FillRule, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint, PremultipliedColorU8, Rect,
    Stroke, Transform,
};

use crate::projection::GeoPoint;
use crate::tilegrid::Viewport;
use crate::tiles::{decode_png, ImageSource, TileError};

/// Google refuses static maps larger than this on either side.
const GOOGLE_MAX_SIDE: u32 = 640;

/// Panel background when there is no base map (or it failed).
pub fn background() -> Color {
    Color::from_rgba8(128, 128, 128, 255)
}

#[derive(Debug, Clone, PartialEq)]
pub enum BaseMapProvider {
    Mapbox { style: String, token: String },
    Google { key: String, maptype: String },
    None,
}

impl BaseMapProvider {
    pub fn url(&self, viewport: &Viewport) -> Option<String> {
        let c = viewport.center();
        match self {
            // Mapbox serves 512px tiles, so its zoom is one less
            BaseMapProvider::Mapbox { style, token } => Some(format!(
                "https://api.mapbox.com/styles/v1/{}/static/{},{},{},0,0/{}x{}?access_token={}",
                style,
                c.lng,
                c.lat,
                viewport.zoom().saturating_sub(1),
                viewport.width_px(),
                viewport.height_px(),
                token
            )),
            BaseMapProvider::Google { key, maptype } => {
                let (mut w, mut h, mut zoom) = (viewport.width_px(), viewport.height_px(), viewport.zoom());
                if w > GOOGLE_MAX_SIDE || h > GOOGLE_MAX_SIDE {
                    w /= 2;
                    h /= 2;
                    zoom = zoom.saturating_sub(1);
                }
                let mut params = Vec::new();
                if !key.is_empty() {
                    params.push(format!("key={}", key));
                }
                params.push(format!("center={},{}", c.lat, c.lng));
                params.push(format!("zoom={}", zoom));
                params.push(format!("size={}x{}", w, h));
                params.push(format!("maptype={}", maptype));
                params.push("format=png".to_string());
                Some(format!("https://maps.googleapis.com/maps/api/staticmap?{}", params.join("&")))
            }
            BaseMapProvider::None => None,
        }
    }
}

/// Fetch and decode the static map, scaled to fit the panel.
pub async fn fetch_base<S: ImageSource>(source: &S, url: &str, viewport: &Viewport) -> Result<Pixmap, TileError> {
    info!("fetching base map for {}", viewport.center());
    let bytes = source.fetch(url).await?;
    let image = decode_png(&bytes)?;
    fit_to_viewport(&image, viewport).ok_or(TileError::Size { width: image.width(), height: image.height() })
}

/// Scale keeping aspect ratio, centred on a grey panel.
pub fn fit_to_viewport(image: &Pixmap, viewport: &Viewport) -> Option<Pixmap> {
    let (w, h) = (viewport.width_px(), viewport.height_px());
    let mut out = Pixmap::new(w, h)?;
    out.fill(background());
    if image.width() == 0 || image.height() == 0 {
        return Some(out);
    }
    if image.width() == w && image.height() == h {
        out.draw_pixmap(0, 0, image.as_ref(), &PixmapPaint::default(), Transform::identity(), None);
        return Some(out);
    }

    let scale = (w as f32 / image.width() as f32).min(h as f32 / image.height() as f32);
    let dx = (w as f32 - image.width() as f32 * scale) / 2.0;
    let dy = (h as f32 - image.height() as f32 * scale) / 2.0;
    debug!("scaling base map {}x{} by {:.3}", image.width(), image.height(), scale);
    let paint = PixmapPaint { quality: FilterQuality::Bicubic, ..PixmapPaint::default() };
    out.draw_pixmap(0, 0, image.as_ref(), &paint, Transform::from_scale(scale, scale).post_translate(dx, dy), None);
    Some(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerSize {
    #[default]
    Large,
    Mid,
    Small,
    Tiny,
}

impl MarkerSize {
    /// Pin height in pixels.
    pub fn height(&self) -> f32 {
        match self {
            MarkerSize::Large => 80.0,
            MarkerSize::Mid => 70.0,
            MarkerSize::Small => 64.0,
            MarkerSize::Tiny => 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub location: GeoPoint,
    pub color: Color,
    pub size: MarkerSize,
    /// Custom pin, tinted by `color`. None draws the teardrop.
    pub image: Option<Pixmap>,
}

/// Named colour, `#rrggbb` or `#rrggbbaa`.
pub fn parse_color(s: &str) -> Option<Color> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return match hex.len() {
            6 => Some(Color::from_rgba8(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Some(Color::from_rgba8(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        };
    }
    let (r, g, b) = match s.to_lowercase().as_str() {
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        "white" => (255, 255, 255),
        "black" => (0, 0, 0),
        "grey" | "gray" => (128, 128, 128),
        _ => return None,
    };
    Some(Color::from_rgba8(r, g, b, 255))
}

/// Pins and optional dim wash drawn above the radar. Markers off the
/// panel are skipped.
pub fn build_overlay(viewport: &Viewport, markers: &[Marker], dim: Option<Color>) -> Option<Pixmap> {
    let mut overlay = Pixmap::new(viewport.width_px(), viewport.height_px())?;
    if let Some(dim) = dim {
        overlay.fill(dim);
    }
    for marker in markers {
        let (x, y) = match viewport.point_to_viewport(marker.location) {
            Ok(p) => p,
            Err(e) => {
                warn!("marker at {} skipped: {}", marker.location, e);
                continue;
            }
        };
        if x < 0.0 || y < 0.0 || x >= viewport.width_px() as f64 || y >= viewport.height_px() as f64 {
            debug!("marker at {} is off the panel", marker.location);
            continue;
        }
        match &marker.image {
            Some(image) => draw_image_pin(&mut overlay, x as f32, y as f32, marker, image),
            None => draw_pin(&mut overlay, x as f32, y as f32, marker),
        }
    }
    Some(overlay)
}

/// Teardrop pin whose tip sits on the location.
fn draw_pin(target: &mut Pixmap, x: f32, y: f32, marker: &Marker) {
    let h = marker.size.height() / 2.0;
    let r = h / 3.0;
    let cy = y - h + r;

    let mut pb = PathBuilder::new();
    pb.move_to(x, y);
    pb.line_to(x - r * 0.8, cy + r * 0.6);
    pb.quad_to(x - r * 1.4, cy - r * 0.2, x - r * 0.7, cy - r * 0.9);
    pb.quad_to(x, cy - r * 1.5, x + r * 0.7, cy - r * 0.9);
    pb.quad_to(x + r * 1.4, cy - r * 0.2, x + r * 0.8, cy + r * 0.6);
    pb.close();
    let Some(pin) = pb.finish() else { return };

    let mut paint = Paint::default();
    paint.anti_alias = true;
    paint.set_color(marker.color);
    target.fill_path(&pin, &paint, FillRule::Winding, Transform::identity(), None);

    paint.set_color(Color::from_rgba8(32, 32, 32, 255));
    let stroke = Stroke { width: 1.0, ..Stroke::default() };
    target.stroke_path(&pin, &paint, &stroke, Transform::identity(), None);

    if let Some(dot) = Rect::from_xywh(x - r * 0.25, cy - r * 0.25, r * 0.5, r * 0.5)
        .and_then(|rect| PathBuilder::from_circle(rect.x() + rect.width() / 2.0, rect.y() + rect.height() / 2.0, rect.width() / 2.0))
    {
        target.fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

/// Custom pin scaled to the marker height, bottom centre on the location.
fn draw_image_pin(target: &mut Pixmap, x: f32, y: f32, marker: &Marker, image: &Pixmap) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    let h = marker.size.height() / 2.0;
    let scale = h / image.height() as f32;
    let w = image.width() as f32 * scale;
    let tinted = tint(image, marker.color);
    let paint = PixmapPaint { quality: FilterQuality::Bicubic, ..PixmapPaint::default() };
    let transform = Transform::from_scale(scale, scale).post_translate(x - w / 2.0, y - h);
    target.draw_pixmap(0, 0, tinted.as_ref(), &paint, transform, None);
}

/// Multiply every pixel by `color`; a white image comes out in the marker colour.
fn tint(image: &Pixmap, color: Color) -> Pixmap {
    let c = color.to_color_u8();
    let scale = |v: u8, by: u8| (v as u16 * by as u16 / 255) as u8;
    let mut out = image.clone();
    for px in out.pixels_mut() {
        let tinted = PremultipliedColorU8::from_rgba(
            scale(px.red(), c.red()),
            scale(px.green(), c.green()),
            scale(px.blue(), c.blue()),
            px.alpha(),
        );
        if let Some(tinted) = tinted {
            *px = tinted;
        }
    }
    out
}
