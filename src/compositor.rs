/*
 *  compositor.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Stitches a radar layer into one viewport sized, captioned frame
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
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    text::Text,
};
use log::{debug, error};
use tiny_skia::{Pixmap, PixmapPaint, Transform};

use crate::frame::{Frame, TimeSlot};
use crate::pixbuf::PixmapTarget;
use crate::tilegrid::TileGrid;
use crate::tiles::Layer;

pub const DEFAULT_ATTRIBUTION: &str = "rainviewer.com";

/// Caption baseline origin, top-left corner of the frame.
const CAPTION_ORIGIN: Point = Point::new(3, 12);
const CAPTION_SHADOW: Rgb888 = Rgb888::new(63, 63, 63);
const CAPTION_FILL: Rgb888 = Rgb888::new(255, 255, 255);

#[derive(Debug, Clone, thiserror::Error)]
#[error("cannot allocate a {0}x{1} frame")]
pub struct FrameSizeError(pub u32, pub u32);

pub struct Compositor {
    width: u32,
    height: u32,
    attribution: String,
    blank: Pixmap,
}

impl Compositor {
    pub fn new(grid: &TileGrid, attribution: &str) -> Result<Self, FrameSizeError> {
        let (width, height) = (grid.viewport().width_px(), grid.viewport().height_px());
        let blank = Pixmap::new(width, height).ok_or(FrameSizeError(width, height))?;
        Ok(Self { width, height, attribution: attribution.to_string(), blank })
    }

    pub fn caption(&self, slot: TimeSlot) -> String {
        if self.attribution.is_empty() {
            slot.hhmm()
        } else {
            format!("{} {}", slot.hhmm(), self.attribution)
        }
    }

    /// Stitch, crop, caption. Always yields a viewport sized frame; absent
    /// cells (or a canvas that cannot be allocated) simply stay blank.
    pub fn composite(&self, grid: &TileGrid, layer: &Layer) -> Frame {
        let mut image = match self.stitch(grid, layer) {
            Some(canvas) => self.crop(grid, &canvas),
            None => {
                error!(
                    "radar canvas {}x{} unavailable, using a blank frame",
                    grid.total_width(),
                    grid.total_height()
                );
                self.blank.clone()
            }
        };
        self.draw_caption(&mut image, &self.caption(layer.slot));

        let absent_tiles = layer.absent();
        debug!("composited {} ({} absent)", layer.slot, absent_tiles);
        Frame { slot: layer.slot, image, absent_tiles }
    }

    fn stitch(&self, grid: &TileGrid, layer: &Layer) -> Option<Pixmap> {
        let mut canvas = Pixmap::new(grid.total_width(), grid.total_height())?;
        let paint = PixmapPaint::default();
        for (position, (_, tile)) in layer.tiles.iter().enumerate().take(grid.len()) {
            if let Some(tile) = tile {
                let (x, y) = grid.cell_origin(position);
                canvas.draw_pixmap(x as i32, y as i32, tile.as_ref(), &paint, Transform::identity(), None);
            }
        }
        Some(canvas)
    }

    fn crop(&self, grid: &TileGrid, canvas: &Pixmap) -> Pixmap {
        let (cx, cy) = grid.crop_offset();
        let mut out = self.blank.clone();
        out.draw_pixmap(
            -(cx as i32),
            -(cy as i32),
            canvas.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        out
    }

    /// Dark copies behind a light fill keep the text legible over any
    /// radar colour.
    fn draw_caption(&self, image: &mut Pixmap, text: &str) {
        let mut target = PixmapTarget::new(image);
        let shadow = MonoTextStyle::new(&FONT_6X10, CAPTION_SHADOW);
        let fill = MonoTextStyle::new(&FONT_6X10, CAPTION_FILL);

        let passes = [
            (Point::new(-1, -1), shadow),
            (Point::new(2, 1), shadow),
            (Point::new(0, 0), fill),
            (Point::new(1, 0), fill),
        ];
        for (offset, style) in passes {
            // drawing into a pixmap target cannot fail
            let _ = Text::new(text, CAPTION_ORIGIN + offset, style).draw(&mut target);
        }
    }

    pub fn size(&self) -> (u32, u32) { (self.width, self.height) }
}

/// Stack the panel layers for a sink: base map, radar frame, markers.
pub fn layer_view(base: Option<&Pixmap>, frame: Option<&Frame>, overlay: Option<&Pixmap>, width: u32, height: u32) -> Option<Pixmap> {
    let mut out = Pixmap::new(width, height)?;
    let paint = PixmapPaint::default();
    for layer in [base, frame.map(|f| &f.image), overlay].into_iter().flatten() {
        out.draw_pixmap(0, 0, layer.as_ref(), &paint, Transform::identity(), None);
    }
    Some(out)
}
