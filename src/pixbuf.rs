/*
 *  pixbuf.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	TODO:
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

use core::convert::Infallible;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use tiny_skia::{ColorU8, Pixmap, PremultipliedColorU8};

/// embedded-graphics view over a tiny-skia pixmap, so mono fonts and
/// primitives can be drawn straight onto a radar frame.
pub struct PixmapTarget<'a> {
    pixmap: &'a mut Pixmap,
}

impl<'a> PixmapTarget<'a> {
    pub fn new(pixmap: &'a mut Pixmap) -> Self {
        Self { pixmap }
    }

    /// Map (x,y) to linear index; returns None if out of bounds
    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as u32, p.y as u32);
            if x < self.pixmap.width() && y < self.pixmap.height() {
                return Some((y * self.pixmap.width() + x) as usize);
            }
        }
        None
    }

    #[inline]
    fn opaque(c: Rgb888) -> PremultipliedColorU8 {
        ColorU8::from_rgba(c.r(), c.g(), c.b(), 255).premultiply()
    }
}

impl OriginDimensions for PixmapTarget<'_> {
    fn size(&self) -> Size {
        Size::new(self.pixmap.width(), self.pixmap.height())
    }
}

impl DrawTarget for PixmapTarget<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.pixmap.pixels_mut()[i] = Self::opaque(c);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let c = Self::opaque(color);
        self.pixmap.pixels_mut().fill(c);
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        // row walk, skipping anything clipped off the pixmap
        let Size { width, height } = area.size;
        if width == 0 || height == 0 { return Ok(()); }

        let mut it = colors.into_iter();
        for row in 0..height as i32 {
            for col in 0..width as i32 {
                let Some(c) = it.next() else { return Ok(()) };
                let p = area.top_left + Point::new(col, row);
                if let Some(i) = self.idx(p) {
                    self.pixmap.pixels_mut()[i] = Self::opaque(c);
                }
            }
        }
        Ok(())
    }
}
