/*
 *  sink.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Where a radar panel puts its pictures
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
use log::{debug, error};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::Pixmap;

use crate::compositor::layer_view;
use crate::frame::Frame;

/// Receives the three panel layers. The base map (with markers) changes
/// rarely, the radar frame changes every time playback moves.
pub trait FrameSink: Send + 'static {
    fn show_base(&mut self, base: &Pixmap, overlay: Option<&Pixmap>);
    fn show_frame(&mut self, frame: &Arc<Frame>);
}

/// Writes the stacked panel to `{dir}/{name}.png` whenever any layer changes.
pub struct PngFileSink {
    path: PathBuf,
    width: u32,
    height: u32,
    base: Option<Pixmap>,
    overlay: Option<Pixmap>,
    frame: Option<Arc<Frame>>,
}

impl PngFileSink {
    pub fn new(dir: &Path, name: &str, width: u32, height: u32) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{name}.png")),
            width,
            height,
            base: None,
            overlay: None,
            frame: None,
        })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn write(&self) {
        let Some(view) = layer_view(
            self.base.as_ref(),
            self.frame.as_deref(),
            self.overlay.as_ref(),
            self.width,
            self.height,
        ) else {
            error!("cannot allocate {}x{} panel view", self.width, self.height);
            return;
        };
        // write beside and rename so a viewer never sees half a file
        let tmp = self.path.with_extension("png.tmp");
        if let Err(e) = view.save_png(&tmp) {
            error!("writing {}: {}", tmp.display(), e);
            return;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            error!("renaming {}: {}", tmp.display(), e);
            return;
        }
        debug!("wrote {}", self.path.display());
    }
}

impl FrameSink for PngFileSink {
    fn show_base(&mut self, base: &Pixmap, overlay: Option<&Pixmap>) {
        self.base = Some(base.clone());
        self.overlay = overlay.cloned();
        self.write();
    }

    fn show_frame(&mut self, frame: &Arc<Frame>) {
        self.frame = Some(Arc::clone(frame));
        self.write();
    }
}
