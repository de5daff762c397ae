/*
 *  error.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Top level error for starting radar panels
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
use thiserror::Error;

use crate::compositor::FrameSizeError;
use crate::config::ConfigError;
use crate::projection::ProjectionError;

#[derive(Debug, Error)]
pub enum RadarError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameSizeError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
