//! Tile URL addressing schemes.
//!
//! Two on-disk pyramid layouts are supported:
//!
//! - **Deep Zoom** (`deepzoom`): level `z` runs from 0 (a 1x1 image) to
//!   `ceil(log2(max(width, height)))` (full resolution). URLs are produced by
//!   substituting `{x}`, `{y}` and `{z}` in a template.
//! - **Zoomify** (`zoomify`): levels are produced by halving the image until it
//!   fits into a single tile. Tiles are stored in folders of 256 tiles each, so
//!   the URL also needs the `{group}` (or `{zoomify_group}`) of the absolute
//!   tile index.
//!
//! The scheme is resolved once when the pyramid is built; a host may also
//! supply its own closure.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::identity::TileId;
use crate::error::ConfigError;

/// Number of tiles stored per Zoomify `TileGroup` folder.
pub const ZOOMIFY_TILES_PER_GROUP: u64 = 256;

/// Pyramid layout of the tile source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileType {
    /// Deep Zoom (DZI) pyramid
    #[default]
    Deepzoom,

    /// Zoomify pyramid with grouped tile folders
    Zoomify,
}

impl FromStr for TileType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deepzoom" | "dzi" => Ok(Self::Deepzoom),
            "zoomify" => Ok(Self::Zoomify),
            other => Err(ConfigError::Parse(format!("unknown tile type '{}'", other))),
        }
    }
}

impl fmt::Display for TileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deepzoom => f.write_str("deepzoom"),
            Self::Zoomify => f.write_str("zoomify"),
        }
    }
}

/// Host-provided URL function.
pub type TileUrlFn = Arc<dyn Fn(TileId) -> String + Send + Sync>;

/// How a tile identity is turned into a URL.
#[derive(Clone)]
pub enum AddressingScheme {
    /// `{x}`, `{y}`, `{z}` substitution in a template
    Templated { template: String },

    /// Absolute tile index within fixed-size group folders (Zoomify)
    Indexed {
        template: String,
        /// Tiles per level in columns, coarsest level first
        columns: Vec<u64>,
        /// Number of tiles in all levels coarser than level `z`
        preceding: Vec<u64>,
    },

    /// Host closure
    Custom(TileUrlFn),
}

impl fmt::Debug for AddressingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Templated { template } => f
                .debug_struct("Templated")
                .field("template", template)
                .finish(),
            Self::Indexed { template, .. } => f
                .debug_struct("Indexed")
                .field("template", template)
                .finish_non_exhaustive(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl AddressingScheme {
    /// Build a templated (Deep Zoom) scheme.
    pub fn templated(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        check_template(&template)?;
        Ok(Self::Templated { template })
    }

    /// Build an indexed (Zoomify) scheme for an image of the given size.
    pub fn indexed(
        template: impl Into<String>,
        width: u32,
        height: u32,
        tile_size: u32,
    ) -> Result<Self, ConfigError> {
        let template = template.into();
        check_template(&template)?;

        let grids = zoomify_grids(width, height, tile_size);
        let mut columns = Vec::with_capacity(grids.len());
        let mut preceding = Vec::with_capacity(grids.len());
        let mut total = 0u64;
        for (cols, rows) in grids {
            preceding.push(total);
            columns.push(cols);
            total += cols * rows;
        }

        Ok(Self::Indexed {
            template,
            columns,
            preceding,
        })
    }

    /// Resolve the URL of a tile.
    pub fn resolve(&self, id: TileId) -> String {
        match self {
            Self::Templated { template } => substitute(template, id),
            Self::Indexed {
                template,
                columns,
                preceding,
            } => {
                let z = id.z as usize;
                let index = match (preceding.get(z), columns.get(z)) {
                    (Some(before), Some(cols)) => before + cols * id.y as u64 + id.x as u64,
                    _ => 0,
                };
                let group = (index / ZOOMIFY_TILES_PER_GROUP).to_string();
                let template = template
                    .replace("{zoomify_group}", &group)
                    .replace("{group}", &group);
                substitute(&template, id)
            }
            Self::Custom(resolve) => resolve(id),
        }
    }
}

fn substitute(template: &str, id: TileId) -> String {
    template
        .replace("{x}", &id.x.to_string())
        .replace("{y}", &id.y.to_string())
        .replace("{z}", &id.z.to_string())
}

fn check_template(template: &str) -> Result<(), ConfigError> {
    for placeholder in ["{x}", "{y}", "{z}"] {
        if !template.contains(placeholder) {
            return Err(ConfigError::InvalidTemplate {
                template: template.to_string(),
                placeholder,
            });
        }
    }
    Ok(())
}

/// Highest Deep Zoom level for the given image dimensions.
///
/// `max_level = ceil(log2(max(width, height)))`
pub fn deepzoom_max_level(width: u32, height: u32) -> u32 {
    let max_dim = width.max(height) as f64;
    if max_dim <= 1.0 {
        return 0;
    }
    max_dim.log2().ceil() as u32
}

/// Tile grid of every Zoomify level, coarsest first.
///
/// Levels are obtained by halving the image until it fits into one tile.
pub fn zoomify_grids(width: u32, height: u32, tile_size: u32) -> Vec<(u64, u64)> {
    let tile = tile_size.max(1) as f64;
    let mut w = width as f64;
    let mut h = height as f64;

    let grid = |w: f64, h: f64| ((w / tile).ceil() as u64, (h / tile).ceil() as u64);

    let mut grids = vec![grid(w, h)];
    while w > tile || h > tile {
        w /= 2.0;
        h /= 2.0;
        grids.push(grid(w, h));
    }
    grids.reverse();
    grids
}
