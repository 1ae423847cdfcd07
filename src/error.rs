use thiserror::Error;

/// Errors that can occur while loading or decoding a single tile image.
///
/// Both variants collapse into [`LoadState::Error`](crate::resource::LoadState)
/// on the owning resource. They are never fatal for the engine: the tile stays
/// a placeholder until it is attached again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// Fetching the tile bytes failed (missing file, network error, ...)
    #[error("Load error: {0}")]
    Load(String),

    /// The fetched bytes could not be decoded into a bitmap
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Errors raised when building a pyramid from options and image data.
///
/// Only misconfiguration that would make tiling impossible is rejected here.
/// Capacity-like settings (cache limit, batch size) degrade instead of failing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Tile size must be at least one pixel
    #[error("Invalid tile size: {0} (must be greater than 0)")]
    InvalidTileSize(u32),

    /// Image has no pixels in one of its dimensions
    #[error("Invalid image dimensions: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    /// Neither the image nor the options provide a tile URL
    #[error("Missing tile URL: set a template in the options or the image descriptor")]
    MissingTileUrl,

    /// Tile URL template lacks a required placeholder
    #[error("Invalid tile URL template '{template}': missing {placeholder}")]
    InvalidTemplate {
        template: String,
        placeholder: &'static str,
    },

    /// Pixel ratio must be a finite, positive number
    #[error("Invalid pixel ratio: {0}")]
    InvalidPixelRatio(f64),

    /// Options could not be parsed
    #[error("Invalid options: {0}")]
    Parse(String),
}
