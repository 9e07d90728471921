//! Server list icon.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

pub const ICON_FILE: &str = "server-icon.png";
pub const ICON_SIZE: u32 = 64;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, thiserror::Error)]
pub enum IconError {
    #[error("failed to read icon: {0}")]
    Io(#[from] std::io::Error),

    #[error("icon is not a PNG image")]
    NotPng,

    #[error("icon must be 64x64 pixels, found {width}x{height}")]
    WrongSize { width: u32, height: u32 },
}

/// The icon shown in server lists, ready to embed in status responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerIcon {
    data: Option<String>,
}

impl ServerIcon {
    pub fn blank() -> Self {
        Self::default()
    }

    /// Loads and validates a PNG icon.
    pub fn load(path: &Path) -> Result<Self, IconError> {
        let bytes = std::fs::read(path)?;
        Self::from_png(&bytes)
    }

    pub fn from_png(bytes: &[u8]) -> Result<Self, IconError> {
        let (width, height) = png_dimensions(bytes).ok_or(IconError::NotPng)?;
        if width != ICON_SIZE || height != ICON_SIZE {
            return Err(IconError::WrongSize { width, height });
        }
        Ok(Self {
            data: Some(format!("data:image/png;base64,{}", STANDARD.encode(bytes))),
        })
    }

    /// `data:` URI of the icon, or `None` for the blank icon.
    pub fn data_uri(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn is_blank(&self) -> bool {
        self.data.is_none()
    }
}

/// Width and height from the IHDR chunk, which must come first.
fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 || &bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some((width, height))
}
