use thiserror::Error;

use crate::camera::backend::LumaFrame;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("qr decode failed: {0}")]
    Grid(rqrr::DeQRError),
}

/// Seam over the external decoding capability. `Ok(None)` is the expected
/// per-frame miss and must never surface as an error; `Err` is a real
/// decode failure the scan loop logs and survives.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, frame: &LumaFrame) -> Result<Option<String>, DecodeError>;
}

/// Production decoder over rqrr. Frames arrive as raw greyscale buffers so
/// no backend image types leak through here.
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        RqrrDecoder
    }
}

impl FrameDecoder for RqrrDecoder {
    fn decode(&self, frame: &LumaFrame) -> Result<Option<String>, DecodeError> {
        let width = frame.width as usize;
        let height = frame.height as usize;
        if width == 0 || height == 0 || frame.data.len() < width * height {
            return Ok(None);
        }

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
            frame.data[y * width + x]
        });

        let grids = prepared.detect_grids();
        if grids.is_empty() {
            return Ok(None);
        }

        let mut failure = None;
        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => return Ok(Some(content)),
                Err(err) => failure = Some(err),
            }
        }

        match failure {
            Some(err) => Err(DecodeError::Grid(err)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use qrcode::{Color, QrCode};

    use super::*;

    /// Renders `payload` as a greyscale frame with a quiet zone, the way a
    /// camera would see a code filling most of the view.
    fn qr_frame(payload: &str) -> LumaFrame {
        const SCALE: usize = 8;
        const MARGIN: usize = 4;

        let code = QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width();
        let colors = code.to_colors();

        let side = (modules + 2 * MARGIN) * SCALE;
        let mut data = vec![255u8; side * side];
        for y in 0..modules {
            for x in 0..modules {
                if colors[y * modules + x] == Color::Dark {
                    for dy in 0..SCALE {
                        for dx in 0..SCALE {
                            let px = (x + MARGIN) * SCALE + dx;
                            let py = (y + MARGIN) * SCALE + dy;
                            data[py * side + px] = 0;
                        }
                    }
                }
            }
        }

        LumaFrame {
            width: side as u32,
            height: side as u32,
            data,
        }
    }

    #[test]
    fn decodes_a_rendered_code() {
        let decoder = RqrrDecoder::new();
        let frame = qr_frame("https://example.com/checkout/42");
        let decoded = decoder.decode(&frame).unwrap();
        assert_eq!(decoded.as_deref(), Some("https://example.com/checkout/42"));
    }

    #[test]
    fn blank_frame_is_a_miss_not_an_error() {
        let decoder = RqrrDecoder::new();
        let frame = LumaFrame {
            width: 64,
            height: 64,
            data: vec![255; 64 * 64],
        };
        assert!(decoder.decode(&frame).unwrap().is_none());
    }

    #[test]
    fn degenerate_frame_is_a_miss() {
        let decoder = RqrrDecoder::new();
        let frame = LumaFrame {
            width: 0,
            height: 0,
            data: Vec::new(),
        };
        assert!(decoder.decode(&frame).unwrap().is_none());
    }
}
