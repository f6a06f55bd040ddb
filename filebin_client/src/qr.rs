use filebin_core::{Error, Result};
use qrcode::QrCode;
use qrcode::render::unicode;

/// Render `data` as a QR code made of half-block characters, two modules
/// per character cell, with the standard quiet zone.
pub fn render_terminal(data: &str) -> Result<String> {
    let code = QrCode::new(data.as_bytes()).map_err(|e| Error::QrCode(e.to_string()))?;

    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}
