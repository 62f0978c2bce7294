use log::warn;
use ratatui::style::Color;

// Приглушённая хакерская цветовая схема
pub const NEON_GREEN: Color = Color::Rgb(0, 160, 50);
pub const NEON_CYAN: Color = Color::Rgb(0, 150, 160);
pub const NEON_MAGENTA: Color = Color::Rgb(160, 60, 160);
pub const NEON_YELLOW: Color = Color::Rgb(180, 160, 60);
pub const NEON_RED: Color = Color::Rgb(180, 60, 60);
pub const DARK_BG: Color = Color::Rgb(15, 15, 25);
pub const MATRIX_GREEN: Color = Color::Rgb(30, 130, 30);
pub const CYBER_BLUE: Color = Color::Rgb(60, 130, 180);
pub const GAUGE_BG: Color = Color::Rgb(20, 20, 30);

/// Shown for colour strings that cannot be parsed.
pub const ERROR_MAGENTA: Color = Color::Rgb(255, 0, 255);

/// Parses `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r,g,b)` or `rgba(r,g,b,a)`.
///
/// Terminal cells have no alpha, so a translucent colour is blended onto
/// black.
pub fn parse_color(input: &str) -> Option<Color> {
    let c = input.trim().trim_matches(|ch: char| ch == '\'' || ch == '"').trim();

    if let Some(hex) = c.strip_prefix('#') {
        return parse_hex(hex);
    }

    let (_, rest) = c.split_once('(')?;
    let body = rest.strip_suffix(')')?;
    let parts = body
        .split(',')
        .map(|p| p.trim().parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if parts.len() < 3 {
        return None;
    }

    let (mut r, mut g, mut b) = (parts[0], parts[1], parts[2]);
    // Components given as 0-1 fractions.
    if r <= 1.0 && g <= 1.0 && b <= 1.0 {
        r *= 255.0;
        g *= 255.0;
        b *= 255.0;
    }
    let a = parts.get(3).copied().unwrap_or(1.0);
    Some(rgba(r, g, b, a))
}

fn parse_hex(hex: &str) -> Option<Color> {
    let hex = if hex.len() == 3 {
        hex.chars().flat_map(|ch| [ch, ch]).collect::<String>()
    } else {
        hex.to_string()
    };
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return None;
    }

    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let (r, g, b) = (channel(0)?, channel(2)?, channel(4)?);
    let a = if hex.len() == 8 {
        f64::from(channel(6)?) / 255.0
    } else {
        1.0
    };
    Some(rgba(f64::from(r), f64::from(g), f64::from(b), a))
}

fn rgba(r: f64, g: f64, b: f64, a: f64) -> Color {
    let a = a.clamp(0.0, 1.0);
    let scale = |v: f64| (v.clamp(0.0, 255.0) * a).round() as u8;
    Color::Rgb(scale(r), scale(g), scale(b))
}

/// Like [`parse_color`], falling back to magenta with a warning.
pub fn color_or_warn(input: &str) -> Color {
    parse_color(input).unwrap_or_else(|| {
        warn!("cannot parse colour {input:?}");
        ERROR_MAGENTA
    })
}

/// Black or white, whichever reads better on `bg`.
pub fn inverse(bg: Color) -> Color {
    match bg {
        Color::Rgb(r, g, b) => {
            let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
            if luma > 128.0 {
                Color::Black
            } else {
                Color::White
            }
        }
        _ => Color::White,
    }
}

/// Utilisation colour ramp used by the panel gauges.
pub fn load_color(percent: f64) -> Color {
    if percent > 90.0 {
        NEON_RED
    } else if percent > 50.0 {
        NEON_YELLOW
    } else {
        NEON_GREEN
    }
}

pub fn temp_color(celsius: f64) -> Color {
    if celsius > 80.0 {
        NEON_RED
    } else if celsius > 60.0 {
        NEON_YELLOW
    } else {
        NEON_CYAN
    }
}
