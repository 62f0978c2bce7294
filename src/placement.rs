use clap::ValueEnum;

/// Edge of the screen the anchor's panel is docked to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Side {
    #[value(alias = "0")]
    Top,
    #[default]
    #[value(alias = "1")]
    Bottom,
    #[value(alias = "2")]
    Left,
    #[value(alias = "3")]
    Right,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Top => "top",
            Side::Bottom => "bottom",
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Places a window next to `anchor` on the side facing away from the panel
/// edge, then clamps it on-screen.
pub fn resolve(anchor: Anchor, side: Side, screen: Size, window: Size, gap: f64) -> (f64, f64) {
    let centered_x = anchor.x + anchor.width / 2.0 - window.width / 2.0;
    let centered_y = anchor.y + anchor.height / 2.0 - window.height / 2.0;

    let (x, y) = match side {
        Side::Top => (centered_x, anchor.y + anchor.height + gap),
        Side::Bottom => (centered_x, anchor.y - window.height - gap),
        Side::Left => (anchor.x + anchor.width + gap, centered_y),
        Side::Right => (anchor.x - window.width - gap, centered_y),
    };

    (
        clamp_axis(x, screen.width, window.width),
        clamp_axis(y, screen.height, window.height),
    )
}

fn clamp_axis(pos: f64, screen: f64, window: f64) -> f64 {
    pos.min(screen - window).max(0.0)
}
