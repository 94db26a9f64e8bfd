use iced::color;
use iced::theme::Palette;
use iced::{Color, Theme};

use facefeed_core::session::result_store::BatchStatus;

pub fn resolve_theme() -> Theme {
    Theme::custom("FaceFeed", palette())
}

fn palette() -> Palette {
    Palette {
        background: color!(0x1c, 0x1c, 0x1e),
        text: color!(0xcc, 0xcc, 0xcc),
        primary: color!(0x3b, 0x82, 0xf6),
        success: color!(0x30, 0xd1, 0x58),
        warning: color!(0xff, 0xcc, 0x00),
        danger: color!(0xff, 0x45, 0x3a),
    }
}

/// Color for the status line.
pub fn status_color(theme: &Theme, status: &BatchStatus) -> Color {
    let palette = theme.palette();
    match status {
        BatchStatus::Idle => muted_color(theme),
        BatchStatus::Processing => palette.warning,
        BatchStatus::Ready => palette.success,
        BatchStatus::Error(_) => palette.danger,
    }
}

pub fn muted_color(theme: &Theme) -> Color {
    Color {
        a: 0.6,
        ..theme.palette().text
    }
}
