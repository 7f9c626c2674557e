use crate::health::throughput::RateClass;
use crate::models::severity::Severity;
use crate::models::status::TestStatus;
use ratatui::style::{Color, Modifier, Style};

const fn rgb(hex: u32) -> Color {
    Color::Rgb(
        ((hex >> 16) & 0xFF) as u8,
        ((hex >>  8) & 0xFF) as u8,
        ( hex        & 0xFF) as u8,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThemeVariant {
    Default,
    Dracula,
    Gruvbox,
    Nord,
    /// No colour at all; for logs and dumb terminals.
    Mono,
}

impl ThemeVariant {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Dracula => "Dracula",
            Self::Gruvbox => "Gruvbox",
            Self::Nord    => "Nord",
            Self::Mono    => "Mono",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "dracula" => Self::Dracula,
            "gruvbox" => Self::Gruvbox,
            "nord"    => Self::Nord,
            "mono" | "none" => Self::Mono,
            _         => Self::Default,
        }
    }
}

/// Styles for reports and throughput graphs.
#[derive(Debug, Clone)]
pub struct Theme {
    pub pass:       Style,
    pub warn:       Style,
    pub fail:       Style,
    /// Samples above the "great" band.
    pub great:      Style,
    pub overridden: Style,
}

impl Theme {
    pub fn for_variant(v: ThemeVariant) -> Self {
        match v {
            ThemeVariant::Default => Self::standard(),
            ThemeVariant::Dracula => Self::palette(0x50fa7b, 0xf1fa8c, 0xff5555, 0x8be9fd, 0xbd93f9),
            ThemeVariant::Gruvbox => Self::palette(0xb8bb26, 0xfabd2f, 0xfb4934, 0x83a598, 0xfe8019),
            ThemeVariant::Nord    => Self::palette(0xa3be8c, 0xebcb8b, 0xbf616a, 0x88c0d0, 0xb48ead),
            ThemeVariant::Mono    => Self::mono(),
        }
    }

    fn standard() -> Self {
        Self {
            pass:       Style::default().fg(Color::Green),
            warn:       Style::default().fg(Color::Yellow),
            fail:       Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            great:      Style::default().fg(Color::Cyan),
            overridden: Style::default().fg(Color::Magenta),
        }
    }

    fn palette(pass: u32, warn: u32, fail: u32, great: u32, over: u32) -> Self {
        Self {
            pass:       Style::default().fg(rgb(pass)),
            warn:       Style::default().fg(rgb(warn)),
            fail:       Style::default().fg(rgb(fail)).add_modifier(Modifier::BOLD),
            great:      Style::default().fg(rgb(great)),
            overridden: Style::default().fg(rgb(over)),
        }
    }

    fn mono() -> Self {
        Self {
            pass:       Style::default(),
            warn:       Style::default(),
            fail:       Style::default().add_modifier(Modifier::BOLD),
            great:      Style::default(),
            overridden: Style::default(),
        }
    }

    pub fn severity_style(&self, s: Severity) -> Style {
        match s {
            Severity::Pass => self.pass,
            Severity::Warn => self.warn,
            Severity::Fail => self.fail,
        }
    }

    pub fn rate_style(&self, class: RateClass) -> Style {
        match class {
            RateClass::Great => self.great,
            other            => self.severity_style(other.severity()),
        }
    }

    /// Style for a test result; overrides stand apart from real passes.
    pub fn status_style(&self, status: TestStatus) -> Style {
        match status {
            TestStatus::Override => self.overridden,
            other                => self.severity_style(other.severity()),
        }
    }
}
