//! Block-character throughput graph. One column per merged sample; 8 levels
//! per row, stacked rows for 16 and 32 step scales.

use crate::error::ConfigError;
use crate::health::throughput::{classify, merge_samples, rate_to_step, ThroughputConfig};
use crate::models::device::DeviceType;
use crate::ui::theme::Theme;
use crossterm::style::{Attribute, Attributes, Color as CColor, ContentStyle};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render `samples` (bytes/s) as graph rows, top row first.
pub fn render(
    samples: &[f64],
    kind:    &DeviceType,
    width:   usize,
    steps:   u8,
    cfg:     &ThroughputConfig,
    theme:   &Theme,
) -> Result<Vec<Line<'static>>, ConfigError> {
    let scale = cfg
        .scale(steps)
        .ok_or_else(|| ConfigError::InvalidScale(format!("no graph scale configured for {} steps", steps)))?;
    let merged = merge_samples(samples, width);
    let cols: Vec<(u8, Style)> = merged
        .iter()
        .map(|&rate| (rate_to_step(rate, scale), theme.rate_style(classify(rate, kind, cfg))))
        .collect();

    let rows = scale.rows();
    let lines = (0..rows)
        .rev()
        .map(|row| {
            let floor = (row * 8) as u8;
            let spans: Vec<Span<'static>> = cols
                .iter()
                .map(|&(step, style)| {
                    let level = step.saturating_sub(floor).min(8);
                    let ch = if level == 0 { ' ' } else { LEVELS[level as usize - 1] };
                    Span::styled(ch.to_string(), style)
                })
                .collect();
            Line::from(spans)
        })
        .collect();
    Ok(lines)
}

fn to_crossterm(c: Color) -> Option<CColor> {
    Some(match c {
        Color::Reset        => return None,
        Color::Black        => CColor::Black,
        Color::Red          => CColor::DarkRed,
        Color::Green        => CColor::DarkGreen,
        Color::Yellow       => CColor::DarkYellow,
        Color::Blue         => CColor::DarkBlue,
        Color::Magenta      => CColor::DarkMagenta,
        Color::Cyan         => CColor::DarkCyan,
        Color::Gray         => CColor::Grey,
        Color::DarkGray     => CColor::DarkGrey,
        Color::LightRed     => CColor::Red,
        Color::LightGreen   => CColor::Green,
        Color::LightYellow  => CColor::Yellow,
        Color::LightBlue    => CColor::Blue,
        Color::LightMagenta => CColor::Magenta,
        Color::LightCyan    => CColor::Cyan,
        Color::White        => CColor::White,
        Color::Rgb(r, g, b) => CColor::Rgb { r, g, b },
        Color::Indexed(i)   => CColor::AnsiValue(i),
    })
}

fn content_style(style: Style) -> ContentStyle {
    let mut attributes = Attributes::default();
    if style.add_modifier.contains(Modifier::BOLD) {
        attributes.set(Attribute::Bold);
    }
    ContentStyle {
        foreground_color: style.fg.and_then(to_crossterm),
        background_color: style.bg.and_then(to_crossterm),
        attributes,
        ..ContentStyle::default()
    }
}

/// `text` wrapped in the ANSI sequences for `style`.
pub fn paint(text: &str, style: Style) -> String {
    content_style(style).apply(text).to_string()
}

/// Lines as an ANSI-coloured string for plain terminal output.
pub fn to_ansi(lines: &[Line<'_>]) -> String {
    let mut out = String::new();
    for line in lines {
        for span in &line.spans {
            out.push_str(&paint(&span.content, span.style));
        }
        out.push('\n');
    }
    out
}

/// Lines without any styling.
pub fn to_plain(lines: &[Line<'_>]) -> String {
    let mut out = String::new();
    for line in lines {
        for span in &line.spans {
            out.push_str(&span.content);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::theme::ThemeVariant;

    const MB: f64 = 1_048_576.0;

    fn draw(samples: &[f64], width: usize, steps: u8) -> Vec<Line<'static>> {
        let theme = Theme::for_variant(ThemeVariant::Default);
        render(samples, &DeviceType::HDD, width, steps, &ThroughputConfig::default(), &theme).unwrap()
    }

    #[test]
    fn one_row_at_eight_steps() {
        let lines = draw(&[0.0, 20.0 * MB, 80.0 * MB, 1000.0 * MB], 4, 8);
        assert_eq!(lines.len(), 1);
        assert_eq!(to_plain(&lines), " ▂▄█\n");
    }

    #[test]
    fn rows_stack_at_sixteen_steps() {
        let lines = draw(&[10.0 * MB, 1e12], 2, 16);
        assert_eq!(lines.len(), 2);
        assert_eq!(to_plain(&lines), " █\n▂█\n");
    }

    #[test]
    fn merges_down_to_width_without_touching_input() {
        let samples = vec![1000.0 * MB; 9];
        let before = samples.clone();
        let lines = draw(&samples, 4, 32);
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.spans.len() == 4));
        assert_eq!(samples, before);
    }

    #[test]
    fn slow_samples_use_the_fail_colour() {
        let theme = Theme::for_variant(ThemeVariant::Default);
        let lines = draw(&[20.0 * MB, 1000.0 * MB], 2, 8);
        assert_eq!(lines[0].spans[0].style, theme.fail);
        assert_eq!(lines[0].spans[1].style, theme.great);
        let ansi = to_ansi(&lines);
        assert!(ansi.contains("\u{1b}["));
        assert!(ansi.contains('█'));
        assert_eq!(paint("x", Style::default()), "x");
    }

    #[test]
    fn unknown_scale_is_an_error() {
        let theme = Theme::for_variant(ThemeVariant::Default);
        assert!(render(&[1.0], &DeviceType::SSD, 1, 12, &ThroughputConfig::default(), &theme).is_err());
    }
}
