use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Context, Line as CanvasLine},
        Block, BorderType, Borders, Gauge, Paragraph,
    },
    Frame,
};

use crate::app::{App, LabelPart, Status};
use crate::chart::{self, Margins, PlotArea, Series};
use crate::config::{StartupParams, TempUnit};
use crate::history::HistoryBuffer;
use crate::models::Sample;
use crate::theme::*;

/// Renders the docked panel widget.
pub fn render_panel(frame: &mut Frame, area: Rect, app: &App) {
    let status_color = match (&app.status, &app.last) {
        (Status::Ok, Some(last)) => load_color(last.utilization),
        (Status::Ok, None) => MATRIX_GREEN,
        _ => NEON_RED,
    };
    let clock = app.last.as_ref().map(Sample::clock).unwrap_or("--:--:--");

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(MATRIX_GREEN))
        .title(vec![
            Span::styled(" ◆ ", Style::default().fg(status_color)),
            Span::styled(
                "GPU ",
                Style::default().fg(NEON_GREEN).add_modifier(Modifier::BOLD),
            ),
            Span::styled("│ ", Style::default().fg(MATRIX_GREEN)),
            Span::styled(clock, Style::default().fg(CYBER_BLUE)),
            Span::raw(" "),
        ])
        .style(Style::default().bg(DARK_BG));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.width == 0 || inner.height == 0 {
        return;
    }

    match &app.status {
        Status::SourceFailed(msg) | Status::GraphUnavailable(msg) | Status::ConfigInvalid(msg)
            if inner.height < 2 || app.label.is_empty() =>
        {
            render_status(frame, inner, msg);
            return;
        }
        _ => {}
    }

    if app.label.is_empty() {
        let blink = if app.frame_count % 20 < 10 { "█" } else { " " };
        let waiting = Line::from(vec![
            Span::styled(
                "Waiting for nvidia-smi response",
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(blink, Style::default().fg(NEON_GREEN)),
        ]);
        frame.render_widget(Paragraph::new(waiting), inner);
        return;
    }

    let mut rows = inner;
    if let Status::SourceFailed(msg) | Status::GraphUnavailable(msg) | Status::ConfigInvalid(msg) =
        &app.status
    {
        let [body, status] = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .areas(inner);
        render_status(frame, status, msg);
        rows = body;
    }

    if usize::from(rows.height) >= app.label.len() {
        render_gauges(frame, rows, &app.label);
    } else {
        render_label_line(frame, rows, &app.label);
    }
}

fn render_status(frame: &mut Frame, area: Rect, msg: &str) {
    let line = Line::from(vec![
        Span::styled("[", Style::default().fg(NEON_RED)),
        Span::styled(
            "!",
            Style::default().fg(NEON_YELLOW).add_modifier(Modifier::BOLD),
        ),
        Span::styled("] ", Style::default().fg(NEON_RED)),
        Span::styled(msg.to_string(), Style::default().fg(NEON_RED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn part_color(part: &LabelPart) -> Color {
    match part.name {
        "TMP" => temp_color(part.percent / 100.0 * chart::TEMP_MAX),
        "MEM" => NEON_MAGENTA,
        _ => load_color(part.percent),
    }
}

fn render_label_line(frame: &mut Frame, area: Rect, parts: &[LabelPart]) {
    let mut spans = Vec::with_capacity(parts.len() * 3);
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" │ ", Style::default().fg(MATRIX_GREEN)));
        }
        spans.push(Span::styled(
            format!("{} ", part.name),
            Style::default().fg(Color::DarkGray),
        ));
        spans.push(Span::styled(
            part.text.clone(),
            Style::default()
                .fg(part_color(part))
                .add_modifier(Modifier::BOLD),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_gauges(frame: &mut Frame, area: Rect, parts: &[LabelPart]) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(parts.iter().map(|_| Constraint::Length(1)))
        .split(area);

    for (part, row) in parts.iter().zip(rows.iter()) {
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(part_color(part)).bg(GAUGE_BG))
            .ratio((part.percent / 100.0).clamp(0.0, 1.0))
            .label(Span::styled(
                format!("▓ {} {}", part.name, part.text),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ));
        frame.render_widget(gauge, *row);
    }
}

/// Colours and axis settings of a graph window, resolved once at startup.
#[derive(Clone, Debug)]
pub struct GraphView {
    pub gpu: Color,
    pub mem: Color,
    pub temp: Color,
    pub fan: Color,
    pub bg: Color,
    pub grid: Color,
    pub axis: Color,
    pub ysteps: usize,
    pub xsteps: usize,
    pub temp_unit: TempUnit,
    /// Samples across the plot width.
    pub window: usize,
    /// Plotted series, in legend order.
    pub series: Vec<Series>,
}

impl GraphView {
    pub fn new(params: &StartupParams) -> Self {
        let palette = &params.palette;
        Self {
            gpu: color_or_warn(&palette.gpu),
            mem: color_or_warn(&palette.mem),
            temp: color_or_warn(&palette.temp),
            fan: color_or_warn(&palette.fan),
            bg: color_or_warn(&palette.bg),
            grid: color_or_warn(&palette.grid),
            axis: color_or_warn(&palette.axis),
            ysteps: params.ysteps,
            xsteps: params.xsteps,
            temp_unit: params.temp_unit,
            window: params.window_points(),
            series: Series::ALL
                .into_iter()
                .filter(|&series| params.shows(series))
                .collect(),
        }
    }

    fn series_color(&self, series: Series) -> Color {
        match series {
            Series::Gpu => self.gpu,
            Series::Mem => self.mem,
            Series::Temp => self.temp,
            Series::Fan => self.fan,
        }
    }

    fn series_text(&self, series: Series, sample: &Sample) -> String {
        match series {
            Series::Temp => self.temp_unit.format(sample.temperature, 0),
            _ => format!("{:.0}%", series.value(sample)),
        }
    }
}

// Cells reserved around the plot for axis labels.
const LABEL_MARGINS: Margins = Margins {
    left: 5.0,
    right: 6.0,
    top: 0.0,
    bottom: 2.0,
};

/// Plot geometry of a graph body, in terminal cells.
pub fn plot_area(inner: Rect) -> PlotArea {
    PlotArea {
        width: f64::from(inner.width),
        height: f64::from(inner.height),
        margins: LABEL_MARGINS,
    }
}

/// Renders the graph window: grid, the visible series and axis labels.
///
/// The legend doubles as a readout of the newest sample.
pub fn render_graph(frame: &mut Frame, area: Rect, history: &HistoryBuffer, view: &GraphView) {
    let mut title = vec![Span::styled(
        " ◇ ",
        Style::default().fg(view.axis).add_modifier(Modifier::BOLD),
    )];
    if let Some(latest) = history.latest() {
        for &series in &view.series {
            title.push(Span::styled(
                format!("{} {} ", series.name(), view.series_text(series, latest)),
                Style::default().fg(view.series_color(series)),
            ));
        }
    } else {
        title.push(Span::styled("NO DATA ", Style::default().fg(inverse(view.bg))));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(view.axis))
        .title(title)
        .style(Style::default().bg(view.bg));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let plot = plot_area(inner);
    if !plot.is_drawable() {
        return;
    }

    let (width, height) = (plot.width, plot.height);
    let canvas = Canvas::default()
        .marker(Marker::Braille)
        .background_color(view.bg)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(|ctx| {
            draw_grid(ctx, &plot, view);
            ctx.layer();
            for &series in &view.series {
                let points = chart::map_series(history.iter(), series, &plot, view.window);
                let color = view.series_color(series);
                for pair in points.windows(2) {
                    ctx.draw(&CanvasLine::new(
                        pair[0].x,
                        height - pair[0].y,
                        pair[1].x,
                        height - pair[1].y,
                        color,
                    ));
                }
                if let [only] = points.as_slice() {
                    ctx.draw(&CanvasLine::new(only.x, height - only.y, only.x, height - only.y, color));
                }
            }
        });
    frame.render_widget(canvas, inner);

    render_axis_labels(frame, inner, &plot, history, view);
}

fn draw_grid(ctx: &mut Context, plot: &PlotArea, view: &GraphView) {
    let height = plot.height;
    for (_, y) in chart::y_ticks(plot, view.ysteps) {
        ctx.draw(&CanvasLine::new(
            plot.margins.left,
            height - y,
            plot.right(),
            height - y,
            view.grid,
        ));
    }
    for (_, x) in chart::x_ticks(plot, view.xsteps) {
        ctx.draw(&CanvasLine::new(
            x,
            height - plot.margins.top,
            x,
            height - plot.bottom(),
            view.grid,
        ));
    }
}

fn render_axis_labels(
    frame: &mut Frame,
    inner: Rect,
    plot: &PlotArea,
    history: &HistoryBuffer,
    view: &GraphView,
) {
    let label_style = Style::default().fg(view.axis).bg(view.bg);
    let last_row = inner.height.saturating_sub(1);
    let plot_last_row = (plot.bottom() as u16).min(last_row.saturating_sub(1));

    for (ratio, y) in chart::y_ticks(plot, view.ysteps) {
        let row = inner.y + (y.round() as u16).min(plot_last_row);
        let percent = format!("{:>4}%", (ratio * 100.0).round());
        let temp = view.temp_unit.format(ratio * chart::TEMP_MAX, 0);

        let left = Rect::new(inner.x, row, LABEL_MARGINS.left as u16, 1);
        frame.render_widget(Paragraph::new(Span::styled(percent, label_style)), left);

        let right_width = LABEL_MARGINS.right as u16;
        let right = Rect::new(inner.right().saturating_sub(right_width), row, right_width, 1);
        frame.render_widget(
            Paragraph::new(Span::styled(format!(" {temp}"), label_style)),
            right,
        );
    }

    let span = view.window.saturating_sub(1) as f64;
    for (ratio, x) in chart::x_ticks(plot, view.xsteps) {
        let offset = ((1.0 - ratio) * span).round() as usize;
        let Some(sample) = history.iter().rev().nth(offset) else {
            continue;
        };
        let text = sample.clock();
        let width = text.chars().count() as u16;
        let col = (x.round() as u16)
            .saturating_sub(width / 2)
            .min(inner.width.saturating_sub(width));
        let cell = Rect::new(inner.x + col, inner.y + last_row, width.min(inner.width), 1);
        frame.render_widget(Paragraph::new(Span::styled(text.to_string(), label_style)), cell);
    }
}
