//! Maps sample history onto plot coordinates.
//!
//! Screen space has its origin at the top-left corner and y grows downward.
//! The newest sample sits on the right edge of the plot area and older
//! samples step left at a fixed pitch derived from the visible window.

use clap::ValueEnum;

use crate::models::Sample;

/// Normalisation ceiling for temperatures, in °C.
pub const TEMP_MAX: f64 = 110.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Margins {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

/// Drawable surface with the margins reserved for axis labels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlotArea {
    pub width: f64,
    pub height: f64,
    pub margins: Margins,
}

impl PlotArea {
    pub fn plot_width(&self) -> f64 {
        self.width - self.margins.left - self.margins.right
    }

    pub fn plot_height(&self) -> f64 {
        self.height - self.margins.top - self.margins.bottom
    }

    pub fn right(&self) -> f64 {
        self.width - self.margins.right
    }

    pub fn bottom(&self) -> f64 {
        self.height - self.margins.bottom
    }

    pub fn is_drawable(&self) -> bool {
        self.plot_width() > 0.0 && self.plot_height() > 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Plotted metric and its normalisation range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Series {
    Gpu,
    Mem,
    Temp,
    Fan,
}

impl Series {
    pub const ALL: [Series; 4] = [Series::Gpu, Series::Mem, Series::Temp, Series::Fan];

    pub fn value(self, sample: &Sample) -> f64 {
        match self {
            Series::Gpu => sample.utilization,
            Series::Mem => sample.memory_percent(),
            Series::Temp => sample.temperature,
            Series::Fan => sample.fan,
        }
    }

    pub fn max_value(self) -> f64 {
        match self {
            Series::Temp => TEMP_MAX,
            _ => 100.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Series::Gpu => "GPU",
            Series::Mem => "MEM",
            Series::Temp => "TMP",
            Series::Fan => "FAN",
        }
    }
}

/// Horizontal pitch between neighbouring points for a visible window.
pub fn step_x(area: &PlotArea, window: usize) -> f64 {
    if window > 1 {
        area.plot_width() / (window - 1) as f64
    } else {
        area.plot_width()
    }
}

/// Vertical position of `value` on a `[0, max_value]` scale.
///
/// Values outside the scale are clamped to the plot edges; a non-positive
/// `max_value` puts everything on the bottom edge.
pub fn value_to_y(area: &PlotArea, value: f64, max_value: f64) -> f64 {
    let ratio = if max_value > 0.0 {
        (value / max_value).clamp(0.0, 1.0)
    } else {
        0.0
    };
    area.margins.top + area.plot_height() * (1.0 - ratio)
}

/// Screen coordinates of the newest `min(len, window)` values, newest first.
///
/// `values` must be in chronological order. Identical inputs always produce
/// identical output.
pub fn map_coordinates<I>(values: I, area: &PlotArea, max_value: f64, window: usize) -> Vec<Point>
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: DoubleEndedIterator,
{
    if !area.is_drawable() || window == 0 {
        return Vec::new();
    }

    let step = step_x(area, window);
    let right = area.right();
    values
        .into_iter()
        .rev()
        .take(window)
        .enumerate()
        .map(|(i, value)| Point {
            x: right - i as f64 * step,
            y: value_to_y(area, value, max_value),
        })
        .collect()
}

/// Convenience wrapper for one series over a sample history.
pub fn map_series<'a, I>(samples: I, series: Series, area: &PlotArea, window: usize) -> Vec<Point>
where
    I: IntoIterator<Item = &'a Sample>,
    I::IntoIter: DoubleEndedIterator,
{
    map_coordinates(
        samples.into_iter().map(|s| series.value(s)),
        area,
        series.max_value(),
        window,
    )
}

/// Y positions of horizontal grid lines, bottom (ratio 0) to top.
pub fn y_ticks(area: &PlotArea, steps: usize) -> Vec<(f64, f64)> {
    let steps = steps.max(1);
    (0..=steps)
        .map(|i| {
            let ratio = i as f64 / steps as f64;
            (ratio, area.margins.top + area.plot_height() * (1.0 - ratio))
        })
        .collect()
}

/// X positions of vertical grid lines, left (ratio 0) to right.
pub fn x_ticks(area: &PlotArea, steps: usize) -> Vec<(f64, f64)> {
    let steps = steps.max(1);
    (0..=steps)
        .map(|i| {
            let ratio = i as f64 / steps as f64;
            (ratio, area.margins.left + area.plot_width() * ratio)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const AREA: PlotArea = PlotArea {
        width: 600.0,
        height: 350.0,
        margins: Margins {
            left: 40.0,
            right: 40.0,
            top: 10.0,
            bottom: 20.0,
        },
    };

    #[test]
    fn single_point_sits_on_right_edge() {
        let points = map_coordinates([0.0], &AREA, 100.0, 120);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].x, 600.0 - 40.0);
        assert_eq!(points[0].y, AREA.margins.top + AREA.plot_height());
    }

    #[test]
    fn max_value_maps_to_top_margin() {
        let points = map_coordinates([100.0], &AREA, 100.0, 120);
        assert_eq!(points[0].y, AREA.margins.top);

        let hot = map_coordinates([TEMP_MAX, 200.0], &AREA, TEMP_MAX, 120);
        assert!(hot.iter().all(|p| p.y == AREA.margins.top));
    }

    #[test]
    fn identical_inputs_give_identical_outputs() {
        let values: Vec<f64> = (0..300).map(|n| (n as f64 * 7.3) % 100.0).collect();
        let a = map_coordinates(values.iter().copied(), &AREA, 100.0, 120);
        let b = map_coordinates(values.iter().copied(), &AREA, 100.0, 120);
        assert_eq!(a, b);
    }

    #[test]
    fn full_window_spans_the_plot_width() {
        let window = 5;
        let values = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0];
        let points = map_coordinates(values, &AREA, 100.0, window);

        assert_eq!(points.len(), window);
        assert_eq!(points[0].x, AREA.right());
        assert_eq!(points[window - 1].x, AREA.margins.left);
        // Newest first.
        assert_eq!(points[0].y, value_to_y(&AREA, 70.0, 100.0));
        assert_eq!(points[window - 1].y, value_to_y(&AREA, 30.0, 100.0));
    }

    #[test]
    fn short_history_is_not_padded() {
        let points = map_coordinates([1.0, 2.0, 3.0], &AREA, 100.0, 120);
        assert_eq!(points.len(), 3);
        let step = step_x(&AREA, 120);
        assert_eq!(points[2].x, AREA.right() - 2.0 * step);
    }

    #[test]
    fn degenerate_inputs_yield_nothing_or_bottom() {
        let cramped = PlotArea {
            width: 60.0,
            ..AREA
        };
        assert!(map_coordinates([1.0], &cramped, 100.0, 10).is_empty());
        assert!(map_coordinates([1.0], &AREA, 100.0, 0).is_empty());

        let flat = map_coordinates([50.0], &AREA, 0.0, 10);
        assert_eq!(flat[0].y, AREA.bottom());
        assert_eq!(step_x(&AREA, 1), AREA.plot_width());
    }

    #[test]
    fn ticks_cover_plot_edges() {
        let ys = y_ticks(&AREA, 3);
        assert_eq!(ys.first(), Some(&(0.0, AREA.bottom())));
        assert_eq!(ys.last(), Some(&(1.0, AREA.margins.top)));
        let xs = x_ticks(&AREA, 4);
        assert_eq!(xs.len(), 5);
        assert_eq!(xs[4].1, AREA.right());
    }
}
