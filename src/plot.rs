//! Plot helpers for drawers.
//!
//! Thin wrappers over `egui_plot` for the common cases: one plot in its own
//! window, a plot inside an existing `Ui`, and a window holding a grid of
//! plots. Titles follow the egui label convention: anything after `##` only
//! contributes to the id and is not displayed.

use std::ops::RangeInclusive;

use egui::{Painter, Pos2, Rect, Stroke};
use egui_plot::{Plot, PlotBounds, PlotUi};

/// Default dash length for [`dashed_line`], in points.
pub const DEFAULT_DASH_LEN: f32 = 6.0;
/// Default gap length for [`dashed_line`], in points.
pub const DEFAULT_GAP_LEN: f32 = 4.0;

/// Initial axis limits of a plot. Applied on the plot's first frame only;
/// the user can pan and zoom away from them afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLimits {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl AxisLimits {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }
}

impl From<AxisLimits> for PlotBounds {
    fn from(limits: AxisLimits) -> Self {
        PlotBounds::from_min_max(
            [limits.min_x, limits.min_y],
            [limits.max_x, limits.max_y],
        )
    }
}

/// Grid line spacing, in points, over which grid lines fade in.
///
/// Lines closer than the minimum are hidden; they only reach full strength
/// far past egui_plot's default of 300 points, which keeps the grid faint at
/// normal zoom levels.
pub const GRID_FADE_SPACING: RangeInclusive<f32> = 8.0..=1200.0;

/// Visible part of an egui-style label.
fn display_label(label: &str) -> &str {
    label.split("##").next().unwrap_or(label)
}

/// Open a window containing one plot that fills it.
///
/// The window is titled `window_title`, or `plot_title` if none is given.
/// Returns `None` when the window is closed or collapsed; `add` is not
/// called then.
pub fn plot_window<R>(
    ctx: &egui::Context,
    plot_title: &str,
    window_title: Option<&str>,
    limits: Option<AxisLimits>,
    add: impl FnOnce(&mut PlotUi) -> R,
) -> Option<R> {
    egui::Window::new(window_title.unwrap_or(plot_title))
        .default_size([480.0, 320.0])
        .show(ctx, |ui| plot(ui, plot_title, limits, add))
        .and_then(|response| response.inner)
}

/// Add a plot filling the remaining space of `ui`.
pub fn plot<R>(
    ui: &mut egui::Ui,
    plot_title: &str,
    limits: Option<AxisLimits>,
    add: impl FnOnce(&mut PlotUi) -> R,
) -> R {
    let label = display_label(plot_title);
    if !label.is_empty() {
        ui.vertical_centered(|ui| ui.strong(label));
    }

    let once_id = ui.id().with(plot_title).with("initial_limits");
    let first_frame = ui.ctx().data_mut(|data| {
        let seen = data.get_temp::<bool>(once_id).unwrap_or(false);
        data.insert_temp(once_id, true);
        !seen
    });

    Plot::new(plot_title)
        .show_grid(true)
        .grid_spacing(GRID_FADE_SPACING)
        .show(ui, |plot_ui| {
            if let Some(limits) = limits.filter(|_| first_frame) {
                plot_ui.set_plot_bounds(limits.into());
            }
            add(plot_ui)
        })
        .inner
}

/// Open a window with a `rows` x `cols` grid of plots.
///
/// `add` is called once per cell with the cell index, row-major. Returns
/// `false` for an empty grid or when the window is closed or collapsed.
pub fn subplots(
    ctx: &egui::Context,
    plot_title: &str,
    window_title: Option<&str>,
    rows: usize,
    cols: usize,
    mut add: impl FnMut(usize, &mut PlotUi),
) -> bool {
    if rows == 0 || cols == 0 {
        return false;
    }

    egui::Window::new(window_title.unwrap_or(plot_title))
        .default_size([640.0, 480.0])
        .show(ctx, |ui| {
            let label = display_label(plot_title);
            if !label.is_empty() {
                ui.vertical_centered(|ui| ui.strong(label));
            }

            let spacing = ui.spacing().item_spacing;
            let available = ui.available_size();
            let cell_width = ((available.x - spacing.x * (cols - 1) as f32) / cols as f32).max(1.0);
            let cell_height = ((available.y - spacing.y * (rows - 1) as f32) / rows as f32).max(1.0);

            egui::Grid::new(plot_title).num_columns(cols).show(ui, |ui| {
                for row in 0..rows {
                    for col in 0..cols {
                        let index = row * cols + col;
                        Plot::new((plot_title, index))
                            .show_grid(true)
                            .grid_spacing(GRID_FADE_SPACING)
                            .width(cell_width)
                            .height(cell_height)
                            .show(ui, |plot_ui| add(index, plot_ui));
                    }
                    ui.end_row();
                }
            });
        })
        .and_then(|response| response.inner)
        .is_some()
}

/// Upper bound on the dashes produced for one line.
pub const MAX_DASHES: usize = 1 << 16;

/// Split the line from `p1` to `p2` into dashes.
///
/// Dashes start at `p1` and are `dash_len` long, separated by `gap_len`; the
/// last one is clipped at `p2`. Zero-length lines and non-positive dash
/// lengths produce nothing. Negative gaps are treated as zero. At most
/// [`MAX_DASHES`] dashes are produced, counted from `p1`.
pub fn dash_segments(p1: Pos2, p2: Pos2, dash_len: f32, gap_len: f32) -> Vec<[Pos2; 2]> {
    visible_dash_segments(p1, p2, dash_len, gap_len, None)
}

/// Like [`dash_segments`], keeping only dashes that touch `clip`.
///
/// Dash positions are still measured from `p1`, so the pattern does not
/// shift as the visible part of the line changes.
pub fn visible_dash_segments(
    p1: Pos2,
    p2: Pos2,
    dash_len: f32,
    gap_len: f32,
    clip: Option<Rect>,
) -> Vec<[Pos2; 2]> {
    let (dx, dy) = (f64::from(p2.x - p1.x), f64::from(p2.y - p1.y));
    let len = dx.hypot(dy);
    if !(len > 0.0 && len.is_finite() && dash_len > 0.0) {
        return Vec::new();
    }

    let (from, to) = match clip {
        Some(rect) => match clip_range(p1, p2, rect) {
            Some((t0, t1)) => (t0 * len, t1 * len),
            None => return Vec::new(),
        },
        None => (0.0, len),
    };

    let dash = f64::from(dash_len);
    let step = dash + f64::from(gap_len.max(0.0));
    // dash i covers [i * step, i * step + dash]
    let first = ((from - dash) / step).ceil().max(0.0);
    let last = (to / step).ceil();
    let count = (last - first).clamp(0.0, MAX_DASHES as f64) as u64;

    let at = |dist: f64| {
        let t = dist / len;
        Pos2::new(
            (f64::from(p1.x) + dx * t) as f32,
            (f64::from(p1.y) + dy * t) as f32,
        )
    };
    let first = first as u64;
    (first..first + count)
        .map(|i| i as f64 * step)
        .take_while(|&start| start < len)
        .map(|start| [at(start), at((start + dash).min(len))])
        .collect()
}

/// Parameter range `[t0, t1]` of the segment `p1..p2` inside `rect`.
fn clip_range(p1: Pos2, p2: Pos2, rect: Rect) -> Option<(f64, f64)> {
    let (x0, y0) = (f64::from(p1.x), f64::from(p1.y));
    let (dx, dy) = (f64::from(p2.x) - x0, f64::from(p2.y) - y0);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    let edges = [
        (-dx, x0 - f64::from(rect.min.x)),
        (dx, f64::from(rect.max.x) - x0),
        (-dy, y0 - f64::from(rect.min.y)),
        (dy, f64::from(rect.max.y) - y0),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
    }
    (t0 <= t1).then_some((t0, t1))
}

/// Paint a dashed line from `p1` to `p2`.
///
/// Only dashes inside the painter's clip rectangle are generated.
pub fn dashed_line(
    painter: &Painter,
    p1: Pos2,
    p2: Pos2,
    stroke: impl Into<Stroke>,
    dash_len: f32,
    gap_len: f32,
) {
    let stroke = stroke.into();
    let clip = Some(painter.clip_rect());
    for segment in visible_dash_segments(p1, p2, dash_len, gap_len, clip) {
        painter.line_segment(segment, stroke);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;
    use egui_plot::{Line, PlotPoints};
    use rstest::rstest;

    fn run_frame(f: impl FnOnce(&egui::Context)) {
        let ctx = egui::Context::default();
        let input = egui::RawInput {
            screen_rect: Some(egui::Rect::from_min_size(
                Pos2::ZERO,
                egui::vec2(1024.0, 768.0),
            )),
            ..Default::default()
        };
        let _ = ctx.run(input, f);
    }

    fn lengths(segments: &[[Pos2; 2]]) -> Vec<f32> {
        segments.iter().map(|[a, b]| (*b - *a).length()).collect()
    }

    #[rstest]
    #[case::exact_fit(20.0, vec![6.0, 6.0])]
    #[case::clipped_last_dash(13.0, vec![6.0, 3.0])]
    #[case::shorter_than_dash(4.0, vec![4.0])]
    fn test_dash_lengths(#[case] len: f32, #[case] expected: Vec<f32>) {
        let segments = dash_segments(pos2(0.0, 0.0), pos2(len, 0.0), 6.0, 4.0);
        let got = lengths(&segments);
        assert_eq!(got.len(), expected.len());
        for (g, e) in got.iter().zip(&expected) {
            assert!((g - e).abs() < 1e-4, "{got:?} != {expected:?}");
        }
    }

    #[test]
    fn test_dashes_follow_direction() {
        let segments = dash_segments(pos2(10.0, 10.0), pos2(10.0, 30.0), 6.0, 4.0);
        assert_eq!(segments[0], [pos2(10.0, 10.0), pos2(10.0, 16.0)]);
        assert_eq!(segments[1], [pos2(10.0, 20.0), pos2(10.0, 26.0)]);
    }

    #[rstest]
    #[case::zero_length(pos2(5.0, 5.0), pos2(5.0, 5.0), 6.0)]
    #[case::zero_dash(Pos2::ZERO, pos2(50.0, 0.0), 0.0)]
    #[case::negative_dash(Pos2::ZERO, pos2(50.0, 0.0), -1.0)]
    fn test_dash_degenerate(#[case] start: Pos2, #[case] end: Pos2, #[case] dash_len: f32) {
        assert!(dash_segments(start, end, dash_len, 4.0).is_empty());
    }

    #[rstest]
    #[case::past_f32_precision(2.0e7, 1.0, 0.0)]
    #[case::tiny_dashes(1.0e6, 0.001, 0.001)]
    fn test_long_line_is_capped(#[case] len: f32, #[case] dash_len: f32, #[case] gap_len: f32) {
        let segments = dash_segments(Pos2::ZERO, pos2(len, 0.0), dash_len, gap_len);
        assert_eq!(segments.len(), MAX_DASHES);
        assert_eq!(segments[0][0], Pos2::ZERO);
        assert!(segments.windows(2).all(|pair| pair[0][0].x <= pair[1][0].x));
    }

    #[test]
    fn test_clipped_dashes_keep_phase() {
        let clip = egui::Rect::from_min_max(pos2(1002.0, -10.0), pos2(1103.0, 10.0));
        let segments =
            visible_dash_segments(Pos2::ZERO, pos2(2.0e7, 0.0), 6.0, 4.0, Some(clip));

        assert_eq!(segments.len(), 11);
        assert_eq!(segments[0], [pos2(1000.0, 0.0), pos2(1006.0, 0.0)]);
        assert_eq!(segments[10], [pos2(1100.0, 0.0), pos2(1106.0, 0.0)]);
    }

    #[test]
    fn test_line_outside_clip_draws_nothing() {
        let clip = egui::Rect::from_min_max(pos2(0.0, 0.0), pos2(100.0, 100.0));
        let segments =
            visible_dash_segments(pos2(0.0, 200.0), pos2(100.0, 200.0), 6.0, 4.0, Some(clip));
        assert!(segments.is_empty());
    }

    #[test]
    fn test_negative_gap_gives_solid_line() {
        let segments = dash_segments(pos2(0.0, 0.0), pos2(12.0, 0.0), 6.0, -3.0);
        assert_eq!(lengths(&segments), vec![6.0, 6.0]);
    }

    #[test]
    fn test_display_label() {
        assert_eq!(display_label("Signal##left"), "Signal");
        assert_eq!(display_label("##hidden"), "");
        assert_eq!(display_label("plain"), "plain");
    }

    #[test]
    fn test_plot_returns_builder_result() {
        run_frame(|ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                let points = plot(ui, "sine", Some(AxisLimits::new(0.0, 1.0, -1.0, 1.0)), |plot_ui| {
                    let points: PlotPoints = (0..10).map(|i| [i as f64 * 0.1, 0.0]).collect();
                    plot_ui.line(Line::new(points));
                    10
                });
                assert_eq!(points, 10);
            });
        });
    }

    #[test]
    fn test_subplots_visits_every_cell() {
        run_frame(|ctx| {
            let mut visited = Vec::new();
            let open = subplots(ctx, "grid", None, 2, 3, |index, _| visited.push(index));
            assert!(open);
            assert_eq!(visited, vec![0, 1, 2, 3, 4, 5]);
        });
    }

    #[test]
    fn test_empty_subplot_grid() {
        run_frame(|ctx| {
            let mut called = false;
            assert!(!subplots(ctx, "grid", None, 0, 3, |_, _| called = true));
            assert!(!called);
        });
    }
}
