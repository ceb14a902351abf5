//! Annotated figures: a rendered field framed by its title, reduction
//! caption and a colorbar legend, and the spatial-mean time-series chart.
//!
//! Text is drawn with the embedded DejaVu Sans font. When the font cannot be
//! parsed the figures are still produced, only without text.

use crate::render::{Color, Colormap};
use image::{Rgba, RgbaImage, imageops};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use log::warn;
use rusttype::{Font, Scale};

/// Embedded font data - DejaVu Sans
const FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

const PADDING: u32 = 12;
const TITLE_SIZE: f32 = 18.0;
const TEXT_SIZE: f32 = 14.0;
const LINE_HEIGHT: u32 = 22;
const COLORBAR_HEIGHT: u32 = 16;
const MIN_CONTENT_WIDTH: u32 = 320;

const CHART_WIDTH: u32 = 720;
const CHART_HEIGHT: u32 = 360;
const CHART_LEFT: u32 = 90;
const CHART_RIGHT: u32 = 24;
const CHART_TOP: u32 = 44;
const CHART_BOTTOM: u32 = 52;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([20, 20, 20, 255]);
const GRID: Rgba<u8> = Rgba([210, 210, 210, 255]);
const SERIES: Rgba<u8> = Rgba([33, 102, 172, 255]);

/// Text and value range shown around a rendered field.
#[derive(Debug, Clone)]
pub struct Annotation<'a> {
    pub title: &'a str,
    /// Which slice of the variable the map shows
    pub caption: &'a str,
    pub units: Option<&'a str>,
    pub min: f32,
    pub max: f32,
    pub colormap: Colormap,
}

/// One spatial mean per timestep.
#[derive(Debug, Clone)]
pub struct TimeSeries<'a> {
    pub title: &'a str,
    pub units: Option<&'a str>,
    pub labels: &'a [String],
    /// `None` where a timestep holds no valid value
    pub values: &'a [Option<f64>],
}

fn load_font() -> Option<Font<'static>> {
    let font = Font::try_from_bytes(FONT_DATA);
    if font.is_none() {
        warn!("Failed to load font; figures are drawn without text");
    }
    font
}

fn text_width(font: Option<&Font<'_>>, size: f32, text: &str) -> u32 {
    font.map(|f| text_size(Scale::uniform(size), f, text).0.max(0) as u32)
        .unwrap_or(0)
}

fn draw_text(image: &mut RgbaImage, font: Option<&Font<'_>>, size: f32, x: i32, y: i32, text: &str) {
    if let Some(font) = font {
        draw_text_mut(image, INK, x, y, Scale::uniform(size), font, text);
    }
}

/// Short numeric label for axes and legends.
pub fn format_tick(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 {
        "0".to_string()
    } else if !(1e-2..1e5).contains(&magnitude) {
        format!("{:.2e}", value)
    } else if magnitude >= 100.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.3}", value)
    }
}

fn with_units(value: f64, units: Option<&str>) -> String {
    match units {
        Some(units) => format!("{} {}", format_tick(value), units),
        None => format_tick(value),
    }
}

/// Frames `map` with the title and caption above it and a colorbar with
/// min, mid and max labels below it. No-data pixels of the map keep their
/// transparency.
pub fn annotate_map(map: &RgbaImage, annotation: &Annotation<'_>) -> RgbaImage {
    let font = load_font();
    let font = font.as_ref();

    let content_width = map
        .width()
        .max(text_width(font, TITLE_SIZE, annotation.title))
        .max(text_width(font, TEXT_SIZE, annotation.caption))
        .max(MIN_CONTENT_WIDTH);
    let width = content_width + 2 * PADDING;

    let header = PADDING + 2 * LINE_HEIGHT;
    let colorbar_top = header + map.height() + PADDING;
    let height = colorbar_top + COLORBAR_HEIGHT + 4 + LINE_HEIGHT + PADDING;

    let mut image = RgbaImage::from_pixel(width, height, BACKGROUND);

    draw_text(&mut image, font, TITLE_SIZE, PADDING as i32, PADDING as i32, annotation.title);
    draw_text(
        &mut image,
        font,
        TEXT_SIZE,
        PADDING as i32,
        (PADDING + LINE_HEIGHT) as i32,
        annotation.caption,
    );

    let map_x = PADDING + (content_width - map.width()) / 2;
    imageops::replace(&mut image, map, map_x as i64, header as i64);

    draw_colorbar(&mut image, PADDING, colorbar_top, content_width, annotation.colormap);

    let labels_y = (colorbar_top + COLORBAR_HEIGHT + 4) as i32;
    let (min, max) = (annotation.min as f64, annotation.max as f64);
    let min_label = with_units(min, annotation.units);
    let mid_label = format_tick((min + max) / 2.0);
    let max_label = with_units(max, annotation.units);

    draw_text(&mut image, font, TEXT_SIZE, PADDING as i32, labels_y, &min_label);
    let mid_width = text_width(font, TEXT_SIZE, &mid_label);
    draw_text(
        &mut image,
        font,
        TEXT_SIZE,
        (PADDING + content_width / 2) as i32 - mid_width as i32 / 2,
        labels_y,
        &mid_label,
    );
    let max_width = text_width(font, TEXT_SIZE, &max_label);
    draw_text(
        &mut image,
        font,
        TEXT_SIZE,
        (PADDING + content_width) as i32 - max_width as i32,
        labels_y,
        &max_label,
    );

    image
}

fn draw_colorbar(image: &mut RgbaImage, x: u32, y: u32, width: u32, colormap: Colormap) {
    let span = width.saturating_sub(1).max(1) as f32;
    for dx in 0..width {
        let Color { r, g, b, a } = colormap.color(dx as f32 / span);
        for dy in 0..COLORBAR_HEIGHT {
            image.put_pixel(x + dx, y + dy, Rgba([r, g, b, a]));
        }
    }
    draw_hollow_rect_mut(image, Rect::at(x as i32, y as i32).of_size(width, COLORBAR_HEIGHT), INK);
}

/// Line chart of one value per timestep. Timesteps without a value leave a
/// gap in the line.
pub fn time_series_chart(series: &TimeSeries<'_>) -> RgbaImage {
    let font = load_font();
    let font = font.as_ref();
    let mut image = RgbaImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, BACKGROUND);

    draw_text(&mut image, font, TITLE_SIZE, PADDING as i32, PADDING as i32, series.title);

    let left = CHART_LEFT as f32;
    let right = (CHART_WIDTH - CHART_RIGHT) as f32;
    let top = CHART_TOP as f32;
    let bottom = (CHART_HEIGHT - CHART_BOTTOM) as f32;

    let defined: Vec<f64> = series.values.iter().flatten().copied().collect();
    let (mut low, mut high) = defined
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if defined.is_empty() {
        (low, high) = (0.0, 1.0);
    } else if (high - low).abs() < f64::EPSILON {
        (low, high) = (low - 0.5, high + 0.5);
    }

    draw_line_segment_mut(&mut image, (left, top), (right, top), GRID);
    draw_line_segment_mut(&mut image, (left, top), (left, bottom), INK);
    draw_line_segment_mut(&mut image, (left, bottom), (right, bottom), INK);

    let count = series.values.len();
    let x_at = |i: usize| {
        if count <= 1 {
            (left + right) / 2.0
        } else {
            left + (right - left) * i as f32 / (count - 1) as f32
        }
    };
    let y_at = |v: f64| bottom - (bottom - top) * ((v - low) / (high - low)) as f32;

    let mut previous: Option<(f32, f32)> = None;
    for (i, value) in series.values.iter().enumerate() {
        let Some(value) = value else {
            previous = None;
            continue;
        };
        let point = (x_at(i), y_at(*value));
        if let Some(from) = previous {
            draw_line_segment_mut(&mut image, from, point, SERIES);
        }
        draw_filled_rect_mut(
            &mut image,
            Rect::at(point.0 as i32 - 2, point.1 as i32 - 2).of_size(5, 5),
            SERIES,
        );
        previous = Some(point);
    }

    let high_label = with_units(high, series.units);
    let low_label = with_units(low, series.units);
    for (label, y) in [(high_label, top), (low_label, bottom)] {
        let width = text_width(font, TEXT_SIZE, &label) as i32;
        draw_text(&mut image, font, TEXT_SIZE, left as i32 - 6 - width, y as i32 - 8, &label);
    }

    if let Some(first) = series.labels.first() {
        draw_text(&mut image, font, TEXT_SIZE, left as i32, bottom as i32 + 8, first);
    }
    if series.labels.len() > 1
        && let Some(last) = series.labels.last()
    {
        let width = text_width(font, TEXT_SIZE, last) as i32;
        draw_text(&mut image, font, TEXT_SIZE, right as i32 - width, bottom as i32 + 8, last);
    }

    image
}
