//! PNG rendering of 2-D fields.
//!
//! Values are mapped through a [`Colormap`] picked from the variable name,
//! no-data pixels stay transparent, and small grids are upscaled by an
//! integer factor. Title and caption travel with the image as `tEXt` chunks.

use crate::catalog;
use std::io::Write;

/// Longest side an upscaled image aims for.
const TARGET_SIDE: usize = 720;
const MAX_UPSCALE: usize = 8;

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn transparent() -> Self {
        Self { r: 0, g: 0, b: 0, a: 0 }
    }
}

/// Linear color interpolation
fn interpolate_color(from: Color, to: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
    Color {
        r: mix(from.r, to.r),
        g: mix(from.g, to.g),
        b: mix(from.b, to.b),
        a: mix(from.a, to.a),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    BlueWhiteRed,
    Terrain,
    Rainbow,
    Blues,
    CoolWarm,
    Viridis,
}

const BLUE_WHITE_RED: &[(f32, Color)] = &[
    (0.0, Color::rgb(33, 102, 172)),
    (0.25, Color::rgb(146, 197, 222)),
    (0.5, Color::rgb(247, 247, 247)),
    (0.75, Color::rgb(244, 165, 130)),
    (1.0, Color::rgb(178, 24, 43)),
];

const TERRAIN: &[(f32, Color)] = &[
    (0.0, Color::rgb(51, 51, 153)),
    (0.15, Color::rgb(0, 153, 255)),
    (0.25, Color::rgb(0, 204, 102)),
    (0.5, Color::rgb(255, 255, 153)),
    (0.75, Color::rgb(128, 92, 84)),
    (1.0, Color::rgb(255, 255, 255)),
];

const RAINBOW: &[(f32, Color)] = &[
    (0.0, Color::rgb(110, 0, 220)),
    (0.2, Color::rgb(0, 64, 255)),
    (0.4, Color::rgb(0, 220, 220)),
    (0.6, Color::rgb(0, 200, 0)),
    (0.8, Color::rgb(255, 230, 0)),
    (1.0, Color::rgb(230, 0, 0)),
];

const BLUES: &[(f32, Color)] = &[
    (0.0, Color::rgb(247, 251, 255)),
    (0.5, Color::rgb(107, 174, 214)),
    (1.0, Color::rgb(8, 48, 107)),
];

const COOL_WARM: &[(f32, Color)] = &[
    (0.0, Color::rgb(59, 76, 192)),
    (0.5, Color::rgb(221, 221, 221)),
    (1.0, Color::rgb(180, 4, 38)),
];

const VIRIDIS: &[(f32, Color)] = &[
    (0.0, Color::rgb(68, 1, 84)),
    (0.25, Color::rgb(59, 82, 139)),
    (0.5, Color::rgb(33, 145, 140)),
    (0.75, Color::rgb(94, 201, 98)),
    (1.0, Color::rgb(253, 231, 37)),
];

impl Colormap {
    /// Picks a colormap from a variable name or alias.
    pub fn for_variable(name: &str) -> Self {
        let name = catalog::lookup(name)
            .map(|spec| spec.name.to_string())
            .unwrap_or_else(|| name.to_ascii_lowercase());

        if name.contains("temperature") {
            Colormap::BlueWhiteRed
        } else if name.contains("geopotential") {
            Colormap::Terrain
        } else if name.contains("pressure") {
            Colormap::Rainbow
        } else if name.contains("precipitation") {
            Colormap::Blues
        } else if name.contains("wind") || name.contains("component") || name.contains("velocity") {
            Colormap::CoolWarm
        } else {
            Colormap::Viridis
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Colormap::BlueWhiteRed => "blue-white-red",
            Colormap::Terrain => "terrain",
            Colormap::Rainbow => "rainbow",
            Colormap::Blues => "blues",
            Colormap::CoolWarm => "cool-warm",
            Colormap::Viridis => "viridis",
        }
    }

    fn stops(self) -> &'static [(f32, Color)] {
        match self {
            Colormap::BlueWhiteRed => BLUE_WHITE_RED,
            Colormap::Terrain => TERRAIN,
            Colormap::Rainbow => RAINBOW,
            Colormap::Blues => BLUES,
            Colormap::CoolWarm => COOL_WARM,
            Colormap::Viridis => VIRIDIS,
        }
    }

    /// Color for a normalized value in `[0, 1]`.
    pub fn color(self, t: f32) -> Color {
        let stops = self.stops();
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };

        for pair in stops.windows(2) {
            let (start, from) = pair[0];
            let (end, to) = pair[1];
            if t <= end {
                return interpolate_color(from, to, (t - start) / (end - start));
            }
        }
        stops[stops.len() - 1].1
    }
}

/// A row-major 2-D field ready to be rendered.
#[derive(Debug, Clone)]
pub struct Field<'a> {
    pub values: &'a [f32],
    pub width: usize,
    pub height: usize,
    /// Value marking missing data, in addition to NaN
    pub fill_value: Option<f32>,
    /// Reverse row order so that north ends up at the top
    pub flip_rows: bool,
}

impl Field<'_> {
    pub fn is_no_data(&self, value: f32) -> bool {
        !value.is_finite() || self.fill_value.is_some_and(|fill| value == fill)
    }
}

/// Maps `field` into RGBA pixels, scaling values between `min` and `max`.
pub fn render_field(field: &Field<'_>, colormap: Colormap, min: f32, max: f32) -> Vec<u8> {
    let range = max - min;
    let range = if range.abs() < f32::EPSILON { 1.0 } else { range };
    let mut pixels = vec![0u8; field.width * field.height * 4];

    for y in 0..field.height {
        let source_row = if field.flip_rows { field.height - 1 - y } else { y };
        for x in 0..field.width {
            let value = field.values[source_row * field.width + x];
            let color = if field.is_no_data(value) {
                Color::transparent()
            } else {
                colormap.color((value - min) / range)
            };

            let offset = (y * field.width + x) * 4;
            pixels[offset..offset + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
        }
    }

    pixels
}

/// Integer factor that brings the longest side close to the target size.
pub fn upscale_factor(width: usize, height: usize) -> usize {
    let longest = width.max(height).max(1);
    (TARGET_SIDE / longest).clamp(1, MAX_UPSCALE)
}

/// Nearest-neighbour upscaling of RGBA pixels.
pub fn upscale(pixels: &[u8], width: usize, height: usize, factor: usize) -> Vec<u8> {
    if factor <= 1 {
        return pixels.to_vec();
    }

    let out_width = width * factor;
    let mut out = Vec::with_capacity(out_width * height * factor * 4);
    for y in 0..height {
        let mut row = Vec::with_capacity(out_width * 4);
        for x in 0..width {
            let offset = (y * width + x) * 4;
            for _ in 0..factor {
                row.extend_from_slice(&pixels[offset..offset + 4]);
            }
        }
        for _ in 0..factor {
            out.extend_from_slice(&row);
        }
    }
    out
}

/// Encodes RGBA pixels as a PNG with optional `tEXt` entries.
pub fn create_png(
    pixels: &[u8],
    width: usize,
    height: usize,
    text: &[(&str, &str)],
) -> std::io::Result<Vec<u8>> {
    let mut png = Vec::new();

    // PNG signature
    png.extend_from_slice(&[137, 80, 78, 71, 13, 10, 26, 10]);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&(width as u32).to_be_bytes());
    ihdr.extend_from_slice(&(height as u32).to_be_bytes());
    // 8-bit RGBA, deflate, no filter, no interlace
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);
    write_chunk(&mut png, b"IHDR", &ihdr);

    for (keyword, value) in text {
        let mut data = Vec::with_capacity(keyword.len() + value.len() + 1);
        data.extend_from_slice(&latin1(keyword));
        data.push(0);
        data.extend_from_slice(&latin1(value));
        write_chunk(&mut png, b"tEXt", &data);
    }

    write_chunk(&mut png, b"IDAT", &deflate_scanlines(pixels, width, height)?);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

fn deflate_scanlines(pixels: &[u8], width: usize, height: usize) -> std::io::Result<Vec<u8>> {
    let stride = width * 4;
    let mut raw = Vec::with_capacity(height * (stride + 1));
    for row in pixels.chunks_exact(stride).take(height) {
        raw.push(0); // filter type: none
        raw.extend_from_slice(row);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&raw)?;
    encoder.finish()
}

/// `tEXt` payloads are Latin-1; other characters become `?`.
fn latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 256 && c != '\0' { c as u8 } else { b'?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colormap_selection() {
        assert_eq!(Colormap::for_variable("temperature"), Colormap::BlueWhiteRed);
        assert_eq!(Colormap::for_variable("t2m"), Colormap::BlueWhiteRed);
        assert_eq!(Colormap::for_variable("geopotential"), Colormap::Terrain);
        assert_eq!(Colormap::for_variable("mean_sea_level_pressure"), Colormap::Rainbow);
        assert_eq!(Colormap::for_variable("total_precipitation"), Colormap::Blues);
        assert_eq!(Colormap::for_variable("10m_u_component_of_wind"), Colormap::CoolWarm);
        assert_eq!(Colormap::for_variable("specific_humidity"), Colormap::Viridis);
    }

    #[test]
    fn test_colormap_endpoints() {
        assert_eq!(Colormap::Viridis.color(0.0), Color::rgb(68, 1, 84));
        assert_eq!(Colormap::Viridis.color(1.0), Color::rgb(253, 231, 37));
        assert_eq!(Colormap::BlueWhiteRed.color(0.5), Color::rgb(247, 247, 247));
        assert_eq!(Colormap::Blues.color(f32::NAN), Color::rgb(247, 251, 255));
    }

    #[test]
    fn test_render_field_transparent_no_data_and_flip() {
        let values = [0.0, f32::NAN, -9999.0, 1.0];
        let field = Field {
            values: &values,
            width: 2,
            height: 2,
            fill_value: Some(-9999.0),
            flip_rows: true,
        };
        let pixels = render_field(&field, Colormap::Viridis, 0.0, 1.0);

        // Row order is reversed: the first output row is the second input row
        assert_eq!(&pixels[0..4], &[0, 0, 0, 0]);
        assert_eq!(&pixels[4..8], &[253, 231, 37, 255]);
        assert_eq!(&pixels[8..12], &[68, 1, 84, 255]);
        assert_eq!(pixels[15], 0);
    }

    #[test]
    fn test_upscale() {
        let pixels = [1, 2, 3, 4, 5, 6, 7, 8];
        let out = upscale(&pixels, 2, 1, 2);
        assert_eq!(out.len(), 2 * 4 * 4);
        assert_eq!(&out[0..8], &[1, 2, 3, 4, 1, 2, 3, 4]);
        assert_eq!(&out[16..24], &[1, 2, 3, 4, 1, 2, 3, 4]);

        assert_eq!(upscale_factor(161, 101), 4);
        assert_eq!(upscale_factor(1440, 721), 1);
        assert_eq!(upscale_factor(3, 2), MAX_UPSCALE);
    }

    #[test]
    fn test_png_structure() {
        let pixels = vec![255u8; 3 * 2 * 4];
        let png = create_png(&pixels, 3, 2, &[("Title", "Temperature at 850 hPa")]).unwrap();

        assert_eq!(&png[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
        assert_eq!(&png[12..16], b"IHDR");
        assert_eq!(u32::from_be_bytes(png[16..20].try_into().unwrap()), 3);
        assert_eq!(u32::from_be_bytes(png[20..24].try_into().unwrap()), 2);
        assert_eq!(&png[37..41], b"tEXt");
        assert!(png.windows(5).any(|w| w == b"Title"));
        assert_eq!(&png[png.len() - 8..png.len() - 4], b"IEND");
    }
}
