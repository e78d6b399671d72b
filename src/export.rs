//! Export module
//!
//! Renders the visible window of the canvas to a PNG image or an SVG page.
//! The core only produces bytes and a suggested file name; presenting them
//! is up to the host.

use crate::error::ExportError;
use crate::noise::fill_pattern;
use crate::renderer::{CoordinateTransform, RasterSurface, StrokeRenderer, Surface};
use crate::{Color, Point, Stroke};
use chrono::{DateTime, Local};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Largest raster edge we are willing to allocate, in pixels.
const MAX_RASTER_EDGE: f64 = 16384.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    /// Vector page.
    Svg,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Svg => "svg",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExportFormat::Png => "PNG",
            ExportFormat::Svg => "SVG",
        }
    }
}

/// Export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Pixels per world unit (raster only).
    pub resolution: f64,
    /// Padding around the visible window, in world units.
    pub margin: f64,
    pub include_noise: bool,
    pub transparent: bool,
    pub auto_name: bool,
    pub prefix: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Png,
            resolution: 2.0,
            margin: 0.0,
            include_noise: true,
            transparent: false,
            auto_name: true,
            prefix: "TapeCanvas_".to_string(),
        }
    }
}

/// The part of the world being exported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportView {
    pub width: f64,
    pub height: f64,
    /// World position of the view's top-left corner.
    pub offset: Point,
}

impl ExportView {
    /// Page size including the margin on both sides.
    fn page_size(&self, margin: f64) -> (f64, f64) {
        (self.width + 2.0 * margin, self.height + 2.0 * margin)
    }

    /// Maps world points onto the page.
    fn transform(&self, margin: f64) -> CoordinateTransform {
        CoordinateTransform::ViewRelative {
            offset: self.offset - Point::new(margin, margin),
        }
    }
}

/// Bytes plus the name the host should offer when sharing them.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFile {
    pub file_name: String,
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
}

/// Suggested file name for an export made at `now`.
pub fn export_file_name(options: &ExportOptions, now: DateTime<Local>) -> String {
    let ext = options.format.extension();
    if options.auto_name {
        format!("{}{}.{}", options.prefix, now.format("%Y-%m-%d_%H-%M-%S"), ext)
    } else {
        format!("TapeCanvas.{}", ext)
    }
}

/// Render `strokes` through `view` in the configured format.
pub fn export<'a, I>(
    strokes: I,
    view: ExportView,
    background: Color,
    noise_tile: Option<&RgbaImage>,
    options: &ExportOptions,
    now: DateTime<Local>,
) -> Result<ExportedFile, ExportError>
where
    I: IntoIterator<Item = &'a Stroke>,
{
    let bytes = match options.format {
        ExportFormat::Png => render_png(strokes, view, background, noise_tile, options)?,
        ExportFormat::Svg => render_svg(strokes, view, background, options)?,
    };
    Ok(ExportedFile {
        file_name: export_file_name(options, now),
        format: options.format,
        bytes,
    })
}

/// Rasterize the view and encode it as PNG.
pub fn render_png<'a, I>(
    strokes: I,
    view: ExportView,
    background: Color,
    noise_tile: Option<&RgbaImage>,
    options: &ExportOptions,
) -> Result<Vec<u8>, ExportError>
where
    I: IntoIterator<Item = &'a Stroke>,
{
    let image = rasterize(strokes, view, background, noise_tile, options)?;
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    log::info!(
        "exported {}x{} PNG ({} bytes)",
        image.width(),
        image.height(),
        bytes.len()
    );
    Ok(bytes)
}

/// Rasterize the view into an RGBA image.
pub fn rasterize<'a, I>(
    strokes: I,
    view: ExportView,
    background: Color,
    noise_tile: Option<&RgbaImage>,
    options: &ExportOptions,
) -> Result<RgbaImage, ExportError>
where
    I: IntoIterator<Item = &'a Stroke>,
{
    let margin = options.margin.max(0.0);
    let scale = options.resolution;
    let (page_w, page_h) = view.page_size(margin);
    let (px_w, px_h) = (page_w * scale, page_h * scale);
    let valid = |v: f64| v.is_finite() && v >= 1.0 && v <= MAX_RASTER_EDGE;
    if !(scale > 0.0) || !valid(px_w) || !valid(px_h) {
        return Err(ExportError::InvalidSize {
            width: px_w,
            height: px_h,
        });
    }

    let fill = if options.transparent {
        Color::TRANSPARENT
    } else {
        background
    };
    let mut image = RgbaImage::from_pixel(px_w.ceil() as u32, px_h.ceil() as u32, fill.to_rgba8());

    if options.include_noise && !options.transparent {
        if let Some(tile) = noise_tile {
            let origin = (margin * scale).round() as u32;
            let content = (
                (view.width * scale).round() as u32,
                (view.height * scale).round() as u32,
            );
            fill_pattern(&mut image, tile, (origin, origin), content);
        }
    }

    let mut surface = RasterSurface::from_image(image, scale);
    StrokeRenderer::new().render_all(strokes, &mut surface, view.transform(margin));
    Ok(surface.into_image())
}

/// Vector target collecting line elements for an SVG page.
#[derive(Debug, Default)]
pub struct SvgSurface {
    lines: Vec<SvgLine>,
}

#[derive(Debug, Clone, Copy)]
struct SvgLine {
    start: Point,
    end: Point,
    width: f64,
    color: Color,
}

impl SvgSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Write the page. `background` of `None` leaves it transparent.
    pub fn finish(
        &self,
        width: f64,
        height: f64,
        background: Option<Color>,
    ) -> Result<String, ExportError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let (w, h) = (fmt_num(width), fmt_num(height));
        let view_box = format!("0 0 {} {}", w, h);
        let mut svg = BytesStart::new("svg");
        svg.push_attribute(("xmlns", "http://www.w3.org/2000/svg"));
        svg.push_attribute(("width", w.as_str()));
        svg.push_attribute(("height", h.as_str()));
        svg.push_attribute(("viewBox", view_box.as_str()));
        writer.write_event(Event::Start(svg))?;

        if let Some(color) = background {
            let fill = color.to_hex();
            let mut rect = BytesStart::new("rect");
            rect.push_attribute(("width", w.as_str()));
            rect.push_attribute(("height", h.as_str()));
            rect.push_attribute(("fill", fill.as_str()));
            writer.write_event(Event::Empty(rect))?;
        }

        let mut group = BytesStart::new("g");
        group.push_attribute(("fill", "none"));
        group.push_attribute(("stroke-linecap", "round"));
        group.push_attribute(("stroke-linejoin", "round"));
        writer.write_event(Event::Start(group))?;

        for line in &self.lines {
            let stroke = line.color.to_hex();
            let opacity = fmt_num(line.color.alpha);
            let coords = [
                fmt_num(line.start.x),
                fmt_num(line.start.y),
                fmt_num(line.end.x),
                fmt_num(line.end.y),
            ];
            let stroke_width = fmt_num(line.width);
            let mut element = BytesStart::new("line");
            element.push_attribute(("x1", coords[0].as_str()));
            element.push_attribute(("y1", coords[1].as_str()));
            element.push_attribute(("x2", coords[2].as_str()));
            element.push_attribute(("y2", coords[3].as_str()));
            element.push_attribute(("stroke", stroke.as_str()));
            element.push_attribute(("stroke-opacity", opacity.as_str()));
            element.push_attribute(("stroke-width", stroke_width.as_str()));
            writer.write_event(Event::Empty(element))?;
        }

        writer.write_event(Event::End(BytesEnd::new("g")))?;
        writer.write_event(Event::End(BytesEnd::new("svg")))?;

        Ok(String::from_utf8(writer.into_inner().into_inner())?)
    }
}

impl Surface for SvgSurface {
    fn stroke_line(&mut self, start: Point, end: Point, width: f64, color: Color) {
        self.lines.push(SvgLine {
            start,
            end,
            width,
            color,
        });
    }
}

/// Render the view as an SVG page. Paper grain is raster-only.
pub fn render_svg<'a, I>(
    strokes: I,
    view: ExportView,
    background: Color,
    options: &ExportOptions,
) -> Result<Vec<u8>, ExportError>
where
    I: IntoIterator<Item = &'a Stroke>,
{
    let margin = options.margin.max(0.0);
    let (page_w, page_h) = view.page_size(margin);
    if !(page_w > 0.0 && page_h > 0.0 && page_w.is_finite() && page_h.is_finite()) {
        return Err(ExportError::InvalidSize {
            width: page_w,
            height: page_h,
        });
    }

    let mut surface = SvgSurface::new();
    StrokeRenderer::new().render_all(strokes, &mut surface, view.transform(margin));
    let fill = (!options.transparent).then_some(background);
    let page = surface.finish(page_w, page_h, fill)?;
    log::info!("exported SVG page with {} lines", surface.line_count());
    Ok(page.into_bytes())
}

/// Up to three decimals, trailing zeros trimmed.
fn fmt_num(value: f64) -> String {
    let text = format!("{:.3}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stroke_across(y: f64) -> Stroke {
        let mut stroke = Stroke::begin(Point::new(110.0, y), 0.0, Color::BLACK, 4.0);
        for i in 1..12 {
            stroke.push(Point::new(110.0 + i as f64 * 6.0, y), i as f64 * 0.05);
        }
        stroke
    }

    fn no_strokes() -> Vec<&'static Stroke> {
        Vec::new()
    }

    fn view() -> ExportView {
        ExportView {
            width: 100.0,
            height: 60.0,
            offset: Point::new(100.0, 0.0),
        }
    }

    #[test]
    fn test_file_names() {
        let now = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let mut options = ExportOptions::default();
        assert_eq!(export_file_name(&options, now), "TapeCanvas_2026-03-04_05-06-07.png");

        options.auto_name = false;
        options.format = ExportFormat::Svg;
        assert_eq!(export_file_name(&options, now), "TapeCanvas.svg");
    }

    #[test]
    fn test_rasterize_dimensions_follow_resolution_and_margin() {
        let mut options = ExportOptions::default();
        options.margin = 10.0;
        let image = rasterize(no_strokes(), view(), Color::WHITE, None, &options).unwrap();
        assert_eq!(image.dimensions(), (240, 160));
    }

    #[test]
    fn test_rasterize_draws_offset_strokes() {
        let options = ExportOptions {
            resolution: 1.0,
            include_noise: false,
            ..ExportOptions::default()
        };
        let stroke = stroke_across(30.0);
        let image = rasterize([&stroke], view(), Color::WHITE, None, &options).unwrap();

        // World x 130 lands at page x 30.
        assert_eq!(image.get_pixel(30, 30).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(30, 5).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_transparent_export_has_clear_background() {
        let options = ExportOptions {
            resolution: 1.0,
            transparent: true,
            ..ExportOptions::default()
        };
        let tile = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]));
        let image = rasterize(no_strokes(), view(), Color::WHITE, Some(&tile), &options).unwrap();
        assert_eq!(image.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn test_noise_stays_inside_margin() {
        let options = ExportOptions {
            resolution: 1.0,
            margin: 5.0,
            ..ExportOptions::default()
        };
        let tile = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]));
        let image = rasterize(no_strokes(), view(), Color::WHITE, Some(&tile), &options).unwrap();
        assert_eq!(image.get_pixel(2, 2).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(10, 10).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_invalid_sizes_are_rejected() {
        let empty = ExportView {
            width: 0.0,
            height: 0.0,
            offset: Point::ZERO,
        };
        let options = ExportOptions::default();
        assert!(matches!(
            rasterize(no_strokes(), empty, Color::WHITE, None, &options),
            Err(ExportError::InvalidSize { .. })
        ));
        assert!(render_svg(no_strokes(), empty, Color::WHITE, &options).is_err());

        let huge = ExportView {
            width: 1e9,
            ..view()
        };
        assert!(rasterize(no_strokes(), huge, Color::WHITE, None, &options).is_err());
    }

    #[test]
    fn test_png_bytes_decode() {
        let options = ExportOptions::default();
        let stroke = stroke_across(30.0);
        let bytes = render_png([&stroke], view(), Color::WHITE, None, &options).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 120));
    }

    #[test]
    fn test_svg_page_contains_lines() {
        let options = ExportOptions {
            format: ExportFormat::Svg,
            ..ExportOptions::default()
        };
        let stroke = stroke_across(30.0);
        let now = Local.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let file = export([&stroke], view(), Color::WHITE, None, &options, now).unwrap();
        let page = String::from_utf8(file.bytes).unwrap();

        assert!(file.file_name.ends_with(".svg"));
        assert!(page.starts_with("<?xml"));
        assert!(page.contains("viewBox=\"0 0 100 60\""));
        assert!(page.contains("<rect"));
        assert_eq!(page.matches("<line ").count(), 11);
        assert!(page.contains("stroke-linecap=\"round\""));
        assert!(page.contains("x1=\"10\""));
    }

    #[test]
    fn test_transparent_svg_has_no_background() {
        let options = ExportOptions {
            format: ExportFormat::Svg,
            transparent: true,
            ..ExportOptions::default()
        };
        let bytes = render_svg(no_strokes(), view(), Color::WHITE, &options).unwrap();
        assert!(!String::from_utf8(bytes).unwrap().contains("<rect"));
    }

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(10.0), "10");
        assert_eq!(fmt_num(2.5), "2.5");
        assert_eq!(fmt_num(1.23456), "1.235");
        assert_eq!(fmt_num(-0.0001), "0");
    }
}
