//! Color-mapped heatmap rendering
//!
//! Turns a model output tensor into a standalone raster: viridis-mapped
//! cells, a title band, and a vertical color-scale legend, encoded as JPEG.

use ab_glyph::{FontVec, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use tract_onnx::prelude::*;

use crate::{Error, Result};

const PANEL_SIZE: u32 = 448;
const MARGIN: u32 = 16;
const TITLE_BAND: u32 = 36;
const LEGEND_WIDTH: u32 = 20;
const LEGEND_GAP: u32 = 12;
const LABEL_WIDTH: u32 = 64;
const JPEG_QUALITY: u8 = 85;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Candidate locations for a label font; annotation text is skipped when
/// none of these exists on the host
const FONT_SEARCH_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
];

/// Renders model outputs as annotated heatmap images
pub struct HeatmapRenderer {
    font: Option<FontVec>,
}

impl HeatmapRenderer {
    /// Create a renderer, picking up a system font for annotations if present
    #[must_use]
    pub fn new() -> Self {
        Self {
            font: load_system_font(),
        }
    }

    /// Render one tensor as a JPEG heatmap byte buffer
    ///
    /// # Errors
    ///
    /// Returns error if the tensor cannot be collapsed to a 2D plane or the
    /// raster fails to encode
    pub fn render(&self, tensor: &Tensor, title: &str) -> Result<Vec<u8>> {
        let plane = tensor_to_plane(tensor)?;
        let (rows, cols) = plane.dim();
        if rows == 0 || cols == 0 {
            return Err(Error::Inference("empty heatmap plane".to_string()));
        }

        let (lo, hi) = value_range(&plane);

        let native = RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
            let t = normalized(plane[(y as usize, x as usize)], lo, hi);
            let color = colorous::VIRIDIS.eval_continuous(f64::from(t));
            Rgb([color.r, color.g, color.b])
        });

        // Nearest keeps patch-score cells crisp at display resolution
        let panel = imageops::resize(&native, PANEL_SIZE, PANEL_SIZE, FilterType::Nearest);

        let width = MARGIN + PANEL_SIZE + LEGEND_GAP + LEGEND_WIDTH + 6 + LABEL_WIDTH + MARGIN;
        let height = TITLE_BAND + PANEL_SIZE + MARGIN;
        let mut canvas = RgbImage::from_pixel(width, height, WHITE);

        imageops::replace(&mut canvas, &panel, i64::from(MARGIN), i64::from(TITLE_BAND));
        self.draw_legend(&mut canvas, lo, hi);
        self.draw_title(&mut canvas, title);

        encode_jpeg(&canvas)
    }

    fn draw_legend(&self, canvas: &mut RgbImage, lo: f32, hi: f32) {
        let x0 = MARGIN + PANEL_SIZE + LEGEND_GAP;

        for dy in 0..PANEL_SIZE {
            let t = 1.0 - f64::from(dy) / f64::from(PANEL_SIZE - 1);
            let color = colorous::VIRIDIS.eval_continuous(t);
            for dx in 0..LEGEND_WIDTH {
                canvas.put_pixel(x0 + dx, TITLE_BAND + dy, Rgb([color.r, color.g, color.b]));
            }
        }

        if let Some(font) = &self.font {
            let label_x = (x0 + LEGEND_WIDTH + 6) as i32;
            draw_text_mut(
                canvas,
                BLACK,
                label_x,
                TITLE_BAND as i32,
                PxScale::from(16.0),
                font,
                &format!("{hi:.2}"),
            );
            draw_text_mut(
                canvas,
                BLACK,
                label_x,
                (TITLE_BAND + PANEL_SIZE - 16) as i32,
                PxScale::from(16.0),
                font,
                &format!("{lo:.2}"),
            );
        }
    }

    fn draw_title(&self, canvas: &mut RgbImage, title: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(
                canvas,
                BLACK,
                MARGIN as i32,
                8,
                PxScale::from(20.0),
                font,
                title,
            );
        }
    }
}

impl Default for HeatmapRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse a model output to a 2D plane: drop leading singleton axes,
/// average any remaining channel axis
fn tensor_to_plane(tensor: &Tensor) -> Result<tract_ndarray::Array2<f32>> {
    let view = tensor
        .to_array_view::<f32>()
        .map_err(|e| Error::Inference(format!("heatmap tensor read failed: {e}")))?;
    let mut plane: tract_ndarray::ArrayD<f32> = view.to_owned();

    while plane.ndim() > 2 && plane.shape()[0] == 1 {
        plane = plane.index_axis_move(tract_ndarray::Axis(0), 0);
    }

    if plane.ndim() == 3 {
        plane = plane
            .mean_axis(tract_ndarray::Axis(0))
            .ok_or_else(|| Error::Inference("empty channel axis".to_string()))?;
    }

    plane
        .into_dimensionality::<tract_ndarray::Ix2>()
        .map_err(|e| Error::Inference(format!("unexpected heatmap shape: {e}")))
}

fn value_range(plane: &tract_ndarray::Array2<f32>) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &v in plane {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }

    if lo.is_finite() && hi.is_finite() {
        (lo, hi)
    } else {
        (0.0, 0.0)
    }
}

fn normalized(value: f32, lo: f32, hi: f32) -> f32 {
    if hi > lo {
        ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn load_system_font() -> Option<FontVec> {
    FONT_SEARCH_PATHS.iter().find_map(|path| {
        let data = std::fs::read(path).ok()?;
        FontVec::try_from_vec(data).ok()
    })
}

fn encode_jpeg(canvas: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder
        .encode_image(&DynamicImage::ImageRgb8(canvas.clone()))
        .map_err(|e| Error::Inference(format!("heatmap encode failed: {e}")))?;
    Ok(bytes)
}
