use crate::error::Result;
use crate::events::{Rectangle, Renderer, VisualArtifact};
use image::{ImageBuffer, Rgba, RgbaImage};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const MARGIN: u32 = 40;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const AXIS: Rgba<u8> = Rgba([100, 116, 139, 255]);
const CURVE: Rgba<u8> = Rgba([30, 64, 175, 255]);
const INSIDE: Rgba<u8> = Rgba([34, 197, 94, 255]);
const OUTSIDE: Rgba<u8> = Rgba([239, 68, 68, 255]);

const WORKER_COLORS: [[u8; 3]; 8] = [
    [59, 130, 246],
    [16, 185, 129],
    [245, 158, 11],
    [139, 92, 246],
    [236, 72, 153],
    [20, 184, 166],
    [249, 115, 22],
    [99, 102, 241],
];

/// Records drawn artifacts in order and rasterizes them on demand.
#[derive(Default)]
pub struct Canvas {
    artifacts: Mutex<Vec<VisualArtifact>>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    fn artifacts_mut(&self) -> MutexGuard<'_, Vec<VisualArtifact>> {
        self.artifacts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn artifacts(&self) -> Vec<VisualArtifact> {
        self.artifacts_mut().clone()
    }

    pub fn len(&self) -> usize {
        self.artifacts_mut().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Draws axes, the quarter circle and every recorded artifact on a square image.
    pub fn render(&self, size: u32) -> RgbaImage {
        let size = size.max(2 * MARGIN + 10);
        let plot = size - 2 * MARGIN;
        let mut img: RgbaImage = ImageBuffer::from_pixel(size, size, BACKGROUND);

        for artifact in self.artifacts_mut().iter() {
            match artifact {
                VisualArtifact::Rectangle(rect) => fill_rectangle(&mut img, plot, rect),
                VisualArtifact::Point { x, y, inside } => {
                    let color = if *inside { INSIDE } else { OUTSIDE };
                    let (px, py) = to_pixel(plot, *x, *y);
                    for dy in 0..2 {
                        for dx in 0..2 {
                            put(&mut img, px + dx, py.saturating_sub(dy), color);
                        }
                    }
                }
            }
        }

        // Axes
        for t in 0..=plot {
            put(&mut img, MARGIN + t, MARGIN + plot, AXIS);
            put(&mut img, MARGIN, MARGIN + t, AXIS);
        }

        // Quarter circle y = sqrt(1 - x^2)
        let steps = plot * 4;
        for s in 0..=steps {
            let x = s as f64 / steps as f64;
            let y = (1.0 - x * x).max(0.0).sqrt();
            let (px, py) = to_pixel(plot, x, y);
            put(&mut img, px, py, CURVE);
        }

        img
    }

    pub fn save(&self, path: impl AsRef<Path>, size: u32) -> Result<()> {
        self.render(size).save(path)?;
        Ok(())
    }
}

impl Renderer for Canvas {
    fn draw_point(&self, x: f64, y: f64, inside: bool) {
        self.artifacts_mut().push(VisualArtifact::Point { x, y, inside });
    }

    fn draw_rectangle(&self, rect: &Rectangle) {
        self.artifacts_mut().push(VisualArtifact::Rectangle(*rect));
    }

    fn clear(&self) {
        self.artifacts_mut().clear();
    }
}

fn to_pixel(plot: u32, x: f64, y: f64) -> (u32, u32) {
    let px = MARGIN + (x.clamp(0.0, 1.0) * plot as f64) as u32;
    let py = MARGIN + plot - (y.clamp(0.0, 1.0) * plot as f64) as u32;
    (px, py)
}

fn put(img: &mut RgbaImage, x: u32, y: u32, color: Rgba<u8>) {
    if x < img.width() && y < img.height() {
        img.put_pixel(x, y, color);
    }
}

fn fill_rectangle(img: &mut RgbaImage, plot: u32, rect: &Rectangle) {
    let [r, g, b] = WORKER_COLORS[rect.worker_id % WORKER_COLORS.len()];
    let (x0, y0) = to_pixel(plot, rect.x, rect.height);
    let (x1, _) = to_pixel(plot, rect.x + rect.width, 0.0);
    let bottom = MARGIN + plot;

    for y in y0..bottom {
        for x in x0..=x1.max(x0) {
            if x >= img.width() || y >= img.height() {
                continue;
            }
            // Blend at half opacity so overlapping workers stay visible
            let under = img.get_pixel(x, y).0;
            let blended = Rgba([
                ((under[0] as u16 + r as u16) / 2) as u8,
                ((under[1] as u16 + g as u16) / 2) as u8,
                ((under[2] as u16 + b as u16) / 2) as u8,
                255,
            ]);
            img.put_pixel(x, y, blended);
        }
    }
}
