//! Shape drawing.
//!
//! Rectangles and ellipses with an optional fill and an optional border,
//! drawn directly onto a typed buffer and clipped to its extent.

use crate::buffer::ImageBuffer;
use crate::pixel::Pixel;

/// Where a border's thickness sits relative to the shape outline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderPosition {
    /// Entirely inside the outline
    #[default]
    Inset,
    /// Straddling the outline
    Center,
    /// Entirely outside the outline
    Outset,
}

/// A shape border
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Border<P: Pixel> {
    /// Border color
    pub color: P,
    /// Thickness in pixels
    pub thickness: u32,
    /// Placement relative to the shape outline
    pub position: BorderPosition,
}

impl<P: Pixel> Border<P> {
    pub fn new(color: P, thickness: u32, position: BorderPosition) -> Self {
        Self {
            color,
            thickness,
            position,
        }
    }

    /// (outward, inward) extents of this border around an outline
    fn extents(&self) -> (u32, u32) {
        match self.position {
            BorderPosition::Inset => (0, self.thickness),
            BorderPosition::Outset => (self.thickness, 0),
            BorderPosition::Center => {
                let outward = self.thickness / 2;
                (outward, self.thickness - outward)
            }
        }
    }
}

/// Anything that can be drawn onto a buffer
pub trait Draw<P: Pixel> {
    /// Draw onto `buffer`, clipping to its extent
    fn draw(&self, buffer: &mut ImageBuffer<P>);
}

/// An axis-aligned rectangle with corners (x1, y1) and (x2, y2), the
/// lower-right corner exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle<P: Pixel> {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    /// Interior color; `None` leaves the interior untouched
    pub fill: Option<P>,
    pub border: Option<Border<P>>,
}

impl<P: Pixel> Rectangle<P> {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            fill: None,
            border: None,
        }
    }

    pub fn with_fill(mut self, fill: P) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_border(mut self, border: Border<P>) -> Self {
        self.border = Some(border);
        self
    }
}

fn fill_rect<P: Pixel>(buffer: &mut ImageBuffer<P>, x1: u32, y1: u32, x2: u32, y2: u32, color: P) {
    let x2 = x2.min(buffer.width());
    let y2 = y2.min(buffer.height());
    if x1 >= x2 || y1 >= y2 {
        return;
    }
    let stride = buffer.width() as usize;
    let data = buffer.as_pixels_mut();
    for y in y1..y2 {
        let row = y as usize * stride;
        data[row + x1 as usize..row + x2 as usize].fill(color);
    }
}

impl<P: Pixel> Draw<P> for Rectangle<P> {
    fn draw(&self, buffer: &mut ImageBuffer<P>) {
        if let Some(fill) = self.fill {
            fill_rect(buffer, self.x1, self.y1, self.x2, self.y2, fill);
        }
        if let Some(border) = self.border {
            if border.thickness == 0 {
                return;
            }
            let (outward, inward) = border.extents();
            let ox1 = self.x1.saturating_sub(outward);
            let oy1 = self.y1.saturating_sub(outward);
            let ox2 = self.x2.saturating_add(outward);
            let oy2 = self.y2.saturating_add(outward);
            let ix1 = self.x1.saturating_add(inward);
            let iy1 = self.y1.saturating_add(inward);
            let ix2 = self.x2.saturating_sub(inward);
            let iy2 = self.y2.saturating_sub(inward);

            // Four edge strips; degenerate interiors collapse to a solid fill
            if ix1 >= ix2 || iy1 >= iy2 {
                fill_rect(buffer, ox1, oy1, ox2, oy2, border.color);
                return;
            }
            fill_rect(buffer, ox1, oy1, ox2, iy1, border.color);
            fill_rect(buffer, ox1, iy2, ox2, oy2, border.color);
            fill_rect(buffer, ox1, iy1, ix1, iy2, border.color);
            fill_rect(buffer, ix2, iy1, ox2, iy2, border.color);
        }
    }
}

/// An axis-aligned ellipse centered at (cx, cy) with the given radii
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ellipse<P: Pixel> {
    pub cx: u32,
    pub cy: u32,
    pub rx: u32,
    pub ry: u32,
    /// Interior color; `None` leaves the interior untouched
    pub fill: Option<P>,
    pub border: Option<Border<P>>,
}

impl<P: Pixel> Ellipse<P> {
    pub fn new(cx: u32, cy: u32, rx: u32, ry: u32) -> Self {
        Self {
            cx,
            cy,
            rx,
            ry,
            fill: None,
            border: None,
        }
    }

    pub fn with_fill(mut self, fill: P) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_border(mut self, border: Border<P>) -> Self {
        self.border = Some(border);
        self
    }

    /// Whether (x, y) lies within the ellipse scaled to the given radii
    fn contains(&self, x: u32, y: u32, rx: u32, ry: u32) -> bool {
        if rx == 0 || ry == 0 {
            return false;
        }
        let dx = f64::from(x) - f64::from(self.cx);
        let dy = f64::from(y) - f64::from(self.cy);
        let nx = dx / f64::from(rx);
        let ny = dy / f64::from(ry);
        nx * nx + ny * ny <= 1.0
    }
}

impl<P: Pixel> Draw<P> for Ellipse<P> {
    fn draw(&self, buffer: &mut ImageBuffer<P>) {
        let (outer_rx, outer_ry, inner_rx, inner_ry) = match self.border {
            Some(border) if border.thickness > 0 => {
                let (outward, inward) = border.extents();
                (
                    self.rx + outward,
                    self.ry + outward,
                    self.rx.saturating_sub(inward),
                    self.ry.saturating_sub(inward),
                )
            }
            _ => (self.rx, self.ry, self.rx, self.ry),
        };

        let x_min = self.cx.saturating_sub(outer_rx);
        let x_max = self.cx.saturating_add(outer_rx).min(buffer.width().saturating_sub(1));
        let y_min = self.cy.saturating_sub(outer_ry);
        let y_max = self.cy.saturating_add(outer_ry).min(buffer.height().saturating_sub(1));

        let stride = buffer.width() as usize;
        let data = buffer.as_pixels_mut();
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let index = y as usize * stride + x as usize;
                let in_border_shape = self.contains(x, y, outer_rx, outer_ry);
                let in_inner = self.contains(x, y, inner_rx, inner_ry);
                if let Some(border) = self.border {
                    if border.thickness > 0 && in_border_shape && !in_inner {
                        data[index] = border.color;
                        continue;
                    }
                }
                if in_inner && self.contains(x, y, self.rx, self.ry) {
                    if let Some(fill) = self.fill {
                        data[index] = fill;
                    }
                }
            }
        }
    }
}
