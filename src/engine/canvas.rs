use crate::model::{Camera, Viewport};

/// World units covered by one canvas column at zoom 1.
pub const UNITS_PER_COL: f64 = 20.0;
/// World units covered by one canvas row at zoom 1. Terminal cells are about twice as tall as wide.
pub const UNITS_PER_ROW: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Glyph {
    #[default]
    Empty,
    Food,
    Cell,
    /// A cell carrying a child.
    Gravid,
    Border,
}

impl Glyph {
    pub fn as_char(self) -> char {
        match self {
            Glyph::Empty => ' ',
            Glyph::Food => '·',
            Glyph::Cell => 'o',
            Glyph::Gravid => '@',
            Glyph::Border => '#',
        }
    }
}

/// Character raster the engine renders into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: u16,
    height: u16,
    glyphs: Vec<Glyph>,
}

impl Canvas {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            width: viewport.width,
            height: viewport.height,
            glyphs: vec![Glyph::Empty; viewport.width as usize * viewport.height as usize],
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.width,
            height: self.height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn clear(&mut self) {
        self.glyphs.fill(Glyph::Empty);
    }

    /// Resize in place, discarding the current contents.
    pub fn resize(&mut self, viewport: Viewport) {
        *self = Canvas::new(viewport);
    }

    #[cfg(test)]
    pub fn get(&self, col: u16, row: u16) -> Option<Glyph> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.glyphs
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }

    /// Set a cell; coordinates outside the raster are ignored.
    pub fn put(&mut self, col: i64, row: i64, glyph: Glyph) {
        if col < 0 || row < 0 || col >= self.width as i64 || row >= self.height as i64 {
            return;
        }
        let idx = row as usize * self.width as usize + col as usize;
        self.glyphs[idx] = glyph;
    }

    /// Project a world position through the camera onto canvas coordinates.
    pub fn project(camera: &Camera, x: f64, y: f64) -> (i64, i64) {
        let col = ((x + camera.x) * camera.zoom / UNITS_PER_COL).floor();
        let row = ((y + camera.y) * camera.zoom / UNITS_PER_ROW).floor();
        (col as i64, row as i64)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Glyph]> {
        self.glyphs.chunks(self.width.max(1) as usize)
    }

    #[cfg(test)]
    pub fn to_lines(&self) -> Vec<String> {
        self.rows()
            .map(|row| row.iter().map(|g| g.as_char()).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_writes_are_ignored() {
        let mut canvas = Canvas::new(Viewport {
            width: 4,
            height: 2,
        });
        canvas.put(-1, 0, Glyph::Cell);
        canvas.put(4, 0, Glyph::Cell);
        canvas.put(0, 2, Glyph::Cell);
        canvas.put(3, 1, Glyph::Food);
        assert_eq!(canvas.to_lines(), vec!["    ".to_string(), "   ·".to_string()]);
        assert_eq!(canvas.get(3, 1), Some(Glyph::Food));
        assert_eq!(canvas.get(4, 1), None);
    }

    #[test]
    fn projection_follows_camera_offset_and_zoom() {
        let camera = Camera {
            x: 20.0,
            y: 0.0,
            zoom: 1.0,
        };
        assert_eq!(Canvas::project(&camera, 0.0, 0.0), (1, 0));
        let zoomed = Camera {
            zoom: 2.0,
            ..Camera::default()
        };
        assert_eq!(Canvas::project(&zoomed, 20.0, 40.0), (2, 2));
    }
}
