//! Drawing surface abstraction.

/// An sRGB color with straight alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// `#rrggbb`
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

pub type Point = (f32, f32);

/// A 2D surface with the origin at the top left and y growing downwards.
pub trait Canvas {
    fn width(&self) -> f32;
    fn height(&self) -> f32;

    /// Discards everything drawn so far and paints the background.
    fn clear(&mut self, background: Color);
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color);
    fn line(&mut self, from: Point, to: Point, color: Color, width: f32);
    fn polyline(&mut self, points: &[Point], color: Color, width: f32);
    fn text(&mut self, at: Point, text: &str, color: Color, size: f32);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Color,
    },
    Line {
        from: Point,
        to: Point,
        color: Color,
        width: f32,
    },
    Polyline {
        points: Vec<Point>,
        color: Color,
        width: f32,
    },
    Text {
        at: Point,
        text: String,
        color: Color,
        size: f32,
    },
}

/// A canvas that records what was drawn on it.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayList {
    width: f32,
    height: f32,
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Canvas for DisplayList {
    fn width(&self) -> f32 {
        self.width
    }

    fn height(&self) -> f32 {
        self.height
    }

    fn clear(&mut self, background: Color) {
        self.commands.clear();
        self.fill_rect(0.0, 0.0, self.width, self.height, background);
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        self.commands.push(DrawCommand::FillRect { x, y, w, h, color });
    }

    fn line(&mut self, from: Point, to: Point, color: Color, width: f32) {
        self.commands.push(DrawCommand::Line {
            from,
            to,
            color,
            width,
        });
    }

    fn polyline(&mut self, points: &[Point], color: Color, width: f32) {
        if points.is_empty() {
            return;
        }
        self.commands.push(DrawCommand::Polyline {
            points: points.to_vec(),
            color,
            width,
        });
    }

    fn text(&mut self, at: Point, text: &str, color: Color, size: f32) {
        self.commands.push(DrawCommand::Text {
            at,
            text: text.to_string(),
            color,
            size,
        });
    }
}
