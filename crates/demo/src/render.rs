//! The demo scene: bouncing rectangles and a pointer-following square.

use std::time::Instant;

use waylite_client::{Canvas, Collaborator, PointerButtons};

use crate::config::SceneConfig;

const PALETTE: [u32; 6] = [
    0xfff3_8ba8, 0xffa6_e3a1, 0xff89_b4fa, 0xfff9_e2af, 0xffcb_a6f7, 0xff94_e2d5,
];

const CURSOR_SIZE: u32 = 12;

/// A rectangle moving at constant velocity, reflecting off the edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub size: u32,
    pub color: u32,
}

impl Entity {
    /// Advance by `dt` seconds inside a `width` x `height` area.
    pub fn step(&mut self, dt: f64, width: u32, height: u32) {
        let max_x = f64::from(width.saturating_sub(self.size));
        let max_y = f64::from(height.saturating_sub(self.size));

        self.x += self.dx * dt;
        self.y += self.dy * dt;

        if self.x <= 0.0 || self.x >= max_x {
            self.dx = -self.dx;
            self.x = self.x.clamp(0.0, max_x);
        }
        if self.y <= 0.0 || self.y >= max_y {
            self.dy = -self.dy;
            self.y = self.y.clamp(0.0, max_y);
        }
    }
}

/// Draws the scene and logs input.
#[derive(Debug)]
pub struct Scene {
    entities: Vec<Entity>,
    background: u32,
    width: u32,
    height: u32,
    pointer: Option<(f64, f64)>,
    buttons: PointerButtons,
    last_frame: Option<Instant>,
    frames: u64,
}

impl Scene {
    pub fn new(config: &SceneConfig, width: u32, height: u32) -> Self {
        let entities = (0..config.entities)
            .map(|i| {
                // Spread start positions and headings deterministically
                let angle = (i as f64 + 0.5) * 2.399_963;
                Entity {
                    x: f64::from(width) * ((i * 37 % 100) as f64 / 100.0),
                    y: f64::from(height) * ((i * 61 % 100) as f64 / 100.0),
                    dx: config.speed * angle.cos(),
                    dy: config.speed * angle.sin(),
                    size: 24 + (i as u32 % 4) * 8,
                    color: PALETTE[i % PALETTE.len()],
                }
            })
            .collect();

        Self {
            entities,
            background: config.background,
            width,
            height,
            pointer: None,
            buttons: PointerButtons::empty(),
            last_frame: None,
            frames: 0,
        }
    }

    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Advance every entity by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        for entity in &mut self.entities {
            entity.step(dt, self.width, self.height);
        }
    }

    fn draw(&self, canvas: &mut Canvas<'_>) {
        canvas.clear(self.background);
        for entity in &self.entities {
            canvas.fill_rect(
                entity.x as i32,
                entity.y as i32,
                entity.size,
                entity.size,
                entity.color,
            );
        }
        if let Some((x, y)) = self.pointer {
            let color = if self.buttons.is_empty() {
                0xffff_ffff
            } else {
                0xffff_5555
            };
            let half = (CURSOR_SIZE / 2) as i32;
            canvas.fill_rect(x as i32 - half, y as i32 - half, CURSOR_SIZE, CURSOR_SIZE, color);
        }
    }
}

impl Collaborator for Scene {
    fn on_redraw_needed(&mut self, canvas: &mut Canvas<'_>) {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            // Cap the step so a stalled window does not teleport entities
            let dt = now.duration_since(last).as_secs_f64().min(0.1);
            self.advance(dt);
        }
        self.last_frame = Some(now);
        self.draw(canvas);
        self.frames += 1;
    }

    fn on_key_input(&mut self, bytes: &[u8]) {
        tracing::info!(bytes = ?bytes, text = %String::from_utf8_lossy(bytes).escape_debug(), "Key input");
    }

    fn on_pointer_event(&mut self, x: f64, y: f64, buttons: PointerButtons) {
        if buttons != self.buttons {
            tracing::debug!(x = x, y = y, buttons = ?buttons, "Pointer buttons");
        }
        self.pointer = Some((x, y));
        self.buttons = buttons;
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        for entity in &mut self.entities {
            entity.step(0.0, width, height);
        }
    }

    fn on_close(&mut self) {
        tracing::info!(frames = self.frames, "Window closed");
    }
}
