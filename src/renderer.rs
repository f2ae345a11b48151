use eframe::egui::{self, Color32, Painter, Pos2, Rect, Stroke, TextureId, Vec2};

use crate::search::MAX_LISTED_VIALS;
use crate::state::AppState;

pub const BEST_MATCH_COLOR: Color32 = Color32::from_rgb(0xff, 0x3d, 0x00);
pub const OTHER_MATCH_COLOR: Color32 = Color32::BLACK;
/// Marker line widths in image pixels; scaled with the image.
pub const BEST_MATCH_LINE_WIDTH: f32 = 15.0;
pub const OTHER_MATCH_LINE_WIDTH: f32 = 10.0;
pub const OVERLAY_COLOR: Color32 = Color32::from_rgba_premultiplied(128, 128, 128, 128);

/// The drawing operations the renderer needs from a canvas.
pub trait Surface {
    fn clear(&mut self, size: Vec2);
    fn draw_image_scaled(&mut self, image_size: Vec2, scale: f32);
    fn fill_rect(&mut self, rect: Rect, color: Color32);
    fn stroke_circle(&mut self, center: Pos2, radius: f32, stroke: Stroke);
}

/// Recomputes the canvas for `viewport_width` and draws the whole scene.
pub fn redraw(state: &mut AppState, viewport_width: f32, surface: &mut dyn Surface) {
    state.resize(viewport_width);
    draw(state, surface);
}

/// Draws base image, then the dimming overlay and markers when something is selected.
pub fn draw(state: &AppState, surface: &mut dyn Surface) {
    let canvas = state.canvas();
    surface.clear(egui::vec2(canvas.width, canvas.height));

    if state.image().is_none() {
        return;
    }
    let (width, height) = state.image_size();
    let image_size = egui::vec2(width as f32, height as f32);
    surface.draw_image_scaled(image_size, canvas.scale);

    if state.selection().is_empty() {
        return;
    }
    draw_overlay(surface, image_size, canvas.scale);
    draw_markers(state, surface, canvas.scale);
}

fn draw_overlay(surface: &mut dyn Surface, image_size: Vec2, scale: f32) {
    surface.fill_rect(
        Rect::from_min_size(Pos2::ZERO, image_size * scale),
        OVERLAY_COLOR,
    );
}

fn draw_markers(state: &AppState, surface: &mut dyn Surface, scale: f32) {
    for (position, vial) in state.selected_vials().take(MAX_LISTED_VIALS).enumerate() {
        let stroke = if position == 0 {
            Stroke::new(BEST_MATCH_LINE_WIDTH * scale, BEST_MATCH_COLOR)
        } else {
            Stroke::new(OTHER_MATCH_LINE_WIDTH * scale, OTHER_MATCH_COLOR)
        };
        surface.stroke_circle(
            egui::pos2(vial.center_x * scale, vial.center_y * scale),
            vial.radius * scale,
            stroke,
        );
    }
}

/// Paints onto an egui region whose top-left corner is `origin`.
pub struct PainterSurface<'a> {
    painter: &'a Painter,
    origin: Pos2,
    texture: TextureId,
    background: Color32,
}

impl<'a> PainterSurface<'a> {
    pub fn new(
        painter: &'a Painter,
        origin: Pos2,
        texture: TextureId,
        background: Color32,
    ) -> Self {
        Self {
            painter,
            origin,
            texture,
            background,
        }
    }
}

impl Surface for PainterSurface<'_> {
    fn clear(&mut self, size: Vec2) {
        self.painter.rect_filled(
            Rect::from_min_size(self.origin, size),
            0.0,
            self.background,
        );
    }

    fn draw_image_scaled(&mut self, image_size: Vec2, scale: f32) {
        self.painter.image(
            self.texture,
            Rect::from_min_size(self.origin, image_size * scale),
            Rect::from_min_max(Pos2::ZERO, egui::pos2(1.0, 1.0)),
            Color32::WHITE,
        );
    }

    fn fill_rect(&mut self, rect: Rect, color: Color32) {
        self.painter
            .rect_filled(rect.translate(self.origin.to_vec2()), 0.0, color);
    }

    fn stroke_circle(&mut self, center: Pos2, radius: f32, stroke: Stroke) {
        self.painter
            .circle_stroke(center + self.origin.to_vec2(), radius, stroke);
    }
}
