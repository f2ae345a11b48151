use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use eframe::egui::{self, Sense, TextureHandle, TextureOptions};

use crate::crop::crop_vial;
use crate::launch::LaunchConfig;
use crate::renderer::PainterSurface;
use crate::search::SEARCH_DEBOUNCE;
use crate::session::{Banner, Panel, Session};
use crate::upload::{upload_reply, UploadReply};
use crate::vial::rgba_to_color_image;

const APP_TITLE: &str = "Vial Finder";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];
const PREVIEW_MAX_DIM: f32 = 120.0;

struct VialPreview {
    /// Session generation and vial index the preview was cut for.
    key: (u64, usize),
    texture: Option<TextureHandle>,
    html: Option<String>,
    error: Option<String>,
}

pub struct VialFinderApp {
    session: Session,
    server_url: String,
    pending_initial_image: Option<PathBuf>,
    upload_receiver: Option<Receiver<UploadReply>>,
    image_texture: Option<TextureHandle>,
    texture_generation: u64,
    preview: Option<VialPreview>,
}

impl Default for VialFinderApp {
    fn default() -> Self {
        Self::new(LaunchConfig::default(), None)
    }
}

impl VialFinderApp {
    pub fn new(config: LaunchConfig, initial_status: Option<String>) -> Self {
        let mut session = Session::default();
        if let Some(status) = initial_status {
            session.show_error(status);
        }

        Self {
            session,
            server_url: config.server_url,
            pending_initial_image: config.initial_image,
            upload_receiver: None,
            image_texture: None,
            texture_generation: 0,
            preview: None,
        }
    }

    fn pick_image(&mut self, ctx: &egui::Context) {
        let picked = rfd::FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_file();
        self.start_upload(picked, ctx);
    }

    fn start_upload(&mut self, file: Option<PathBuf>, ctx: &egui::Context) {
        let Some(token) = self.session.begin_upload(file.as_deref()) else {
            return;
        };
        let Some(path) = file else {
            return;
        };

        let server_url = self.server_url.clone();
        let (tx, rx) = mpsc::channel::<UploadReply>();
        thread::spawn(move || {
            let _ = tx.send(upload_reply(&server_url, path, token));
        });
        self.upload_receiver = Some(rx);
        ctx.request_repaint();
    }

    fn poll_upload(&mut self, ctx: &egui::Context) {
        let Some(receiver) = self.upload_receiver.take() else {
            return;
        };

        match receiver.try_recv() {
            Ok(reply) => {
                self.session.complete_upload(reply);
            }
            Err(TryRecvError::Empty) => {
                self.upload_receiver = Some(receiver);
                ctx.request_repaint_after(Duration::from_millis(16));
            }
            Err(TryRecvError::Disconnected) => {
                if self.session.is_uploading() {
                    self.session.reset();
                    self.session
                        .show_error("Upload worker stopped unexpectedly, try again.");
                }
            }
        }
    }

    fn reset(&mut self) {
        self.upload_receiver = None;
        self.session.reset();
    }

    fn sync_image_texture(&mut self, ctx: &egui::Context) {
        if self.texture_generation == self.session.generation() {
            return;
        }
        self.texture_generation = self.session.generation();
        self.preview = None;
        self.image_texture = self.session.state().image().map(|image| {
            ctx.load_texture("vial-image", image.to_color_image(), TextureOptions::LINEAR)
        });
    }

    fn sync_preview(&mut self, ctx: &egui::Context) {
        let generation = self.session.generation();
        let Some((index, vial)) = self.session.best_match() else {
            self.preview = None;
            return;
        };
        let key = (generation, index);
        if self.preview.as_ref().map(|preview| preview.key) == Some(key) {
            return;
        }
        let Some(image) = self.session.state().image() else {
            self.preview = None;
            return;
        };

        self.preview = Some(
            match crop_vial(image, vial.center_x, vial.center_y, vial.radius) {
                Ok(cropped) => {
                    log::debug!(
                        "Preview for vial {:?} cut at {:?}",
                        vial.label,
                        cropped.bounds
                    );
                    VialPreview {
                        key,
                        html: Some(cropped.html()),
                        texture: Some(ctx.load_texture(
                            "vial-preview",
                            rgba_to_color_image(&cropped.image),
                            TextureOptions::LINEAR,
                        )),
                        error: None,
                    }
                }
                Err(err) => {
                    log::warn!("No preview for vial {:?}: {err}", vial.label);
                    VialPreview {
                        key,
                        texture: None,
                        html: None,
                        error: Some(err.to_string()),
                    }
                }
            },
        );
    }

    fn show_banner(&self, ctx: &egui::Context) {
        let banner = self.session.banner();
        if *banner == Banner::Hidden {
            return;
        }
        egui::TopBottomPanel::top("message-banner").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| match banner {
                Banner::Info(text) => {
                    ui.add(egui::Spinner::new());
                    ui.label(text);
                }
                Banner::Error(text) => {
                    ui.colored_label(ui.visuals().error_fg_color, text);
                }
                Banner::Hidden => {}
            });
            ui.add_space(4.0);
        });
    }

    fn show_upload_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let mut choose_clicked = false;
        let mut reset_clicked = false;
        let affordance_visible = self.session.upload_affordance_visible();

        ui.allocate_ui_with_layout(
            ui.available_size(),
            egui::Layout::top_down(egui::Align::Center),
            |ui| {
                ui.add_space(ui.available_height() * 0.35);
                ui.heading("Upload a photo of the vial rack");
                ui.add_space(12.0);
                if affordance_visible {
                    choose_clicked = ui.button("Choose image...").clicked();
                } else {
                    ui.label("Waiting for the processing service...");
                }
                ui.add_space(8.0);
                reset_clicked = ui.small_button("Reset").clicked();
            },
        );

        if reset_clicked {
            self.reset();
        } else if choose_clicked {
            self.pick_image(ctx);
        }
    }

    fn show_search_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let mut reset_clicked = false;
        let mut edited_query = None;

        ui.horizontal(|ui| {
            let mut query = self.session.query_input().to_string();
            let response = ui.add(
                egui::TextEdit::singleline(&mut query)
                    .hint_text("Search vial label")
                    .desired_width(240.0),
            );
            if response.changed() {
                edited_query = Some(query);
            }
            reset_clicked = ui.button("Reset").clicked();
            let state = self.session.state();
            if state.query().trim().is_empty() {
                ui.label(format!("{} vial(s) detected", state.vials().len()));
            } else {
                ui.label(format!(
                    "{} of {} vial(s) match {:?}",
                    state.selection().len(),
                    state.vials().len(),
                    state.query()
                ));
            }
        });

        if reset_clicked {
            self.reset();
            return;
        }
        if let Some(query) = edited_query {
            self.session.edit_query(query, Instant::now());
            ctx.request_repaint_after(SEARCH_DEBOUNCE);
        }

        ui.add_space(6.0);
        let mut copy_html = None;
        ui.horizontal_top(|ui| {
            let canvas = self.session.state().canvas();
            let (canvas_rect, _) =
                ui.allocate_exact_size(egui::vec2(canvas.width, canvas.height), Sense::hover());
            if let Some(texture_id) = self.image_texture.as_ref().map(|texture| texture.id()) {
                let mut surface = PainterSurface::new(
                    ui.painter(),
                    canvas_rect.min,
                    texture_id,
                    ui.visuals().extreme_bg_color,
                );
                self.session.redraw_canvas(&mut surface);
            }

            ui.vertical(|ui| {
                egui::ScrollArea::vertical()
                    .id_salt("found-vials")
                    .show(ui, |ui| {
                        for (entry, vial) in self.session.result_entries() {
                            let label = vial.label.trim();
                            if !entry.with_preview {
                                ui.label(label);
                                continue;
                            }
                            if let Some(preview) = self.preview.as_ref() {
                                if let Some(texture) = preview.texture.as_ref() {
                                    let size = texture.size_vec2();
                                    let fit = (PREVIEW_MAX_DIM / size.x.max(size.y)).min(1.0);
                                    ui.image(egui::load::SizedTexture::new(
                                        texture.id(),
                                        size * fit,
                                    ));
                                }
                                if let Some(error) = preview.error.as_ref() {
                                    ui.small(error);
                                }
                            }
                            ui.horizontal(|ui| {
                                ui.strong(label);
                                let html = self
                                    .preview
                                    .as_ref()
                                    .and_then(|preview| preview.html.clone());
                                if let Some(html) = html {
                                    if ui
                                        .small_button("Copy HTML")
                                        .on_hover_text("Copy the preview as an <img> tag")
                                        .clicked()
                                    {
                                        copy_html = Some(html);
                                    }
                                }
                            });
                            ui.separator();
                        }
                    });
            });
        });

        if let Some(html) = copy_html {
            ctx.copy_text(html);
        }
    }
}

impl eframe::App for VialFinderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(path) = self.pending_initial_image.take() {
            self.start_upload(Some(path), ctx);
        }
        self.poll_upload(ctx);

        let viewport_width = ctx.screen_rect().width();
        if (viewport_width - self.session.viewport_width()).abs() > f32::EPSILON {
            self.session.on_viewport_resize(viewport_width);
        }

        let now = Instant::now();
        self.session.poll_search(now);
        if let Some(remaining) = self.session.search_remaining(now) {
            ctx.request_repaint_after(remaining);
        }

        self.sync_image_texture(ctx);
        self.sync_preview(ctx);

        if self.session.is_uploading() {
            ctx.set_cursor_icon(egui::CursorIcon::Progress);
        }

        egui::TopBottomPanel::top("titlebar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(APP_TITLE);
                ui.weak(format!("v{APP_VERSION}"));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.weak(&self.server_url);
                });
            });
        });
        self.show_banner(ctx);

        egui::CentralPanel::default().show(ctx, |ui| match self.session.panel() {
            Panel::Upload => self.show_upload_panel(ui, ctx),
            Panel::Search => self.show_search_panel(ui, ctx),
        });
    }
}
