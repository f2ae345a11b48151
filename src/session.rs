use std::path::Path;
use std::time::{Duration, Instant};

use crate::renderer::{self, Surface};
use crate::search::{filter, result_entries, ResultEntry, SearchDebouncer};
use crate::state::AppState;
use crate::upload::{RequestToken, UploadController, UploadError, UploadReply};
use crate::vial::Vial;

pub const PROCESSING_MESSAGE: &str = "Processing image, please wait...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Upload,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    Hidden,
    /// Shown with a spinner.
    Info(String),
    Error(String),
}

/// Owns the application state and every transition the UI can trigger.
#[derive(Debug)]
pub struct Session {
    state: AppState,
    panel: Panel,
    banner: Banner,
    upload: UploadController,
    debouncer: SearchDebouncer,
    query_input: String,
    viewport_width: f32,
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: AppState::default(),
            panel: Panel::Upload,
            banner: Banner::Hidden,
            upload: UploadController::default(),
            debouncer: SearchDebouncer::default(),
            query_input: String::new(),
            viewport_width: 0.0,
            generation: 0,
        }
    }
}

impl Session {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn panel(&self) -> Panel {
        self.panel
    }

    pub fn banner(&self) -> &Banner {
        &self.banner
    }

    pub fn query_input(&self) -> &str {
        &self.query_input
    }

    pub fn viewport_width(&self) -> f32 {
        self.viewport_width
    }

    /// Changes whenever a new image is loaded or the session is reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn upload_affordance_visible(&self) -> bool {
        self.panel == Panel::Upload && !self.upload.is_uploading()
    }

    pub fn is_uploading(&self) -> bool {
        self.upload.is_uploading()
    }

    pub fn show_error(&mut self, message: impl Into<String>) {
        self.banner = Banner::Error(message.into());
    }

    /// Back to the upload panel with everything cleared. Keeps the viewport width.
    ///
    /// The upload controller survives so tokens issued before the reset stay stale.
    pub fn reset(&mut self) {
        self.state.reset();
        self.panel = Panel::Upload;
        self.banner = Banner::Hidden;
        self.upload.abandon();
        self.debouncer.cancel();
        self.query_input.clear();
        self.generation = self.generation.wrapping_add(1);
        log::info!("Session reset");
    }

    pub fn begin_upload(&mut self, file: Option<&Path>) -> Option<RequestToken> {
        match self.upload.begin(file) {
            Ok(token) => {
                self.banner = Banner::Info(PROCESSING_MESSAGE.to_string());
                Some(token)
            }
            Err(err) => {
                self.apply_upload_failure(err);
                None
            }
        }
    }

    /// Applies a worker reply. Returns `false` when the reply was stale.
    pub fn complete_upload(&mut self, reply: UploadReply) -> bool {
        let Some(outcome) = self.upload.finish(reply.token, reply.result) else {
            return false;
        };

        match outcome {
            Ok(loaded) => {
                self.state.load(loaded);
                self.state.resize(self.viewport_width);
                self.generation = self.generation.wrapping_add(1);
                self.query_input.clear();
                self.debouncer.cancel();
                self.panel = Panel::Search;
                self.banner = Banner::Hidden;
            }
            Err(err) => self.apply_upload_failure(err),
        }
        true
    }

    fn apply_upload_failure(&mut self, err: UploadError) {
        log::warn!("Upload failed: {err}");
        if matches!(err, UploadError::Transport(_)) {
            self.reset();
        }
        self.panel = Panel::Upload;
        self.banner = Banner::Error(err.to_string());
    }

    /// Records a keystroke; the search itself runs once typing pauses.
    pub fn edit_query(&mut self, text: String, now: Instant) {
        self.query_input = text.clone();
        self.debouncer.push(text, now);
    }

    /// Runs the debounced search if it is due. Returns `true` when the selection changed.
    pub fn poll_search(&mut self, now: Instant) -> bool {
        let Some(query) = self.debouncer.poll(now) else {
            return false;
        };
        let selection = filter(self.state.vials(), &query);
        log::debug!("Query {query:?} matched {} vial(s)", selection.len());
        self.state.set_selection(query, selection);
        true
    }

    pub fn search_remaining(&self, now: Instant) -> Option<Duration> {
        self.debouncer.remaining(now)
    }

    pub fn on_viewport_resize(&mut self, viewport_width: f32) {
        self.viewport_width = viewport_width;
        self.state.resize(viewport_width);
    }

    /// Resizes the canvas for the current viewport and draws the scene onto `surface`.
    pub fn redraw_canvas(&mut self, surface: &mut dyn Surface) {
        renderer::redraw(&mut self.state, self.viewport_width, surface);
    }

    pub fn result_entries(&self) -> Vec<(ResultEntry, &Vial)> {
        result_entries(self.state.selection())
            .into_iter()
            .filter_map(|entry| {
                self.state
                    .vials()
                    .get(entry.vial_index)
                    .map(|vial| (entry, vial))
            })
            .collect()
    }

    pub fn best_match(&self) -> Option<(usize, &Vial)> {
        let index = *self.state.selection().first()?;
        self.state.vials().get(index).map(|vial| (index, vial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{MAX_LISTED_VIALS, SEARCH_DEBOUNCE};
    use eframe::egui;
    use crate::upload::UploadPhase;
    use crate::vial::{LoadedImage, VialImage};
    use image::RgbaImage;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_image_file() -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "vialfinder-session-test-{}-{}-{}.png",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        fs::write(&path, b"png-ish").expect("should write temp image");
        path
    }

    fn loaded(vials: Vec<Vial>) -> LoadedImage {
        LoadedImage {
            image: VialImage::from_rgba(RgbaImage::new(800, 400)),
            vials,
        }
    }

    fn two_vials() -> Vec<Vial> {
        vec![
            Vial::new("A1", 100.0, 100.0, 20.0),
            Vial::new("B2", 300.0, 100.0, 25.0),
        ]
    }

    fn session_with(vials: Vec<Vial>) -> Session {
        let path = temp_image_file();
        let mut session = Session::default();
        session.on_viewport_resize(810.0);
        let token = session.begin_upload(Some(&path)).expect("upload should start");
        assert!(session.complete_upload(UploadReply {
            token,
            result: Ok(loaded(vials)),
        }));
        let _ = fs::remove_file(path);
        session
    }

    fn search(session: &mut Session, query: &str) {
        let now = Instant::now();
        session.edit_query(query.to_string(), now);
        assert!(session.poll_search(now + SEARCH_DEBOUNCE));
    }

    #[test]
    fn starts_on_upload_panel() {
        let session = Session::default();
        assert_eq!(session.panel(), Panel::Upload);
        assert_eq!(session.banner(), &Banner::Hidden);
        assert!(session.upload_affordance_visible());
    }

    #[test]
    fn missing_file_shows_validation_error() {
        let mut session = Session::default();
        assert!(session.begin_upload(None).is_none());
        assert_eq!(
            session.banner(),
            &Banner::Error("Please select an image file.".to_string())
        );
        assert!(session.upload_affordance_visible());
    }

    #[test]
    fn uploading_hides_affordance_and_shows_spinner_message() {
        let path = temp_image_file();
        let mut session = Session::default();
        session.begin_upload(Some(&path)).expect("upload should start");
        assert!(!session.upload_affordance_visible());
        assert_eq!(
            session.banner(),
            &Banner::Info(PROCESSING_MESSAGE.to_string())
        );
        let _ = fs::remove_file(path);
    }

    #[test]
    fn success_switches_to_search_panel_and_sizes_canvas() {
        let session = session_with(two_vials());
        assert_eq!(session.panel(), Panel::Search);
        assert_eq!(session.banner(), &Banner::Hidden);
        assert_eq!(session.state().vials().len(), 2);
        assert_eq!(session.state().canvas().width, 400.0);
        assert!(session.state().selection().is_empty());
    }

    #[test]
    fn scenario_prefix_query_selects_first_vial() {
        let mut session = session_with(two_vials());
        search(&mut session, "A");
        assert_eq!(session.state().selection(), &[0]);
        let (index, vial) = session.best_match().expect("should have a best match");
        assert_eq!(index, 0);
        assert_eq!(vial, &Vial::new("A1", 100.0, 100.0, 20.0));
    }

    #[test]
    fn scenario_empty_query_clears_selection() {
        let mut session = session_with(two_vials());
        search(&mut session, "A");
        search(&mut session, "");
        assert!(session.state().selection().is_empty());
        assert!(session.best_match().is_none());
        assert!(session.result_entries().is_empty());
    }

    #[test]
    fn scenario_server_error_keeps_vials() {
        let mut session = session_with(two_vials());
        let path = temp_image_file();
        let token = session.begin_upload(Some(&path)).expect("upload should start");
        assert!(session.complete_upload(UploadReply {
            token,
            result: Err(UploadError::Server { status: 500 }),
        }));

        assert_eq!(session.panel(), Panel::Upload);
        assert!(matches!(session.banner(), Banner::Error(_)));
        assert_eq!(session.state().vials(), two_vials().as_slice());
        assert!(session.upload_affordance_visible());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn scenario_transport_error_clears_vials() {
        let mut session = session_with(two_vials());
        let path = temp_image_file();
        let token = session.begin_upload(Some(&path)).expect("upload should start");
        assert!(session.complete_upload(UploadReply {
            token,
            result: Err(UploadError::Transport("connection refused".to_string())),
        }));

        assert_eq!(session.panel(), Panel::Upload);
        assert!(session.state().vials().is_empty());
        assert!(session.state().image().is_none());
        match session.banner() {
            Banner::Error(message) => assert!(message.contains("connection refused")),
            other => panic!("unexpected banner {other:?}"),
        }
        assert!(session.upload_affordance_visible());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn scenario_many_matches_list_is_capped() {
        let vials = (0..12)
            .map(|index| Vial::new(format!("7{index:02}"), 10.0, 10.0, 5.0))
            .collect::<Vec<_>>();
        let mut session = session_with(vials);
        search(&mut session, "7");

        assert_eq!(session.state().selection().len(), 12);
        let entries = session.result_entries();
        assert_eq!(entries.len(), MAX_LISTED_VIALS);
        assert!(entries[0].0.with_preview);
        assert!(entries[1..].iter().all(|(entry, _)| !entry.with_preview));
        assert_eq!(entries[9].1.label, "709");
    }

    #[test]
    fn reply_after_reset_is_ignored() {
        let path = temp_image_file();
        let mut session = Session::default();
        let token = session.begin_upload(Some(&path)).expect("upload should start");
        session.reset();
        assert!(!session.complete_upload(UploadReply {
            token,
            result: Ok(loaded(two_vials())),
        }));
        assert_eq!(session.panel(), Panel::Upload);
        assert!(session.state().vials().is_empty());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn reply_for_upload_before_reset_cannot_match_a_new_one() {
        let path = temp_image_file();
        let mut session = Session::default();
        let stale = session.begin_upload(Some(&path)).expect("upload should start");
        session.reset();
        let fresh = session.begin_upload(Some(&path)).expect("upload should start");
        assert_ne!(stale, fresh);
        assert!(!session.complete_upload(UploadReply {
            token: stale,
            result: Ok(loaded(two_vials())),
        }));
        assert!(session.is_uploading());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn reset_restores_initial_session() {
        let mut session = session_with(two_vials());
        search(&mut session, "B");
        session.edit_query("B2".to_string(), Instant::now());
        session.show_error("something");

        session.reset();
        assert_eq!(session.state(), &AppState::default());
        assert_eq!(session.panel(), Panel::Upload);
        assert_eq!(session.banner(), &Banner::Hidden);
        assert!(session.query_input().is_empty());
        assert_eq!(session.search_remaining(Instant::now()), None);
        assert_eq!(session.upload.phase(), UploadPhase::Idle);
        assert_eq!(session.viewport_width(), 810.0);
    }

    #[test]
    fn viewport_resize_keeps_selection() {
        let mut session = session_with(two_vials());
        search(&mut session, "2");
        session.on_viewport_resize(1610.0);
        assert_eq!(session.state().canvas().width, 800.0);
        assert_eq!(session.state().selection(), &[1]);
        assert_eq!(session.state().vials().len(), 2);
    }

    #[test]
    fn only_last_keystroke_counts() {
        let mut session = session_with(two_vials());
        let start = Instant::now();
        session.edit_query("A".to_string(), start);
        session.edit_query("B".to_string(), start + Duration::from_millis(10));
        assert!(!session.poll_search(start + Duration::from_millis(55)));
        assert!(session.poll_search(start + Duration::from_millis(60)));
        assert_eq!(session.state().query(), "B");
        assert_eq!(session.state().selection(), &[1]);
        assert!(!session.poll_search(start + Duration::from_millis(500)));
    }

    #[derive(Default)]
    struct CountingSurface {
        cleared: Vec<egui::Vec2>,
        images: usize,
        circles: usize,
    }

    impl Surface for CountingSurface {
        fn clear(&mut self, size: egui::Vec2) {
            self.cleared.push(size);
        }

        fn draw_image_scaled(&mut self, _image_size: egui::Vec2, _scale: f32) {
            self.images += 1;
        }

        fn fill_rect(&mut self, _rect: egui::Rect, _color: egui::Color32) {}

        fn stroke_circle(&mut self, _center: egui::Pos2, _radius: f32, _stroke: egui::Stroke) {
            self.circles += 1;
        }
    }

    #[test]
    fn redraw_sizes_canvas_for_current_viewport() {
        let mut session = session_with(two_vials());
        search(&mut session, "A");
        session.on_viewport_resize(1610.0);

        let mut surface = CountingSurface::default();
        session.redraw_canvas(&mut surface);
        assert_eq!(surface.cleared, vec![egui::vec2(800.0, 400.0)]);
        assert_eq!(surface.images, 1);
        assert_eq!(surface.circles, 1);
        assert_eq!(session.state().canvas().scale, 1.0);
    }

    #[test]
    fn redraw_after_reset_only_clears() {
        let mut session = session_with(two_vials());
        session.reset();

        let mut surface = CountingSurface::default();
        session.redraw_canvas(&mut surface);
        assert_eq!(surface.cleared, vec![egui::Vec2::ZERO]);
        assert_eq!(surface.images, 0);
    }
}
