use crate::vial::{LoadedImage, Vial, VialImage};

/// Horizontal space kept free around the canvas before it takes half the viewport.
pub const CANVAS_MARGIN: f32 = 10.0;

/// Canvas size and the factors mapping image pixels onto it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasGeometry {
    pub width: f32,
    pub height: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub scale: f32,
}

impl Default for CanvasGeometry {
    fn default() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            scale: 1.0,
        }
    }
}

impl CanvasGeometry {
    /// Sizes the canvas to half the viewport, keeping the image aspect ratio.
    pub fn fit(viewport_width: f32, image_width: u32, image_height: u32) -> Self {
        if image_width == 0 || image_height == 0 {
            return Self::default();
        }

        let image_width = image_width as f32;
        let image_height = image_height as f32;
        let width = ((viewport_width - CANVAS_MARGIN) / 2.0).max(0.0);
        let height = width / image_width * image_height;
        let scale_x = width / image_width;
        let scale_y = height / image_height;

        Self {
            width,
            height,
            scale_x,
            scale_y,
            scale: scale_x.min(scale_y),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    image: Option<VialImage>,
    image_width: u32,
    image_height: u32,
    canvas: CanvasGeometry,
    vials: Vec<Vial>,
    query: String,
    selection: Vec<usize>,
}

impl AppState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Swaps in a freshly decoded image and its vials in one step.
    pub fn load(&mut self, loaded: LoadedImage) {
        let LoadedImage { image, vials } = loaded;
        log::info!(
            "Loaded {}x{} image with {} vial(s)",
            image.width,
            image.height,
            vials.len()
        );
        self.image_width = image.width;
        self.image_height = image.height;
        self.image = Some(image);
        self.vials = vials;
        self.query.clear();
        self.selection.clear();
    }

    /// Stores the result of a search. `selection` holds ascending positions into the vial list.
    pub fn set_selection(&mut self, query: String, selection: Vec<usize>) {
        debug_assert!(selection.windows(2).all(|pair| pair[0] < pair[1]));
        debug_assert!(selection.iter().all(|&index| index < self.vials.len()));
        self.query = query;
        self.selection = selection;
    }

    pub fn resize(&mut self, viewport_width: f32) -> CanvasGeometry {
        self.canvas = CanvasGeometry::fit(viewport_width, self.image_width, self.image_height);
        self.canvas
    }

    pub fn image(&self) -> Option<&VialImage> {
        self.image.as_ref()
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    pub fn canvas(&self) -> CanvasGeometry {
        self.canvas
    }

    pub fn vials(&self) -> &[Vial] {
        &self.vials
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn selection(&self) -> &[usize] {
        &self.selection
    }

    pub fn selected_vials(&self) -> impl Iterator<Item = &Vial> + '_ {
        self.selection
            .iter()
            .filter_map(|&index| self.vials.get(index))
    }
}
