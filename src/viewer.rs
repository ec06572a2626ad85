//! Interactive blur viewer using wgpu + winit

use std::path::PathBuf;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::error::BlurError;
use crate::gpu::blur::{FRAGMENT_SHADER, VERTEX_SHADER};
use crate::gpu::{BlurPipeline, GpuContext};
use crate::params::BlurParams;

/// Radius moves in whole taps, strength in hundredths.
const RADIUS_STEP: f32 = 1.0;
const STRENGTH_STEP: f32 = 0.01;

/// Configuration for the viewer
#[derive(Clone)]
pub struct ViewerConfig {
    /// Initial blur radius, in per-side taps
    pub initial_radius: f32,
    /// Initial blur strength (Gaussian falloff coefficient)
    pub initial_strength: f32,
    /// Image to load at startup; `O` opens a picker at any time
    pub initial_image: Option<PathBuf>,
    /// Window title
    pub title: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            initial_radius: 0.0,
            initial_strength: 0.01,
            initial_image: None,
            title: "Blur Viewer (ESC to exit)".to_string(),
        }
    }
}

/// Viewer state: the GPU context plus the blur pipeline driven by it
struct ViewerState {
    gpu_ctx: GpuContext,
    pipeline: BlurPipeline,
    // Remembered to derive a default export file name
    loaded_path: Option<PathBuf>,
}

impl ViewerState {
    fn new(window: Arc<Window>, config: &ViewerConfig) -> Result<Self, BlurError> {
        let gpu_ctx = GpuContext::new(window)?;
        let pipeline = BlurPipeline::new(
            &gpu_ctx,
            VERTEX_SHADER,
            FRAGMENT_SHADER,
            BlurParams::new(config.initial_radius, config.initial_strength),
        )?;

        Ok(Self {
            gpu_ctx,
            pipeline,
            loaded_path: None,
        })
    }

    fn load(&mut self, path: PathBuf) {
        self.loaded_path = Some(path.clone());
        self.pipeline.load_image(path);
    }

    fn open_dialog(&mut self) {
        let picked = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg"])
            .pick_file();
        if let Some(path) = picked {
            self.load(path);
        }
    }

    fn save_dialog(&mut self) {
        if !self.pipeline.is_ready() {
            log::warn!("no image loaded, nothing to save");
            return;
        }

        let default_name = self
            .loaded_path
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|stem| format!("{}_blur.png", stem.to_string_lossy()))
            .unwrap_or_else(|| "blur.png".to_string());

        let picked = rfd::FileDialog::new()
            .add_filter("PNG image", &["png"])
            .set_file_name(default_name)
            .save_file();
        let Some(path) = picked else { return };

        let saved = self.pipeline.export_frame(&self.gpu_ctx).and_then(|img| {
            img.save(&path).map_err(|source| BlurError::Export {
                path: path.clone(),
                source,
            })
        });
        match saved {
            Ok(()) => log::info!("saved image to {:?}", path),
            Err(e) => log::error!("save failed: {e}"),
        }
    }

    fn adjust_radius(&mut self, delta: f32) {
        let radius = self.pipeline.params().radius() + delta;
        let stored = self.pipeline.set_radius(&self.gpu_ctx, radius);
        println!("Radius: {:.0}", stored);
        self.gpu_ctx.request_redraw();
    }

    fn adjust_strength(&mut self, delta: f32) {
        let strength = self.pipeline.params().strength() + delta;
        let stored = self.pipeline.set_strength(&self.gpu_ctx, strength);
        println!("Strength: {:.2}", stored);
        self.gpu_ctx.request_redraw();
    }
}

/// Application handler for winit event loop
struct ViewerApp {
    config: ViewerConfig,
    state: Option<ViewerState>,
}

impl ViewerApp {
    fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(800.0, 600.0));

        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .expect("Failed to create window"),
        );

        match ViewerState::new(window, &self.config) {
            Ok(mut state) => {
                println!("=== Interactive Blur Viewer ===");
                println!("Controls:");
                println!("  Up/Down    - Blur radius ({:+.0})", RADIUS_STEP);
                println!("  Right/Left - Blur strength ({:+.2})", STRENGTH_STEP);
                println!("  O          - Open image");
                println!("  S          - Save blurred image");
                println!("  Drag&drop  - Load image");
                println!("  ESC        - Exit");
                println!();

                if let Some(path) = self.config.initial_image.take() {
                    state.load(path);
                }

                self.state = Some(state);
            }
            Err(e) => {
                log::error!("Failed to create viewer state: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let state = match &mut self.state {
            Some(s) => s,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                state.gpu_ctx.resize((size.width, size.height));
            }

            WindowEvent::DroppedFile(path) => {
                state.load(path);
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => match key {
                KeyCode::Escape => event_loop.exit(),

                KeyCode::ArrowUp => state.adjust_radius(RADIUS_STEP),
                KeyCode::ArrowDown => state.adjust_radius(-RADIUS_STEP),
                KeyCode::ArrowRight => state.adjust_strength(STRENGTH_STEP),
                KeyCode::ArrowLeft => state.adjust_strength(-STRENGTH_STEP),

                KeyCode::KeyO => state.open_dialog(),
                KeyCode::KeyS => state.save_dialog(),

                _ => {}
            },

            WindowEvent::RedrawRequested => {
                if let Err(e) = state.pipeline.render(&state.gpu_ctx) {
                    log::error!("Render error: {e}");
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let Some(state) = &mut self.state else { return };

        // Install any finished background decode. The pipeline resizes the
        // surface and renders once; the window is brought along here.
        match state.pipeline.complete_loads(&mut state.gpu_ctx) {
            Some(Ok(size)) => {
                log::info!("loaded image at {}x{}", size.0, size.1);
                state.gpu_ctx.request_window_size(size);
                state.gpu_ctx.request_redraw();
            }
            Some(Err(e)) => log::error!("image load failed: {e}"),
            None => {}
        }
    }
}

/// Run the viewer until the window is closed
pub fn run_viewer(config: ViewerConfig) -> Result<(), BlurError> {
    env_logger::init();

    let event_loop =
        EventLoop::new().map_err(|e| BlurError::EventLoop(format!("Failed to create event loop: {e}")))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp::new(config);
    event_loop
        .run_app(&mut app)
        .map_err(|e| BlurError::EventLoop(format!("Event loop error: {e}")))?;

    Ok(())
}
