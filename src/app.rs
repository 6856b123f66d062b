//! Window, event loop and frame pacing.
//!
//! [`run`] opens a window, creates a [`WgpuBackend`] and hands a
//! [`SetupContext`] to the setup closure, which uploads resources and returns
//! the [`Scene`] together with a per-frame closure. Every frame then runs, in
//! order:
//!
//! 1. [`Scene::update`] (camera movement from input),
//! 2. the per-frame closure, the place for game logic to mutate transforms,
//!    materials and lights,
//! 3. [`FrameRenderer::draw`],
//! 4. [`Input::begin_frame`].
//!
//! Resizes reach the surface, the depth buffer and the camera. Escape or
//! closing the window quits.
//!
//! ```no_run
//! use tessera::{AppConfig, CameraConfig, Frame, Scene};
//!
//! fn idle(_frame: &mut Frame) {}
//!
//! tessera::run(AppConfig::new().title("empty"), |ctx| {
//!     let scene = Scene::new(ctx.camera(CameraConfig::new()));
//!     Ok((scene, idle))
//! })
//! .unwrap();
//! ```

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowAttributes, WindowId};

use crate::backend::BackendError;
use crate::camera::{Camera, CameraConfig};
use crate::color::Color;
use crate::input::Input;
use crate::material::MaterialError;
use crate::renderer::{FrameRenderer, FrameStats, RenderError};
use crate::scene::{Scene, SceneError};
use crate::wgpu_backend::WgpuBackend;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("event loop failed: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Material(#[from] MaterialError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Window and presentation settings.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Applied to the scene returned by setup.
    pub clear_color: Color,
    pub vsync: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Tessera".to_string(),
            width: 1280,
            height: 720,
            clear_color: Color::SKY_BLUE,
            vsync: true,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }
}

/// Handed to the setup closure once the window and backend exist.
pub struct SetupContext<'a> {
    /// Upload meshes and textures, create samplers and load shaders here.
    pub backend: &'a mut WgpuBackend,
    width: u32,
    height: u32,
}

impl SetupContext<'_> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// A camera whose aspect ratio matches the window.
    pub fn camera(&self, config: CameraConfig) -> Camera {
        Camera::new(config.aspect(self.aspect()))
    }
}

/// What the per-frame closure sees.
pub struct Frame<'a> {
    pub scene: &'a mut Scene,
    pub input: &'a Input,
    /// Seconds since the app started.
    pub time: f32,
    /// Seconds since the previous frame.
    pub dt: f32,
    /// Counters from the previous draw.
    pub stats: FrameStats,
    exit: &'a mut bool,
}

impl Frame<'_> {
    pub fn fps(&self) -> f32 {
        if self.dt > 0.0 { 1.0 / self.dt } else { 0.0 }
    }

    /// Closes the window after this frame is drawn.
    pub fn exit(&mut self) {
        *self.exit = true;
    }
}

/// Opens a window and runs until it closes.
///
/// Errors from setup or from drawing end the loop and are returned here.
pub fn run<S, F>(config: AppConfig, setup: S) -> Result<(), AppError>
where
    S: FnOnce(&mut SetupContext) -> Result<(Scene, F), AppError> + 'static,
    F: FnMut(&mut Frame) + 'static,
{
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = TesseraApp::Pending {
        config,
        setup: Some(Box::new(setup)),
    };
    event_loop.run_app(&mut app)?;

    match app {
        TesseraApp::Failed(Some(err)) => Err(err),
        _ => Ok(()),
    }
}

type SetupFn<F> = Box<dyn FnOnce(&mut SetupContext) -> Result<(Scene, F), AppError>>;

enum TesseraApp<F> {
    Pending {
        config: AppConfig,
        setup: Option<SetupFn<F>>,
    },
    Running(Box<Running<F>>),
    Failed(Option<AppError>),
}

struct Running<F> {
    window: Arc<Window>,
    backend: WgpuBackend,
    scene: Scene,
    renderer: FrameRenderer,
    input: Input,
    frame_fn: F,
    stats: FrameStats,
    start_time: Instant,
    last_frame: Instant,
}

impl<F: FnMut(&mut Frame)> Running<F> {
    fn start(
        event_loop: &ActiveEventLoop,
        config: &AppConfig,
        setup: SetupFn<F>,
    ) -> Result<Self, AppError> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let mut backend = WgpuBackend::new(window.clone(), config.vsync)?;
        let (width, height) = (backend.gpu().width(), backend.gpu().height());
        let mut ctx = SetupContext {
            backend: &mut backend,
            width,
            height,
        };
        let (mut scene, frame_fn) = setup(&mut ctx)?;
        scene.set_clear_color(config.clear_color);
        scene.resize(width, height);
        tracing::info!(title = %config.title, width, height, entities = scene.entity_count(), "app started");

        Ok(Self {
            window,
            backend,
            scene,
            renderer: FrameRenderer::new(),
            input: Input::new(),
            frame_fn,
            stats: FrameStats::default(),
            start_time: Instant::now(),
            last_frame: Instant::now(),
        })
    }

    /// Runs one frame. Returns `false` when the app should quit.
    fn redraw(&mut self) -> Result<bool, AppError> {
        let now = Instant::now();
        let time = self.start_time.elapsed().as_secs_f32();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        let mut exit = self.input.key_pressed(KeyCode::Escape);

        self.scene.update(&self.input, dt, time);
        (self.frame_fn)(&mut Frame {
            scene: &mut self.scene,
            input: &self.input,
            time,
            dt,
            stats: self.stats,
            exit: &mut exit,
        });

        match self.renderer.draw(&mut self.scene, &mut self.backend, dt, time) {
            Ok(stats) => self.stats = stats,
            Err(RenderError::Backend(BackendError::Surface(err))) => {
                tracing::warn!(%err, "skipping frame");
            }
            Err(err) => return Err(err.into()),
        }

        self.input.begin_frame();
        self.window.request_redraw();
        Ok(!exit)
    }
}

impl<F: FnMut(&mut Frame)> ApplicationHandler for TesseraApp<F> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let TesseraApp::Pending { config, setup } = self else {
            return;
        };
        let Some(setup) = setup.take() else {
            return;
        };
        match Running::start(event_loop, config, setup) {
            Ok(running) => *self = TesseraApp::Running(Box::new(running)),
            Err(err) => {
                tracing::error!(%err, "startup failed");
                *self = TesseraApp::Failed(Some(err));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let TesseraApp::Running(running) = self else {
            return;
        };

        running.input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("window closed");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                running.backend.resize(size.width, size.height);
                running.scene.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => match running.redraw() {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!("exit requested");
                    event_loop.exit();
                }
                Err(err) => {
                    tracing::error!(%err, "frame failed");
                    *self = TesseraApp::Failed(Some(err));
                    event_loop.exit();
                }
            },
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let TesseraApp::Running(running) = self {
            running.input.handle_device_event(&event);
        }
    }
}
