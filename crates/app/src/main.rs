//! lumen: a window, a rotating textured triangle pair and a sprite.
//!
//! Any initialization or frame failure is logged and ends the process with a
//! non-zero exit code.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event_loop::ControlFlow;
use winit::window::WindowId;

use lumen_core::config::{WINDOW_HEIGHT, WINDOW_TITLE, WINDOW_WIDTH};
use lumen_core::{FrameTimer, RendererConfig};
use lumen_platform::{ActiveEventLoop, EventLoop, Window, WindowEvent};
use lumen_renderer::Renderer;

struct App {
    config: RendererConfig,
    // Dropped before the window it renders into.
    renderer: Option<Renderer>,
    window: Option<Window>,
    timer: FrameTimer,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            timer: FrameTimer::new(Duration::from_secs(1)),
            fatal: None,
        }
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, self.config.width, self.config.height, WINDOW_TITLE)
            .context("Failed to create window")?;
        let renderer =
            Renderer::new(&window, &self.config).context("Failed to initialize renderer")?;

        info!("Initialization complete, entering main loop");
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{:#}", e);
        self.fatal = Some(e);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.initialize(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                if let Some(renderer) = self.renderer.as_mut()
                    && let Err(e) = renderer.shutdown()
                {
                    self.fail(event_loop, anyhow!(e).context("Shutdown failed"));
                    return;
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                self.timer.tick();
                if let Some(fps) = self.timer.take_fps() {
                    info!("{:.1} fps", fps);
                }

                if let Some(renderer) = self.renderer.as_mut()
                    && let Err(e) = renderer.render_frame()
                {
                    self.fail(event_loop, anyhow!(e).context("Frame failed"));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    lumen_core::init_logging();
    info!("Starting lumen");

    let config = RendererConfig {
        width: WINDOW_WIDTH,
        height: WINDOW_HEIGHT,
        ..RendererConfig::default()
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    let frames = app.renderer.as_ref().map_or(0, Renderer::frame_count);

    match app.fatal.take() {
        Some(e) => Err(e),
        None => {
            info!("Exited cleanly after {} frames", frames);
            Ok(())
        }
    }
}
