use crate::machine::DigitalInput;
use crate::{HEIGHT, WIDTH};
use pixels::Pixels;
use std::sync::{Arc, Mutex};
use winit::window::Window;

/// Control messages sent from the windowing thread to the machine thread.
pub enum Message {
    Input(DigitalInput, bool),
    Pause(bool),
}

pub(crate) enum SurfaceInner {
    Dummy,
    Real {
        pixels: Box<Mutex<Pixels>>,
        window: Window,
    },
}

/// Window-side handle to the pixel surface. Cloneable so the event loop can
/// keep rendering while the machine thread owns the matching [`FrameSink`].
#[derive(Clone)]
pub struct Surface(Arc<SurfaceInner>);

/// Where a machine paints its video output during a draw.
///
/// The dummy variant swallows everything, so headless sessions and tests can
/// draw without a window existing.
pub enum FrameSink {
    Dummy,
    Real {
        surface: Surface,
        buffer: Vec<u8>,
    },
}

impl FrameSink {
    pub fn set_pixel(&mut self, x: usize, y: usize, color: (u8, u8, u8)) {
        if let Self::Real { buffer, .. } = self {
            let offset = 4 * (y * WIDTH as usize + x);
            buffer[offset] = color.0;
            buffer[offset + 1] = color.1;
            buffer[offset + 2] = color.2;
            buffer[offset + 3] = 0xff;
        }
    }

    /// Publish the painted frame to the window surface. Until this is called
    /// the window keeps showing the previously presented frame.
    pub fn present(&mut self) {
        if let Self::Real { surface, buffer } = self {
            if let SurfaceInner::Real { pixels, .. } = &*surface.0 {
                pixels
                    .lock()
                    .expect("failed to lock")
                    .get_frame()
                    .copy_from_slice(buffer);
            }
        }
    }
}

impl Surface {
    pub fn dummy() -> (Surface, FrameSink) {
        (Surface(Arc::new(SurfaceInner::Dummy)), FrameSink::Dummy)
    }

    pub fn new(mut pixels: Pixels, window: Window) -> (Surface, FrameSink) {
        let buffer = pixels.get_frame().to_vec();

        let surface = Surface(Arc::new(SurfaceInner::Real {
            pixels: Box::new(Mutex::new(pixels)),
            window,
        }));

        let sink = FrameSink::Real {
            surface: surface.clone(),
            buffer,
        };

        (surface, sink)
    }

    /// Render the most recently presented frame to the window.
    pub fn redraw(&self) {
        if let SurfaceInner::Real { pixels, .. } = &*self.0 {
            pixels
                .lock()
                .expect("failed to lock")
                .render()
                .expect("failed to render using pixels library");
        }
    }
}
