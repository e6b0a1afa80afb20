use crate::error::Error;
use crate::machine::{DigitalInput, Machine};
use crate::scheduler::{CycleScheduler, RefreshEvent};
use crate::screen::{Message, Surface};
use crate::session::Session;
use crate::{HEIGHT, WIDTH};
use log::info;
use pixels::{Pixels, SurfaceTexture};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Host-window parameters for [`run_machine`].
pub struct WindowConfig {
    pub title: String,
    /// Cadence at which refresh events are generated, in Hz.
    pub refresh_rate: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "cadence".into(),
            refresh_rate: 60.0,
        }
    }
}

fn input_for_key(code: VirtualKeyCode) -> Option<DigitalInput> {
    match code {
        VirtualKeyCode::Up | VirtualKeyCode::W => Some(DigitalInput::Up),
        VirtualKeyCode::Down | VirtualKeyCode::S => Some(DigitalInput::Down),
        VirtualKeyCode::Left | VirtualKeyCode::A => Some(DigitalInput::Left),
        VirtualKeyCode::Right | VirtualKeyCode::D => Some(DigitalInput::Right),
        VirtualKeyCode::Z => Some(DigitalInput::Fire),
        VirtualKeyCode::X => Some(DigitalInput::Action),
        VirtualKeyCode::Return => Some(DigitalInput::Reset),
        _ => None,
    }
}

/// The machine thread: generates refresh events at the configured cadence
/// and forwards control messages from the windowing side. Exits once the
/// session closes or the windowing side goes away.
fn drive_machine<M: Machine>(
    session: &Session<M>,
    control_rx: &Receiver<Message>,
    refresh_rate: f64,
) {
    let period = Duration::from_secs_f64(1.0 / refresh_rate);
    let start = Instant::now();
    let mut next_tick = start + period;

    loop {
        loop {
            match control_rx.try_recv() {
                Ok(Message::Input(input, pressed)) => session.set_input(input, pressed),
                Ok(Message::Pause(true)) => {
                    loop {
                        match control_rx.recv() {
                            Ok(Message::Pause(false)) => break,
                            Ok(_) => {}
                            Err(_) => return,
                        }
                    }
                    // Restart the timebase so the pause is not mistaken for
                    // a backlog of work.
                    session.rebase();
                    next_tick = Instant::now() + period;
                }
                Ok(Message::Pause(false)) => {}
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        if session.is_closed() {
            return;
        }

        session.update(RefreshEvent {
            time_value: start.elapsed().as_nanos() as i64,
            time_scale: NANOS_PER_SECOND,
            did_skip_previous: false,
            nominal_frequency: refresh_rate,
        });

        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        }
        next_tick += period;
    }
}

/// Opens a window for the machine and drives it at the configured refresh
/// cadence until the window is closed. Keyboard input is forwarded to
/// [`Machine::set_input`]; losing window focus pauses the machine.
///
/// This function *has to be called from the main thread* and does not
/// return on window close; the process exits with the event loop. Use
/// [`run_machine_headless_for`] in tests.
pub fn run_machine<M>(
    machine: M,
    cycles_per_second: i64,
    config: WindowConfig,
) -> Result<(), Error>
where
    M: Machine + Send + 'static,
{
    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title(config.title)
        .with_inner_size(LogicalSize::new(f64::from(WIDTH) * 2.0, f64::from(HEIGHT) * 2.0))
        .build(&event_loop)?;

    let window_size = window.inner_size();
    let surface_texture = SurfaceTexture::new(window_size.width, window_size.height, &window);
    let pixels = Pixels::new(WIDTH, HEIGHT, surface_texture)?;

    let (surface, sink) = Surface::new(pixels, window);
    let (control_tx, control_rx) = channel();

    let session = Arc::new(Session::new(
        machine,
        CycleScheduler::new(cycles_per_second),
        sink,
    ));

    info!("starting machine at {} cycles/s", cycles_per_second);

    let refresh_rate = config.refresh_rate;
    {
        let session = Arc::clone(&session);
        thread::spawn(move || drive_machine(&session, &control_rx, refresh_rate));
    }

    let mut last = Instant::now();
    let wait_time = Duration::from_secs_f64(1.0 / refresh_rate);

    event_loop.run(move |event, _, control_flow| {
        match event {
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => {
                session.close();
                *control_flow = ControlFlow::Exit;
                return;
            }
            Event::WindowEvent {
                event: WindowEvent::Focused(focused),
                ..
            } => {
                // The machine thread may already be gone; nothing to do then.
                let _ = control_tx.send(Message::Pause(!focused));
            }
            Event::WindowEvent {
                event: WindowEvent::KeyboardInput { input, .. },
                ..
            } => {
                if let Some(code) = input.virtual_keycode {
                    if let Some(mapped) = input_for_key(code) {
                        let _ = control_tx.send(Message::Input(
                            mapped,
                            input.state == ElementState::Pressed,
                        ));
                    }
                }
            }
            _ => {}
        }

        *control_flow = ControlFlow::WaitUntil(Instant::now() + wait_time);

        if Instant::now().duration_since(last) > wait_time {
            session.draw(true);
            surface.redraw();
            last = Instant::now();
        }
    });
}

/// Drives the machine without a window, synthesizing refresh events at a
/// fixed 60 Hz cadence with no real-time sleeping in between. This can be
/// useful in tests.
///
/// Returns the total number of cycles run, which is at least `cycle_limit`.
pub fn run_machine_headless_for<M: Machine>(
    machine: &mut M,
    cycles_per_second: i64,
    cycle_limit: i64,
) -> i64 {
    assert!(
        cycles_per_second > 0,
        "headless runner needs a configured clock rate"
    );

    let (_surface, sink) = Surface::dummy();
    let session = Session::new(machine, CycleScheduler::new(cycles_per_second), sink);

    let mut time_value = 0;
    let mut total: i64 = 0;
    while total < cycle_limit {
        let ran = session.update(RefreshEvent {
            time_value,
            time_scale: 60,
            did_skip_previous: false,
            nominal_frequency: 60.0,
        });
        total += i64::from(ran.unwrap_or(0));
        session.draw(true);
        time_value += 1;
    }
    session.close();
    total
}
