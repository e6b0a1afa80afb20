use crate::screen::FrameSink;

/// A logical input line on the emulated machine. Hosts map their own
/// keyboard or controller events onto these before forwarding them.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DigitalInput {
    Up,
    Down,
    Left,
    Right,
    Fire,
    Action,
    Reset,
}

/// The seam between this crate and an emulation core. The library never
/// looks inside the machine; it only feeds it cycles, input state and draw
/// requests.
pub trait Machine {
    /// Advance the emulation by exactly `cycles` cycles. Note that a machine
    /// operation can span many cycles, so a call may end mid-instruction; the
    /// machine is expected to pick up from that point on the next call.
    fn run(&mut self, cycles: i32);

    /// Produce the machine's current video output into `frame`, finishing
    /// with [`FrameSink::present`]. If `only_if_dirty` is true the machine
    /// may decline to repaint when nothing changed since the previous draw;
    /// otherwise it must paint.
    fn draw(&mut self, frame: &mut FrameSink, only_if_dirty: bool);

    /// Install a ROM or cartridge image. Machines without removable media
    /// can leave the default, which ignores it.
    fn set_rom(&mut self, _bytes: &[u8]) {}

    /// Change the state of one digital input line. The default ignores all
    /// input.
    fn set_input(&mut self, _input: DigitalInput, _pressed: bool) {}
}

impl<M: Machine + ?Sized> Machine for &mut M {
    fn run(&mut self, cycles: i32) {
        (**self).run(cycles);
    }

    fn draw(&mut self, frame: &mut FrameSink, only_if_dirty: bool) {
        (**self).draw(frame, only_if_dirty);
    }

    fn set_rom(&mut self, bytes: &[u8]) {
        (**self).set_rom(bytes);
    }

    fn set_input(&mut self, input: DigitalInput, pressed: bool) {
        (**self).set_input(input, pressed);
    }
}
