//! Local actuators: status LED, addressable LED ring and the user button.
//!
//! [`ActuatorPanel`] is the surface the recovery loop drives. [`RingPanel`]
//! implements it on top of a [`PanelHardware`] driver by owning the
//! [`AnimationBuffer`] and the animation mode, so firmware and emulator only
//! provide pin and pixel access.

use rand_core::RngCore;

/// Default number of pixels on the LED ring.
pub const RING_PIXELS: usize = 12;

/// 8-bit RGB color.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const OFF: Self = Self::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Fixed palette cycled in [`AnimationMode::Palette`].
pub const PALETTE: [Color; 7] = [
    Color::new(255, 0, 0),
    Color::new(255, 127, 0),
    Color::new(255, 255, 0),
    Color::new(0, 255, 0),
    Color::new(0, 0, 255),
    Color::new(75, 0, 130),
    Color::new(148, 0, 211),
];

/// How the next animation color is chosen.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AnimationMode {
    Palette,
    Random,
}

impl AnimationMode {
    /// Returns the other mode.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            AnimationMode::Palette => AnimationMode::Random,
            AnimationMode::Random => AnimationMode::Palette,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AnimationMode::Palette => "palette",
            AnimationMode::Random => "random",
        }
    }
}

/// Most-recent-first shift register of `N` colors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnimationBuffer<const N: usize> {
    slots: [Color; N],
}

impl<const N: usize> AnimationBuffer<N> {
    /// Creates a buffer with every slot dark.
    pub const fn new() -> Self {
        Self {
            slots: [Color::OFF; N],
        }
    }

    /// Shifts every slot down by one and writes `color` at index 0.
    pub fn advance(&mut self, color: Color) {
        if N == 0 {
            return;
        }
        self.slots.copy_within(0..N - 1, 1);
        self.slots[0] = color;
    }

    pub fn as_slice(&self) -> &[Color] {
        &self.slots
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}

impl<const N: usize> Default for AnimationBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Actuator capability consumed by the recovery loop.
pub trait ActuatorPanel {
    fn set_status_led(&mut self, on: bool);

    fn status_led(&self) -> bool;

    /// Returns `true` while the button is held down.
    fn read_button(&mut self) -> bool;

    /// Pushes the next color into the animation buffer and returns it.
    fn advance_animation(&mut self) -> Color;

    /// Switches between palette and random colors, returning the new mode.
    fn toggle_animation_mode(&mut self) -> AnimationMode;

    fn animation_mode(&self) -> AnimationMode;

    /// Flushes the animation buffer to the LEDs.
    async fn render(&mut self);
}

/// Pin and pixel access supplied by the board.
pub trait PanelHardware {
    fn write_status_led(&mut self, on: bool);

    fn button_pressed(&mut self) -> bool;

    async fn write_pixels(&mut self, pixels: &[Color]);
}

/// [`ActuatorPanel`] backed by a [`PanelHardware`] driver and an RNG.
pub struct RingPanel<H, R, const N: usize = RING_PIXELS> {
    hardware: H,
    rng: R,
    buffer: AnimationBuffer<N>,
    mode: AnimationMode,
    palette_index: usize,
    led_on: bool,
}

impl<H, R, const N: usize> RingPanel<H, R, N>
where
    H: PanelHardware,
    R: RngCore,
{
    /// Creates a panel in palette mode with the status LED off.
    pub fn new(mut hardware: H, rng: R) -> Self {
        hardware.write_status_led(false);
        Self {
            hardware,
            rng,
            buffer: AnimationBuffer::new(),
            mode: AnimationMode::Palette,
            palette_index: 0,
            led_on: false,
        }
    }

    pub fn buffer(&self) -> &AnimationBuffer<N> {
        &self.buffer
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    fn next_color(&mut self) -> Color {
        match self.mode {
            AnimationMode::Palette => {
                let color = PALETTE[self.palette_index];
                self.palette_index = (self.palette_index + 1) % PALETTE.len();
                color
            }
            AnimationMode::Random => {
                let [r, g, b, _] = self.rng.next_u32().to_le_bytes();
                Color::new(r, g, b)
            }
        }
    }
}

impl<H, R, const N: usize> ActuatorPanel for RingPanel<H, R, N>
where
    H: PanelHardware,
    R: RngCore,
{
    fn set_status_led(&mut self, on: bool) {
        self.led_on = on;
        self.hardware.write_status_led(on);
    }

    fn status_led(&self) -> bool {
        self.led_on
    }

    fn read_button(&mut self) -> bool {
        self.hardware.button_pressed()
    }

    fn advance_animation(&mut self) -> Color {
        let color = self.next_color();
        self.buffer.advance(color);
        color
    }

    fn toggle_animation_mode(&mut self) -> AnimationMode {
        self.mode = self.mode.toggled();
        self.mode
    }

    fn animation_mode(&self) -> AnimationMode {
        self.mode
    }

    async fn render(&mut self) {
        self.hardware.write_pixels(self.buffer.as_slice()).await;
    }
}
