use airlift_core::panel::{Color, PanelHardware, RING_PIXELS};
use embassy_rp::gpio::{Input, Output};
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio_programs::ws2812::PioWs2812;
use smart_leds::RGB8;

/// WS2812 ring driven from PIO0 state machine 0.
pub type Ring = PioWs2812<'static, PIO0, 0, RING_PIXELS>;

/// Status LED, active-low button and LED ring.
pub struct BoardPanel {
    led: Output<'static>,
    button: Input<'static>,
    ring: Ring,
}

impl BoardPanel {
    pub fn new(led: Output<'static>, button: Input<'static>, ring: Ring) -> Self {
        Self { led, button, ring }
    }
}

impl PanelHardware for BoardPanel {
    fn write_status_led(&mut self, on: bool) {
        self.led.set_level(on.into());
    }

    fn button_pressed(&mut self) -> bool {
        self.button.is_low()
    }

    async fn write_pixels(&mut self, pixels: &[Color]) {
        let mut frame = [RGB8::default(); RING_PIXELS];
        for (slot, pixel) in frame.iter_mut().zip(pixels) {
            *slot = RGB8::new(pixel.r, pixel.g, pixel.b);
        }
        self.ring.write(&frame).await;
    }
}
