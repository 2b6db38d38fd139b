use defmt::{info, unwrap, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::adc::{self, Adc};
use embassy_rp::bind_interrupts;
use embassy_rp::clocks::RoscRng;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::{InterruptHandler, Pio};
use embassy_rp::pio_programs::ws2812::{PioWs2812, PioWs2812Program};
use embassy_rp::rtc::Rtc;
use embassy_rp::spi::{self, Spi};
use embassy_sync::mutex::Mutex;
use static_cell::StaticCell;

use airlift_core::log::Logger;
use airlift_core::panel::RingPanel;
use airlift_core::recovery::{RecoveryLoop, RunError};

use crate::config::{self, Provisioning};
use crate::hw::{BoardPanel, BoardSensors, DefmtSink, RtcClock};
use crate::link::{MqttLink, Topics};
use crate::radio::{Nina, SharedRadio};

mod node_task;

/// The recovery loop wired to the board.
pub type Node = RecoveryLoop<RtcClock, BoardSensors, RingPanel<BoardPanel, RoscRng>, MqttLink, DefmtSink>;

const RADIO_SPI_HZ: u32 = 8_000_000;

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

static RADIO: StaticCell<SharedRadio> = StaticCell::new();
static TOPICS: StaticCell<Topics> = StaticCell::new();
static NODE: StaticCell<Node> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    info!("airlift node starting");

    let provisioning = Provisioning::from_build_env();
    if let Err(err) = provisioning.validate() {
        node_task::halt(RunError::from(err)).await;
    }
    let topics = match Topics::new(provisioning.credentials.io_username) {
        Ok(topics) => TOPICS.init(topics),
        Err(err) => node_task::halt(RunError::Startup(err)).await,
    };

    let mut spi_config = spi::Config::default();
    spi_config.frequency = RADIO_SPI_HZ;
    let spi = Spi::new_blocking(p.SPI1, p.PIN_10, p.PIN_11, p.PIN_12, spi_config);
    let mut radio = Nina::new(
        spi,
        Output::new(p.PIN_13, Level::High),
        Input::new(p.PIN_14, Pull::None),
        Output::new(p.PIN_15, Level::High),
    );
    radio.reset().await;
    match radio.firmware_version().await {
        Ok(version) => info!("radio firmware {=str}", version.as_str()),
        Err(err) => warn!("radio firmware version unavailable: {}", err),
    }
    match radio.mac_address().await {
        Ok(mac) => info!("radio mac {:02x}", mac),
        Err(err) => warn!("radio mac unavailable: {}", err),
    }
    let radio: &'static SharedRadio = RADIO.init(Mutex::new(radio));

    let Pio {
        mut common, sm0, ..
    } = Pio::new(p.PIO0, Irqs);
    let program = PioWs2812Program::new(&mut common);
    let ring = PioWs2812::new(&mut common, sm0, p.DMA_CH0, p.PIN_16, &program);
    let panel = RingPanel::new(
        BoardPanel::new(
            Output::new(p.PIN_25, Level::Low),
            Input::new(p.PIN_20, Pull::Up),
            ring,
        ),
        RoscRng,
    );

    let sensors = BoardSensors::new(
        Adc::new_blocking(p.ADC, adc::Config::default()),
        adc::Channel::new_pin(p.PIN_29, Pull::None),
        adc::Channel::new_temp_sensor(p.ADC_TEMP_SENSOR),
        Input::new(p.PIN_24, Pull::None),
    );

    let node = NODE.init(RecoveryLoop::new(
        RtcClock::new(Rtc::new(p.RTC)),
        sensors,
        panel,
        MqttLink::new(radio, provisioning, topics),
        Logger::new(DefmtSink),
        config::loop_config(),
    ));

    let token = unwrap!(node_task::run(node));
    spawner.spawn(token);

    core::future::pending::<()>().await;
}
