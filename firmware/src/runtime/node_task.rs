use core::convert::Infallible;

use airlift_core::recovery::RunError;
use defmt::{Display2Format, error};
use embassy_time::{Duration, Timer};

use super::Node;

/// Delay between a fatal error and the chip reset.
const RESTART_DELAY: Duration = Duration::from_secs(10);

#[embassy_executor::task]
pub async fn run(node: &'static mut Node) {
    let Err(err) = node.run().await;
    restart(err).await;
}

/// Logs `err`, waits, then resets the chip.
async fn restart(err: RunError) -> ! {
    error!("node stopped: {}", Display2Format(&err));
    Timer::after(RESTART_DELAY).await;
    cortex_m::peripheral::SCB::sys_reset()
}

/// Logs a provisioning error and parks the task.
pub async fn halt(err: RunError) -> ! {
    error!("node cannot start: {}", Display2Format(&err));
    match core::future::pending::<Infallible>().await {}
}
