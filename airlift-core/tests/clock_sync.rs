mod support;

use core::time::Duration;

use airlift_core::config::LoopConfig;
use airlift_core::link::{LinkError, LinkFault};
use airlift_core::recovery::ClockSync;
use airlift_core::time::{DateTime, TimeSource};
use embassy_futures::block_on;

use support::{Call, FixedSensors, START_WALL_CLOCK, build_loop};

const DOWN: LinkError = LinkError::Recoverable(LinkFault::NetworkDown);

#[test]
fn three_failures_make_three_calls_and_keep_wall_clock() {
    let mut node = build_loop(LoopConfig::default(), FixedSensors::default());
    node.link_mut().times.extend([Err(DOWN), Err(DOWN), Err(DOWN)]);

    let outcome = block_on(node.init_clock());

    assert_eq!(outcome, ClockSync::Failed { attempts: 3 });
    assert_eq!(node.link().count(Call::NetworkTime), 3);
    assert_eq!(
        node.time().sleeps,
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    assert_eq!(node.time().wall_clock(), START_WALL_CLOCK);
    assert!(
        node.logger()
            .sink()
            .contains("WARNING: Clock not synchronized, keeping 2024-01-01 00:00:00")
    );
}

#[test]
fn later_success_applies_timezone_offset() {
    let mut node = build_loop(LoopConfig::default(), FixedSensors::default());
    node.link_mut().times.extend([Err(DOWN), Ok(1_700_017_200)]);

    let outcome = block_on(node.init_clock());

    let local = DateTime::new(2023, 11, 14, 20, 0, 0);
    assert_eq!(outcome, ClockSync::Synced(local));
    assert_eq!(node.link().count(Call::NetworkTime), 2);
    assert_eq!(node.time().sleeps, vec![Duration::from_secs(1)]);
    assert_eq!(node.time().wall_clock(), local);
    assert!(
        node.logger()
            .sink()
            .contains("2023-11-14 20:00:00 [clock] INFO: Current time: 2023-11-14 20:00:00")
    );
}

#[test]
fn attempts_and_offset_are_configurable() {
    let config = LoopConfig::default()
        .with_clock_sync(1, Duration::from_secs(5))
        .with_utc_offset(0);
    let mut node = build_loop(config, FixedSensors::default());

    assert_eq!(
        block_on(node.init_clock()),
        ClockSync::Failed { attempts: 1 }
    );
    assert!(node.time().sleeps.is_empty());

    node.link_mut().times.push_back(Ok(1_700_000_000));
    assert_eq!(
        block_on(node.init_clock()),
        ClockSync::Synced(DateTime::new(2023, 11, 14, 22, 13, 20))
    );
}
