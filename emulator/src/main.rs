mod console;
mod link;
mod sim;

use std::env;
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use airlift_core::config::{ButtonPolicy, LoopConfig, PowerProfile, ResyncPolicy};
use airlift_core::log::Logger;
use airlift_core::panel::RingPanel;
use airlift_core::recovery::{RecoveryLoop, RunError};
use airlift_core::time::TimeSource;
use embassy_futures::block_on;
use rand::SeedableRng;
use rand::rngs::StdRng;

use console::ConsoleSink;
use link::{FaultProfile, SimLink};
use sim::{SimBoard, SimClock, SimSensors, VirtualTime};

const USAGE: &str = "Usage: airlift-emulator [--profile <steady|flaky|outage|mains>] \
[--iterations N] [--resync <fail-fast|retry>] [--button <level|edge>] \
[--low-power SECS] [--seed N] [--transcript PATH] [--ring]";

const DEFAULT_ITERATIONS: u32 = 600;
const DEFAULT_SEED: u64 = 0x5EED;

type EmulatedNode = RecoveryLoop<SimClock, SimSensors, RingPanel<SimBoard, StdRng>, SimLink, ConsoleSink>;

#[derive(Clone, Debug, PartialEq)]
struct Options {
    profile: FaultProfile,
    iterations: u32,
    resync: ResyncPolicy,
    button: ButtonPolicy,
    power: PowerProfile,
    seed: u64,
    transcript: Option<PathBuf>,
    ring: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            profile: FaultProfile::Steady,
            iterations: DEFAULT_ITERATIONS,
            resync: ResyncPolicy::FailFast,
            button: ButtonPolicy::Level,
            power: PowerProfile::Active,
            seed: DEFAULT_SEED,
            transcript: None,
            ring: false,
        }
    }
}

impl Options {
    fn parse<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            if arg == "--ring" {
                options.ring = true;
                continue;
            }

            let (flag, value) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), value.to_string()),
                None => {
                    let value = args
                        .next()
                        .ok_or_else(|| format!("Expected value after {arg}"))?;
                    (arg, value)
                }
            };

            match flag.as_str() {
                "--profile" => options.profile = FaultProfile::from_tag(&value)?,
                "--iterations" => options.iterations = parse_number(&flag, &value)?,
                "--resync" => options.resync = parse_resync(&value)?,
                "--button" => options.button = parse_button(&value)?,
                "--low-power" => {
                    options.power = PowerProfile::LowPower {
                        max_idle: Duration::from_secs(parse_number(&flag, &value)?),
                    };
                }
                "--seed" => options.seed = parse_number(&flag, &value)?,
                "--transcript" => options.transcript = Some(PathBuf::from(value)),
                _ => return Err(format!("Unknown option `{flag}`")),
            }
        }

        Ok(options)
    }

    fn loop_config(&self) -> LoopConfig {
        LoopConfig::new()
            .with_resync_policy(self.resync)
            .with_button_policy(self.button)
            .with_power_profile(self.power)
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid number `{value}` for {flag}"))
}

fn parse_resync(value: &str) -> Result<ResyncPolicy, String> {
    [ResyncPolicy::FailFast, ResyncPolicy::Retry]
        .into_iter()
        .find(|policy| value.eq_ignore_ascii_case(policy.label()))
        .ok_or_else(|| format!("Unknown resync policy `{value}`"))
}

fn parse_button(value: &str) -> Result<ButtonPolicy, String> {
    [ButtonPolicy::Level, ButtonPolicy::Edge]
        .into_iter()
        .find(|policy| value.eq_ignore_ascii_case(policy.label()))
        .ok_or_else(|| format!("Unknown button policy `{value}`"))
}

fn main() -> io::Result<()> {
    let options = Options::parse(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let header = format!(
        "AirLift emulator transcript (profile {}, seed {})",
        options.profile.label(),
        options.seed
    );
    let sink = match &options.transcript {
        Some(path) => ConsoleSink::with_transcript(path, &header)?,
        None => ConsoleSink::new(),
    };

    let time = VirtualTime::default();
    let mut node: EmulatedNode = RecoveryLoop::new(
        SimClock::new(time.clone()),
        SimSensors::new(
            time.clone(),
            options.profile.on_battery(),
            StdRng::seed_from_u64(options.seed),
        ),
        RingPanel::new(
            SimBoard::new(time.clone(), options.ring),
            StdRng::seed_from_u64(options.seed.wrapping_add(1)),
        ),
        SimLink::new(
            options.profile,
            time.clone(),
            StdRng::seed_from_u64(options.seed.wrapping_add(2)),
        ),
        Logger::new(sink),
        options.loop_config(),
    );

    let outcome = block_on(simulate(&mut node, options.iterations));

    let stats = node.stats();
    println!(
        "simulated {:.0?}: {} iterations, {} telemetry cycles, {} heartbeats, {} messages, \
         {} recoverable errors, {} resyncs ({} failed), {} frames, {} publishes, {} log lines, \
         status LED {}",
        time.elapsed(),
        stats.iterations,
        stats.telemetry_cycles,
        stats.heartbeats,
        stats.inbound_messages,
        stats.recoverable_errors,
        stats.resyncs,
        stats.resync_failures,
        node.panel().hardware().frames(),
        node.link().published(),
        node.logger().sink().lines(),
        if node.panel().hardware().led() { "on" } else { "off" },
    );

    if let Err(err) = outcome {
        eprintln!("loop stopped: {err}");
        process::exit(1);
    }
    Ok(())
}

async fn simulate(node: &mut EmulatedNode, iterations: u32) -> Result<(), RunError> {
    node.start().await?;
    node.init_clock().await;
    for _ in 0..iterations {
        node.tick().await?;
        if let Some(idle) = node.idle_budget() {
            node.time_mut().sleep(idle).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        Options::parse(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(parse(&[]), Ok(Options::default()));
    }

    #[test]
    fn flags_accept_split_and_joined_values() {
        let options = parse(&[
            "--profile",
            "outage",
            "--iterations=50",
            "--resync",
            "retry",
            "--button=edge",
            "--ring",
        ])
        .unwrap();
        assert_eq!(options.profile, FaultProfile::Outage);
        assert_eq!(options.iterations, 50);
        assert_eq!(options.resync, ResyncPolicy::Retry);
        assert_eq!(options.button, ButtonPolicy::Edge);
        assert!(options.ring);
    }

    #[test]
    fn low_power_sets_idle_cap() {
        let options = parse(&["--low-power", "5"]).unwrap();
        assert_eq!(
            options.loop_config().power_profile,
            PowerProfile::LowPower {
                max_idle: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse(&["--profile"]).is_err());
        assert!(parse(&["--iterations", "many"]).is_err());
        assert!(parse(&["--resync", "never"]).is_err());
        assert!(parse(&["--frobnicate", "1"]).is_err());
    }

    #[test]
    fn outage_profile_survives_with_retry_policy() {
        let options = parse(&["--profile", "outage", "--resync", "retry", "--iterations", "300"])
            .unwrap();
        let time = VirtualTime::default();
        let mut node: EmulatedNode = RecoveryLoop::new(
            SimClock::new(time.clone()),
            SimSensors::new(time.clone(), true, StdRng::seed_from_u64(1)),
            RingPanel::new(SimBoard::new(time.clone(), false), StdRng::seed_from_u64(2)),
            SimLink::new(options.profile, time.clone(), StdRng::seed_from_u64(3)),
            Logger::new(ConsoleSink::new()),
            options.loop_config(),
        );

        block_on(simulate(&mut node, options.iterations)).unwrap();

        let stats = node.stats();
        assert!(stats.recoverable_errors >= 1);
        assert!(stats.resync_failures >= 1);
        assert!(stats.telemetry_cycles >= 5);
    }
}
