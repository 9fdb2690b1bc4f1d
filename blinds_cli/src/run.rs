//! Controller assembly and the `run`, `status` and `self-check` commands.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use blinds_config::Config;
use blinds_core::{Controller, ControllerCfg, Node, RunSummary, Snapshot, TopicMap};
use blinds_traits::Indicator;
#[cfg(not(feature = "mqtt"))]
use blinds_traits::Message;
use eyre::{Result, WrapErr};

pub type BoxIndicator = Box<dyn Indicator + Send>;

/// Build the controller on the compiled-in backend: the TMC2130/AS5600 pair
/// with `hardware`, a simulated plant resting at the top otherwise.
pub fn assemble_controller(cfg: &Config) -> Result<Controller> {
    let rt = ControllerCfg::from(cfg);

    #[cfg(feature = "hardware")]
    {
        use blinds_hardware::hardware::{As5600, Tmc2130, Tmc2130Config};
        let driver = Tmc2130::new(Tmc2130Config {
            step_pin: cfg.pins.step,
            dir_pin: cfg.pins.dir,
            en_pin: cfg.pins.en,
            spi_bus: cfg.pins.spi_bus,
            spi_cs: cfg.pins.spi_cs,
            motor_steps: cfg.driver.motor_steps,
            microsteps: cfg.driver.microsteps,
            rsense_ohm: cfg.driver.rsense_ohm,
            stall_threshold: cfg.driver.stall_threshold,
        })
        .wrap_err("open tmc2130 driver")?;
        let builder = Controller::builder().with_actuator(driver).with_cfg(rt);
        let builder = if cfg.encoder.enabled {
            let sensor = As5600::new(cfg.pins.i2c_bus).wrap_err("open as5600 encoder")?;
            builder.with_encoder(sensor)
        } else {
            builder
        };
        builder.build()
    }

    #[cfg(not(feature = "hardware"))]
    {
        let plant = blinds_hardware::SimPlant::new(cfg.travel.top);
        tracing::info!(position = cfg.travel.top, "using simulated plant");
        Controller::builder()
            .with_actuator(plant.actuator())
            .with_encoder(plant.encoder(cfg.encoder.counts_per_rev))
            .with_cfg(rt)
            .build()
    }
}

/// Status LED, if one is configured.
pub fn assemble_indicator(cfg: &Config) -> Result<Option<BoxIndicator>> {
    #[cfg(feature = "hardware")]
    {
        use blinds_hardware::hardware::GpioIndicator;
        cfg.pins
            .led
            .map(|pin| {
                GpioIndicator::new(pin)
                    .map(|led| Box::new(led) as BoxIndicator)
                    .wrap_err("open status led")
            })
            .transpose()
    }

    #[cfg(not(feature = "hardware"))]
    {
        Ok(cfg
            .pins
            .led
            .map(|_| Box::new(blinds_hardware::SimulatedIndicator::new()) as BoxIndicator))
    }
}

/// Serve commands until `shutdown` is raised or `ticks` elapsed.
pub fn run_node(
    cfg: &Config,
    ticks: Option<u64>,
    tick_ms: Option<u64>,
    json: bool,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let mut controller = assemble_controller(cfg)?;
    controller.begin().wrap_err("controller boot")?;
    let indicator = assemble_indicator(cfg)?;
    let topics = TopicMap::from(&cfg.topics);
    let period = Duration::from_millis(tick_ms.unwrap_or(cfg.runner.tick_ms).max(1));
    tracing::info!(
        client_id = %cfg.broker.client_id,
        tick_ms = period.as_millis() as u64,
        ticks = ?ticks,
        "node start"
    );

    #[cfg(feature = "mqtt")]
    {
        use blinds_hardware::mqtt::{MqttBus, MqttSettings};
        let _ = json;
        let bus = MqttBus::new(MqttSettings {
            host: cfg.broker.host.clone(),
            port: cfg.broker.port,
            keep_alive: Duration::from_secs(cfg.broker.keep_alive_s),
        });
        let mut node = Node::new(controller, bus, indicator, topics, &cfg.broker.client_id);
        node.run(period, &shutdown, ticks)
    }

    #[cfg(not(feature = "mqtt"))]
    {
        run_loopback(controller, indicator, topics, cfg, period, ticks, json, &shutdown)
    }
}

/// Loopback broker: inbound messages come from stdin as `topic payload`
/// lines, publications are echoed to stdout.
#[cfg(not(feature = "mqtt"))]
#[allow(clippy::too_many_arguments)]
fn run_loopback(
    controller: Controller,
    indicator: Option<BoxIndicator>,
    topics: TopicMap,
    cfg: &Config,
    period: Duration,
    ticks: Option<u64>,
    json: bool,
    shutdown: &AtomicBool,
) -> Result<RunSummary> {
    use blinds_hardware::LoopbackBus;
    use std::sync::atomic::Ordering;

    let (bus, handle) = LoopbackBus::new();
    spawn_stdin_reader(handle.injector())?;

    let done = Arc::new(AtomicBool::new(false));
    let printer = {
        let handle = handle.clone();
        let done = Arc::clone(&done);
        std::thread::Builder::new()
            .name("publish-echo".into())
            .spawn(move || {
                while !done.load(Ordering::Acquire) {
                    for m in handle.take_published() {
                        print_publication(&m, json);
                    }
                    std::thread::sleep(period);
                }
            })
            .wrap_err("spawn publish echo thread")?
    };

    let mut node = Node::new(controller, bus, indicator, topics, &cfg.broker.client_id);
    let result = node.run(period, shutdown, ticks);

    done.store(true, Ordering::Release);
    if printer.join().is_err() {
        tracing::warn!("publish echo thread panicked");
    }
    for m in handle.take_published() {
        print_publication(&m, json);
    }
    result
}

#[cfg(not(feature = "mqtt"))]
fn print_publication(m: &Message, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({ "topic": m.topic, "payload": m.payload })
        );
    } else {
        println!("{} {}", m.topic, m.payload);
    }
}

/// Feed `topic payload` lines from stdin into the loopback broker until EOF.
#[cfg(not(feature = "mqtt"))]
fn spawn_stdin_reader(tx: crossbeam_channel::Sender<Message>) -> Result<()> {
    use std::io::BufRead;
    std::thread::Builder::new()
        .name("stdin-broker".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let Some(msg) = parse_line(&line) else {
                    continue;
                };
                if tx.send(msg).is_err() {
                    break;
                }
            }
            tracing::debug!("stdin closed");
        })
        .wrap_err("spawn stdin reader")?;
    Ok(())
}

/// `topic payload` with the payload possibly empty; blank and `#` lines are skipped.
#[cfg(not(feature = "mqtt"))]
pub fn parse_line(line: &str) -> Option<Message> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((topic, payload)) => Some(Message::new(topic, payload.trim())),
        None => Some(Message::new(line, "")),
    }
}

pub fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ticks": summary.ticks,
                "commands": summary.commands,
                "publications": summary.publications,
                "faults": summary.faults,
            })
        );
    } else {
        println!(
            "ticks: {} commands: {} publications: {} faults: {}",
            summary.ticks, summary.commands, summary.publications, summary.faults
        );
    }
}

/// Boot the controller, read driver telemetry once and return the snapshot.
pub fn status(cfg: &Config) -> Result<Snapshot> {
    let mut controller = assemble_controller(cfg)?;
    controller.begin().wrap_err("controller boot")?;
    controller.read_status()?;
    let snap = controller.snapshot();
    controller.release_driver()?;
    Ok(snap)
}

pub fn snapshot_json(s: &Snapshot) -> serde_json::Value {
    serde_json::json!({
        "position": s.position,
        "target": s.target,
        "percent": s.percent,
        "target_percent": s.target_percent,
        "driver_enabled": s.driver_enabled,
        "driver_status": s.actuator.map(|a| serde_json::json!({
            "stalled": a.stalled,
            "thermal_warning": a.thermal_warning,
            "enabled": a.enabled,
            "register": a.register,
        })),
        "last_profile": s.last_profile.map(|p| serde_json::json!({
            "current_ma": p.current_ma,
            "speed_rpm": p.speed_rpm,
        })),
        "protection": s.protection.name(),
        "publish_pending": s.publish_pending,
        "reports": s.reports,
        "absolute_encoder": s.has_absolute_encoder,
        "revolutions": s.revolutions,
        "stalls": s.stalls,
        "backoffs": s.backoffs,
        "uptime_ms": s.uptime_ms,
    })
}

/// Config is valid, the driver answers, and the encoder (if enabled) reads.
pub fn self_check(cfg: &Config) -> Result<()> {
    let mut controller = assemble_controller(cfg)?;
    let status = controller.read_status()?;
    if status.stalled {
        tracing::warn!(register = status.register, "driver reports a latched fault");
    }
    controller.begin().wrap_err("encoder seed read")?;
    controller.release_driver()?;
    tracing::info!(
        position = controller.position(),
        absolute_encoder = controller.snapshot().has_absolute_encoder,
        "self-check passed"
    );
    Ok(())
}

#[cfg(all(test, not(feature = "mqtt")))]
mod tests {
    use super::*;

    #[test]
    fn stdin_lines_split_on_first_whitespace() {
        assert_eq!(
            parse_line("esp8266/blinds/set  CLOSE "),
            Some(Message::new("esp8266/blinds/set", "CLOSE"))
        );
        assert_eq!(
            parse_line("blinds/set_position 40"),
            Some(Message::new("blinds/set_position", "40"))
        );
        assert_eq!(parse_line("blinds/set"), Some(Message::new("blinds/set", "")));
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("# comment"), None);
    }
}
