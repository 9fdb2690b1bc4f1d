#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and zone-table parsing for the blinds controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Zone table CSV loader enforces headers and ordering so it can replace
//!   `[motion].zones` at startup.
use serde::Deserialize;
use serde::de::Deserializer;

/// One row of the zone table.
///
/// CSV schema, expected headers:
/// threshold,current_ma,speed_rpm
///
/// Example:
/// threshold,current_ma,speed_rpm
/// -179000,1500,30
/// -80000,1250,30
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ZoneRow {
    /// Lower position bound (device units) at which this zone starts.
    pub threshold: i64,
    pub current_ma: u32,
    pub speed_rpm: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Broker {
    pub host: String,
    pub port: u16,
    /// Device identity used when connecting.
    pub client_id: String,
    pub keep_alive_s: u64,
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            host: "hub.local".to_string(),
            port: 1883,
            client_id: "blinds".to_string(),
            keep_alive_s: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Topics {
    /// OPEN / CLOSE / STOP / RESET / ledon / ledoff
    pub command: String,
    /// Decimal 0..=100 target
    pub set_position: String,
    /// Decimal 0..=100 ground-truth override
    pub feedback: String,
    /// Outbound normalized position
    pub position: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            command: "blinds/set".to_string(),
            set_position: "blinds/set_position".to_string(),
            feedback: "blinds/feedback".to_string(),
            position: "blinds/position".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Travel {
    /// Fully-open bound (device units).
    pub top: i64,
    /// Fully-closed bound (device units).
    pub bottom: i64,
    /// Re-home position; defaults to `top`.
    #[serde(default)]
    pub home: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct Motion {
    /// Settled when |target - position| < deadzone. 0 for open-loop setups.
    #[serde(default)]
    pub deadzone: i64,
    /// Largest forward microstep burst per tick.
    pub max_burst: i32,
    /// Largest reverse burst per tick (negative). Defaults to `-max_burst`.
    #[serde(default)]
    pub min_burst: Option<i32>,
    /// Zone table. Accepts either:
    /// - array of tables: [{ threshold = 0, current_ma = 1500, speed_rpm = 30 }, ...]
    /// - array of tuples: [[0, 1500, 30], [400000, 1000, 60], ...]
    #[serde(deserialize_with = "de_zones")]
    pub zones: Vec<ZoneRow>,
    /// Target gate in front of the zones: unless the target lies strictly
    /// above `threshold` and the position is off it, this profile is used.
    /// Same shape as a zone row.
    #[serde(default)]
    pub descent: Option<ZoneRow>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Protection {
    /// Hold-off after a stall before motion may resume.
    pub cooldown_ms: u64,
    /// Reverse back-off magnitude as a multiple of the planned burst.
    pub backoff_ratio: f32,
    /// Current limit used for the back-off move.
    pub backoff_current_ma: u32,
    /// Settle window after a back-off before full motion resumes.
    pub settle_ms: u64,
}

impl Default for Protection {
    fn default() -> Self {
        Self {
            cooldown_ms: 5000,
            backoff_ratio: 1.5,
            backoff_current_ma: 400,
            settle_ms: 3000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Encoder {
    /// Absolute rotary encoder fitted (closed loop) or not (open loop).
    pub enabled: bool,
    /// Raw counts per revolution of the encoder.
    pub counts_per_rev: u32,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            enabled: true,
            counts_per_rev: 4096,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Driver {
    /// Full steps per motor revolution.
    pub motor_steps: u32,
    pub microsteps: u32,
    /// Sense resistor value used to derive the current scale.
    pub rsense_ohm: f32,
    /// stallGuard threshold (signed 7-bit).
    pub stall_threshold: i8,
}

impl Default for Driver {
    fn default() -> Self {
        Self {
            motor_steps: 200,
            microsteps: 128,
            rsense_ohm: 0.11,
            stall_threshold: 26,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pins {
    pub step: u8,
    pub dir: u8,
    pub en: u8,
    pub led: Option<u8>,
    /// SPI bus index for the driver (0 = /dev/spidev0.x).
    pub spi_bus: u8,
    /// SPI chip select for the driver.
    pub spi_cs: u8,
    /// I2C bus carrying the angle sensor (1 = /dev/i2c-1).
    pub i2c_bus: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            step: 18,
            dir: 23,
            en: 24,
            led: Some(25),
            spi_bus: 0,
            spi_cs: 0,
            i2c_bus: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Control loop period.
    pub tick_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self { tick_ms: 10 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: Broker,
    #[serde(default)]
    pub topics: Topics,
    pub travel: Travel,
    pub motion: Motion,
    #[serde(default)]
    pub protection: Protection,
    #[serde(default)]
    pub encoder: Encoder,
    #[serde(default)]
    pub driver: Driver,
    #[serde(default)]
    pub pins: Pins,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ZoneToml {
    Tuple((i64, u32, u32)),
    Table {
        threshold: i64,
        current_ma: u32,
        speed_rpm: u32,
    },
}

fn de_zones<'de, D>(deserializer: D) -> Result<Vec<ZoneRow>, D::Error>
where
    D: Deserializer<'de>,
{
    let items: Vec<ZoneToml> = Vec::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .map(|z| match z {
            ZoneToml::Tuple((threshold, current_ma, speed_rpm)) => ZoneRow {
                threshold,
                current_ma,
                speed_rpm,
            },
            ZoneToml::Table {
                threshold,
                current_ma,
                speed_rpm,
            } => ZoneRow {
                threshold,
                current_ma,
                speed_rpm,
            },
        })
        .collect())
}

/// Check that zone rows are usable as a partition of the travel range.
pub fn validate_zones(zones: &[ZoneRow]) -> eyre::Result<()> {
    if zones.is_empty() {
        eyre::bail!("motion.zones must contain at least one zone");
    }
    for (i, z) in zones.iter().enumerate() {
        if z.current_ma == 0 {
            eyre::bail!("motion.zones[{i}].current_ma must be > 0");
        }
        if z.speed_rpm == 0 {
            eyre::bail!("motion.zones[{i}].speed_rpm must be > 0");
        }
    }
    for i in 1..zones.len() {
        if zones[i].threshold <= zones[i - 1].threshold {
            eyre::bail!(
                "motion.zones thresholds must be strictly ascending (index {} and {})",
                i - 1,
                i
            );
        }
    }
    Ok(())
}

pub fn load_zones_csv(path: &std::path::Path) -> eyre::Result<Vec<ZoneRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open zone CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["threshold", "current_ma", "speed_rpm"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "zone CSV must have headers 'threshold,current_ma,speed_rpm', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<ZoneRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    validate_zones(&rows)?;
    Ok(rows)
}

impl Motion {
    /// Effective reverse burst limit.
    pub fn min_burst(&self) -> i32 {
        self.min_burst.unwrap_or_else(|| self.max_burst.saturating_neg())
    }
}

impl Travel {
    /// Effective re-home position.
    pub fn home(&self) -> i64 {
        self.home.unwrap_or(self.top)
    }
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Broker / topics
        if self.broker.host.trim().is_empty() {
            eyre::bail!("broker.host must not be empty");
        }
        if self.broker.port == 0 {
            eyre::bail!("broker.port must be > 0");
        }
        if self.broker.client_id.trim().is_empty() {
            eyre::bail!("broker.client_id must not be empty");
        }
        let subs = [
            ("topics.command", &self.topics.command),
            ("topics.set_position", &self.topics.set_position),
            ("topics.feedback", &self.topics.feedback),
            ("topics.position", &self.topics.position),
        ];
        for (key, topic) in subs {
            if topic.trim().is_empty() {
                eyre::bail!("{key} must not be empty");
            }
            if topic.contains('+') || topic.contains('#') {
                eyre::bail!("{key} must be a concrete topic (no wildcards)");
            }
        }
        for i in 0..subs.len() {
            for j in (i + 1)..subs.len() {
                if subs[i].1 == subs[j].1 {
                    eyre::bail!("{} and {} must be distinct", subs[i].0, subs[j].0);
                }
            }
        }

        // Travel
        if self.travel.top <= self.travel.bottom {
            eyre::bail!("travel.top must be greater than travel.bottom");
        }
        let home = self.travel.home();
        if home < self.travel.bottom || home > self.travel.top {
            eyre::bail!("travel.home must lie within [travel.bottom, travel.top]");
        }

        // Motion
        if self.motion.deadzone < 0 {
            eyre::bail!("motion.deadzone must be >= 0");
        }
        if self.motion.max_burst <= 0 {
            eyre::bail!("motion.max_burst must be > 0");
        }
        if self.motion.min_burst() >= 0 {
            eyre::bail!("motion.min_burst must be < 0");
        }
        validate_zones(&self.motion.zones)?;
        if let Some(g) = self.motion.descent
            && (g.current_ma == 0 || g.speed_rpm == 0)
        {
            eyre::bail!("motion.descent current_ma and speed_rpm must be > 0");
        }

        // Protection
        if self.protection.cooldown_ms == 0 {
            eyre::bail!("protection.cooldown_ms must be >= 1");
        }
        if !(self.protection.backoff_ratio.is_finite()
            && self.protection.backoff_ratio > 0.0
            && self.protection.backoff_ratio <= 4.0)
        {
            eyre::bail!("protection.backoff_ratio must be in (0.0, 4.0]");
        }
        if self.protection.backoff_current_ma == 0 {
            eyre::bail!("protection.backoff_current_ma must be > 0");
        }
        if self.protection.settle_ms > 60_000 {
            eyre::bail!("protection.settle_ms is unreasonably large (>60s)");
        }

        // Encoder
        if self.encoder.enabled && self.encoder.counts_per_rev < 4 {
            eyre::bail!("encoder.counts_per_rev must be >= 4");
        }
        if self.encoder.enabled && self.encoder.counts_per_rev > u32::from(u16::MAX) + 1 {
            eyre::bail!("encoder.counts_per_rev must be <= 65536");
        }

        // Driver
        if self.driver.motor_steps == 0 || self.driver.microsteps == 0 {
            eyre::bail!("driver.motor_steps and driver.microsteps must be > 0");
        }
        if !self.driver.microsteps.is_power_of_two() || self.driver.microsteps > 256 {
            eyre::bail!("driver.microsteps must be a power of two <= 256");
        }
        if !(self.driver.rsense_ohm.is_finite() && self.driver.rsense_ohm > 0.0) {
            eyre::bail!("driver.rsense_ohm must be > 0");
        }
        if !(-64..=63).contains(&self.driver.stall_threshold) {
            eyre::bail!("driver.stall_threshold must be in [-64, 63]");
        }

        // Runner
        if self.runner.tick_ms == 0 {
            eyre::bail!("runner.tick_ms must be >= 1");
        }

        Ok(())
    }
}
