use super::{expect_success, read_pin, status_map, DeviceError};
use crate::controller::CommandSink;
use crate::tools::StatusMap;
use linkbrain_protocol::Command;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// ADC-capable pins on the peer
pub const ADC_PINS: [u8; 6] = [32, 33, 34, 35, 36, 39];

const ADC_MAX: f64 = 4095.0;
const ADC_REFERENCE_VOLTS: f64 = 3.3;
const DEFAULT_LINE_VOLTAGE: f64 = 220.0;

/// Latest converted sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyReadings {
    pub current_amps: f64,
    pub power_watts: f64,
    pub voltage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_adc: Option<u16>,
}

impl EnergyReadings {
    fn idle(voltage: f64) -> Self {
        Self {
            current_amps: 0.0,
            power_watts: 0.0,
            voltage,
            raw_adc: None,
        }
    }

    /// Convert a raw 12-bit count: 0..=4095 maps onto 0..=3.3 V at the pin
    fn from_raw(raw: u16, voltage: f64, calibration_factor: f64) -> Self {
        let pin_volts = f64::from(raw) / ADC_MAX * ADC_REFERENCE_VOLTS;
        let current_amps = pin_volts * calibration_factor;
        Self {
            current_amps: round_to(current_amps, 3),
            power_watts: round_to(current_amps * voltage, 2),
            voltage,
            raw_adc: Some(raw),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Current sensor on an ADC pin
pub struct EnergyMonitor {
    name: String,
    pin: u8,
    sink: Arc<dyn CommandSink>,
    voltage: f64,
    calibration_factor: f64,
    readings: RwLock<EnergyReadings>,
}

impl EnergyMonitor {
    pub fn new(
        name: impl Into<String>,
        pin: u8,
        sink: Arc<dyn CommandSink>,
    ) -> Result<Self, DeviceError> {
        if !ADC_PINS.contains(&pin) {
            return Err(DeviceError::InvalidPin {
                pin,
                reason: format!("not ADC-capable, use one of {:?}", ADC_PINS),
            });
        }

        Ok(Self {
            name: name.into(),
            pin,
            sink,
            voltage: DEFAULT_LINE_VOLTAGE,
            calibration_factor: 1.0,
            readings: RwLock::new(EnergyReadings::idle(DEFAULT_LINE_VOLTAGE)),
        })
    }

    /// Line voltage used for the power calculation
    pub fn with_voltage(mut self, voltage: f64) -> Self {
        self.voltage = voltage;
        self.readings = RwLock::new(EnergyReadings::idle(voltage));
        self
    }

    pub fn with_calibration(mut self, factor: f64) -> Self {
        self.calibration_factor = factor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Put the pin into input mode. Failure is logged only; later reads
    /// surface any real problem.
    pub async fn init(&self) {
        match self.sink.send_command(Command::gpio_mode(self.pin, "input")).await {
            Ok(response) => {
                if let Err(e) = expect_success(response) {
                    warn!("Failed to initialize ADC pin {}: {}", self.pin, e);
                }
            }
            Err(e) => warn!("Could not initialize ADC pin {}: {}", self.pin, e),
        }
    }

    /// Sample the sensor and cache the converted reading
    pub async fn read(&self) -> Result<EnergyReadings, DeviceError> {
        let raw = read_pin(self.sink.as_ref(), self.pin).await?;
        let readings = EnergyReadings::from_raw(raw, self.voltage, self.calibration_factor);
        debug!("{} readings: {:?}", self.name, readings);
        *self.readings.write().await = readings;
        Ok(readings)
    }

    /// Status with the freshest reading available
    pub async fn status(&self) -> StatusMap {
        if let Err(e) = self.read().await {
            warn!("Could not get readings: {}", e);
        }
        let readings = *self.readings.read().await;
        status_map(json!({
            "name": self.name,
            "pin": self.pin,
            "type": "energy_monitor",
            "readings": readings,
            "voltage": self.voltage,
            "calibration_factor": self.calibration_factor,
        }))
    }
}
