//! Air-quality sensor cluster read through the Linux IIO sysfs interface.
//!
//! The kernel drivers for the CCS811 (gas), BME280 (pressure, humidity,
//! temperature) and TMP117 (temperature) expose their channels under
//! `/sys/bus/i2c/devices/<bus>-<addr>/iio:deviceN/`. This module only reads
//! those attributes and scales them; calibration stays with the drivers.

use crate::config::AirqConfig;
use crate::error::{AirqError, Result};
use crate::sensors::record::SensorRecord;
use crate::sensors::traits::ReadingSource;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// One sensor on the I2C bus, located by bus number and address.
#[derive(Debug, Clone)]
pub struct I2cSensor {
    name: &'static str,
    device_dir: PathBuf,
}

impl I2cSensor {
    pub fn new(name: &'static str, sysfs_root: &Path, bus: u32, address: u16) -> Self {
        Self {
            name,
            device_dir: sysfs_root.join(format!("{}-{:04x}", bus, address)),
        }
    }

    /// Find the IIO device directory bound to this I2C client.
    fn iio_dir(&self) -> Result<PathBuf> {
        let entries = fs::read_dir(&self.device_dir).map_err(|e| {
            AirqError::sensor_error(format!(
                "{} not found at {}: {}",
                self.name,
                self.device_dir.display(),
                e
            ))
        })?;

        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with("iio:device") {
                return Ok(entry.path());
            }
        }

        Err(AirqError::sensor_error(format!(
            "{} at {} has no IIO device bound",
            self.name,
            self.device_dir.display()
        )))
    }

    /// Read a numeric IIO attribute.
    fn read_attr(&self, attr: &str) -> Result<f64> {
        let path = self.iio_dir()?.join(attr);
        let raw = fs::read_to_string(&path).map_err(|e| {
            AirqError::sensor_error(format!("{}: failed to read {}: {}", self.name, attr, e))
        })?;
        raw.trim().parse::<f64>().map_err(|_| {
            AirqError::sensor_error(format!(
                "{}: unparsable {} value {:?}",
                self.name,
                attr,
                raw.trim()
            ))
        })
    }
}

/// The CCS811 + BME280 + TMP117 cluster.
pub struct AirqDevice {
    ccs811: I2cSensor,
    bme280: I2cSensor,
    tmp117: I2cSensor,
    ccs811_n_samples: u32,
    sample_period: Duration,
}

impl AirqDevice {
    /// Create a device from the `airq` configuration section.
    pub fn new(config: &AirqConfig) -> Self {
        let root = config.sysfs_root.as_path();
        Self {
            ccs811: I2cSensor::new("ccs811", root, config.i2c_bus, config.ccs811_i2c),
            bme280: I2cSensor::new("bme280", root, config.i2c_bus, config.bme280_i2c),
            tmp117: I2cSensor::new("tmp117", root, config.i2c_bus, config.tmp117_i2c),
            ccs811_n_samples: config.ccs811_n_samples.max(1),
            sample_period: Duration::from_millis(config.ccs811_sample_period_ms),
        }
    }

    /// Sample the gas sensor `n` times and return `(tvoc, eco2)` statistics.
    ///
    /// Samples are spaced by the sample period so each one sees a fresh
    /// driver result. This blocks the calling thread for `(n - 1)` periods.
    fn sample_gas(&self) -> Result<(Stats, Stats)> {
        let mut tvoc = Vec::with_capacity(self.ccs811_n_samples as usize);
        let mut eco2 = Vec::with_capacity(self.ccs811_n_samples as usize);
        for i in 0..self.ccs811_n_samples {
            if i > 0 && !self.sample_period.is_zero() {
                thread::sleep(self.sample_period);
            }
            tvoc.push(self.ccs811.read_attr("in_concentration_voc_raw")?);
            eco2.push(self.ccs811.read_attr("in_concentration_co2_raw")?);
        }
        Ok((Stats::from_samples(&tvoc), Stats::from_samples(&eco2)))
    }
}

impl ReadingSource for AirqDevice {
    fn reading(&mut self) -> Result<SensorRecord> {
        let (tvoc, eco2) = self.sample_gas()?;

        // bmp280 driver units: kPa, milli-percent, milli-degC
        let pres_kpa = self.bme280.read_attr("in_pressure_input")?;
        let rh_milli = self.bme280.read_attr("in_humidityrelative_input")?;
        let tbme_milli = self.bme280.read_attr("in_temp_input")?;

        let tmp117_raw = self.tmp117.read_attr("in_temp_raw")?;
        let tmp117_scale = self.tmp117.read_attr("in_temp_scale")?;

        let record = SensorRecord::new()
            .with("tvoc_ppb", round_to(tvoc.mean, 1))
            .with("tvoc_std", round_to(tvoc.std_dev, 2))
            .with("eco2_ppm", round_to(eco2.mean, 1))
            .with("eco2_std", round_to(eco2.std_dev, 2))
            .with("pres_mb", round_to(pres_kpa * 10.0, 2))
            .with("rh", round_to(rh_milli / 1000.0, 2))
            .with("tbme_degc", round_to(tbme_milli / 1000.0, 2))
            .with("tdry_degc", round_to(tmp117_raw * tmp117_scale / 1000.0, 3))
            .with("n", self.ccs811_n_samples);

        tracing::debug!(fields = record.len(), "air-quality reading taken");
        Ok(record)
    }
}

/// Mean and population standard deviation of a sample set.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Stats {
    mean: f64,
    std_dev: f64,
}

impl Stats {
    fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self { mean: 0.0, std_dev: 0.0 };
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
