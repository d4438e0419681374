//! Demonstration payload: a fixed-size air-quality record.
//!
//! The core is generic over any `Payload`; this record is the shape the
//! demo modes and the seed scenarios move through the queue. Strings live
//! in NUL-padded fixed buffers so the record stays `Copy` with no owned
//! heap.

use std::fmt;

pub const MAX_TIMESTAMP_LEN: usize = 33;
pub const MAX_CITY_LEN: usize = 64;
pub const MAX_ICON_LEN: usize = 32;

/// City name reserved for the end-of-stream sentinel. The queue carries a
/// sentinel like any other record; only consumers interpret it.
pub const SENTINEL_CITY: &str = "##BENCHMARK_END##";

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeatherRecord {
    timestamp: [u8; MAX_TIMESTAMP_LEN],
    city: [u8; MAX_CITY_LEN],
    pub aqi: i32,
    icon: [u8; MAX_ICON_LEN],
    pub wind_speed: f32,
    pub humidity: i32,
    pub valid: bool,
}

fn pack(dst: &mut [u8], src: &str) {
    // Truncate to the buffer, always leaving a terminating NUL.
    let take = src.len().min(dst.len() - 1);
    dst[..take].copy_from_slice(&src.as_bytes()[..take]);
    for b in dst[take..].iter_mut() {
        *b = 0;
    }
}

fn unpack(src: &[u8]) -> &str {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    std::str::from_utf8(&src[..end]).unwrap_or("")
}

impl WeatherRecord {
    pub fn new(
        timestamp: &str,
        city: &str,
        aqi: i32,
        icon: &str,
        wind_speed: f32,
        humidity: i32,
    ) -> Self {
        let mut record = Self::invalid();
        pack(&mut record.timestamp, timestamp);
        pack(&mut record.city, city);
        record.aqi = aqi;
        pack(&mut record.icon, icon);
        record.wind_speed = wind_speed;
        record.humidity = humidity;
        record.valid = true;
        record
    }

    /// All-zero record with `valid = false`.
    pub fn invalid() -> Self {
        Self {
            timestamp: [0; MAX_TIMESTAMP_LEN],
            city: [0; MAX_CITY_LEN],
            aqi: 0,
            icon: [0; MAX_ICON_LEN],
            wind_speed: 0.0,
            humidity: 0,
            valid: false,
        }
    }

    /// Synthetic record for test mode, derived from the item number.
    pub fn synthetic(item_number: usize) -> Self {
        Self::new(
            "2025-05-23T22:01:56.580965+07:00",
            &format!("TestCity{}", item_number),
            (item_number as i32 * 10) % 300,
            &format!("icon{}", item_number % 5),
            item_number as f32 * 1.5,
            (item_number as i32 * 5) % 100,
        )
    }

    /// End-of-stream marker; one is pushed per consumer.
    pub fn sentinel() -> Self {
        let mut record = Self::new(
            "9999-12-31T23:59:59.999999+00:00",
            SENTINEL_CITY,
            -1,
            "none",
            -1.0,
            -1,
        );
        record.valid = true;
        record
    }

    pub fn is_sentinel(&self) -> bool {
        self.valid && self.city() == SENTINEL_CITY
    }

    pub fn timestamp(&self) -> &str {
        unpack(&self.timestamp)
    }

    pub fn city(&self) -> &str {
        unpack(&self.city)
    }

    pub fn icon(&self) -> &str {
        unpack(&self.icon)
    }

    /// Parse one CSV line, format
    /// `timestamp,city,aqi,weather_icon,wind_speed,humidity`.
    /// Header and blank lines yield `None`.
    pub fn parse_csv(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() || line.starts_with("timestamp") {
            return None;
        }

        let mut fields = line.split(',');
        let timestamp = fields.next()?;
        let city = fields.next()?;
        let aqi = fields.next()?.trim().parse().ok()?;
        let icon = fields.next()?;
        let wind_speed = fields.next()?.trim().parse().ok()?;
        let humidity = fields.next()?.trim().parse().ok()?;

        Some(Self::new(timestamp, city, aqi, icon, wind_speed, humidity))
    }
}

impl fmt::Display for WeatherRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid {
            return write!(f, "invalid weather record");
        }
        write!(
            f,
            "Timestamp: {}, City: {}, AQI: {}, Icon: {}, Wind: {:.1}, Humidity: {}%",
            self.timestamp(),
            self.city(),
            self.aqi,
            self.icon(),
            self.wind_speed,
            self.humidity
        )
    }
}
