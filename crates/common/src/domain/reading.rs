use chrono::NaiveDateTime;

/// Unbox code written with a full reading when the payload carries none
pub const DEFAULT_UNBOX_CODE: char = 'C';

/// Civil timestamp layout shared with the reporting system
pub const CIVIL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Calibrated sensor values in engineering units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorValues {
    pub sensor1: f64,
    pub sensor2: f64,
    pub sensor3: f64,
    pub sensor4: f64,
}

impl SensorValues {
    pub const ZERO: SensorValues = SensorValues {
        sensor1: 0.0,
        sensor2: 0.0,
        sensor3: 0.0,
        sensor4: 0.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingMode {
    FullReading,
    IdentifierOnly,
}

/// Shape of a resolved reading; the two modes are mutually exclusive
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingKind {
    /// All four sensors present. `unbox` is only set when the payload carried one.
    Full {
        sensors: SensorValues,
        unbox: Option<char>,
    },
    /// Only the box/identifier flag was sent
    IdentifierOnly { id_flag: char },
}

/// Typed reading produced by the resolver, ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalReading {
    pub device_id: String,
    pub observed_at: NaiveDateTime,
    pub kind: ReadingKind,
}

impl CanonicalReading {
    pub fn mode(&self) -> ReadingMode {
        match self.kind {
            ReadingKind::Full { .. } => ReadingMode::FullReading,
            ReadingKind::IdentifierOnly { .. } => ReadingMode::IdentifierOnly,
        }
    }

    /// Sensor values to store; identifier-only readings report zeros
    pub fn sensors(&self) -> SensorValues {
        match self.kind {
            ReadingKind::Full { sensors, .. } => sensors,
            ReadingKind::IdentifierOnly { .. } => SensorValues::ZERO,
        }
    }

    /// Unbox code for the reading row, falling back to the default
    pub fn unbox_code(&self) -> char {
        match self.kind {
            ReadingKind::Full { unbox, .. } => unbox.unwrap_or(DEFAULT_UNBOX_CODE),
            ReadingKind::IdentifierOnly { id_flag } => id_flag,
        }
    }

    /// Unbox code as found in the payload, never the default
    pub fn payload_unbox_code(&self) -> Option<char> {
        match self.kind {
            ReadingKind::Full { unbox, .. } => unbox,
            ReadingKind::IdentifierOnly { id_flag } => Some(id_flag),
        }
    }
}

/// Sparse set of device attributes. Absent fields are never written.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttributeSet {
    pub main_power: Option<f64>,
    pub gsm_signal: Option<i32>,
    pub sample_time: Option<i32>,
    pub sending_rate: Option<i32>,
    pub unbox_code: Option<char>,
}

impl AttributeSet {
    pub fn is_empty(&self) -> bool {
        self.main_power.is_none()
            && self.gsm_signal.is_none()
            && self.sample_time.is_none()
            && self.sending_rate.is_none()
            && self.unbox_code.is_none()
    }
}
