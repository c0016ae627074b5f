use serde::{Deserialize, Serialize};

/// Device state as broadcast on the status port.
///
/// Schema only: nothing in this crate listens on the status port yet, so no
/// record is ever built from the wire here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelloStatus {
    /// Mission pad id, -1 when none is detected.
    pub mid: i32,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
    pub vgx: i32,
    pub vgy: i32,
    pub vgz: i32,
    pub templ: f64,
    pub temph: f64,
    /// Time-of-flight distance, cm.
    pub tof: f64,
    /// Height, cm.
    pub h: i32,
    /// Battery, percent.
    pub bat: f64,
    pub baro: f64,
    /// Motor time, seconds.
    pub time: f64,
    pub agx: f64,
    pub agy: f64,
    pub agz: f64,
}
