//! External ("X") sensor value cache.
//!
//! Browsers push virtual sensor snapshots (gyroscope, touch surface, video
//! tracking, geolocation, or arbitrary key/value maps) with `setXSnsValue`.
//! The cache keeps exactly one slot per sensor name; every push replaces the
//! slot wholesale, so a concurrent reader sees either the old snapshot or
//! the new one, never a half-updated value. Decoding runs at most once per
//! slot instance, on first read, and is pure — a benign race between two
//! first-reads would at worst decode the same snapshot twice.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock, OnceLock};

use parking_lot::RwLock;
use serde_json::{Map, Value, json};

/// Wire codes for the typed sensor snapshots.
pub const XSENSOR_TYPE_GYRO: &str = "Gyr1";
pub const XSENSOR_TYPE_TOUCH: &str = "Tch1";
pub const XSENSOR_TYPE_VIDEO: &str = "Vid1";
pub const XSENSOR_TYPE_GEO: &str = "Geo1";

/// Decoded value of one sensor snapshot.
///
/// Immutable once built; shared by reference with however many readers ask.
#[derive(Clone, Debug, PartialEq)]
pub struct XSensorValue {
    is_started: bool,
    reading: XSensorReading,
}

/// Per-type payload of a decoded snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum XSensorReading {
    /// Sensor was never pushed, or the snapshot carried no typed payload.
    None,
    /// Gyroscope: angle per axis, degrees.
    Gyro { x_angle: f64, y_angle: f64, z_angle: f64 },
    /// Multi-touch surface: active touch name to hit count.
    Touch { touches: BTreeMap<String, i64> },
    /// Video object tracking: tracked object name to (x, y) position.
    Video { objects: BTreeMap<String, (i64, i64)> },
    /// Geolocation fix.
    Geo {
        latitude: f64,
        longitude: f64,
        accuracy: f64,
        altitude: f64,
        altitude_accuracy: f64,
    },
    /// Untyped key/value snapshot, kept as-is.
    Map(Map<String, Value>),
}

impl XSensorValue {
    /// The well-defined default for a sensor that was never pushed.
    pub fn not_started() -> Self {
        Self { is_started: false, reading: XSensorReading::None }
    }

    pub fn is_started(&self) -> bool {
        self.is_started
    }

    pub fn reading(&self) -> &XSensorReading {
        &self.reading
    }

    /// Flat JSON view handed to scripts: `isStarted` plus the per-type
    /// fields at the top level.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        let _ = obj.insert("isStarted".into(), json!(self.is_started));
        match &self.reading {
            XSensorReading::None => {}
            XSensorReading::Gyro { x_angle, y_angle, z_angle } => {
                let _ = obj.insert("x".into(), json!({ "angle": x_angle }));
                let _ = obj.insert("y".into(), json!({ "angle": y_angle }));
                let _ = obj.insert("z".into(), json!({ "angle": z_angle }));
            }
            XSensorReading::Touch { touches } => {
                let _ = obj.insert("touches".into(), json!(touches));
            }
            XSensorReading::Video { objects } => {
                let rendered: Map<String, Value> = objects
                    .iter()
                    .map(|(name, (x, y))| (name.clone(), json!({ "x": x, "y": y })))
                    .collect();
                let _ = obj.insert("objects".into(), Value::Object(rendered));
            }
            XSensorReading::Geo { latitude, longitude, accuracy, altitude, altitude_accuracy } => {
                let _ = obj.insert("latitude".into(), json!(latitude));
                let _ = obj.insert("longitude".into(), json!(longitude));
                let _ = obj.insert("accuracy".into(), json!(accuracy));
                let _ = obj.insert("altitude".into(), json!(altitude));
                let _ = obj.insert("altitudeAccuracy".into(), json!(altitude_accuracy));
            }
            XSensorReading::Map(map) => {
                for (k, v) in map {
                    if k != "isStarted" {
                        let _ = obj.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        Value::Object(obj)
    }
}

fn num(obj: &Map<String, Value>, key: &str) -> f64 {
    obj.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn axis_angle(obj: &Map<String, Value>, key: &str) -> f64 {
    obj.get(key)
        .and_then(Value::as_object)
        .map(|axis| num(axis, "angle"))
        .unwrap_or(0.0)
}

/// Decode a raw snapshot. Pure: no side effects, total over any JSON input.
fn decode(sensor_type: &str, raw: &Value) -> XSensorValue {
    let Some(obj) = raw.as_object() else {
        return XSensorValue::not_started();
    };
    let is_started = obj.get("isStarted").and_then(Value::as_bool).unwrap_or(false);
    let reading = match sensor_type {
        XSENSOR_TYPE_GYRO => XSensorReading::Gyro {
            x_angle: if is_started { axis_angle(obj, "x") } else { 0.0 },
            y_angle: if is_started { axis_angle(obj, "y") } else { 0.0 },
            z_angle: if is_started { axis_angle(obj, "z") } else { 0.0 },
        },
        XSENSOR_TYPE_TOUCH => {
            let mut touches = BTreeMap::new();
            if is_started {
                if let Some(raw_touches) = obj.get("touchs").and_then(Value::as_object) {
                    for (name, hits) in raw_touches {
                        let _ = touches.insert(name.clone(), hits.as_i64().unwrap_or(0));
                    }
                }
            }
            XSensorReading::Touch { touches }
        }
        XSENSOR_TYPE_VIDEO => {
            let mut objects = BTreeMap::new();
            if is_started {
                if let Some(raw_objects) = obj.get("objects").and_then(Value::as_object) {
                    for (name, pos) in raw_objects {
                        let pos = pos.as_object();
                        let x = pos.map_or(0, |p| p.get("x").and_then(Value::as_i64).unwrap_or(0));
                        let y = pos.map_or(0, |p| p.get("y").and_then(Value::as_i64).unwrap_or(0));
                        let _ = objects.insert(name.clone(), (x, y));
                    }
                }
            }
            XSensorReading::Video { objects }
        }
        XSENSOR_TYPE_GEO => XSensorReading::Geo {
            latitude: num(obj, "latitude"),
            longitude: num(obj, "longitude"),
            accuracy: num(obj, "accuracy"),
            altitude: num(obj, "altitude"),
            altitude_accuracy: num(obj, "altitudeAccuracy"),
        },
        _ => XSensorReading::Map(obj.clone()),
    };
    XSensorValue { is_started, reading }
}

/// One pushed snapshot plus its decode-once cache.
///
/// The slot is replaced wholesale on every push; `resolved` is computed at
/// most once for this slot instance and is immutable afterwards.
#[derive(Debug)]
struct XSensorSlot {
    sensor_type: String,
    raw: Value,
    resolved: OnceLock<Arc<XSensorValue>>,
}

impl XSensorSlot {
    fn value(&self) -> Arc<XSensorValue> {
        Arc::clone(
            self.resolved
                .get_or_init(|| Arc::new(decode(&self.sensor_type, &self.raw))),
        )
    }
}

static NOT_STARTED: LazyLock<Arc<XSensorValue>> =
    LazyLock::new(|| Arc::new(XSensorValue::not_started()));

/// Most-recent-value cache for every named external sensor.
///
/// Producers (the `setXSnsValue` handler on the I/O thread) and the consumer
/// (the script thread) only contend on the brief map access; the decoded
/// value itself needs no lock because slots are replaced, never mutated.
#[derive(Debug, Default)]
pub struct XSensorRegistry {
    slots: RwLock<HashMap<String, Arc<XSensorSlot>>>,
}

impl XSensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh snapshot for `name`, replacing any previous slot.
    pub fn set_value(&self, name: &str, sensor_type: &str, raw: Value) {
        let slot = Arc::new(XSensorSlot {
            sensor_type: sensor_type.to_string(),
            raw,
            resolved: OnceLock::new(),
        });
        let _ = self.slots.write().insert(name.to_string(), slot);
    }

    /// Current decoded value for `name`; the not-started default when the
    /// sensor was never pushed.
    pub fn value(&self, name: &str) -> Arc<XSensorValue> {
        let slot = self.slots.read().get(name).cloned();
        match slot {
            Some(slot) => slot.value(),
            None => Arc::clone(&NOT_STARTED),
        }
    }
}
