/// Telemetry datagram schema for the LuaSTGPlus remote debugger.
///
/// Each UDP packet is one bencode dictionary:
///   { "processId": int, "msgType": int, "args": dict }
/// with the `args` layout depending on `msgType`. The engine sends floats as
/// fixed-point integers: fps/objects are scaled x1000, frametime/rendertime
/// x1000 twice (the sender multiplies by 1000.0 * 1000.0).
///
/// Everything here is a closed enum: any out-of-range message type, resource
/// type or pool value makes the whole datagram unrecognized and the caller
/// drops it. Parsing never fails loudly — `parse_datagram` returns `None` for
/// anything it does not understand, because the receive loop must survive
/// arbitrary traffic on the port.
use std::collections::BTreeMap;

use crate::bencode::{self, Value};
use crate::telemetry::TelemetrySnapshot;

/// UDP port the engine targets when launched with `/debugger:<port>`.
pub const DEFAULT_TELEMETRY_PORT: u16 = 3459;

/// Asset kinds the engine reports resource events for.
/// Wire values start at 1, matching the engine's resource-manager enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Texture,
    Sprite,
    Animation,
    Music,
    SoundEffect,
    Particle,
    SpriteFont,
    TrueTypeFont,
    Fx,
}

impl ResourceType {
    fn from_wire(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Texture),
            2 => Some(Self::Sprite),
            3 => Some(Self::Animation),
            4 => Some(Self::Music),
            5 => Some(Self::SoundEffect),
            6 => Some(Self::Particle),
            7 => Some(Self::SpriteFont),
            8 => Some(Self::TrueTypeFont),
            9 => Some(Self::Fx),
            _ => None,
        }
    }

    /// Short label used in log output and the status file.
    pub fn label(self) -> &'static str {
        match self {
            Self::Texture => "texture",
            Self::Sprite => "sprite",
            Self::Animation => "animation",
            Self::Music => "music",
            Self::SoundEffect => "sound",
            Self::Particle => "particle",
            Self::SpriteFont => "spritefont",
            Self::TrueTypeFont => "ttf",
            Self::Fx => "fx",
        }
    }
}

/// Which resource pool an event concerns. The engine also has an internal
/// "none" pool (wire value 0) that never appears in telemetry; it is treated
/// as out of range here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePool {
    Global,
    Stage,
}

impl ResourcePool {
    fn from_wire(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Global),
            2 => Some(Self::Stage),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Stage => "stage",
        }
    }
}

/// A resource lifecycle notification. Pure event — the monitor keeps no
/// resource bookkeeping; aggregation belongs to whoever consumes these.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    Loaded {
        kind: ResourceType,
        pool: ResourcePool,
        name: String,
        path: String,
        /// Seconds the engine spent loading the asset.
        load_time: f32,
    },
    Removed {
        kind: ResourceType,
        pool: ResourcePool,
        name: String,
    },
    Cleared {
        pool: ResourcePool,
    },
}

/// Payload of one recognized datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Performance(TelemetrySnapshot),
    Resource(ResourceEvent),
}

/// A fully parsed datagram: sender pid plus typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    pub process_id: u32,
    pub message: Telemetry,
}

/// Parses one UDP payload. Returns `None` for anything malformed, foreign or
/// out of range — the caller drops such packets without comment.
pub fn parse_datagram(data: &[u8]) -> Option<Datagram> {
    let top = bencode::decode_dictionary(data).ok()?;

    let process_id = u32::try_from(get_int(&top, "processId")?).ok()?;
    let msg_type = get_int(&top, "msgType")?;
    let args = match top.get("args")? {
        Value::Dict(map) => map,
        _ => return None,
    };

    let message = match msg_type {
        1 => parse_performance(args)?,
        2 => parse_loaded(args)?,
        3 => parse_removed(args)?,
        4 => parse_cleared(args)?,
        _ => return None,
    };

    Some(Datagram { process_id, message })
}

fn parse_performance(args: &BTreeMap<String, Value>) -> Option<Telemetry> {
    // frametime/rendertime arrive scaled by 1000 twice; divide twice to match
    // the sender exactly.
    Some(Telemetry::Performance(TelemetrySnapshot {
        fps: get_int(args, "fps")? as f32 / 1000.0,
        objects: get_int(args, "objects")? as f32 / 1000.0,
        frame_time: get_int(args, "frametime")? as f32 / 1000.0 / 1000.0,
        render_time: get_int(args, "rendertime")? as f32 / 1000.0 / 1000.0,
    }))
}

fn parse_loaded(args: &BTreeMap<String, Value>) -> Option<Telemetry> {
    Some(Telemetry::Resource(ResourceEvent::Loaded {
        kind: ResourceType::from_wire(get_int(args, "type")?)?,
        pool: ResourcePool::from_wire(get_int(args, "pool")?)?,
        name: get_string(args, "name")?,
        path: get_string(args, "path")?,
        load_time: get_int(args, "time")? as f32 / 1000.0,
    }))
}

fn parse_removed(args: &BTreeMap<String, Value>) -> Option<Telemetry> {
    Some(Telemetry::Resource(ResourceEvent::Removed {
        kind: ResourceType::from_wire(get_int(args, "type")?)?,
        pool: ResourcePool::from_wire(get_int(args, "pool")?)?,
        name: get_string(args, "name")?,
    }))
}

fn parse_cleared(args: &BTreeMap<String, Value>) -> Option<Telemetry> {
    Some(Telemetry::Resource(ResourceEvent::Cleared {
        pool: ResourcePool::from_wire(get_int(args, "pool")?)?,
    }))
}

fn get_int(map: &BTreeMap<String, Value>, key: &str) -> Option<i64> {
    match map.get(key)? {
        Value::Int(n) => Some(*n),
        _ => None,
    }
}

/// Byte-string field decoded as UTF-8. The engine converts wide paths to
/// UTF-8 before sending; anything else is replaced, not rejected.
fn get_string(map: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}
