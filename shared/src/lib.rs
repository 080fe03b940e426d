use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

pub mod codec;

pub const PROTOCOL_VERSION: u32 = 1;

/// Absolute per-component tolerance used when comparing positions.
pub const POSITION_EPSILON: f32 = 1e-5;

/// Largest frame payload accepted by the codec.
pub const MAX_FRAME_SIZE: usize = 1 << 20;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// True when every component is within [`POSITION_EPSILON`] of `other`.
    pub fn approx_eq(&self, other: &Vec3) -> bool {
        (self.x - other.x).abs() <= POSITION_EPSILON
            && (self.y - other.y).abs() <= POSITION_EPSILON
            && (self.z - other.z).abs() <= POSITION_EPSILON
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Text message flavours. Only object whispers are hidden from the operator.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Raw,
    Chat,
    Translation,
    Popup,
    Tip,
    System,
    Whisper,
    Announcement,
    ObjectWhisper,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ActorEventKind {
    Hurt,
    Died,
    Respawn,
    Other(u8),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerListEntry {
    pub username: String,
    pub unique_id: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Handshake
    Login {
        client_version: u32,
        token: String,
    },
    LoginAccepted {
        runtime_id: u64,
    },
    Disconnect {
        reason: String,
    },

    // World updates
    Text {
        kind: TextKind,
        source_name: String,
        message: String,
        parameters: Vec<String>,
        needs_translation: bool,
    },
    PlayerList {
        entries: Vec<PlayerListEntry>,
    },
    AddPlayer {
        username: String,
        runtime_id: u64,
        unique_id: i64,
        position: Vec3,
    },
    RemoveEntity {
        runtime_id: u64,
    },
    ActorEvent {
        runtime_id: u64,
        event: ActorEventKind,
    },
    MovePlayer {
        runtime_id: u64,
        position: Vec3,
    },
    MoveActorAbsolute {
        runtime_id: u64,
        position: Vec3,
    },
    MoveActorDelta {
        runtime_id: u64,
        delta: Vec3,
    },

    Heartbeat {
        timestamp: u64,
    },
    /// A message kind this client does not model.
    Unknown {
        id: u32,
        payload: Vec<u8>,
    },
}

impl Packet {
    /// Short name of the message kind, used in log lines.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Packet::Login { .. } => "login",
            Packet::LoginAccepted { .. } => "login_accepted",
            Packet::Disconnect { .. } => "disconnect",
            Packet::Text { .. } => "text",
            Packet::PlayerList { .. } => "player_list",
            Packet::AddPlayer { .. } => "add_player",
            Packet::RemoveEntity { .. } => "remove_entity",
            Packet::ActorEvent { .. } => "actor_event",
            Packet::MovePlayer { .. } => "move_player",
            Packet::MoveActorAbsolute { .. } => "move_actor_absolute",
            Packet::MoveActorDelta { .. } => "move_actor_delta",
            Packet::Heartbeat { .. } => "heartbeat",
            Packet::Unknown { .. } => "unknown",
        }
    }
}
