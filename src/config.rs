use crate::data::Grade;
use serde::{Deserialize, Serialize};
use std::env;

/// Students per room the planner sizes level groups against.
pub const IDEAL_ROOM_CAPACITY: u32 = 22;
/// Hard ceiling a homeroom may be filled to.
pub const MAX_ROOM_CAPACITY: u32 = 28;
/// Grade whose rooms host the Tahsili track instead of Qudrat.
pub const ALTERNATE_TRACK_GRADE: Grade = 12;

pub const BIND_ADDR_ENV: &str = "ROOM_PLANNER_ADDR";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Tunables for one planning call. Requests may override any field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannerConfig {
    pub ideal_room_capacity: u32,
    pub max_room_capacity: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            ideal_room_capacity: IDEAL_ROOM_CAPACITY,
            max_room_capacity: MAX_ROOM_CAPACITY,
        }
    }
}

impl PlannerConfig {
    /// Ideal capacity as a divisor; never zero.
    pub fn ideal_capacity(&self) -> usize {
        self.ideal_room_capacity.max(1) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_addr = env::var(BIND_ADDR_ENV).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        Self { bind_addr }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}
