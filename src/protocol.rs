// DSU (Cemuhook) protocol constants
pub const MAGIC_CLIENT: [u8; 4] = *b"DSUC";
pub const MAGIC_SERVER: [u8; 4] = *b"DSUS";
pub const PROTOCOL_VERSION: u16 = 1001;
pub const SERVER_ID: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];

pub const HEADER_LEN: usize = 16;
pub const TYPE_LEN: usize = 4;
pub const MAX_DATAGRAM: usize = 1024;

pub const TYPE_VERSION: u32 = 0x0010_0000;
pub const TYPE_PORTS: u32 = 0x0010_0001;
pub const TYPE_DATA: u32 = 0x0010_0002;

pub const SLOT_BASE: u8 = 0;
pub const SLOT_DISPLAY: u8 = 1;

pub const CONNECTION_STATE_CONNECTED: u8 = 0x02;
pub const CONNECTION_METHOD_NONE: u8 = 0x00;
pub const MODEL_NOT_CONNECTED: u8 = 0x00;
pub const MODEL_PARTIAL: u8 = 0x01;
pub const MODEL_FULL_GYRO: u8 = 0x02;

pub const BATTERY_UNKNOWN: u8 = 0x00;
pub const BATTERY_DYING: u8 = 0x01;
pub const BATTERY_LOW: u8 = 0x02;
pub const BATTERY_MEDIUM: u8 = 0x03;
pub const BATTERY_HIGH: u8 = 0x04;
pub const BATTERY_FULL: u8 = 0x05;
pub const BATTERY_CHARGING: u8 = 0xEE;
pub const BATTERY_CHARGED: u8 = 0xEF;

/// Highest action code that still means "subscribe" (0 = all, 1 = by slot).
pub const ACTION_SUBSCRIBE_MAX: u8 = 0x01;

pub const DEFAULT_PORT: u16 = 26760;
pub const DEFAULT_TTL_MS: u64 = 2000;
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 100;
