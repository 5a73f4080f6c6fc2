use crate::protocol::{
    HEADER_LEN, MAGIC_CLIENT, MAGIC_SERVER, PROTOCOL_VERSION, SERVER_ID, TYPE_DATA, TYPE_LEN,
    TYPE_PORTS, TYPE_VERSION,
};
use bytemuck::{Pod, Zeroable};
use crc32fast::Hasher;
use thiserror::Error;

pub type Slot = u8;

const CRC_RANGE: std::ops::Range<usize> = 8..12;

// [magic:4][version:2][length:2][crc32:4][server_id:4][type:4]
// `length` counts the type field plus the payload.
#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct RawHeader {
    magic: [u8; 4],
    version: [u8; 2],
    length: [u8; 2],
    crc: [u8; 4],
    server_id: [u8; 4],
    packet_type: [u8; 4],
}

const RAW_HEADER_LEN: usize = std::mem::size_of::<RawHeader>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Version,
    Ports,
    Data,
}

impl PacketType {
    pub fn code(self) -> u32 {
        match self {
            PacketType::Version => TYPE_VERSION,
            PacketType::Ports => TYPE_PORTS,
            PacketType::Data => TYPE_DATA,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            TYPE_VERSION => Some(PacketType::Version),
            TYPE_PORTS => Some(PacketType::Ports),
            TYPE_DATA => Some(PacketType::Data),
            _ => None,
        }
    }
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Version,
    Ports { slots: Vec<Slot> },
    Data { action: u8, slot: Slot, mac: [u8; 6] },
}

impl Request {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Request::Version => PacketType::Version,
            Request::Ports { .. } => PacketType::Ports,
            Request::Data { .. } => PacketType::Data,
        }
    }

    /// Frames the request the way a DSU client would send it.
    pub fn encode(&self) -> Vec<u8> {
        let payload = match self {
            Request::Version => Vec::new(),
            Request::Ports { slots } => {
                let mut payload = Vec::with_capacity(4 + slots.len());
                payload.extend_from_slice(&(slots.len() as i32).to_le_bytes());
                payload.extend_from_slice(slots);
                payload
            }
            Request::Data { action, slot, mac } => {
                let mut payload = Vec::with_capacity(8);
                payload.push(*action);
                payload.push(*slot);
                payload.extend_from_slice(mac);
                payload
            }
        };
        frame(MAGIC_CLIENT, self.packet_type(), &payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("bad magic {0:02X?}, expected DSUC")]
    BadMagic([u8; 4]),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),
    #[error("truncated packet: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("unknown packet type 0x{0:08X}")]
    UnknownType(u32),
}

/// Builds a server-to-client message for `packet_type` carrying `payload`.
pub fn encode(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
    frame(MAGIC_SERVER, packet_type, payload)
}

fn frame(magic: [u8; 4], packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
    let header = RawHeader {
        magic,
        version: PROTOCOL_VERSION.to_le_bytes(),
        length: ((payload.len() + TYPE_LEN) as u16).to_le_bytes(),
        crc: [0; 4],
        server_id: SERVER_ID,
        packet_type: packet_type.code().to_le_bytes(),
    };

    let mut message = Vec::with_capacity(RAW_HEADER_LEN + payload.len());
    message.extend_from_slice(bytemuck::bytes_of(&header));
    message.extend_from_slice(payload);

    let crc = crc32fast::hash(&message);
    message[CRC_RANGE].copy_from_slice(&crc.to_le_bytes());
    message
}

/// Parses a client-to-server message. The CRC is not checked here; see
/// [`verify_checksum`].
pub fn decode(buf: &[u8]) -> Result<Request, DecodeError> {
    require(buf, MAGIC_CLIENT.len())?;
    let magic: [u8; 4] = [buf[0], buf[1], buf[2], buf[3]];
    if magic != MAGIC_CLIENT {
        return Err(DecodeError::BadMagic(magic));
    }

    require(buf, 6)?;
    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    require(buf, RAW_HEADER_LEN)?;
    let header: &RawHeader = bytemuck::from_bytes(&buf[..RAW_HEADER_LEN]);
    let declared = (u16::from_le_bytes(header.length) as usize).max(TYPE_LEN);
    require(buf, HEADER_LEN + declared)?;

    let code = u32::from_le_bytes(header.packet_type);
    let packet_type = PacketType::from_code(code).ok_or(DecodeError::UnknownType(code))?;
    // The declared length is only a lower bound; trailing bytes still belong to the payload.
    let payload = &buf[RAW_HEADER_LEN..];

    match packet_type {
        PacketType::Version => Ok(Request::Version),
        PacketType::Ports => decode_ports(payload),
        PacketType::Data => decode_data(payload),
    }
}

fn decode_ports(payload: &[u8]) -> Result<Request, DecodeError> {
    require(payload, 4)?;
    let count = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]).max(0) as usize;
    require(payload, 4 + count)?;
    Ok(Request::Ports {
        slots: payload[4..4 + count].to_vec(),
    })
}

fn decode_data(payload: &[u8]) -> Result<Request, DecodeError> {
    require(payload, 8)?;
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&payload[2..8]);
    Ok(Request::Data {
        action: payload[0],
        slot: payload[1],
        mac,
    })
}

fn require(buf: &[u8], needed: usize) -> Result<(), DecodeError> {
    if buf.len() < needed {
        Err(DecodeError::Truncated {
            needed,
            actual: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Checks the embedded CRC32 against the message with the CRC field zeroed.
pub fn verify_checksum(message: &[u8]) -> bool {
    if message.len() < HEADER_LEN {
        return false;
    }
    let mut embedded = [0u8; 4];
    embedded.copy_from_slice(&message[CRC_RANGE]);

    let mut hasher = Hasher::new();
    hasher.update(&message[..CRC_RANGE.start]);
    hasher.update(&[0u8; 4]);
    hasher.update(&message[CRC_RANGE.end..]);
    hasher.finalize() == u32::from_le_bytes(embedded)
}
