use bytemuck::{Pod, Zeroable};

use crate::codec::Slot;
use crate::protocol::{
    BATTERY_CHARGED, BATTERY_CHARGING, BATTERY_DYING, BATTERY_FULL, BATTERY_HIGH, BATTERY_LOW,
    BATTERY_MEDIUM, BATTERY_UNKNOWN, CONNECTION_METHOD_NONE, CONNECTION_STATE_CONNECTED,
    MODEL_FULL_GYRO, MODEL_NOT_CONNECTED, MODEL_PARTIAL, SLOT_BASE, SLOT_DISPLAY,
};
use crate::sensors::{Battery, SensorSnapshot};

const ACCEL_SCALE: f32 = 65536.0;
const GYRO_SCALE: f32 = 32.0;
const LIGHT_MASK: u32 = 0x1FFF;
const MAX_LID_ANGLE: i32 = 360;

/// Shared prefix of ports replies and data packets.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ControllerHeader {
    pub slot: u8,
    pub state: u8,
    pub model: u8,
    pub connection: u8,
    pub mac: [u8; 6],
    pub battery: u8,
}

pub const CONTROLLER_HEADER_LEN: usize = std::mem::size_of::<ControllerHeader>();
pub const DATA_PAYLOAD_LEN: usize = CONTROLLER_HEADER_LEN + 69;

impl ControllerHeader {
    pub fn new(slot: Slot, battery: Option<Battery>) -> Self {
        Self {
            slot,
            state: CONNECTION_STATE_CONNECTED,
            model: device_model(slot),
            connection: CONNECTION_METHOD_NONE,
            mac: [0; 6],
            battery: battery_status(battery),
        }
    }
}

pub fn device_model(slot: Slot) -> u8 {
    match slot {
        SLOT_BASE => MODEL_FULL_GYRO,
        SLOT_DISPLAY => MODEL_PARTIAL,
        _ => MODEL_NOT_CONNECTED,
    }
}

pub fn battery_status(battery: Option<Battery>) -> u8 {
    match battery {
        None => BATTERY_UNKNOWN,
        Some(Battery { percent, charging: true }) => {
            if percent < 90 {
                BATTERY_CHARGING
            } else {
                BATTERY_CHARGED
            }
        }
        Some(Battery { percent, charging: false }) => match percent {
            0..=9 => BATTERY_DYING,
            10..=24 => BATTERY_LOW,
            25..=74 => BATTERY_MEDIUM,
            75..=89 => BATTERY_HIGH,
            _ => BATTERY_FULL,
        },
    }
}

/// Left-stick X and tablet-mode flag for a lid angle in degrees.
pub fn lid_stick(angle: i32) -> (u8, u8) {
    if angle <= MAX_LID_ANGLE {
        let x = (angle as f64 / MAX_LID_ANGLE as f64 * 255.0).round();
        (x.clamp(0.0, 255.0) as u8, 0)
    } else {
        (0xFF, 1)
    }
}

/// Ports reply: controller header plus one zero byte.
pub fn ports_payload(slot: Slot, battery: Option<Battery>) -> Vec<u8> {
    let mut payload = Vec::with_capacity(CONTROLLER_HEADER_LEN + 1);
    payload.extend_from_slice(bytemuck::bytes_of(&ControllerHeader::new(slot, battery)));
    payload.push(0x00);
    payload
}

struct SlotState {
    connected: u8,
    tablet_mode: u8,
    left_x: u8,
    light: u32,
    touch: u8,
    motion: Option<([f32; 3], [f32; 3])>,
}

fn slot_state(slot: Slot, snapshot: &SensorSnapshot) -> SlotState {
    match slot {
        SLOT_BASE => {
            let (left_x, tablet_mode) = lid_stick(snapshot.lid_angle_degrees);
            let accel = snapshot.base_accel;
            let gyro = snapshot.base_gyro;
            SlotState {
                connected: 1,
                tablet_mode,
                left_x,
                light: snapshot.base_illuminance as u32,
                touch: 1,
                motion: Some((
                    [
                        scaled(neg(accel.x), ACCEL_SCALE),
                        scaled(neg(accel.z), ACCEL_SCALE),
                        scaled(accel.y as i64, ACCEL_SCALE),
                    ],
                    [
                        scaled(gyro.x as i64, GYRO_SCALE),
                        scaled(neg(gyro.z), GYRO_SCALE),
                        scaled(gyro.y as i64, GYRO_SCALE),
                    ],
                )),
            }
        }
        SLOT_DISPLAY => {
            let accel = snapshot.display_accel;
            SlotState {
                connected: 1,
                tablet_mode: 0,
                left_x: 0,
                light: snapshot.display_illuminance as u32,
                touch: 1,
                motion: Some((
                    [
                        scaled(neg(accel.x), ACCEL_SCALE),
                        scaled(neg(accel.y), ACCEL_SCALE),
                        scaled(neg(accel.z), ACCEL_SCALE),
                    ],
                    [0.0; 3],
                )),
            }
        }
        _ => SlotState {
            connected: 0,
            tablet_mode: 0,
            left_x: 0,
            light: 0,
            touch: 0,
            motion: None,
        },
    }
}

// Negate in integer space so a zero reading never becomes -0.0 on the wire.
fn neg(value: i32) -> i64 {
    -(value as i64)
}

fn scaled(value: i64, scale: f32) -> f32 {
    value as f32 / scale
}

/// Full controller-data payload (header included) for `slot`.
pub fn data_payload(
    slot: Slot,
    snapshot: &SensorSnapshot,
    packet_number: u32,
    timestamp_us: u64,
) -> Vec<u8> {
    let state = slot_state(slot, snapshot);
    let mut payload = Vec::with_capacity(DATA_PAYLOAD_LEN);

    payload.extend_from_slice(bytemuck::bytes_of(&ControllerHeader::new(
        slot,
        snapshot.battery,
    )));
    payload.push(state.connected);
    payload.extend_from_slice(&packet_number.to_le_bytes());
    // [buttons1][buttons2][home][touch_button]
    payload.extend_from_slice(&[0x00, 0x00, state.tablet_mode, 0x00]);
    // Sticks: LX LY RX RY
    payload.extend_from_slice(&[state.left_x, 0x00, 0x00, 0x00]);
    // D-pad, face buttons, R1 L1 R2 L2 (analog)
    payload.extend_from_slice(&[0x00; 12]);

    // Touch 1 carries the illuminance in its X coordinate
    payload.extend_from_slice(&[state.touch, state.touch]);
    payload.extend_from_slice(&((state.light & LIGHT_MASK) as u16).to_le_bytes());
    payload.extend_from_slice(&[0x00, 0x00]);
    // Touch 2
    payload.extend_from_slice(&[0x00; 6]);

    match state.motion {
        Some((accel, gyro)) => {
            payload.extend_from_slice(&timestamp_us.to_le_bytes());
            for value in accel.iter().chain(gyro.iter()) {
                payload.extend_from_slice(&value.to_le_bytes());
            }
        }
        None => payload.extend_from_slice(&[0x00; 32]),
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Axes;

    fn f32_at(payload: &[u8], offset: usize) -> f32 {
        f32::from_le_bytes(payload[offset..offset + 4].try_into().unwrap())
    }

    const MOTION: usize = CONTROLLER_HEADER_LEN + 37;

    #[test]
    fn battery_boundaries() {
        let discharging = |percent| battery_status(Some(Battery { percent, charging: false }));
        let charging = |percent| battery_status(Some(Battery { percent, charging: true }));

        assert_eq!(battery_status(None), 0x00);
        assert_eq!(discharging(0), 0x01);
        assert_eq!(discharging(9), 0x01);
        assert_eq!(discharging(10), 0x02);
        assert_eq!(discharging(24), 0x02);
        assert_eq!(discharging(25), 0x03);
        assert_eq!(discharging(74), 0x03);
        assert_eq!(discharging(75), 0x04);
        assert_eq!(discharging(89), 0x04);
        assert_eq!(discharging(90), 0x05);
        assert_eq!(discharging(100), 0x05);
        assert_eq!(charging(0), 0xEE);
        assert_eq!(charging(89), 0xEE);
        assert_eq!(charging(90), 0xEF);
        assert_eq!(charging(100), 0xEF);
    }

    #[test]
    fn lid_angle_maps_to_left_stick() {
        let (x, tablet) = lid_stick(180);
        assert!((126..=128).contains(&x), "x = {x}");
        assert_eq!(tablet, 0);

        assert_eq!(lid_stick(400), (255, 1));
        assert_eq!(lid_stick(360), (255, 0));
        assert_eq!(lid_stick(0), (0, 0));
        assert_eq!(lid_stick(-5), (0, 0));
    }

    #[test]
    fn header_models_follow_slot() {
        assert_eq!(ports_payload(0, None), vec![0, 0x02, 0x02, 0, 0, 0, 0, 0, 0, 0, 0x00, 0]);
        assert_eq!(ControllerHeader::new(1, None).model, 0x01);
        assert_eq!(ControllerHeader::new(5, None).model, 0x00);
    }

    #[test]
    fn base_slot_payload() {
        let snapshot = SensorSnapshot {
            lid_angle_degrees: 400,
            base_illuminance: 0x2005,
            base_accel: Axes { x: 65536, y: 131072, z: -65536 },
            base_gyro: Axes { x: 64, y: 32, z: 96 },
            battery: Some(Battery { percent: 50, charging: false }),
            ..Default::default()
        };
        let payload = data_payload(0, &snapshot, 7, 1234);
        let data = CONTROLLER_HEADER_LEN;

        assert_eq!(payload.len(), DATA_PAYLOAD_LEN);
        assert_eq!(payload[10], 0x03);
        assert_eq!(payload[data], 1);
        assert_eq!(&payload[data + 1..data + 5], &7u32.to_le_bytes());
        assert_eq!(payload[data + 7], 1, "tablet mode");
        assert_eq!(payload[data + 9], 255, "left stick x");
        assert_eq!(&payload[data + 25..data + 27], &[1, 1]);
        assert_eq!(&payload[data + 27..data + 29], &0x0005u16.to_le_bytes());
        assert_eq!(&payload[MOTION..MOTION + 8], &1234u64.to_le_bytes());
        assert_eq!(f32_at(&payload, MOTION + 8), -1.0);
        assert_eq!(f32_at(&payload, MOTION + 12), 1.0);
        assert_eq!(f32_at(&payload, MOTION + 16), 2.0);
        assert_eq!(f32_at(&payload, MOTION + 20), 2.0);
        assert_eq!(f32_at(&payload, MOTION + 24), -3.0);
        assert_eq!(f32_at(&payload, MOTION + 28), 1.0);
    }

    #[test]
    fn display_slot_payload() {
        let snapshot = SensorSnapshot {
            display_illuminance: 300,
            display_accel: Axes { x: 65536, y: -65536, z: 0 },
            base_gyro: Axes { x: 999, y: 999, z: 999 },
            ..Default::default()
        };
        let payload = data_payload(1, &snapshot, 1, 99);
        let data = CONTROLLER_HEADER_LEN;

        assert_eq!(payload[2], 0x01);
        assert_eq!(payload[data], 1);
        assert_eq!(payload[data + 9], 0);
        assert_eq!(&payload[data + 27..data + 29], &300u16.to_le_bytes());
        assert_eq!(f32_at(&payload, MOTION + 8), -1.0);
        assert_eq!(f32_at(&payload, MOTION + 12), 1.0);
        // +0.0, never -0.0
        assert_eq!(&payload[MOTION + 16..MOTION + 20], &[0, 0, 0, 0]);
        assert_eq!(&payload[MOTION + 20..MOTION + 32], &[0u8; 12]);
    }

    #[test]
    fn other_slots_are_disconnected() {
        let snapshot = SensorSnapshot {
            lid_angle_degrees: 90,
            base_illuminance: 12,
            ..Default::default()
        };
        let payload = data_payload(3, &snapshot, 1, 99);
        assert_eq!(payload.len(), DATA_PAYLOAD_LEN);
        assert_eq!(payload[CONTROLLER_HEADER_LEN], 0);
        assert!(payload[CONTROLLER_HEADER_LEN + 5..].iter().all(|&b| b == 0));
    }
}
