use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};

use super::profile::ConfigurationProfile;

// Wire layout of the configuration packet
pub const PACKET_SIZE: usize = 40;
pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const PAYLOAD_LENGTH: u8 = 33;
pub const YEAR_BASE: i32 = 2020;

const OFFSET_PRODUCT_TYPE: usize = 1;
const OFFSET_MAC: usize = 2;
const OFFSET_LENGTH: usize = 4;
const OFFSET_LIGHT: usize = 5;
const OFFSET_OUTLET: usize = 6;
const OFFSET_DIMMING: usize = 7;
const OFFSET_TIMESTAMP: usize = 29;
const OFFSET_XOR: usize = 36;
const OFFSET_SUM: usize = 37;
const OFFSET_ETX: usize = 38;

/// Inclusive byte range covered by both checksums
const CHECKSUM_START: usize = 1;
const CHECKSUM_END: usize = 35;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("Invalid packet length: {0} (expected 40)")]
    InvalidLength(usize),

    #[error("Invalid start marker: 0x{0:02X}")]
    BadStartMarker(u8),

    #[error("Invalid end marker: 0x{0:02X}")]
    BadEndMarker(u8),

    #[error("XOR checksum mismatch: calculated 0x{calculated:02X}, got 0x{stored:02X}")]
    XorMismatch { calculated: u8, stored: u8 },

    #[error("ADD checksum mismatch: calculated 0x{calculated:02X}, got 0x{stored:02X}")]
    SumMismatch { calculated: u8, stored: u8 },
}

/// A 40-byte configuration packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigPacket([u8; PACKET_SIZE]);

impl ConfigPacket {
    /// Encode a profile, stamping the packet with the local wall clock
    pub fn build(profile: &ConfigurationProfile) -> Self {
        Self::build_at(profile, Local::now().naive_local())
    }

    /// Encode a profile with an explicit timestamp
    pub fn build_at(profile: &ConfigurationProfile, now: NaiveDateTime) -> Self {
        let mut packet = [0u8; PACKET_SIZE];

        packet[0] = STX;
        packet[OFFSET_PRODUCT_TYPE] = profile.product_type.code();

        let mac = profile.mac_bytes().unwrap_or_else(|| {
            log::warn!(
                "MAC suffix {:?} is not 4 hex characters, encoding 00 00",
                profile.mac_suffix
            );
            [0x00, 0x00]
        });
        packet[OFFSET_MAC..OFFSET_MAC + 2].copy_from_slice(&mac);

        packet[OFFSET_LENGTH] = PAYLOAD_LENGTH;
        packet[OFFSET_LIGHT] = profile.light_circuits;
        packet[OFFSET_OUTLET] = profile.outlet_circuits;
        packet[OFFSET_DIMMING] = profile.dimming_type;

        // bytes 8..=28 stay reserved (zero)

        packet[OFFSET_TIMESTAMP] = (now.year() - YEAR_BASE) as u8;
        packet[OFFSET_TIMESTAMP + 1] = now.month() as u8;
        packet[OFFSET_TIMESTAMP + 2] = now.day() as u8;
        packet[OFFSET_TIMESTAMP + 3] = now.hour() as u8;
        packet[OFFSET_TIMESTAMP + 4] = now.minute() as u8;

        // bytes 34..=35 reserved

        packet[OFFSET_XOR] = checksum_xor(&packet[CHECKSUM_START..=CHECKSUM_END]);
        packet[OFFSET_SUM] = checksum_add(&packet[CHECKSUM_START..=CHECKSUM_END]);
        packet[OFFSET_ETX] = ETX;
        // byte 39 is padding

        Self(packet)
    }

    /// Parse received bytes, rejecting anything that fails [`ConfigPacket::check`]
    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        Self::check(data)?;
        let mut packet = [0u8; PACKET_SIZE];
        packet.copy_from_slice(data);
        Ok(Self(packet))
    }

    /// Structural and checksum validation with the failure reason
    pub fn check(data: &[u8]) -> Result<(), PacketError> {
        if data.len() != PACKET_SIZE {
            return Err(PacketError::InvalidLength(data.len()));
        }
        if data[0] != STX {
            return Err(PacketError::BadStartMarker(data[0]));
        }
        if data[OFFSET_ETX] != ETX {
            return Err(PacketError::BadEndMarker(data[OFFSET_ETX]));
        }

        let covered = &data[CHECKSUM_START..=CHECKSUM_END];

        let calculated = checksum_xor(covered);
        if calculated != data[OFFSET_XOR] {
            return Err(PacketError::XorMismatch {
                calculated,
                stored: data[OFFSET_XOR],
            });
        }

        let calculated = checksum_add(covered);
        if calculated != data[OFFSET_SUM] {
            return Err(PacketError::SumMismatch {
                calculated,
                stored: data[OFFSET_SUM],
            });
        }

        Ok(())
    }

    /// True when `data` is a well-formed packet
    pub fn validate(data: &[u8]) -> bool {
        match Self::check(data) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Packet rejected: {}", e);
                false
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn product_type(&self) -> u8 {
        self.0[OFFSET_PRODUCT_TYPE]
    }

    pub fn mac(&self) -> [u8; 2] {
        [self.0[OFFSET_MAC], self.0[OFFSET_MAC + 1]]
    }

    /// Decode the embedded build timestamp; `None` if the bytes are not a calendar date
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        decode_timestamp(&self.0)
    }
}

impl AsRef<[u8]> for ConfigPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ConfigPacket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Read year offset, month, day, hour and minute starting at byte 29
pub fn decode_timestamp(data: &[u8]) -> Option<NaiveDateTime> {
    let stamp = data.get(OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 5)?;
    NaiveDate::from_ymd_opt(YEAR_BASE + stamp[0] as i32, stamp[1] as u32, stamp[2] as u32)?
        .and_hms_opt(stamp[3] as u32, stamp[4] as u32, 0)
}

/// Bytewise exclusive-or
pub fn checksum_xor(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Low byte of the arithmetic sum
pub fn checksum_add(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}
