use chrono::NaiveDate;
use proptest::prelude::*;

use switch_bench_lib::config::packet::{checksum_add, checksum_xor, ETX, STX};
use switch_bench_lib::config::{ConfigPacket, ConfigurationProfile, PacketError, PACKET_SIZE};

fn profile_strategy() -> impl Strategy<Value = ConfigurationProfile> {
    (any::<u8>(), "[0-9A-Fa-f]{4}", any::<u8>(), any::<u8>(), any::<u8>()).prop_map(
        |(product, mac, light, outlet, dimming)| ConfigurationProfile::new(product, mac, light, outlet, dimming),
    )
}

proptest! {
    #[test]
    fn built_packets_are_well_formed(profile in profile_strategy()) {
        let packet = ConfigPacket::build(&profile);
        let bytes = packet.as_bytes();

        prop_assert_eq!(bytes.len(), PACKET_SIZE);
        prop_assert_eq!(bytes[0], STX);
        prop_assert_eq!(bytes[38], ETX);
        prop_assert_eq!(bytes[1], profile.product_type.code());
        prop_assert_eq!(bytes[36], checksum_xor(&bytes[1..=35]));
        prop_assert_eq!(bytes[37], checksum_add(&bytes[1..=35]));
        prop_assert!(ConfigPacket::validate(bytes));
    }

    #[test]
    fn mac_suffix_is_encoded_big_endian(profile in profile_strategy()) {
        let packet = ConfigPacket::build(&profile);
        let expected = profile.mac_bytes().expect("strategy only yields valid MACs");
        prop_assert_eq!(packet.mac(), expected);
    }

    #[test]
    fn single_bit_flip_in_covered_range_is_detected(
        profile in profile_strategy(),
        index in 1usize..=35,
        bit in 0u8..8,
    ) {
        let mut bytes = *ConfigPacket::build(&profile).as_bytes();
        bytes[index] ^= 1 << bit;
        prop_assert!(!ConfigPacket::validate(&bytes));
    }

    #[test]
    fn wrong_lengths_are_rejected(len in 0usize..80) {
        prop_assume!(len != PACKET_SIZE);
        let data = vec![0u8; len];
        prop_assert_eq!(ConfigPacket::check(&data), Err(PacketError::InvalidLength(len)));
    }
}

#[test]
fn reference_profile_packet() {
    let profile = ConfigurationProfile::new(0x5B, "1A2B", 2, 1, 0);
    let at = NaiveDate::from_ymd_opt(2025, 3, 14)
        .unwrap()
        .and_hms_opt(9, 26, 0)
        .unwrap();
    let packet = ConfigPacket::build_at(&profile, at);
    let bytes = packet.as_bytes();

    assert_eq!(bytes[0], 0x02);
    assert_eq!(&bytes[1..8], &[0x5B, 0x1A, 0x2B, 0x21, 0x02, 0x01, 0x00]);
    assert_eq!(&bytes[29..34], &[0x05, 0x03, 0x0E, 0x09, 0x1A]);
    assert_eq!(bytes[38], 0x03);
    assert!(ConfigPacket::validate(bytes));
    assert_eq!(packet.timestamp(), Some(at));
    assert_eq!(packet.to_hex().len(), PACKET_SIZE * 2);
}

#[test]
fn profile_validation_is_loud_but_packet_build_is_not() {
    let profile = ConfigurationProfile::new(0x5D, "ZZZZ", 0, 0, 1);
    assert!(profile.validate().is_err());

    let packet = ConfigPacket::build(&profile);
    assert_eq!(packet.mac(), [0x00, 0x00]);
    assert!(ConfigPacket::validate(packet.as_bytes()));
}
