use super::models::{TestId, TestVerdict};
use super::{DeviceError, Result};
use crate::serial::{SerialError, SerialInterface};

/// First response byte signalling device-side success
pub const SUCCESS_CODE: u8 = 0x01;

/// Metering magnitude must lie strictly between these bounds
pub const METERING_MIN_EXCLUSIVE: u16 = 0;
pub const METERING_MAX_EXCLUSIVE: u16 = 1000;

/// How a test's response is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseRule {
    /// Non-empty response whose first byte is [`SUCCESS_CODE`]
    Acknowledge,
    /// Acknowledge followed by a big-endian u16 magnitude within the open range
    MeteringRange { min_exclusive: u16, max_exclusive: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: TestId,
    pub command_code: u8,
    pub rule: ResponseRule,
}

pub static CATALOG: [CatalogEntry; 8] = [
    CatalogEntry { id: TestId::Touch, command_code: 0x10, rule: ResponseRule::Acknowledge },
    CatalogEntry { id: TestId::Doppler, command_code: 0x11, rule: ResponseRule::Acknowledge },
    CatalogEntry { id: TestId::Ir, command_code: 0x12, rule: ResponseRule::Acknowledge },
    CatalogEntry { id: TestId::OutletRelay, command_code: 0x13, rule: ResponseRule::Acknowledge },
    CatalogEntry { id: TestId::LightRelay, command_code: 0x14, rule: ResponseRule::Acknowledge },
    CatalogEntry {
        id: TestId::Metering,
        command_code: 0x15,
        rule: ResponseRule::MeteringRange {
            min_exclusive: METERING_MIN_EXCLUSIVE,
            max_exclusive: METERING_MAX_EXCLUSIVE,
        },
    },
    CatalogEntry { id: TestId::Led, command_code: 0x16, rule: ResponseRule::Acknowledge },
    CatalogEntry { id: TestId::Buzzer, command_code: 0x17, rule: ResponseRule::Acknowledge },
];

pub fn entry(id: TestId) -> &'static CatalogEntry {
    // CATALOG is ordered like TestId::ALL
    &CATALOG[id as usize]
}

impl TestId {
    pub fn command_code(self) -> u8 {
        entry(self).command_code
    }
}

impl ResponseRule {
    pub fn interpret(&self, response: &[u8]) -> TestVerdict {
        match *self {
            ResponseRule::Acknowledge => match response.first() {
                None => TestVerdict::fail("empty response"),
                Some(&SUCCESS_CODE) => TestVerdict::pass(),
                Some(&code) => TestVerdict::fail(format!("device reported 0x{:02X}", code)),
            },
            ResponseRule::MeteringRange {
                min_exclusive,
                max_exclusive,
            } => {
                if response.len() < 3 {
                    return TestVerdict::fail(format!(
                        "metering response too short: {} bytes",
                        response.len()
                    ));
                }
                if response[0] != SUCCESS_CODE {
                    return TestVerdict::fail(format!("device reported 0x{:02X}", response[0]));
                }

                let magnitude = u16::from_be_bytes([response[1], response[2]]);
                let verdict = if magnitude > min_exclusive && magnitude < max_exclusive {
                    TestVerdict::pass()
                } else {
                    TestVerdict::fail(format!(
                        "metering value {} outside ({}, {})",
                        magnitude, min_exclusive, max_exclusive
                    ))
                };
                verdict.with_metering_value(magnitude)
            }
        }
    }
}

/// Run the test named `identifier`.
///
/// Unknown names fail with [`DeviceError::InvalidTestId`] rather than a Fail verdict.
pub async fn run_test(identifier: &str, interface: &mut SerialInterface) -> Result<TestVerdict> {
    let id: TestId = identifier.parse()?;
    run_test_id(id, interface).await
}

/// Issue the command for `id` and judge the response.
///
/// A missing or unreadable response is a Fail verdict. A closed port and a
/// cancelled read are returned as errors.
pub async fn run_test_id(id: TestId, interface: &mut SerialInterface) -> Result<TestVerdict> {
    let entry = entry(id);
    log::debug!("Running {} test (0x{:02X})", id, entry.command_code);

    let verdict = match interface.query(entry.command_code).await {
        Ok(response) => entry.rule.interpret(&response),
        Err(SerialError::NotConnected) => return Err(DeviceError::NotConnected),
        Err(SerialError::Cancelled) => return Err(DeviceError::SerialError(SerialError::Cancelled)),
        Err(SerialError::Timeout) => TestVerdict::fail("no response"),
        Err(e) => TestVerdict::fail(e.to_string()),
    };

    if verdict.is_pass() {
        log::info!("{} test passed", id);
    } else {
        log::warn!(
            "{} test failed: {}",
            id,
            verdict.detail.as_deref().unwrap_or("unknown reason")
        );
    }

    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TestResult;

    #[test]
    fn test_catalog_matches_ids() {
        for (i, id) in TestId::ALL.into_iter().enumerate() {
            assert_eq!(CATALOG[i].id, id, "catalog order must follow TestId::ALL");
            assert_eq!(id.command_code(), 0x10 + i as u8);
        }
    }

    #[test]
    fn test_acknowledge_rule() {
        let rule = ResponseRule::Acknowledge;
        assert!(rule.interpret(&[0x01]).is_pass());
        assert!(rule.interpret(&[0x01, 0xFF, 0xFF]).is_pass());
        assert_eq!(rule.interpret(&[0x00]).result, TestResult::Fail);
        assert_eq!(rule.interpret(&[]).result, TestResult::Fail);
    }

    #[test]
    fn test_metering_boundaries() {
        let rule = entry(TestId::Metering).rule;

        let zero = rule.interpret(&[0x01, 0x00, 0x00]);
        assert_eq!(zero.result, TestResult::Fail);
        assert_eq!(zero.metering_value, Some(0));

        let hundred = rule.interpret(&[0x01, 0x00, 0x64]);
        assert!(hundred.is_pass());
        assert_eq!(hundred.metering_value, Some(100));

        assert!(rule.interpret(&[0x01, 0x03, 0xE7]).is_pass());
        assert_eq!(rule.interpret(&[0x01, 0x03, 0xE8]).result, TestResult::Fail);
        assert_eq!(rule.interpret(&[0x01, 0x00, 0x01]).result, TestResult::Pass);
    }

    #[test]
    fn test_metering_rejects_short_or_nack() {
        let rule = entry(TestId::Metering).rule;
        assert_eq!(rule.interpret(&[0x01, 0x00]).result, TestResult::Fail);
        assert_eq!(rule.interpret(&[0x00, 0x00, 0x64]).result, TestResult::Fail);
        assert_eq!(rule.interpret(&[0x00, 0x00, 0x64]).metering_value, None);
    }
}
