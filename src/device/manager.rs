use std::sync::{Arc, Mutex as SyncMutex};

use tokio::sync::Mutex;

use super::catalog;
use super::models::{ProfileContext, TestId, TestOutcome, TestRunReport};
use super::sequencer::TestSequencer;
use super::{DeviceError, Result};
use crate::config::{ConfigPacket, ConfigurationProfile};
use crate::serial::{cancel_pair, CancelHandle, SerialError, SerialInterface, SerialPortIO};
use crate::settings::BenchSettings;

/// Owns the bench connection and exposes every operation the UI needs.
///
/// The interface sits behind a mutex held for a whole exchange, so callers in
/// different tasks never interleave bytes on the line.
pub struct BenchManager {
    interface: Arc<Mutex<SerialInterface>>,
    settings: BenchSettings,
    profile: Arc<Mutex<Option<ProfileContext>>>,
    active_run: Arc<SyncMutex<Option<CancelHandle>>>,
}

impl BenchManager {
    pub fn new(settings: BenchSettings) -> Self {
        let interface = SerialInterface::with_options(settings.transport_options());
        Self::from_interface(interface, settings)
    }

    pub fn from_interface(interface: SerialInterface, settings: BenchSettings) -> Self {
        Self {
            interface: Arc::new(Mutex::new(interface)),
            settings,
            profile: Arc::new(Mutex::new(None)),
            active_run: Arc::new(SyncMutex::new(None)),
        }
    }

    pub fn settings(&self) -> &BenchSettings {
        &self.settings
    }

    /// Open `port_name`, or the port from settings when `None`
    pub async fn connect(&self, port_name: Option<&str>) -> Result<()> {
        let port_name = port_name
            .or(self.settings.port_name.as_deref())
            .ok_or_else(|| SerialError::ConnectionFailed("no port selected".to_string()))?;

        let mut interface = self.interface.lock().await;
        interface.open(port_name, self.settings.baud_rate, self.settings.line_timeout())?;
        Ok(())
    }

    /// Use an already open byte stream, e.g. [`crate::serial::SimulatedDevice`]
    pub async fn attach(&self, io: Box<dyn SerialPortIO>, name: &str) {
        let mut interface = self.interface.lock().await;
        interface.attach(io, name);
        log::info!("Attached {}", name);
    }

    pub async fn disconnect(&self) {
        self.interface.lock().await.close();
    }

    pub async fn is_connected(&self) -> bool {
        self.interface.lock().await.is_connected()
    }

    pub async fn port_name(&self) -> Option<String> {
        self.interface.lock().await.port_name().map(str::to_string)
    }

    /// Query the device status; a closed port is an error rather than `false`
    pub async fn device_status(&self) -> Result<bool> {
        let mut interface = self.interface.lock().await;
        if !interface.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        Ok(interface.check_device_status().await)
    }

    /// Validate `profile`, send its configuration packet and return what was sent
    pub async fn send_config(&self, profile: &ConfigurationProfile) -> Result<ConfigPacket> {
        profile.validate()?;

        let mut interface = self.interface.lock().await;
        if !interface.is_connected() {
            return Err(DeviceError::NotConnected);
        }

        let packet = ConfigPacket::build(profile);
        interface.send_raw(packet.as_bytes()).await?;
        drop(interface);

        log::info!(
            "Sent configuration for {} (0x{:02X}), MAC {}",
            profile.product_label(),
            profile.product_type.code(),
            profile.mac_suffix
        );
        *self.profile.lock().await = Some(ProfileContext::from(profile));
        Ok(packet)
    }

    /// Profile most recently sent to the device
    pub async fn current_profile(&self) -> Option<ProfileContext> {
        self.profile.lock().await.clone()
    }

    /// Run one catalog test by name
    pub async fn run_test(&self, name: &str) -> Result<TestOutcome> {
        let id: TestId = name.parse()?;

        let mut interface = self.interface.lock().await;
        let verdict = catalog::run_test_id(id, &mut interface).await?;
        Ok(TestOutcome::from_verdict(id, id.command_code(), verdict))
    }

    /// Run `names` in order, or the whole catalog when empty.
    ///
    /// `progress` receives the test name and completion percent before each test.
    pub async fn run_sequence<S, P>(&self, names: &[S], progress: P) -> Result<TestRunReport>
    where
        S: AsRef<str>,
        P: FnMut(&str, u8),
    {
        // Lock order: interface, then profile or active_run. cancel_run never takes the interface.
        let mut interface = self.interface.lock().await;
        if !interface.is_connected() {
            return Err(DeviceError::NotConnected);
        }

        let (handle, token) = cancel_pair();
        let _active = ActiveRun::register(&self.active_run, handle);

        let profile = self.profile.lock().await.clone();
        let mut sequencer = TestSequencer::new(&mut interface)
            .with_inter_test_delay(self.settings.inter_test_delay())
            .with_cancel_token(token);

        let mut report = if names.is_empty() {
            sequencer.run_all(progress).await
        } else {
            sequencer.run(names, progress).await
        };
        report.profile = profile;
        Ok(report)
    }

    /// Cancel the sequence in progress; returns false if none is running
    pub async fn cancel_run(&self) -> bool {
        let active_run = self.active_run.lock().unwrap_or_else(|e| e.into_inner());
        match active_run.as_ref() {
            Some(handle) => {
                log::info!("Cancelling test run");
                handle.cancel();
                true
            }
            None => false,
        }
    }
}

/// Keeps a run's cancel handle registered until dropped, including when the run future is abandoned
struct ActiveRun<'m> {
    slot: &'m SyncMutex<Option<CancelHandle>>,
}

impl<'m> ActiveRun<'m> {
    fn register(slot: &'m SyncMutex<Option<CancelHandle>>, handle: CancelHandle) -> Self {
        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Self { slot }
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl Default for BenchManager {
    fn default() -> Self {
        Self::new(BenchSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::{SimulatedDevice, TransportOptions};
    use std::time::Duration;

    fn fast_manager() -> BenchManager {
        let settings = BenchSettings {
            inter_test_delay_ms: 0,
            ..BenchSettings::default()
        };
        let interface = SerialInterface::with_options(TransportOptions {
            expected_response_len: 40,
            response_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(2),
        });
        BenchManager::from_interface(interface, settings)
    }

    #[tokio::test]
    async fn test_closed_manager_reports_not_connected() {
        let manager = fast_manager();
        assert!(!manager.is_connected().await);
        assert!(matches!(manager.device_status().await, Err(DeviceError::NotConnected)));
        assert!(matches!(
            manager.send_config(&ConfigurationProfile::default()).await,
            Err(DeviceError::NotConnected)
        ));
        assert!(matches!(
            manager.run_sequence(&["touch"], |_, _| {}).await,
            Err(DeviceError::NotConnected)
        ));
        assert!(!manager.cancel_run().await);
    }

    #[tokio::test]
    async fn test_connect_without_port_fails() {
        let manager = fast_manager();
        let err = manager.connect(None).await.unwrap_err();
        assert!(matches!(err, DeviceError::SerialError(SerialError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_connect_to_missing_port_fails() {
        let manager = fast_manager();
        let err = manager.connect(Some("/dev/does-not-exist")).await.unwrap_err();
        assert!(matches!(err, DeviceError::SerialError(SerialError::ConnectionFailed(_))));
        assert!(!manager.is_connected().await);
        assert_eq!(manager.port_name().await, None);
    }

    #[tokio::test]
    async fn test_abandoned_run_leaves_manager_usable() {
        let manager = fast_manager();
        manager
            .attach(Box::new(SimulatedDevice::healthy().silent(0x16)), "sim")
            .await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            manager.run_sequence(&["led"], |_, _| {}),
        )
        .await;
        assert!(abandoned.is_err(), "run should still be waiting on the silent LED test");

        assert!(!manager.cancel_run().await, "no run is in progress any more");

        let outcome = manager.run_test("touch").await.expect("reads must not stay cancelled");
        assert!(outcome.is_pass());
        assert!(manager.device_status().await.unwrap());
    }

    #[tokio::test]
    async fn test_send_config_rejects_bad_mac_before_io() {
        let manager = fast_manager();
        let device = SimulatedDevice::healthy();
        let written = device.written();
        manager.attach(Box::new(device), "sim").await;

        let profile = ConfigurationProfile::new(0x5B, "XYZ", 1, 0, 0);
        assert!(matches!(
            manager.send_config(&profile).await,
            Err(DeviceError::InvalidConfiguration(_))
        ));
        assert!(written.frames().is_empty());
    }

    #[tokio::test]
    async fn test_send_config_records_profile() {
        let manager = fast_manager();
        let device = SimulatedDevice::healthy();
        let written = device.written();
        manager.attach(Box::new(device), "sim").await;

        let profile = ConfigurationProfile::new(0x5C, "1A2B", 0, 2, 0);
        let packet = manager.send_config(&profile).await.unwrap();

        assert!(ConfigPacket::validate(packet.as_bytes()));
        assert_eq!(written.config_packets(), vec![packet]);
        assert_eq!(manager.current_profile().await.unwrap().product_label, "Outlet switch");
    }

    #[tokio::test]
    async fn test_run_sequence_carries_profile() {
        let manager = fast_manager();
        manager.attach(Box::new(SimulatedDevice::healthy()), "sim").await;
        manager
            .send_config(&ConfigurationProfile::new(0x5B, "0001", 1, 0, 0))
            .await
            .unwrap();

        let report = manager.run_sequence::<&str, _>(&[], |_, _| {}).await.unwrap();
        assert_eq!(report.summary.total, 8);
        assert!(report.all_passed(), "failed: {:?}", report.failed_tests());
        assert_eq!(report.profile.unwrap().product_type, 0x5B);
    }

    #[tokio::test]
    async fn test_run_single_test() {
        let manager = fast_manager();
        manager.attach(Box::new(SimulatedDevice::healthy()), "sim").await;

        let outcome = manager.run_test("Metering").await.unwrap();
        assert!(outcome.is_pass());
        assert_eq!(outcome.metering_value, Some(100));
        assert_eq!(outcome.command_code, Some(0x15));

        assert!(matches!(
            manager.run_test("warp_drive").await,
            Err(DeviceError::InvalidTestId(_))
        ));
    }
}
