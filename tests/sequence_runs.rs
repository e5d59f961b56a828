use std::sync::Arc;
use std::time::{Duration, Instant};

use switch_bench_lib::config::ConfigurationProfile;
use switch_bench_lib::device::{BenchManager, TestId, TestResult, TestSequencer};
use switch_bench_lib::serial::{cancel_pair, SerialInterface, SimulatedDevice, TransportOptions};
use switch_bench_lib::settings::BenchSettings;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn interface_for(device: SimulatedDevice, timeout: Duration) -> SerialInterface {
    let mut interface = SerialInterface::from_io(Box::new(device));
    interface.set_options(TransportOptions {
        expected_response_len: 40,
        response_timeout: timeout,
        poll_interval: Duration::from_millis(2),
    });
    interface
}

#[tokio::test]
async fn unknown_test_fails_without_stopping_the_run() {
    init_logger();
    let device = SimulatedDevice::new().with_reply(0x10, vec![0x01]);
    let mut interface = interface_for(device, Duration::from_millis(40));

    let report = TestSequencer::new(&mut interface)
        .with_inter_test_delay(Duration::ZERO)
        .run(&["touch", "unknown_test"], |_, _| {})
        .await;

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].result, TestResult::Pass);
    assert_eq!(report.outcomes[0].test_name, "Touch");
    assert_eq!(report.outcomes[1].result, TestResult::Fail);
    assert_eq!(report.outcomes[1].test_name, "unknown_test");
    assert_eq!(report.outcomes[1].error.as_deref(), Some("invalid test identifier"));

    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.passed, 1);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.pass_rate, 50.0);
}

#[tokio::test]
async fn full_catalog_reports_progress_in_order() {
    init_logger();
    let device = SimulatedDevice::healthy();
    let written = device.written();
    let mut interface = interface_for(device, Duration::from_millis(200));

    let mut progress = Vec::new();
    let report = TestSequencer::new(&mut interface)
        .with_inter_test_delay(Duration::ZERO)
        .run_all(|name, percent| progress.push((name.to_string(), percent)))
        .await;

    let percents: Vec<u8> = progress.iter().map(|(_, p)| *p).collect();
    assert_eq!(percents, vec![12, 25, 37, 50, 62, 75, 87, 100]);

    let names: Vec<&str> = progress.iter().map(|(n, _)| n.as_str()).collect();
    let expected: Vec<&str> = TestId::ALL.iter().map(|id| id.display_name()).collect();
    assert_eq!(names, expected);

    assert!(report.all_passed(), "failed: {:?}", report.failed_tests());
    assert_eq!(report.summary.pass_rate, 100.0);
    assert_eq!(written.command_codes(), (0x10..=0x17).collect::<Vec<u8>>());
}

#[tokio::test]
async fn silent_device_fails_every_test() {
    init_logger();
    let mut interface = interface_for(SimulatedDevice::new(), Duration::from_millis(20));

    let report = TestSequencer::new(&mut interface)
        .with_inter_test_delay(Duration::ZERO)
        .run(&["touch", "ir"], |_, _| {})
        .await;

    assert_eq!(report.summary.failed, 2);
    for outcome in &report.outcomes {
        assert_eq!(outcome.error.as_deref(), Some("no response"));
    }
    assert_eq!(report.summary.pass_rate, 0.0);
}

#[tokio::test]
async fn empty_sequence_has_zero_rate() {
    init_logger();
    let mut interface = interface_for(SimulatedDevice::healthy(), Duration::from_millis(20));

    let report = TestSequencer::new(&mut interface)
        .run::<&str, _>(&[], |_, _| panic!("no progress expected"))
        .await;

    assert_eq!(report.summary.total, 0);
    assert_eq!(report.summary.pass_rate, 0.0);
}

#[tokio::test]
async fn inter_test_delay_is_applied_between_tests_only() {
    init_logger();
    let mut interface = interface_for(SimulatedDevice::healthy(), Duration::from_millis(200));

    let start = Instant::now();
    let report = TestSequencer::new(&mut interface)
        .with_inter_test_delay(Duration::from_millis(30))
        .run(&["touch", "doppler", "ir"], |_, _| {})
        .await;
    let elapsed = start.elapsed();

    assert!(report.all_passed());
    assert!(elapsed >= Duration::from_millis(60), "two pauses expected, took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1000));
}

#[tokio::test]
async fn cancellation_fails_current_and_remaining_tests() {
    init_logger();
    let mut interface = interface_for(SimulatedDevice::new(), Duration::from_secs(5));
    let (handle, token) = cancel_pair();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.cancel();
    });

    let start = Instant::now();
    let report = TestSequencer::new(&mut interface)
        .with_cancel_token(token)
        .run(&["touch", "doppler", "ir"], |_, _| {})
        .await;

    assert!(start.elapsed() < Duration::from_secs(2), "cancel should cut the read short");
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.failed, 3);
    for outcome in &report.outcomes {
        assert_eq!(outcome.error.as_deref(), Some("run cancelled"));
    }
}

#[tokio::test]
async fn abandoned_run_restores_interface_token() {
    init_logger();
    let device = SimulatedDevice::healthy().silent(0x16);
    let mut interface = interface_for(device, Duration::from_secs(5));
    let (handle, token) = cancel_pair();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        TestSequencer::new(&mut interface)
            .with_cancel_token(token)
            .run(&["led"], |_, _| {}),
    )
    .await;
    assert!(abandoned.is_err(), "LED test should still be waiting");

    // The abandoned run's token must no longer reach the interface
    handle.cancel();
    let response = interface.query(0x10).await.expect("touch should answer");
    assert_eq!(response[0], 0x01);
}

#[tokio::test]
async fn summary_always_adds_up() {
    init_logger();
    let device = SimulatedDevice::healthy()
        .with_reply(0x11, vec![0x00])
        .with_reply(0x15, vec![0x01, 0x03, 0xE8]);
    let mut interface = interface_for(device, Duration::from_millis(100));

    let report = TestSequencer::new(&mut interface)
        .with_inter_test_delay(Duration::ZERO)
        .with_profile(&ConfigurationProfile::new(0x5D, "00FF", 1, 1, 2))
        .run_all(|_, _| {})
        .await;

    let summary = &report.summary;
    assert_eq!(summary.total, summary.passed + summary.failed);
    assert_eq!(summary.total, report.outcomes.len());
    assert_eq!(summary.passed, 6);
    assert_eq!(summary.pass_rate, 75.0);
    assert_eq!(report.failed_tests(), vec!["Doppler sensor", "Metering"]);
    assert_eq!(report.profile.as_ref().unwrap().product_label, "Dimmer switch");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["summary"]["total"], 8);
    assert_eq!(json["outcomes"][5]["metering_value"], 1000);
}

#[tokio::test]
async fn manager_run_can_be_cancelled_from_another_task() {
    init_logger();
    let settings = BenchSettings {
        inter_test_delay_ms: 0,
        ..BenchSettings::default()
    };
    let interface = interface_for(SimulatedDevice::new(), Duration::from_secs(5));
    let manager = Arc::new(BenchManager::from_interface(interface, settings));

    let runner = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run_sequence(&["touch", "led"], |_, _| {}).await })
    };

    let mut cancelled = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if manager.cancel_run().await {
            cancelled = true;
            break;
        }
    }
    assert!(cancelled, "run never became cancellable");

    let report = runner.await.unwrap().unwrap();
    assert_eq!(report.summary.failed, 2);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.error.as_deref() == Some("run cancelled")));
}
