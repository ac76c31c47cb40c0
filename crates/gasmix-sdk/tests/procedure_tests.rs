//! 分步流程与遥测集成测试

mod common;

use common::{MockRig, fast_retry};
use gasmix_sdk::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

fn fast_calibration(sample_count: usize) -> CalibrationTiming {
    CalibrationTiming {
        initial_purge: Duration::from_millis(10),
        zero_hold: Duration::from_millis(10),
        span_hold: Duration::from_millis(10),
        final_purge: Duration::from_millis(10),
        settle: Duration::from_millis(10),
        sample_count,
        sample_interval: Duration::from_millis(1),
    }
}

#[test]
fn test_calibration_updates_sensor_mapping() {
    let mock = MockRig::connected();
    mock.sensor.push_script([0.5; 10]);
    mock.sensor.push_script([2.5; 10]);

    let (events, rx) = event_channel(1024);
    let report = StagedProcedure::calibration(fast_calibration(10))
        .with_retry_policy(fast_retry())
        .spawn(mock.rig.clone(), events)
        .unwrap()
        .wait()
        .unwrap()
        .into_result()
        .unwrap();

    let range = CalibrationRange::new(0.5, 2.5).unwrap();
    assert_eq!(report.committed_calibration, Some(range));
    assert_eq!(mock.rig.calibration().current(), range);
    assert_eq!(report.samples.len(), 2);

    // 新区间立即作用于浓度映射
    mock.sensor.set_voltage(1.5);
    assert!((mock.rig.read_ppm() - 10_000.0).abs() < 1e-6);

    // 标定流程各步写入的流量
    assert_eq!(mock.target.writes(), vec![0.0, 0.0, 100.0, 0.0, 0.0, 0.0]);
    assert_eq!(mock.diluent.writes(), vec![500.0, 100.0, 0.0, 500.0, 0.0, 0.0]);
    assert!(
        rx.try_iter()
            .any(|e| matches!(e, RigEvent::ProcedureFinished(r) if r.is_completed()))
    );
}

#[test]
fn test_cancelled_calibration_keeps_previous_range() {
    let mock = MockRig::connected();
    let before = mock.rig.calibration().current();
    let timing = CalibrationTiming {
        zero_hold: Duration::from_secs(30),
        ..fast_calibration(10)
    };

    let handle = StagedProcedure::calibration(timing)
        .spawn(mock.rig.clone(), EventSender::noop())
        .unwrap();
    std::thread::sleep(Duration::from_millis(80));
    handle.cancel();
    let report = handle.wait().unwrap();

    assert!(matches!(report.outcome, ProcedureOutcome::Cancelled));
    assert_eq!(report.steps_completed, 1);
    assert_eq!(mock.rig.calibration().current(), before);
    assert!(mock.both_at_zero());
}

#[test]
fn test_flush_ends_with_both_channels_zero() {
    let mock = MockRig::connected();
    let report = StagedProcedure::flush(FlushTiming {
        purge: Duration::from_millis(20),
        settle: Duration::from_millis(20),
    })
    .run(&mock.rig, &RunFlag::raised(), &EventSender::noop())
    .unwrap();

    assert!(report.is_completed());
    assert!(report.committed_calibration.is_none());
    assert_eq!(mock.diluent.writes(), vec![500.0, 0.0, 0.0]);
    assert!(mock.both_at_zero());
}

#[test]
fn test_schedule_from_triples() {
    let mock = MockRig::connected();
    let triples = validate_triples("0.001,120,30,0.001,0,250").unwrap();
    let schedule = build_schedule(&triples).unwrap();
    let offset = schedule.entries()[1].start_offset.as_secs_f64();
    assert!((offset - 0.06).abs() < 1e-6);

    let report = StagedProcedure::from_schedule(&schedule)
        .run(&mock.rig, &RunFlag::raised(), &EventSender::noop())
        .unwrap();
    assert!(report.is_completed());
    assert_eq!(mock.target.writes(), vec![120.0, 0.0, 0.0]);
    assert_eq!(mock.diluent.writes(), vec![30.0, 250.0, 0.0]);
}

#[test]
fn test_telemetry_sampler_stops_on_request() {
    let mock = MockRig::connected();
    mock.rig.set_flow(ChannelId::Target, 25.0).unwrap();
    mock.rig.set_flow(ChannelId::Diluent, 75.0).unwrap();
    mock.sensor.set_ppm(5_000.0);

    let published = Arc::new(AtomicU64::new(0));
    let counter = published.clone();
    let sampler = TelemetrySampler::start(
        mock.rig.clone(),
        TelemetryConfig {
            interval: Duration::from_millis(10),
        },
        move |snapshot: TelemetrySnapshot| {
            assert_eq!(snapshot.channel1_measured_flow, 25.0);
            assert_eq!(snapshot.channel2_measured_flow, 75.0);
            counter.fetch_add(1, Ordering::SeqCst);
        },
    )
    .unwrap();

    std::thread::sleep(Duration::from_millis(80));
    let cycles = sampler.join();
    assert!(cycles >= 2);
    assert_eq!(published.load(Ordering::SeqCst), cycles);

    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(published.load(Ordering::SeqCst), cycles);
}

#[test]
fn test_failed_reads_degrade_to_zero() {
    let mock = MockRig::connected();
    mock.rig.set_flow(ChannelId::Target, 25.0).unwrap();
    mock.target.fail_reads(true);
    mock.sensor.fail(true);

    let snapshot = TelemetrySnapshot::capture(&mock.rig, 0);
    assert_eq!(snapshot.channel1_measured_flow, 0.0);
    assert_eq!(snapshot.concentration_ppm, 0.0);
}
