mod common;

use chargeshare::config::LoadSharingPriority;
use chargeshare::error::ChargeShareError;
use chargeshare::orchestrator::TelemetryUpdate;
use chargeshare::station::{PilotVoltage, StationState};
use common::{Harness, charger};
use tokio_stream::StreamExt;

fn update(h: &Harness, id: &str, pilot: PilotVoltage) -> TelemetryUpdate {
    TelemetryUpdate {
        client_id: id.to_string(),
        data: h.fleet.telemetry(id, pilot, 0.0, 0),
    }
}

#[tokio::test]
async fn worker_processes_queue_in_order_and_stops() {
    let h = Harness::new(&[charger("s1", LoadSharingPriority::Normal)], 32);
    let plugged = update(&h, "s1", PilotVoltage::Volt9);
    let unplugged = update(&h, "s1", PilotVoltage::Volt12);
    let fleet = h.fleet.clone();

    let (handle, task) = h.orchestrator.spawn(4);
    let mut snapshots = Box::pin(handle.snapshot_stream());

    handle.submit(plugged).await.unwrap();
    handle.submit(unplugged).await.unwrap();

    let first = snapshots.next().await.unwrap();
    assert_eq!(first.state, StationState::PluggedNotReady);
    assert_eq!(first.pwm_percent, Some(10));
    let second = snapshots.next().await.unwrap();
    assert_eq!(second.state, StationState::Unplugged);
    assert_eq!(second.pwm_percent, Some(100));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert_eq!(fleet.station("s1").pwm, 100);

    let late = TelemetryUpdate {
        client_id: "s1".to_string(),
        data: fleet.telemetry("s1", PilotVoltage::Volt9, 0.0, 0),
    };
    assert!(matches!(
        handle.submit(late).await,
        Err(ChargeShareError::Queue { .. })
    ));
}

#[tokio::test]
async fn dropping_handles_ends_worker() {
    let h = Harness::new(&[charger("s1", LoadSharingPriority::Normal)], 32);
    let (handle, task) = h.orchestrator.spawn(1);
    drop(handle);
    task.await.unwrap();
}

#[test]
fn telemetry_update_parses_from_json_line() {
    let line = r#"{"client_id":"s1","data":{"contactor_on":false,"pwm_percent":100,
        "pilot_voltage":"volt_9","proximity_pilot_amps":"amp32",
        "phase1_millivolts":230000,"phase2_millivolts":230000,"phase3_millivolts":230000,
        "phase1_milliamps":-387,"phase2_milliamps":-265,"phase3_milliamps":-666,
        "timestamp_ms":1700000000000}}"#;
    let update: TelemetryUpdate = serde_json::from_str(line).unwrap();
    assert_eq!(update.client_id, "s1");
    assert_eq!(update.data.pilot_voltage, PilotVoltage::Volt9);
    assert!(update.data.fault_codes.is_empty());
    assert!(!update.data.has_fault());
}
