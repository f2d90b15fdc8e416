use std::time::Duration;

use engine_fault_tests::{
    cluster::RankState,
    fault::{FaultAction, FaultInjector, FaultOutcome},
    pool::PoolBuilder,
    sim::{SimCluster, SimConfig},
    Error,
};

use assert_matches::assert_matches;

async fn injector(sim: &SimCluster) -> FaultInjector {
    let handle = sim.handle();
    let pool = PoolBuilder::new(handle.clone())
        .with_name("device-pool")
        .with_new_uuid()
        .create()
        .await
        .unwrap();
    FaultInjector::new(handle, pool).with_rank_check(Duration::from_millis(10), 5)
}

#[tokio::test]
async fn sys_metadata_device_refusal_is_the_expected_outcome() {
    let sim = SimCluster::new(SimConfig::default());
    sim.add_device("node1", "boot-ssd", true);
    let injector = injector(&sim).await;

    let outcome = injector
        .apply(&FaultAction::SetDeviceFaulty {
            host: "node1".to_string(),
            uuid: "boot-ssd".to_string(),
            has_sys_xs: true,
        })
        .await
        .unwrap();

    assert_eq!(outcome, FaultOutcome::RefusedSysMetadata);
    // The hosting rank went down with its metadata device.
    assert_eq!(sim.rank_state(1), Some(RankState::Stopped));
    // No compensating reset is registered for a refused fault.
    assert!(injector.run_cleanup().await.is_empty());
    assert!(sim.led_resets().is_empty());
}

#[tokio::test]
async fn surviving_sys_metadata_fault_is_a_postcondition_failure() {
    let sim = SimCluster::new(SimConfig::default());
    let injector = injector(&sim).await;

    // The device is an ordinary one, so the control plane accepts the
    // fault; a test claiming it hosts system metadata must fail.
    let error = injector
        .apply(&FaultAction::SetDeviceFaulty {
            host: "node2".to_string(),
            uuid: "sim-nvme-2".to_string(),
            has_sys_xs: true,
        })
        .await
        .unwrap_err();
    assert_matches!(error, Error::Postcondition { .. });
}

#[tokio::test]
async fn refused_fault_on_an_ordinary_claim_is_an_error() {
    let sim = SimCluster::new(SimConfig::default());
    sim.add_device("node0", "boot-ssd", true);
    let injector = injector(&sim).await;

    let error = injector
        .apply(&FaultAction::SetDeviceFaulty {
            host: "node0".to_string(),
            uuid: "boot-ssd".to_string(),
            has_sys_xs: false,
        })
        .await
        .unwrap_err();
    assert_matches!(error, Error::CommandFailed { .. });
}

#[tokio::test]
async fn faulted_device_registers_a_reset_for_teardown() {
    let sim = SimCluster::new(SimConfig::default());
    let injector = injector(&sim).await;

    // Pick the device from the per-host enumeration, as a test would.
    let devices = sim.handle().storage.device_uuids().await.unwrap();
    let device = devices.get("node3").and_then(|d| d.first()).cloned().unwrap();
    assert!(!device.has_sys_xs);
    assert_eq!(device.uuid, "sim-nvme-3");

    let outcome = injector
        .apply(&FaultAction::SetDeviceFaulty {
            host: "node3".to_string(),
            uuid: device.uuid,
            has_sys_xs: false,
        })
        .await
        .unwrap();
    assert_eq!(outcome, FaultOutcome::Applied);
    assert_eq!(
        sim.faulted_devices(),
        vec![("node3".to_string(), "sim-nvme-3".to_string())]
    );

    let errors = injector.run_cleanup().await;
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(
        sim.led_resets(),
        vec![("node3".to_string(), "sim-nvme-3".to_string())]
    );
    assert!(sim.faulted_devices().is_empty());

    // Cleanup is one-shot; a second run has nothing left to do.
    assert!(injector.run_cleanup().await.is_empty());
    assert_eq!(sim.led_resets().len(), 1);
}
