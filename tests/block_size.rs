use engine_fault_tests::{
    cluster::{BenchOutput, StorageClass},
    container::ContainerBuilder,
    pool::PoolBuilder,
    sim::{SimCluster, SimConfig},
    workload::{LoadGenerator, ObjectClass, Workload, WorkloadMode},
    Error,
};

use assert_matches::assert_matches;

const FREE: u64 = 100 * 1024 * 1024 * 1024;
const XFER: u64 = 1024 * 1024;

#[test]
fn block_size_is_bounded_and_aligned() {
    let classes = ["SX", "RP_2GX", "RP_3GX", "EC_4P1GX", "EC_8P2GX"];
    for percent in [1, 37, 50, 100] {
        for class in classes {
            let w = Workload::new(WorkloadMode::AutoWrite)
                .with_fill_percent(percent)
                .with_transfer_size(XFER)
                .with_object_class(ObjectClass::new(class));
            let block = w.block_size_for(FREE);
            assert_eq!(block % XFER, 0, "{class} at {percent}%");
            assert!(
                block <= FREE / 100 * percent,
                "{class} at {percent}%: {block} exceeds the fill bound"
            );
        }
    }
}

#[test]
fn process_count_divides_the_block_size() {
    let single = Workload::new(WorkloadMode::AutoWrite)
        .with_fill_percent(50)
        .with_transfer_size(XFER);
    let spread = single.clone().with_processes(4);
    assert_eq!(spread.block_size_for(FREE) * 4, single.block_size_for(FREE));
}

#[test]
fn read_modes_never_create_the_container() {
    assert!(Workload::new(WorkloadMode::Write).creates_container());
    assert!(Workload::new(WorkloadMode::AutoWrite).creates_container());
    assert!(!Workload::new(WorkloadMode::Read).creates_container());
    assert!(!Workload::new(WorkloadMode::AutoRead).creates_container());
    assert!(!Workload::new(WorkloadMode::Write)
        .with_create_container(false)
        .creates_container());
}

#[test]
fn metrics_require_a_summary_line() {
    let output = BenchOutput {
        stdout: "no summary here".to_string(),
    };
    assert_matches!(output.metrics(), Err(Error::CommandFailed { .. }));
}

#[tokio::test]
async fn auto_write_sizes_from_pool_free_space() {
    let sim = SimCluster::new(SimConfig::default());
    let handle = sim.handle();

    let pool = PoolBuilder::new(handle.clone())
        .with_name("pool0")
        .with_new_uuid()
        .with_scm_size_mb(1024)
        .with_nvme_size_mb(8192)
        .create()
        .await
        .unwrap();
    let container = ContainerBuilder::new(handle.clone(), &pool)
        .with_new_uuid()
        .build();

    let workload = Workload::new(WorkloadMode::AutoWrite)
        .with_storage(StorageClass::Nvme)
        .with_fill_percent(10)
        .with_transfer_size(XFER);
    let expected = workload.block_size_for(pool.free_space(StorageClass::Nvme).await.unwrap());

    let generator = LoadGenerator::new(handle, pool, container.clone());
    let metrics = generator.run(&workload).await.unwrap();

    assert_eq!(metrics.bytes_moved, expected);
    assert!(container.exists().await.unwrap());
}
