//! Container proxy.

use snafu::ensure;

use crate::{
    cluster::{ClusterHandle, ContainerSpec, ContainerStatus, Property},
    error::{PostconditionSnafu, Result},
    generate_uuid,
    pool::Pool,
    workload::ObjectClass,
};

#[derive(Clone)]
pub struct ContainerBuilder {
    cluster: ClusterHandle,
    pool_uuid: String,
    uuid: Option<String>,
    oclass: Option<ObjectClass>,
    properties: Vec<Property>,
}

impl ContainerBuilder {
    pub fn new(cluster: ClusterHandle, pool: &Pool) -> Self {
        Self {
            cluster,
            pool_uuid: pool.uuid().to_owned(),
            uuid: None,
            oclass: None,
            properties: Vec::new(),
        }
    }

    pub fn with_uuid(mut self, uuid: &str) -> Self {
        self.uuid = Some(uuid.to_owned());
        self
    }

    pub fn with_new_uuid(self) -> Self {
        let uuid = generate_uuid();
        self.with_uuid(&uuid)
    }

    pub fn with_object_class(mut self, oclass: ObjectClass) -> Self {
        self.oclass = Some(oclass);
        self
    }

    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.properties.push(Property::new(name, value));
        self
    }

    /// Build the proxy without creating the container on the cluster.
    pub fn build(self) -> Container {
        Container {
            cluster: self.cluster,
            pool_uuid: self.pool_uuid,
            uuid: self.uuid.expect("Container UUID must be set"),
            oclass: self.oclass,
            properties: self.properties,
        }
    }

    pub async fn create(self) -> Result<Container> {
        let container = self.build();
        container.create().await?;
        Ok(container)
    }
}

/// Proxy to one container.
#[derive(Clone)]
pub struct Container {
    cluster: ClusterHandle,
    pool_uuid: String,
    uuid: String,
    oclass: Option<ObjectClass>,
    properties: Vec<Property>,
}

impl Container {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn pool_uuid(&self) -> &str {
        &self.pool_uuid
    }

    pub async fn create(&self) -> Result<()> {
        let spec = ContainerSpec {
            uuid: self.uuid.clone(),
            pool: self.pool_uuid.clone(),
            object_class: self.oclass.as_ref().map(|c| c.name().to_owned()),
            properties: self.properties.clone(),
        };
        self.cluster.container.create_container(&spec).await
    }

    pub async fn exists(&self) -> Result<bool> {
        self.cluster.container.container_exists(&self.uuid).await
    }

    pub async fn destroy(self) -> Result<()> {
        self.cluster.container.destroy_container(&self.uuid).await
    }

    /// Write objects whose primary placement is the given rank.
    pub async fn write_objects(&self, rank: u32, oclass: &ObjectClass) -> Result<u64> {
        self.cluster
            .container
            .write_objects(&self.uuid, rank, oclass.name())
            .await
    }

    /// Re-read every object, verifying content byte-for-byte.
    pub async fn read_objects(&self) -> Result<u64> {
        self.cluster.container.read_objects(&self.uuid).await
    }

    /// Number of objects currently placed on the given rank.
    pub async fn rank_object_count(&self, rank: u32) -> Result<u64> {
        let counts = self
            .cluster
            .container
            .target_rank_counts(&self.uuid)
            .await?;
        Ok(counts.get(&rank).copied().unwrap_or(0))
    }

    pub async fn set_prop(&self, name: &str, value: &str) -> Result<()> {
        self.cluster
            .container
            .set_cont_prop(&self.uuid, &Property::new(name, value))
            .await
    }

    pub async fn get_prop(&self, name: Option<&str>) -> Result<Vec<Property>> {
        self.cluster.container.get_cont_props(&self.uuid, name).await
    }

    /// Clear a redundancy-degradation status picked up mid-rebuild.
    pub async fn mark_healthy(&self) -> Result<()> {
        self.set_prop("status", "healthy").await
    }

    pub async fn query(&self) -> Result<ContainerStatus> {
        self.cluster.container.query_container(&self.uuid).await
    }

    pub async fn create_snap(&self) -> Result<u64> {
        self.cluster.container.create_snap(&self.uuid).await
    }

    pub async fn destroy_snap(&self, epoch: u64) -> Result<()> {
        self.cluster.container.destroy_snap(&self.uuid, epoch).await
    }

    pub async fn list_snaps(&self) -> Result<Vec<u64>> {
        self.cluster.container.list_snaps(&self.uuid).await
    }

    /// Verify the reported snapshot epochs equal `expected` as a set.
    pub async fn verify_snaps(&self, expected: &[u64]) -> Result<()> {
        let mut detected = self.list_snaps().await?;
        let mut expected = expected.to_vec();
        detected.sort_unstable();
        expected.sort_unstable();
        ensure!(
            detected == expected,
            PostconditionSnafu {
                reason: format!(
                    "container {}: detected snapshots {detected:?} do not match expected {expected:?}",
                    self.uuid
                ),
            }
        );
        Ok(())
    }
}
