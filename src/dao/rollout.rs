use tracing::debug;

use super::DaoFactory;
use crate::error::{Error, Result};
use crate::types::{ClientRatio, Metric};

impl DaoFactory {
    pub async fn metrics(&self, deployment_key: &str) -> Result<Vec<Metric>> {
        self.driver.find_metrics(deployment_key).await
    }

    pub async fn insert_metric(&self, metric: Metric) -> Result<()> {
        self.driver.insert_metric(&metric).await?;
        debug!(
            deployment_key = %metric.deployment_key,
            status = metric.status.as_str(),
            "metric recorded"
        );
        Ok(())
    }

    pub async fn client_ratio(
        &self,
        client_unique_id: &str,
        package_hash: &str,
    ) -> Result<Option<ClientRatio>> {
        self.driver
            .find_client_ratio(client_unique_id, package_hash)
            .await
    }

    /// Records whether a client was updated to `package_hash` under the
    /// given rollout ratio. A later call for the same client and package
    /// replaces the earlier record.
    pub async fn insert_client_ratio(
        &self,
        client_unique_id: &str,
        package_hash: &str,
        ratio: f64,
        updated: bool,
    ) -> Result<ClientRatio> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::invalid_state(format!(
                "rollout ratio {ratio} is outside 0.0..=1.0"
            )));
        }

        let record = ClientRatio {
            client_unique_id: client_unique_id.to_string(),
            package_hash: package_hash.to_string(),
            ratio,
            updated,
        };
        self.driver.upsert_client_ratio(&record).await?;
        debug!(client_unique_id, package_hash, ratio, updated, "client ratio recorded");
        Ok(record)
    }
}
