//! Typed access to staffing records on top of the generic document store.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::extract::{
    StaffingExtractRecord, DOC_TYPE_EMPLOYEE_DATA, DOC_TYPE_RFP_STAFFING_EXTRACT,
};
use crate::storage::documents::{DocumentQuery, DocumentStore, StoreError};

#[derive(Clone)]
pub struct StaffingRepository {
    store: Arc<dyn DocumentStore>,
}

impl StaffingRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn insert_extract(&self, record: &StaffingExtractRecord) -> Result<(), StoreError> {
        let document = serde_json::to_value(record)?;
        self.store.upsert(&document).await?;
        info!(
            "Stored extract {} for '{}' (run {}, {} roles)",
            record.id,
            record.blob_name,
            record.rfp_id,
            record.rfp_staffing_requirements.len()
        );
        Ok(())
    }

    pub async fn get_extract(
        &self,
        rfp_id: Uuid,
        id: Uuid,
    ) -> Result<Option<StaffingExtractRecord>, StoreError> {
        match self
            .store
            .read(&id.to_string(), &rfp_id.to_string())
            .await?
        {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// Every extract record written by one ingestion run.
    pub async fn list_run(&self, rfp_id: Uuid) -> Result<Vec<StaffingExtractRecord>, StoreError> {
        let query = DocumentQuery::new()
            .eq("doc_type", DOC_TYPE_RFP_STAFFING_EXTRACT)
            .in_partition(rfp_id.to_string());
        let documents = self.store.query(&query).await?;
        Ok(decode_records(documents))
    }

    /// Extract records in `status`, grouped by run.
    pub async fn grouped_by_status(
        &self,
        status: &str,
    ) -> Result<BTreeMap<Uuid, Vec<StaffingExtractRecord>>, StoreError> {
        let query = DocumentQuery::new()
            .eq("doc_type", DOC_TYPE_RFP_STAFFING_EXTRACT)
            .eq("status", status)
            .enable_cross_partition();
        let documents = self.store.query(&query).await?;

        let mut grouped: BTreeMap<Uuid, Vec<StaffingExtractRecord>> = BTreeMap::new();
        for record in decode_records(documents) {
            grouped.entry(record.rfp_id).or_default().push(record);
        }
        Ok(grouped)
    }

    pub async fn update_status(
        &self,
        rfp_id: Uuid,
        id: Uuid,
        status: &str,
    ) -> Result<Value, StoreError> {
        self.update_field(rfp_id, id, "status", Value::from(status))
            .await
    }

    /// Overwrites one top-level field with no schema check.
    pub async fn update_field(
        &self,
        rfp_id: Uuid,
        id: Uuid,
        field: &str,
        value: Value,
    ) -> Result<Value, StoreError> {
        let (id, partition_key) = (id.to_string(), rfp_id.to_string());
        let mut document =
            self.store
                .read(&id, &partition_key)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    id: id.clone(),
                    partition_key: partition_key.clone(),
                })?;

        match document.as_object_mut() {
            Some(fields) => {
                fields.insert(field.to_string(), value);
            }
            None => return Err(StoreError::MissingKey("id")),
        }

        self.store.replace(&id, &partition_key, &document).await
    }

    /// Employee records, stored alongside extracts with `doc_type = employee_data`.
    pub async fn list_employees(&self) -> Result<Vec<Value>, StoreError> {
        let query = DocumentQuery::new()
            .eq("doc_type", DOC_TYPE_EMPLOYEE_DATA)
            .enable_cross_partition();
        self.store.query(&query).await
    }
}

/// Drops documents that no longer decode (e.g. after a blunt field update).
fn decode_records(documents: Vec<Value>) -> Vec<StaffingExtractRecord> {
    documents
        .into_iter()
        .filter_map(|document| {
            let id = document.get("id").cloned().unwrap_or_default();
            match serde_json::from_value(document) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping undecodable extract record {id}: {e}");
                    None
                }
            }
        })
        .collect()
}
