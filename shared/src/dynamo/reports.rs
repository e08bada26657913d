use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::config::DynamoConfig;
use crate::error::DataError;
use crate::provider::{upload_path, BlobUploader, ReportRepository};
use crate::session::SessionStore;
use crate::types::{Location, NewReport, Report, Vehicle};

// All reports share one partition; the sort key orders them by creation
// time so queries come back already sorted.
const REPORT_PARTITION: &str = "REPORT";

/// Fixed-width RFC 3339 so lexicographic order equals chronological order.
fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn sort_key(created_at: DateTime<Utc>, report_id: &str) -> String {
    format!("{}#{}", format_ts(created_at), report_id)
}

/// Upper bound for an inclusive range query: '~' sorts after '#', so every
/// sort key stamped exactly at `end` still falls inside the window.
fn range_end_key(end: DateTime<Utc>) -> String {
    format!("{}~", format_ts(end))
}

/// Document-variant report repository over a single DynamoDB table.
/// Attribute names are camelCase, matching the document schema.
pub struct DynamoReports {
    client: DynamoClient,
    table_name: String,
    uploader: Arc<dyn BlobUploader>,
    session: SessionStore,
}

impl DynamoReports {
    pub fn new(
        aws_config: &aws_config::SdkConfig,
        config: &DynamoConfig,
        uploader: Arc<dyn BlobUploader>,
        session: SessionStore,
    ) -> Self {
        Self {
            client: DynamoClient::new(aws_config),
            table_name: config.table_name.clone(),
            uploader,
            session,
        }
    }

    fn items_to_reports(items: &[HashMap<String, AttributeValue>]) -> Vec<Report> {
        items.iter().filter_map(item_to_report).collect()
    }
}

fn location_to_item(location: &Location) -> AttributeValue {
    let mut map = HashMap::new();
    map.insert(
        "latitude".to_string(),
        AttributeValue::N(location.latitude.to_string()),
    );
    map.insert(
        "longitude".to_string(),
        AttributeValue::N(location.longitude.to_string()),
    );
    if let Some(address) = &location.address {
        map.insert("address".to_string(), AttributeValue::S(address.clone()));
    }
    AttributeValue::M(map)
}

fn item_to_location(value: &AttributeValue) -> Option<Location> {
    let map = value.as_m().ok()?;
    Some(Location {
        latitude: map.get("latitude")?.as_n().ok()?.parse().ok()?,
        longitude: map.get("longitude")?.as_n().ok()?.parse().ok()?,
        address: map
            .get("address")
            .and_then(|v| v.as_s().ok())
            .cloned(),
    })
}

fn item_to_report(item: &HashMap<String, AttributeValue>) -> Option<Report> {
    let id = item.get("reportId").and_then(|v| v.as_s().ok())?.clone();
    let created_at = item
        .get("createdAt")
        .and_then(|v| v.as_s().ok())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    let Some(created_at) = created_at else {
        tracing::warn!("Skipping report {} with unreadable createdAt", id);
        return None;
    };

    Some(Report {
        id,
        user_name: item
            .get("userName")
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default(),
        user_id: item
            .get("userId")
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default(),
        purpose: item
            .get("purpose")
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default(),
        time_out: item
            .get("timeOut")
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default(),
        time_in: item
            .get("timeIn")
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default(),
        vehicle: item
            .get("vehicle")
            .and_then(|v| v.as_s().ok())
            .map(|s| Vehicle::parse(s))
            .unwrap_or(Vehicle::Other),
        photo_url: item
            .get("photoUrl")
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default(),
        location: item.get("location").and_then(item_to_location),
        notes: item
            .get("notes")
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default(),
        created_at,
    })
}

#[async_trait]
impl ReportRepository for DynamoReports {
    async fn submit_report(&self, report: NewReport) -> Result<Report, DataError> {
        let photo_url = match &report.photo {
            Some(file) => {
                let path = upload_path(&file.file_name, Utc::now());
                self.uploader.upload_image(file, &path).await?
            }
            None => String::new(),
        };

        let user_id = self
            .session
            .current()
            .principal
            .map(|p| p.account_id)
            .unwrap_or_default();

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let mut put = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("PK", AttributeValue::S(REPORT_PARTITION.to_string()))
            .item("SK", AttributeValue::S(sort_key(created_at, &id)))
            .item("reportId", AttributeValue::S(id.clone()))
            .item("userName", AttributeValue::S(report.user_name.clone()))
            .item("userId", AttributeValue::S(user_id.clone()))
            .item("purpose", AttributeValue::S(report.purpose.clone()))
            .item("timeOut", AttributeValue::S(report.time_out.clone()))
            .item("timeIn", AttributeValue::S(report.time_in.clone()))
            .item(
                "vehicle",
                AttributeValue::S(report.vehicle.as_str().to_string()),
            )
            .item("photoUrl", AttributeValue::S(photo_url.clone()))
            .item("notes", AttributeValue::S(report.notes.clone()))
            .item("createdAt", AttributeValue::S(format_ts(created_at)));

        if let Some(location) = &report.location {
            put = put.item("location", location_to_item(location));
        }

        put.send()
            .await
            .map_err(|e| DataError::transport(format!("Failed to store report: {:?}", e)))?;

        tracing::info!("Report {} stored for {}", id, report.user_name);

        Ok(Report {
            id,
            user_name: report.user_name,
            user_id,
            purpose: report.purpose,
            time_out: report.time_out,
            time_in: report.time_in,
            vehicle: report.vehicle,
            photo_url,
            location: report.location,
            notes: report.notes,
            created_at,
        })
    }

    async fn get_reports(&self) -> Result<Vec<Report>, DataError> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("PK = :pk")
            .expression_attribute_values(":pk", AttributeValue::S(REPORT_PARTITION.to_string()))
            .scan_index_forward(false)
            .send()
            .await
            .map_err(|e| DataError::transport(format!("Failed to list reports: {:?}", e)))?;

        Ok(Self::items_to_reports(result.items()))
    }

    async fn get_reports_by_user(&self, user_name: &str) -> Result<Vec<Report>, DataError> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("PK = :pk")
            .filter_expression("userName = :userName")
            .expression_attribute_values(":pk", AttributeValue::S(REPORT_PARTITION.to_string()))
            .expression_attribute_values(":userName", AttributeValue::S(user_name.to_string()))
            .scan_index_forward(false)
            .send()
            .await
            .map_err(|e| DataError::transport(format!("Failed to list reports: {:?}", e)))?;

        Ok(Self::items_to_reports(result.items()))
    }

    async fn get_reports_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Report>, DataError> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("PK = :pk AND SK BETWEEN :start AND :end")
            .expression_attribute_values(":pk", AttributeValue::S(REPORT_PARTITION.to_string()))
            .expression_attribute_values(":start", AttributeValue::S(format_ts(start)))
            .expression_attribute_values(":end", AttributeValue::S(range_end_key(end)))
            .scan_index_forward(false)
            .send()
            .await
            .map_err(|e| DataError::transport(format!("Failed to list reports: {:?}", e)))?;

        Ok(Self::items_to_reports(result.items()))
    }
}
