use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DataError;
use crate::provider::{upload_path, BlobUploader, ReportRepository};
use crate::session::SessionStore;
use crate::types::{Location, NewReport, Report, Vehicle};

const SELECT_REPORT: &str = "SELECT id, user_name, user_id, purpose, time_out, time_in, \
     vehicle, photo_url, location, notes, created_at FROM reports";

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    user_name: String,
    user_id: String,
    purpose: String,
    time_out: String,
    time_in: String,
    vehicle: String,
    photo_url: String,
    location: Option<Json<Location>>,
    notes: String,
    created_at: DateTime<Utc>,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Report {
            id: row.id.to_string(),
            user_name: row.user_name,
            user_id: row.user_id,
            purpose: row.purpose,
            time_out: row.time_out,
            time_in: row.time_in,
            vehicle: Vehicle::parse(&row.vehicle),
            photo_url: row.photo_url,
            location: row.location.map(|json| json.0),
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

/// Relational-variant report repository. Column names are snake_case; the
/// database assigns both id and created_at.
pub struct PostgresReports {
    pool: PgPool,
    uploader: Arc<dyn BlobUploader>,
    session: SessionStore,
}

impl PostgresReports {
    pub fn new(pool: PgPool, uploader: Arc<dyn BlobUploader>, session: SessionStore) -> Self {
        Self {
            pool,
            uploader,
            session,
        }
    }
}

#[async_trait]
impl ReportRepository for PostgresReports {
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

        let row = sqlx::query_as::<_, ReportRow>(
            "INSERT INTO reports \
                 (user_name, user_id, purpose, time_out, time_in, vehicle, photo_url, location, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id, user_name, user_id, purpose, time_out, time_in, vehicle, photo_url, \
                 location, notes, created_at",
        )
        .bind(&report.user_name)
        .bind(&user_id)
        .bind(&report.purpose)
        .bind(&report.time_out)
        .bind(&report.time_in)
        .bind(report.vehicle.as_str())
        .bind(&photo_url)
        .bind(report.location.as_ref().map(|loc| Json(loc.clone())))
        .bind(&report.notes)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Report {} stored for {}", row.id, row.user_name);
        Ok(row.into())
    }

    async fn get_reports(&self) -> Result<Vec<Report>, DataError> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "{SELECT_REPORT} ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Report::from).collect())
    }

    async fn get_reports_by_user(&self, user_name: &str) -> Result<Vec<Report>, DataError> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "{SELECT_REPORT} WHERE user_name = $1 ORDER BY created_at DESC"
        ))
        .bind(user_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Report::from).collect())
    }

    async fn get_reports_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Report>, DataError> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "{SELECT_REPORT} WHERE created_at >= $1 AND created_at <= $2 ORDER BY created_at DESC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Report::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rows_map_to_reports() {
        let row = ReportRow {
            id: Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap(),
            user_name: "John Doe".to_string(),
            user_id: "acct-1".to_string(),
            purpose: "Client Meeting".to_string(),
            time_out: "2023-06-01T09:00".to_string(),
            time_in: "2023-06-01T12:30".to_string(),
            vehicle: "Personal Car".to_string(),
            photo_url: "https://storage.fieldlog.local/reports/reports/1_site.jpg".to_string(),
            location: Some(Json(Location {
                latitude: 37.7749,
                longitude: -122.4194,
                address: None,
            })),
            notes: String::new(),
            created_at: Utc.with_ymd_and_hms(2023, 6, 1, 8, 45, 0).unwrap(),
        };

        let report = Report::from(row);
        assert_eq!(report.id, "11111111-2222-3333-4444-555555555555");
        assert_eq!(report.vehicle, Vehicle::PersonalCar);
        assert_eq!(report.location.unwrap().latitude, 37.7749);
    }

    #[test]
    fn stored_vehicle_outside_the_set_reads_as_other() {
        let row = ReportRow {
            id: Uuid::new_v4(),
            user_name: String::new(),
            user_id: String::new(),
            purpose: String::new(),
            time_out: String::new(),
            time_in: String::new(),
            vehicle: "Bicycle".to_string(),
            photo_url: String::new(),
            location: None,
            notes: String::new(),
            created_at: Utc::now(),
        };
        assert_eq!(Report::from(row).vehicle, Vehicle::Other);
    }
}
