use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::DataError;
use crate::types::{NewReport, Principal, Report, Role, UploadFile, UserAccount};

/// Domain suffix for synthesized employee login emails.
pub const EMPLOYEE_EMAIL_DOMAIN: &str = "fieldlog.local";

/// Deterministic login email for a provisioned employee account.
pub fn employee_email(employee_id: &str) -> String {
    format!("{}@{}", employee_id.to_lowercase(), EMPLOYEE_EMAIL_DOMAIN)
}

/// Storage path convention for report photos. Not collision-proof for two
/// same-named files in the same millisecond; kept as the established layout.
pub fn upload_path(file_name: &str, now: DateTime<Utc>) -> String {
    format!("reports/{}_{}", now.timestamp_millis(), file_name)
}

/// Auth-state subscription: the resolver publishes the current principal
/// (or `None`) on every sign-in/sign-out transition. The receiver's initial
/// value counts as the first notification.
pub type AuthStateReceiver = watch::Receiver<Option<Principal>>;

/// Credential resolution and account provisioning against one provider.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Exact, case-sensitive employee-ID lookup followed by a password
    /// sign-in with the resolved email. Zero matches fail with `NotFound`
    /// before any sign-in attempt; a matched record without a login email
    /// fails with `Conflict`.
    async fn employee_login(&self, employee_id: &str, password: &str) -> Result<(), DataError>;

    /// Admin-invoked provisioning: synthesizes the login email, creates the
    /// auth account, then writes the profile record linked by the new
    /// account id. An existing employee ID fails with `Conflict`.
    async fn create_employee(
        &self,
        employee_id: &str,
        name: &str,
        password: &str,
        role: Role,
    ) -> Result<(), DataError>;

    /// Direct provider email/password sign-in.
    async fn login(&self, email: &str, password: &str) -> Result<(), DataError>;

    /// Direct provider sign-up plus a default-role profile record.
    async fn signup(&self, email: &str, password: &str) -> Result<(), DataError>;

    /// Invalidates the current session. A no-op when nothing is signed in.
    async fn logout(&self) -> Result<(), DataError>;

    /// Single-record profile lookup by account id.
    async fn account_by_id(&self, account_id: &str) -> Result<Option<UserAccount>, DataError>;

    fn subscribe(&self) -> AuthStateReceiver;
}

/// Create/list/filter over report records. Every listing is ordered by
/// `created_at` descending; no pagination, no result cap.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Uploads the photo first when present, then writes one report row with
    /// a store-assigned creation timestamp and the current session's account
    /// id as owner when available. Fields are not re-validated here.
    async fn submit_report(&self, report: NewReport) -> Result<Report, DataError>;

    async fn get_reports(&self) -> Result<Vec<Report>, DataError>;

    /// Equality filter on the denormalized display name.
    async fn get_reports_by_user(&self, user_name: &str) -> Result<Vec<Report>, DataError>;

    /// Inclusive on both ends of the `created_at` window.
    async fn get_reports_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Report>, DataError>;
}

/// Stores one binary object and returns a publicly resolvable URL. No
/// size/type validation happens here; that belongs to the bucket policy.
#[async_trait]
pub trait BlobUploader: Send + Sync {
    async fn upload_image(&self, file: &UploadFile, path: &str) -> Result<String, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, Vehicle};
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[test]
    fn employee_email_is_lowercased_with_fixed_domain() {
        assert_eq!(employee_email("EMP001"), "emp001@fieldlog.local");
        assert_eq!(employee_email("emp001"), "emp001@fieldlog.local");
    }

    #[test]
    fn upload_path_uses_millis_and_original_filename() {
        let at = Utc.with_ymd_and_hms(2023, 6, 1, 9, 0, 0).unwrap();
        assert_eq!(
            upload_path("site.jpg", at),
            format!("reports/{}_site.jpg", at.timestamp_millis())
        );
    }

    // Reference in-memory repository used to pin down the listing contract:
    // descending order, exact filter subsets, inclusive range bounds.
    struct MemoryReports {
        rows: Mutex<Vec<Report>>,
        clock: Mutex<DateTime<Utc>>,
        owner: Option<String>,
    }

    impl MemoryReports {
        fn new(owner: Option<&str>) -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                clock: Mutex::new(Utc.with_ymd_and_hms(2023, 6, 1, 8, 0, 0).unwrap()),
                owner: owner.map(|o| o.to_string()),
            }
        }

        fn tick(&self) -> DateTime<Utc> {
            let mut clock = self.clock.lock().unwrap();
            *clock += chrono::Duration::minutes(1);
            *clock
        }
    }

    #[async_trait]
    impl ReportRepository for MemoryReports {
        async fn submit_report(&self, report: NewReport) -> Result<Report, DataError> {
            let photo_url = match &report.photo {
                Some(file) => format!("memory://{}", upload_path(&file.file_name, self.tick())),
                None => String::new(),
            };
            let created_at = self.tick();
            let mut rows = self.rows.lock().unwrap();
            let stored = Report {
                id: format!("mem-{}", rows.len() + 1),
                user_name: report.user_name,
                user_id: self.owner.clone().unwrap_or_default(),
                purpose: report.purpose,
                time_out: report.time_out,
                time_in: report.time_in,
                vehicle: report.vehicle,
                photo_url,
                location: report.location,
                notes: report.notes,
                created_at,
            };
            rows.push(stored.clone());
            Ok(stored)
        }

        async fn get_reports(&self) -> Result<Vec<Report>, DataError> {
            let mut rows = self.rows.lock().unwrap().clone();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rows)
        }

        async fn get_reports_by_user(&self, user_name: &str) -> Result<Vec<Report>, DataError> {
            Ok(self
                .get_reports()
                .await?
                .into_iter()
                .filter(|r| r.user_name == user_name)
                .collect())
        }

        async fn get_reports_by_date_range(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Report>, DataError> {
            Ok(self
                .get_reports()
                .await?
                .into_iter()
                .filter(|r| start <= r.created_at && r.created_at <= end)
                .collect())
        }
    }

    fn form(user_name: &str, purpose: &str) -> NewReport {
        NewReport {
            user_name: user_name.to_string(),
            purpose: purpose.to_string(),
            time_out: "2023-06-01T09:00".to_string(),
            time_in: "2023-06-01T12:30".to_string(),
            vehicle: Vehicle::PersonalCar,
            photo: Some(UploadFile {
                file_name: "site.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                bytes: vec![0xFF, 0xD8],
            }),
            location: Some(Location {
                latitude: 37.7749,
                longitude: -122.4194,
                address: None,
            }),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn listings_are_newest_first_without_gaps() {
        let repo = MemoryReports::new(None);
        for i in 0..4 {
            repo.submit_report(form("John Doe", &format!("Trip {i}")))
                .await
                .unwrap();
        }

        let all = repo.get_reports().await.unwrap();
        assert_eq!(all.len(), 4);
        for pair in all.windows(2) {
            assert!(pair[0].created_at > pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn user_filter_is_an_ordered_subset() {
        let repo = MemoryReports::new(None);
        repo.submit_report(form("John Doe", "Client Meeting")).await.unwrap();
        repo.submit_report(form("Jane Smith", "Site Inspection")).await.unwrap();
        repo.submit_report(form("John Doe", "Supply Pickup")).await.unwrap();

        let all = repo.get_reports().await.unwrap();
        let johns = repo.get_reports_by_user("John Doe").await.unwrap();

        let expected: Vec<_> = all
            .iter()
            .filter(|r| r.user_name == "John Doe")
            .map(|r| r.id.clone())
            .collect();
        let actual: Vec<_> = johns.iter().map(|r| r.id.clone()).collect();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn date_range_is_inclusive_on_both_ends() {
        let repo = MemoryReports::new(None);
        let first = repo.submit_report(form("John Doe", "A")).await.unwrap();
        let second = repo.submit_report(form("John Doe", "B")).await.unwrap();
        let third = repo.submit_report(form("John Doe", "C")).await.unwrap();

        let window = repo
            .get_reports_by_date_range(first.created_at, second.created_at)
            .await
            .unwrap();
        let ids: Vec<_> = window.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        // A window containing nothing is an empty sequence, not an error.
        let empty = repo
            .get_reports_by_date_range(
                third.created_at + chrono::Duration::hours(1),
                third.created_at + chrono::Duration::hours(2),
            )
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn submit_stores_photo_url_location_and_fresh_timestamp() {
        let repo = MemoryReports::new(Some("acct-1"));
        let issued_at = *repo.clock.lock().unwrap();
        let stored = repo.submit_report(form("John Doe", "Client Meeting")).await.unwrap();

        assert!(!stored.photo_url.is_empty());
        assert_eq!(
            stored.location,
            Some(Location {
                latitude: 37.7749,
                longitude: -122.4194,
                address: None,
            })
        );
        assert_eq!(stored.user_id, "acct-1");
        assert!(stored.created_at > issued_at);
    }

    #[tokio::test]
    async fn submit_without_photo_stores_empty_url() {
        let repo = MemoryReports::new(None);
        let mut report = form("John Doe", "Client Meeting");
        report.photo = None;
        let stored = repo.submit_report(report).await.unwrap();
        assert_eq!(stored.photo_url, "");
    }
}
