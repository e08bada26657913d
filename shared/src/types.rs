use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ========== ROLE ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Resolve a stored role string. Anything that is not exactly "admin"
    /// (missing field, unknown value) degrades to `User`, never to `Admin`.
    pub fn parse_or_user(value: Option<&str>) -> Role {
        match value {
            Some("admin") => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserAccount {
    pub account_id: String,
    pub employee_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// The provider-authenticated identity carried by auth-state events.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmployeeLoginRequest {
    pub employee_id: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmployeeRequest {
    pub employee_id: String,
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

// ========== REPORT ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Vehicle {
    #[serde(rename = "Personal Car")]
    PersonalCar,
    #[serde(rename = "Company Vehicle")]
    CompanyVehicle,
    Taxi,
    #[serde(rename = "Public Transport")]
    PublicTransport,
    Walking,
    Other,
}

impl Vehicle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vehicle::PersonalCar => "Personal Car",
            Vehicle::CompanyVehicle => "Company Vehicle",
            Vehicle::Taxi => "Taxi",
            Vehicle::PublicTransport => "Public Transport",
            Vehicle::Walking => "Walking",
            Vehicle::Other => "Other",
        }
    }

    /// Stored values outside the fixed set read back as `Other`.
    pub fn parse(value: &str) -> Vehicle {
        match value {
            "Personal Car" => Vehicle::PersonalCar,
            "Company Vehicle" => Vehicle::CompanyVehicle,
            "Taxi" => Vehicle::Taxi,
            "Public Transport" => Vehicle::PublicTransport,
            "Walking" => Vehicle::Walking,
            _ => Vehicle::Other,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Report {
    pub id: String,
    pub user_name: String,
    pub user_id: String,
    pub purpose: String,
    // Wall-clock values entered by the submitter, stored verbatim.
    pub time_out: String,
    pub time_in: String,
    pub vehicle: Vehicle,
    pub photo_url: String,
    pub location: Option<Location>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// A photo carried alongside a report submission.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Form data for one report submission.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub user_name: String,
    pub purpose: String,
    pub time_out: String,
    pub time_in: String,
    pub vehicle: Vehicle,
    pub photo: Option<UploadFile>,
    pub location: Option<Location>,
    pub notes: String,
}

impl NewReport {
    /// Caller-side presence check, run before submission. The repository
    /// itself does not re-validate.
    pub fn validate(&self) -> Result<(), String> {
        if self.user_name.is_empty()
            || self.purpose.is_empty()
            || self.time_out.is_empty()
            || self.time_in.is_empty()
            || self.photo.is_none()
            || self.location.is_none()
        {
            return Err("All fields except notes are required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitReportRequest {
    pub user_name: String,
    pub purpose: String,
    pub time_out: String,
    pub time_in: String,
    pub vehicle: Vehicle,
    pub photo: Option<PhotoUpload>,
    pub location: Option<Location>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: String,
    pub file_data: String, // base64 encoded
}

/// Case-insensitive text search over an already-fetched report list, used by
/// the admin dashboard. Matches user name, purpose, or location address and
/// preserves the input order.
pub fn search_reports(reports: &[Report], query: &str) -> Vec<Report> {
    let needle = query.to_lowercase();
    reports
        .iter()
        .filter(|report| {
            report.user_name.to_lowercase().contains(&needle)
                || report.purpose.to_lowercase().contains(&needle)
                || report
                    .location
                    .as_ref()
                    .and_then(|loc| loc.address.as_ref())
                    .map(|addr| addr.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        })
        .cloned()
        .collect()
}
