use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use fieldlog_shared::error::{DataError, ErrorResponse};
use fieldlog_shared::types::{
    search_reports, CreateEmployeeRequest, EmployeeLoginRequest, LoginRequest, NewReport, Role,
    SignupRequest, SubmitReportRequest, UploadFile,
};
use fieldlog_shared::Backend;
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::sync::Arc;

/// Main Lambda handler - routes requests to auth, session and report
/// endpoints.
pub(crate) async fn function_handler(
    event: Request,
    backend: Arc<Backend>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("🚀 API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == "OPTIONS" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET,POST,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, parts.as_slice()) {
        (&Method::POST, ["auth", "login"]) => {
            let request: LoginRequest = match parse_json(event.body()) {
                Ok(request) => request,
                Err(message) => return bad_request(&message),
            };
            match backend.identity.login(&request.email, &request.password).await {
                Ok(()) => message_response("Login successful"),
                Err(err) => error_response(&err),
            }
        }
        (&Method::POST, ["auth", "employee-login"]) => {
            let request: EmployeeLoginRequest = match parse_json(event.body()) {
                Ok(request) => request,
                Err(message) => return bad_request(&message),
            };
            match backend
                .identity
                .employee_login(&request.employee_id, &request.password)
                .await
            {
                Ok(()) => message_response("Login successful"),
                Err(err) => error_response(&err),
            }
        }
        (&Method::POST, ["auth", "signup"]) => {
            let request: SignupRequest = match parse_json(event.body()) {
                Ok(request) => request,
                Err(message) => return bad_request(&message),
            };
            match backend.identity.signup(&request.email, &request.password).await {
                Ok(()) => message_response("Account created successfully"),
                Err(err) => error_response(&err),
            }
        }
        (&Method::POST, ["auth", "logout"]) => match backend.identity.logout().await {
            Ok(()) => message_response("Logged out successfully"),
            Err(err) => error_response(&err),
        },
        // Current session snapshot: principal, resolved role, loading flag.
        (&Method::GET, ["session"]) => json_response(
            StatusCode::OK,
            serde_json::to_string(&backend.session.current())?,
        ),
        (&Method::POST, ["employees"]) => {
            // Provisioning is admin-gated on the session's resolved role.
            if backend.session.current().role != Some(Role::Admin) {
                return json_response(
                    StatusCode::FORBIDDEN,
                    serde_json::json!({"error": "Forbidden", "message": "Admin role required"})
                        .to_string(),
                );
            }
            let request: CreateEmployeeRequest = match parse_json(event.body()) {
                Ok(request) => request,
                Err(message) => return bad_request(&message),
            };
            match backend
                .identity
                .create_employee(
                    &request.employee_id,
                    &request.name,
                    &request.password,
                    request.role,
                )
                .await
            {
                Ok(()) => message_response("Employee account created successfully"),
                Err(err) => error_response(&err),
            }
        }
        (&Method::POST, ["reports"]) => {
            let request: SubmitReportRequest = match parse_json(event.body()) {
                Ok(request) => request,
                Err(message) => return bad_request(&message),
            };
            let report = match to_new_report(request) {
                Ok(report) => report,
                Err(message) => return bad_request(&message),
            };
            // Field presence is checked here, before the repository.
            if let Err(message) = report.validate() {
                return bad_request(&message);
            }
            match backend.reports.submit_report(report).await {
                Ok(stored) => json_response(StatusCode::CREATED, serde_json::to_string(&stored)?),
                Err(err) => error_response(&err),
            }
        }
        (&Method::GET, ["reports"]) => {
            let params = event.query_string_parameters_ref();
            let user = params.and_then(|p| p.first("user"));
            let start = params.and_then(|p| p.first("start"));
            let end = params.and_then(|p| p.first("end"));
            let query = params.and_then(|p| p.first("q"));

            let result = if let Some(user) = user {
                backend.reports.get_reports_by_user(user).await
            } else if start.is_some() || end.is_some() {
                match (start.and_then(parse_date), end.and_then(parse_date)) {
                    (Some(start), Some(end)) => {
                        backend.reports.get_reports_by_date_range(start, end).await
                    }
                    _ => {
                        return bad_request("start and end must both be RFC 3339 timestamps")
                    }
                }
            } else if let Some(query) = query {
                // Dashboard text search runs over the full list in memory.
                backend
                    .reports
                    .get_reports()
                    .await
                    .map(|reports| search_reports(&reports, query))
            } else {
                backend.reports.get_reports().await
            };

            match result {
                Ok(reports) => json_response(StatusCode::OK, serde_json::to_string(&reports)?),
                Err(err) => error_response(&err),
            }
        }
        (_, ["auth", ..]) | (_, ["session"]) | (_, ["employees"]) | (_, ["reports"]) => {
            method_not_allowed()
        }
        _ => {
            tracing::warn!("⚠️ No route matched - Method: {} Path: {}", method, path);
            not_found()
        }
    }
}

/// Decode the wire form of a submission into repository form data.
fn to_new_report(request: SubmitReportRequest) -> Result<NewReport, String> {
    let photo = match request.photo {
        Some(photo) => Some(UploadFile {
            bytes: general_purpose::STANDARD
                .decode(&photo.file_data)
                .map_err(|e| format!("Failed to decode photo: {}", e))?,
            file_name: photo.file_name,
            content_type: photo.content_type,
        }),
        None => None,
    };

    Ok(NewReport {
        user_name: request.user_name,
        purpose: request.purpose,
        time_out: request.time_out,
        time_in: request.time_in,
        vehicle: request.vehicle,
        photo,
        location: request.location,
        notes: request.notes,
    })
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &Body) -> Result<T, String> {
    let body_str = match body {
        Body::Text(text) => text.as_str(),
        Body::Binary(bytes) => std::str::from_utf8(bytes).unwrap_or(""),
        Body::Empty => "",
    };

    serde_json::from_str(body_str).map_err(|e| {
        tracing::error!("Failed to parse request body: {}", e);
        format!("Invalid request body: {}", e)
    })
}

fn json_response(status: StatusCode, body: String) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(body.into())
        .map_err(Box::new)?)
}

fn message_response(message: &str) -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::OK,
        serde_json::json!({"message": message}).to_string(),
    )
}

fn error_response(err: &DataError) -> Result<Response<Body>, Error> {
    tracing::error!("Request failed: {}", err);
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, serde_json::to_string(&ErrorResponse::from_error(err))?)
}

fn bad_request(message: &str) -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::BAD_REQUEST,
        serde_json::json!({"error": "InvalidRequest", "message": message}).to_string(),
    )
}

fn method_not_allowed() -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        serde_json::json!({"error": "Method not allowed"}).to_string(),
    )
}

fn not_found() -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::NOT_FOUND,
        serde_json::json!({"error": "Not found"}).to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldlog_shared::types::{Location, PhotoUpload, Vehicle};

    fn submit_request(file_data: &str) -> SubmitReportRequest {
        SubmitReportRequest {
            user_name: "John Doe".to_string(),
            purpose: "Client Meeting".to_string(),
            time_out: "2023-06-01T09:00".to_string(),
            time_in: "2023-06-01T12:30".to_string(),
            vehicle: Vehicle::PersonalCar,
            photo: Some(PhotoUpload {
                file_name: "site.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                file_data: file_data.to_string(),
            }),
            location: Some(Location {
                latitude: 37.7749,
                longitude: -122.4194,
                address: None,
            }),
            notes: String::new(),
        }
    }

    #[test]
    fn submission_decodes_base64_photo() {
        let encoded = general_purpose::STANDARD.encode([0xFF, 0xD8, 0xFF]);
        let report = to_new_report(submit_request(&encoded)).unwrap();
        let photo = report.photo.unwrap();
        assert_eq!(photo.bytes, vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(photo.file_name, "site.jpg");
    }

    #[test]
    fn submission_rejects_bad_base64() {
        assert!(to_new_report(submit_request("not base64!!!")).is_err());
    }

    #[test]
    fn submission_without_photo_is_allowed_through_decode() {
        let mut request = submit_request("");
        request.photo = None;
        let report = to_new_report(request).unwrap();
        assert!(report.photo.is_none());
        // validate() still rejects it before the repository sees it.
        assert!(report.validate().is_err());
    }

    #[test]
    fn dates_parse_as_rfc3339_only() {
        assert!(parse_date("2023-06-01T00:00:00Z").is_some());
        assert!(parse_date("2023-06-01T00:00:00+02:00").is_some());
        assert!(parse_date("2023-06-01").is_none());
        assert!(parse_date("yesterday").is_none());
    }
}
