use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::{watch, Mutex};

use crate::config::DynamoConfig;
use crate::error::DataError;
use crate::provider::{employee_email, AuthStateReceiver, IdentityResolver};
use crate::types::{Principal, Role, UserAccount};

type HmacSha256 = Hmac<Sha256>;

/// Compute the SECRET_HASH for Cognito authentication
fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> String {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Map a Cognito error debug string to the layer taxonomy with a
/// user-facing message.
fn classify_cognito_error(error_message: &str) -> DataError {
    if error_message.contains("NotAuthorizedException") {
        DataError::unauthorized("Incorrect email or password")
    } else if error_message.contains("UserNotFoundException") {
        DataError::not_found("No account found with this email")
    } else if error_message.contains("UserNotConfirmedException") {
        DataError::unauthorized("Please verify your email before logging in")
    } else if error_message.contains("UsernameExistsException") {
        DataError::conflict("An account with this email already exists")
    } else if error_message.contains("InvalidPasswordException") {
        DataError::transport(
            "Password must contain at least 8 characters with uppercase, lowercase, number, and special character",
        )
    } else if error_message.contains("TooManyRequestsException") {
        DataError::transport("Too many attempts. Please try again later")
    } else {
        DataError::transport(error_message.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
}

/// Extract the principal from an id token's claim segment. The token was
/// just issued over TLS by the same endpoint, so the signature is not
/// re-verified here.
fn principal_from_id_token(id_token: &str, fallback_email: &str) -> Result<Principal, DataError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| DataError::transport("Malformed id token"))?;
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| DataError::transport(format!("Failed to decode id token: {}", e)))?;
    let claims: IdTokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| DataError::transport(format!("Failed to parse id token claims: {}", e)))?;
    Ok(Principal {
        account_id: claims.sub,
        email: claims.email.unwrap_or_else(|| fallback_email.to_string()),
    })
}

/// Document-variant identity resolver: Cognito for credentials, DynamoDB for
/// profile records. Profile rows live at PK=USER#<account-id>/SK=PROFILE;
/// employee-ID lookups go through PK=EMPLOYEE#<employee-id>/SK=METADATA.
pub struct CognitoIdentity {
    cognito: CognitoClient,
    dynamo: DynamoClient,
    table_name: String,
    client_id: String,
    client_secret: String,
    user_pool_id: String,
    // Access token of the active session, needed for provider sign-out.
    access_token: Mutex<Option<String>>,
    auth_state: watch::Sender<Option<Principal>>,
}

impl CognitoIdentity {
    pub fn new(aws_config: &aws_config::SdkConfig, config: &DynamoConfig) -> Self {
        let (auth_state, _) = watch::channel(None);
        Self {
            cognito: CognitoClient::new(aws_config),
            dynamo: DynamoClient::new(aws_config),
            table_name: config.table_name.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            user_pool_id: config.user_pool_id.clone(),
            access_token: Mutex::new(None),
            auth_state,
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<(), DataError> {
        let secret_hash = compute_secret_hash(email, &self.client_id, &self.client_secret);

        let result = self
            .cognito
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", &secret_hash)
            .send()
            .await
            .map_err(|e| {
                let message = format!("{:?}", e);
                tracing::error!("Cognito authentication error: {}", message);
                classify_cognito_error(&message)
            })?;

        let auth = result
            .authentication_result()
            .ok_or_else(|| DataError::unauthorized("No authentication result returned"))?;

        let principal = principal_from_id_token(auth.id_token().unwrap_or_default(), email)?;
        *self.access_token.lock().await = Some(auth.access_token().unwrap_or_default().to_string());
        self.auth_state.send_replace(Some(principal));

        tracing::info!("Authentication successful for {}", email);
        Ok(())
    }

    async fn create_auth_account(&self, email: &str, password: &str) -> Result<String, DataError> {
        let secret_hash = compute_secret_hash(email, &self.client_id, &self.client_secret);

        let attribute = AttributeType::builder()
            .name("email")
            .value(email)
            .build()
            .map_err(|e| DataError::transport(format!("{:?}", e)))?;

        let signup = self
            .cognito
            .sign_up()
            .client_id(&self.client_id)
            .username(email)
            .password(password)
            .secret_hash(&secret_hash)
            .user_attributes(attribute)
            .send()
            .await
            .map_err(|e| {
                let message = format!("{:?}", e);
                tracing::error!("Cognito signup error: {}", message);
                classify_cognito_error(&message)
            })?;

        // These accounts have no reachable inbox, so confirm them directly.
        if let Err(e) = self
            .cognito
            .admin_confirm_sign_up()
            .user_pool_id(&self.user_pool_id)
            .username(email)
            .send()
            .await
        {
            tracing::error!("Failed to auto-confirm {}: {:?}", email, e);
        }

        Ok(signup.user_sub().to_string())
    }

    async fn write_profile(
        &self,
        account_id: &str,
        employee_id: &str,
        name: &str,
        email: &str,
        role: Role,
    ) -> Result<(), DataError> {
        self.dynamo
            .put_item()
            .table_name(&self.table_name)
            .item("PK", AttributeValue::S(format!("USER#{}", account_id)))
            .item("SK", AttributeValue::S("PROFILE".to_string()))
            .item("employeeId", AttributeValue::S(employee_id.to_string()))
            .item("name", AttributeValue::S(name.to_string()))
            .item("email", AttributeValue::S(email.to_string()))
            .item("role", AttributeValue::S(role.as_str().to_string()))
            .item(
                "createdAt",
                AttributeValue::S(chrono::Utc::now().to_rfc3339()),
            )
            .send()
            .await
            .map_err(|e| DataError::transport(format!("Failed to write profile: {:?}", e)))?;

        if !employee_id.is_empty() {
            self.dynamo
                .put_item()
                .table_name(&self.table_name)
                .item("PK", AttributeValue::S(format!("EMPLOYEE#{}", employee_id)))
                .item("SK", AttributeValue::S("METADATA".to_string()))
                .item("accountId", AttributeValue::S(account_id.to_string()))
                .item("email", AttributeValue::S(email.to_string()))
                .send()
                .await
                .map_err(|e| {
                    DataError::transport(format!("Failed to write employee lookup: {:?}", e))
                })?;
        }

        Ok(())
    }

    /// Best-effort compensation when a profile write fails after the auth
    /// account already exists. Failures are logged; an orphaned credential
    /// then survives until cleaned up manually.
    async fn remove_orphaned_account(&self, account_id: &str, email: &str) {
        if let Err(e) = self
            .cognito
            .admin_delete_user()
            .user_pool_id(&self.user_pool_id)
            .username(email)
            .send()
            .await
        {
            tracing::error!("Cleanup of orphaned auth account {} failed: {:?}", email, e);
        }
        if let Err(e) = self
            .dynamo
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(format!("USER#{}", account_id)))
            .key("SK", AttributeValue::S("PROFILE".to_string()))
            .send()
            .await
        {
            tracing::error!("Cleanup of orphaned profile {} failed: {:?}", account_id, e);
        }
    }

    async fn employee_lookup(
        &self,
        employee_id: &str,
    ) -> Result<Option<(String, String)>, DataError> {
        let result = self
            .dynamo
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(format!("EMPLOYEE#{}", employee_id)))
            .key("SK", AttributeValue::S("METADATA".to_string()))
            .send()
            .await
            .map_err(|e| DataError::transport(format!("Failed to look up employee: {:?}", e)))?;

        Ok(result.item().map(|item| {
            let account_id = item
                .get("accountId")
                .and_then(|v| v.as_s().ok())
                .cloned()
                .unwrap_or_default();
            let email = item
                .get("email")
                .and_then(|v| v.as_s().ok())
                .cloned()
                .unwrap_or_default();
            (account_id, email)
        }))
    }
}

#[async_trait]
impl IdentityResolver for CognitoIdentity {
    async fn employee_login(&self, employee_id: &str, password: &str) -> Result<(), DataError> {
        let Some((_, email)) = self.employee_lookup(employee_id).await? else {
            return Err(DataError::not_found("Employee ID not found"));
        };
        if email.is_empty() {
            return Err(DataError::conflict(
                "Employee account is not properly configured",
            ));
        }
        self.sign_in(&email, password).await
    }

    async fn create_employee(
        &self,
        employee_id: &str,
        name: &str,
        password: &str,
        role: Role,
    ) -> Result<(), DataError> {
        // Read-then-write duplicate check; the document store offers no
        // constraint to back this up, so a concurrent create can still race.
        if self.employee_lookup(employee_id).await?.is_some() {
            return Err(DataError::conflict("Employee ID already exists"));
        }

        let email = employee_email(employee_id);
        let account_id = self.create_auth_account(&email, password).await?;

        if let Err(err) = self
            .write_profile(&account_id, employee_id, name, &email, role)
            .await
        {
            tracing::error!(
                "Profile write for employee {} failed after auth account creation: {}",
                employee_id,
                err
            );
            self.remove_orphaned_account(&account_id, &email).await;
            return Err(err);
        }

        tracing::info!("Employee account created for {}", employee_id);
        Ok(())
    }

    async fn login(&self, email: &str, password: &str) -> Result<(), DataError> {
        self.sign_in(email, password).await
    }

    async fn signup(&self, email: &str, password: &str) -> Result<(), DataError> {
        let account_id = self.create_auth_account(email, password).await?;

        if let Err(err) = self
            .write_profile(&account_id, "", "", email, Role::User)
            .await
        {
            tracing::error!("Profile write for {} failed after signup: {}", email, err);
            self.remove_orphaned_account(&account_id, email).await;
            return Err(err);
        }
        Ok(())
    }

    async fn logout(&self) -> Result<(), DataError> {
        let token = self.access_token.lock().await.take();
        if let Some(token) = token {
            if let Err(e) = self.cognito.global_sign_out().access_token(&token).send().await {
                // Keep the session so a retry can still sign out.
                *self.access_token.lock().await = Some(token);
                return Err(DataError::transport(format!("Failed to sign out: {:?}", e)));
            }
        }
        self.auth_state.send_replace(None);
        Ok(())
    }

    async fn account_by_id(&self, account_id: &str) -> Result<Option<UserAccount>, DataError> {
        let result = self
            .dynamo
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(format!("USER#{}", account_id)))
            .key("SK", AttributeValue::S("PROFILE".to_string()))
            .send()
            .await
            .map_err(|e| DataError::transport(format!("Failed to fetch profile: {:?}", e)))?;

        let Some(item) = result.item() else {
            return Ok(None);
        };

        Ok(Some(UserAccount {
            account_id: account_id.to_string(),
            employee_id: item
                .get("employeeId")
                .and_then(|v| v.as_s().ok())
                .cloned()
                .unwrap_or_default(),
            name: item
                .get("name")
                .and_then(|v| v.as_s().ok())
                .cloned()
                .unwrap_or_default(),
            email: item
                .get("email")
                .and_then(|v| v.as_s().ok())
                .cloned()
                .unwrap_or_default(),
            role: Role::parse_or_user(item.get("role").and_then(|v| v.as_s().ok()).map(|s| s.as_str())),
        }))
    }

    fn subscribe(&self) -> AuthStateReceiver {
        self.auth_state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hash_is_stable() {
        let a = compute_secret_hash("emp001@fieldlog.local", "client", "secret");
        let b = compute_secret_hash("emp001@fieldlog.local", "client", "secret");
        assert_eq!(a, b);
        assert_ne!(a, compute_secret_hash("other@fieldlog.local", "client", "secret"));
    }

    #[test]
    fn cognito_errors_map_to_taxonomy() {
        assert!(matches!(
            classify_cognito_error("ServiceError(NotAuthorizedException { .. })"),
            DataError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_cognito_error("ServiceError(UserNotFoundException { .. })"),
            DataError::NotFound(_)
        ));
        assert!(matches!(
            classify_cognito_error("ServiceError(UsernameExistsException { .. })"),
            DataError::Conflict(_)
        ));
        assert!(matches!(
            classify_cognito_error("DispatchFailure(connection refused)"),
            DataError::Transport(_)
        ));
    }

    #[test]
    fn id_token_claims_resolve_to_principal() {
        let payload = general_purpose::URL_SAFE_NO_PAD
            .encode(br#"{"sub":"acct-123","email":"emp001@fieldlog.local"}"#);
        let token = format!("eyJhbGciOiJub25lIn0.{}.sig", payload);

        let principal = principal_from_id_token(&token, "fallback@fieldlog.local").unwrap();
        assert_eq!(principal.account_id, "acct-123");
        assert_eq!(principal.email, "emp001@fieldlog.local");
    }

    #[test]
    fn id_token_without_email_claim_uses_login_email() {
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"sub":"acct-123"}"#);
        let token = format!("header.{}.sig", payload);

        let principal = principal_from_id_token(&token, "emp001@fieldlog.local").unwrap();
        assert_eq!(principal.email, "emp001@fieldlog.local");
    }

    #[test]
    fn malformed_id_token_is_rejected() {
        assert!(principal_from_id_token("not-a-jwt", "x@y").is_err());
        assert!(principal_from_id_token("a.%%%.c", "x@y").is_err());
    }
}
