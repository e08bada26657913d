use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::DataError;
use crate::provider::{employee_email, AuthStateReceiver, IdentityResolver};
use crate::types::{Principal, Role, UserAccount};

fn hash_password(password: &str) -> Result<String, DataError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DataError::transport(format!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn map_unique(err: sqlx::Error, message: &str) -> DataError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => DataError::conflict(message),
        _ => err.into(),
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    employee_id: Option<String>,
    name: String,
    email: String,
    role: String,
}

fn row_to_account(row: UserRow) -> UserAccount {
    UserAccount {
        account_id: row.id.to_string(),
        employee_id: row.employee_id.unwrap_or_default(),
        name: row.name,
        email: row.email,
        role: Role::parse_or_user(Some(row.role.as_str())),
    }
}

/// Relational-variant identity resolver: credentials live in `accounts`
/// (argon2 hashes), profiles in `users`. Provisioning writes both rows in
/// one transaction.
pub struct PostgresIdentity {
    pool: PgPool,
    auth_state: watch::Sender<Option<Principal>>,
}

impl PostgresIdentity {
    pub fn new(pool: PgPool) -> Self {
        let (auth_state, _) = watch::channel(None);
        Self { pool, auth_state }
    }
}

#[async_trait]
impl IdentityResolver for PostgresIdentity {
    async fn employee_login(&self, employee_id: &str, password: &str) -> Result<(), DataError> {
        let email = sqlx::query_scalar::<_, String>(
            "SELECT email FROM users WHERE employee_id = $1",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(email) = email else {
            return Err(DataError::not_found("Employee ID not found"));
        };
        if email.is_empty() {
            return Err(DataError::conflict(
                "Employee account is not properly configured",
            ));
        }

        self.login(&email, password).await
    }

    async fn create_employee(
        &self,
        employee_id: &str,
        name: &str,
        password: &str,
        role: Role,
    ) -> Result<(), DataError> {
        // Read-then-write check, same shape in both variants. The UNIQUE
        // constraint on employee_id closes the race here.
        let existing =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE employee_id = $1")
                .bind(employee_id)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return Err(DataError::conflict("Employee ID already exists"));
        }

        let email = employee_email(employee_id);
        let password_hash = hash_password(password)?;

        // Credential and profile commit together; a failure leaves neither.
        let mut tx = self.pool.begin().await?;

        let account_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO accounts (email, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(&email)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "An account with this email already exists"))?;

        sqlx::query(
            "INSERT INTO users (id, employee_id, name, email, role) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(account_id)
        .bind(employee_id)
        .bind(name)
        .bind(&email)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "Employee ID already exists"))?;

        tx.commit().await?;

        tracing::info!("Employee account created for {}", employee_id);
        Ok(())
    }

    async fn login(&self, email: &str, password: &str) -> Result<(), DataError> {
        let account = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, password_hash FROM accounts WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        // Unknown email and wrong password are indistinguishable on purpose.
        let Some(account) = account else {
            return Err(DataError::unauthorized("Incorrect email or password"));
        };
        if !verify_password(password, &account.password_hash) {
            return Err(DataError::unauthorized("Incorrect email or password"));
        }

        self.auth_state.send_replace(Some(Principal {
            account_id: account.id.to_string(),
            email: account.email,
        }));

        tracing::info!("Authentication successful for {}", email);
        Ok(())
    }

    async fn signup(&self, email: &str, password: &str) -> Result<(), DataError> {
        let password_hash = hash_password(password)?;

        let mut tx = self.pool.begin().await?;

        let account_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO accounts (email, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(email)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "An account with this email already exists"))?;

        // Default-role profile row; role falls back to 'user' in the DDL.
        sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
            .bind(account_id)
            .bind(email)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn logout(&self) -> Result<(), DataError> {
        // No remote session to invalidate; the published state is the session.
        self.auth_state.send_replace(None);
        Ok(())
    }

    async fn account_by_id(&self, account_id: &str) -> Result<Option<UserAccount>, DataError> {
        let Ok(id) = Uuid::parse_str(account_id) else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, employee_id, name, email, role FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_account))
    }

    fn subscribe(&self) -> AuthStateReceiver {
        self.auth_state.subscribe()
    }
}
