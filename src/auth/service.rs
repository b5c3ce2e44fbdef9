use std::{future::Future, sync::Arc, time::Duration};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest},
        jwt::JwtKeys,
        password::{hash_password_blocking, verify_password_blocking},
        repo::UserStore,
        repo_types::{NewUser, User, UserPatch},
    },
    db::{bounded, StoreError},
    error::{AppError, INVALID_CREDENTIALS, INVALID_TOKEN, MISSING_TOKEN},
    users::dto::UpdateProfileRequest,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Well-formed argon2id digest that matches no password. Unknown emails are
/// verified against it so they cost the same as a wrong password.
const UNKNOWN_USER_DIGEST: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Runs a full argon2 verify whether or not the account exists.
async fn check_password(user: Option<&User>, password: String) -> Result<bool, AppError> {
    let digest = user.map_or(UNKNOWN_USER_DIGEST, |u| u.password_hash.as_str());
    verify_password_blocking(password, digest.to_string()).await
}

/// Registration, login and per-request authentication.
///
/// Holds no mutable state: the store handle and keys are shared read-only
/// across all requests.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
    store_timeout: Duration,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, keys: JwtKeys, store_timeout: Duration) -> Self {
        Self {
            users,
            keys,
            store_timeout,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    async fn store<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        Ok(bounded(self.store_timeout, fut).await?)
    }

    #[instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> Result<User, AppError> {
        let email = normalize_email(&req.email);
        if email.is_empty() || req.password.is_empty() {
            return Err(AppError::Validation("email and password are required".into()));
        }
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AppError::Validation("invalid email".into()));
        }

        if self.store(self.users.find_by_email(&email)).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AppError::Conflict("email already registered".into()));
        }

        let password_hash = hash_password_blocking(req.password).await?;
        let user = self
            .store(self.users.create(NewUser {
                username: req.username.trim().to_string(),
                email,
                password_hash,
            }))
            .await?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Returns a signed token. Unknown email and wrong password are
    /// indistinguishable to the caller.
    #[instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> Result<String, AppError> {
        let email = normalize_email(&req.email);
        if email.is_empty() || req.password.is_empty() {
            return Err(AppError::Validation("email and password are required".into()));
        }

        let user = self.store(self.users.find_by_email(&email)).await?;
        let matched = check_password(user.as_ref(), req.password).await?;
        let user = match user {
            Some(user) if matched => user,
            Some(user) => {
                warn!(user_id = %user.id, "login invalid password");
                return Err(AppError::Auth(INVALID_CREDENTIALS));
            }
            None => {
                warn!("login unknown email");
                return Err(AppError::Auth(INVALID_CREDENTIALS));
            }
        };

        let token = self.keys.sign(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }

    /// Resolves a presented token to a live user id.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Uuid, AppError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Auth(MISSING_TOKEN))?;
        let claims = self.keys.verify(token)?;

        match self.store(self.users.find_by_id(claims.sub)).await? {
            Some(user) => Ok(user.id),
            None => {
                warn!(user_id = %claims.sub, "token subject no longer exists");
                Err(AppError::Auth(INVALID_TOKEN))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.store(self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".into()))
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<User, AppError> {
        let mut patch = UserPatch {
            username: req.username.map(|u| u.trim().to_string()),
            ..UserPatch::default()
        };

        if let Some(email) = req.email {
            let email = normalize_email(&email);
            if !is_valid_email(&email) {
                return Err(AppError::Validation("invalid email".into()));
            }
            patch.email = Some(email);
        }

        if let Some(password) = req.password {
            if password.is_empty() {
                return Err(AppError::Validation("password must not be empty".into()));
            }
            patch.password_hash = Some(hash_password_blocking(password).await?);
        }

        let user = self
            .store(self.users.update(user_id, patch))
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".into()))?;
        info!(user_id = %user.id, "profile updated");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{
            password::{hash_password, verify_password},
            repo::memory::MemoryUserStore,
        },
        config::JwtConfig,
    };

    fn service() -> (AuthService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::default());
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "test-secret".into(),
            ttl_hours: 72,
        });
        let svc = AuthService::new(store.clone(), keys, Duration::from_secs(5));
        (svc, store)
    }

    fn register_req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: "reader".into(),
            email: email.into(),
            password: password.into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a b@c.com"));
    }

    #[tokio::test]
    async fn register_then_login_yields_token_for_user() {
        let (svc, _) = service();
        let user = svc.register(register_req("Ana@Example.com ", "s3cret")).await.unwrap();
        assert_eq!(user.email, "ana@example.com");
        assert_ne!(user.password_hash, "s3cret");

        let token = svc.login(login_req("ana@example.com", "s3cret")).await.unwrap();
        let claims = svc.keys().verify(&token).unwrap();
        assert_eq!(claims.sub, user.id);

        assert_eq!(svc.authenticate(Some(&token)).await.unwrap(), user.id);
    }

    #[tokio::test]
    async fn login_failures_are_uniform() {
        let (svc, _) = service();
        svc.register(register_req("ana@example.com", "s3cret")).await.unwrap();

        let wrong_password = svc.login(login_req("ana@example.com", "nope")).await.unwrap_err();
        let unknown_email = svc.login(login_req("bob@example.com", "s3cret")).await.unwrap_err();

        assert_eq!(wrong_password.status_code(), unknown_email.status_code());
        assert_eq!(wrong_password.public_message(), unknown_email.public_message());
        assert_eq!(wrong_password.public_message(), INVALID_CREDENTIALS);
    }

    #[test]
    fn unknown_user_digest_parses_and_matches_nothing() {
        for pw in ["", "s3cret", "password"] {
            assert!(!verify_password(pw, UNKNOWN_USER_DIGEST).unwrap());
        }
    }

    #[tokio::test]
    async fn unknown_email_still_pays_for_a_verify() {
        let ana = User {
            id: Uuid::new_v4(),
            username: "ana".into(),
            email: "ana@example.com".into(),
            password_hash: hash_password("s3cret").unwrap(),
            created_at: time::OffsetDateTime::now_utc(),
        };
        assert!(check_password(Some(&ana), "s3cret".into()).await.unwrap());
        assert!(!check_password(Some(&ana), "nope".into()).await.unwrap());

        // Goes through argon2 on the placeholder digest rather than bailing out.
        assert!(!check_password(None, "s3cret".into()).await.unwrap());
        assert!(matches!(check_password(None, String::new()).await, Ok(false)));
    }

    #[tokio::test]
    async fn register_rejects_empty_fields_before_store() {
        let (svc, store) = service();
        for (email, password) in [("", "pw"), ("a@b.co", ""), ("   ", "pw")] {
            let err = svc.register(register_req(email, password)).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_and_keeps_first_record() {
        let (svc, _) = service();
        let first = svc.register(register_req("ana@example.com", "first")).await.unwrap();

        let err = svc.register(register_req("ANA@example.com", "second")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let token = svc.login(login_req("ana@example.com", "first")).await.unwrap();
        assert_eq!(svc.keys().verify(&token).unwrap().sub, first.id);
        assert!(svc.login(login_req("ana@example.com", "second")).await.is_err());
    }

    #[tokio::test]
    async fn store_conflict_race_maps_to_conflict() {
        let (svc, store) = service();
        store
            .create(NewUser {
                username: "x".into(),
                email: "race@example.com".into(),
                password_hash: "h".into(),
            })
            .await
            .unwrap();
        let err = svc
            .store(store.create(NewUser {
                username: "y".into(),
                email: "race@example.com".into(),
                password_hash: "h".into(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn same_password_is_salted_per_user() {
        let (svc, _) = service();
        let a = svc.register(register_req("a@example.com", "shared")).await.unwrap();
        let b = svc.register(register_req("b@example.com", "shared")).await.unwrap();
        assert_ne!(a.password_hash, b.password_hash);
        assert!(svc.login(login_req("a@example.com", "shared")).await.is_ok());
        assert!(svc.login(login_req("b@example.com", "shared")).await.is_ok());
    }

    #[tokio::test]
    async fn authenticate_rejects_missing_and_bad_tokens() {
        let (svc, _) = service();
        let err = svc.authenticate(None).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(MISSING_TOKEN)));

        let err = svc.authenticate(Some("garbage")).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(INVALID_TOKEN)));
    }

    #[tokio::test]
    async fn authenticate_rejects_deleted_subject() {
        let (svc, store) = service();
        let user = svc.register(register_req("gone@example.com", "pw")).await.unwrap();
        let token = svc.login(login_req("gone@example.com", "pw")).await.unwrap();
        store.remove(user.id).await;

        let err = svc.authenticate(Some(&token)).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(INVALID_TOKEN)));
    }

    #[tokio::test]
    async fn update_profile_rehashes_password_and_checks_email() {
        let (svc, _) = service();
        let ana = svc.register(register_req("ana@example.com", "old")).await.unwrap();
        svc.register(register_req("bob@example.com", "pw")).await.unwrap();

        let updated = svc
            .update_profile(
                ana.id,
                UpdateProfileRequest {
                    username: Some(" Ana ".into()),
                    email: None,
                    password: Some("new".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username, "Ana");
        assert!(svc.login(login_req("ana@example.com", "new")).await.is_ok());
        assert!(svc.login(login_req("ana@example.com", "old")).await.is_err());

        let err = svc
            .update_profile(
                ana.id,
                UpdateProfileRequest {
                    username: None,
                    email: Some("bob@example.com".into()),
                    password: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
