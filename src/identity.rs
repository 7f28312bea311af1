// Identity provider adapter
// Sign-in/registration/sign-out against an external provider, plus the session state the app reads

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl User {
    // Name shown in the dashboard greeting
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("User")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Apple,
}

impl OAuthProvider {
    pub fn provider_id(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google.com",
            OAuthProvider::Apple => "apple.com",
        }
    }
}

// Provider failure, identified by the provider's error code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Auth error: {code}")]
pub struct AuthError {
    pub code: String,
}

impl AuthError {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
        }
    }

    // Localized message for the auth form
    pub fn message(&self) -> &'static str {
        match self.code.as_str() {
            "auth/user-not-found" => "Akun tidak ditemukan. Silakan daftar terlebih dahulu.",
            "auth/wrong-password" => "Password salah. Silakan coba lagi.",
            "auth/email-already-in-use" => "Email sudah digunakan. Silakan gunakan email lain.",
            "auth/weak-password" => "Password terlalu lemah. Gunakan minimal 6 karakter.",
            "auth/invalid-email" => "Format email tidak valid.",
            "auth/network-request-failed" => "Koneksi internet bermasalah. Silakan coba lagi.",
            "auth/popup-closed-by-user" | "auth/cancelled-popup-request" => "Login dibatalkan.",
            _ => "Terjadi kesalahan. Silakan coba lagi.",
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    // Current-user-changed notifications; dropping the receiver unsubscribes
    fn subscribe(&self) -> watch::Receiver<Option<User>>;

    fn current_user(&self) -> Option<User>;

    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<User, AuthError>;

    async fn register_with_email(&self, email: &str, password: &str) -> Result<User, AuthError>;

    async fn update_display_name(&self, display_name: &str) -> Result<User, AuthError>;

    async fn sign_in_with_popup(&self, provider: OAuthProvider) -> Result<User, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

// Auth state held by the app: the signed-in user, a busy flag and the last
// localized error. Every operation clears the previous error first and
// records the new one on failure before returning it.
pub struct AuthSession<P: IdentityProvider> {
    provider: Arc<P>,
    loading: Mutex<bool>,
    error: Mutex<Option<String>>,
}

impl<P: IdentityProvider> AuthSession<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            loading: Mutex::new(false),
            error: Mutex::new(None),
        }
    }

    pub fn user(&self) -> Option<User> {
        self.provider.current_user()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.provider.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.lock()
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.error.lock() = None;
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.begin();
        let result = self.provider.sign_in_with_email(email, password).await;
        self.finish(result)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, AuthError> {
        self.begin();
        let result = match self.provider.register_with_email(email, password).await {
            Ok(_) => self.provider.update_display_name(display_name).await,
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    pub async fn login_with_google(&self) -> Result<User, AuthError> {
        self.begin();
        let result = self.provider.sign_in_with_popup(OAuthProvider::Google).await;
        self.finish(result)
    }

    pub async fn login_with_apple(&self) -> Result<User, AuthError> {
        self.begin();
        let result = self.provider.sign_in_with_popup(OAuthProvider::Apple).await;
        self.finish(result)
    }

    // Sign-out never toggles the busy flag
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.clear_error();
        self.provider.sign_out().await.map_err(|e| self.record(e))
    }

    fn begin(&self) {
        self.clear_error();
        *self.loading.lock() = true;
    }

    fn finish<T>(&self, result: Result<T, AuthError>) -> Result<T, AuthError> {
        *self.loading.lock() = false;
        result.map_err(|e| self.record(e))
    }

    fn record(&self, err: AuthError) -> AuthError {
        warn!(code = %err.code, "authentication failed");
        *self.error.lock() = Some(err.message().to_string());
        err
    }
}

struct Account {
    uid: String,
    password: String,
    display_name: Option<String>,
}

// In-process identity provider backed by a map of email accounts.
// OAuth popups succeed with a provider-scoped account unless the next popup
// has been set to close via `close_next_popup`.
pub struct InMemoryIdentityProvider {
    accounts: DashMap<String, Account>,
    current: watch::Sender<Option<User>>,
    close_next_popup: Mutex<bool>,
    offline: Mutex<bool>,
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: DashMap::new(),
            current,
            close_next_popup: Mutex::new(false),
            offline: Mutex::new(false),
        }
    }

    pub fn close_next_popup(&self) {
        *self.close_next_popup.lock() = true;
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    fn check_network(&self) -> Result<(), AuthError> {
        if *self.offline.lock() {
            return Err(AuthError::new("auth/network-request-failed"));
        }
        Ok(())
    }

    fn set_current(&self, user: Option<User>) {
        self.current.send_replace(user);
    }

    fn is_valid_email(email: &str) -> bool {
        match email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.'),
            None => false,
        }
    }

    fn user_for(email: &str, account: &Account) -> User {
        User {
            uid: account.uid.clone(),
            email: Some(email.to_string()),
            display_name: account.display_name.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }

    fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.check_network()?;
        if !Self::is_valid_email(email) {
            return Err(AuthError::new("auth/invalid-email"));
        }
        let account = self
            .accounts
            .get(email)
            .ok_or_else(|| AuthError::new("auth/user-not-found"))?;
        if account.password != password {
            return Err(AuthError::new("auth/wrong-password"));
        }
        let user = Self::user_for(email, &account);
        drop(account);
        info!(uid = %user.uid, "signed in with email");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn register_with_email(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.check_network()?;
        if !Self::is_valid_email(email) {
            return Err(AuthError::new("auth/invalid-email"));
        }
        if password.chars().count() < 6 {
            return Err(AuthError::new("auth/weak-password"));
        }
        if self.accounts.contains_key(email) {
            return Err(AuthError::new("auth/email-already-in-use"));
        }
        let account = Account {
            uid: format!("uid-{}", rand::random::<u64>()),
            password: password.to_string(),
            display_name: None,
        };
        let user = Self::user_for(email, &account);
        self.accounts.insert(email.to_string(), account);
        info!(uid = %user.uid, "registered account");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn update_display_name(&self, display_name: &str) -> Result<User, AuthError> {
        self.check_network()?;
        let mut user = self
            .current_user()
            .ok_or_else(|| AuthError::new("auth/no-current-user"))?;
        if let Some(email) = user.email.as_deref() {
            if let Some(mut account) = self.accounts.get_mut(email) {
                account.display_name = Some(display_name.to_string());
            }
        }
        user.display_name = Some(display_name.to_string());
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in_with_popup(&self, provider: OAuthProvider) -> Result<User, AuthError> {
        self.check_network()?;
        {
            let mut close = self.close_next_popup.lock();
            if *close {
                *close = false;
                return Err(AuthError::new("auth/popup-closed-by-user"));
            }
        }
        let user = User {
            uid: format!("{}:{}", provider.provider_id(), rand::random::<u32>()),
            email: None,
            display_name: None,
        };
        info!(uid = %user.uid, provider = provider.provider_id(), "signed in with popup");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.check_network()?;
        self.set_current(None);
        Ok(())
    }
}
