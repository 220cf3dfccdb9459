use crate::billing::stripe_integration::StripeClient;
use crate::core::config::AppConfig;
use crate::core::shared::error::{AppError, AppResult};
use crate::core::shared::utils::{lazy_pool, DbPool};
use crate::drive::DriveClient;
use crate::email::Mailer;
use crate::qbo::client::QboClient;
use crate::security::csrf::CsrfManager;
use diesel::PgConnection;

#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub drive: Option<DriveClient>,
    pub mailer: Option<Mailer>,
    pub qbo: Option<QboClient>,
    pub stripe: Option<StripeClient>,
    pub csrf: CsrfManager,
}

impl AppState {
    pub fn new(config: AppConfig, conn: DbPool) -> Self {
        let csrf = CsrfManager::new(config.session.secret.clone());
        let qbo = config.qbo.clone().map(QboClient::new);
        let stripe = config.stripe.as_ref().map(StripeClient::from_config);
        let mailer = config.email.as_ref().and_then(|email| match Mailer::new(email) {
            Ok(mailer) => Some(mailer),
            Err(e) => {
                log::warn!("SMTP disabled: {}", e);
                None
            }
        });

        Self {
            conn,
            config,
            drive: None,
            mailer,
            qbo,
            stripe,
            csrf,
        }
    }

    /// State backed by a pool that connects on first use, so routers can be
    /// exercised without a reachable database.
    pub fn lazy(config: AppConfig) -> Self {
        let pool = lazy_pool(&config.database.url);
        Self::new(config, pool)
    }

    pub fn with_drive(mut self, drive: DriveClient) -> Self {
        self.drive = Some(drive);
        self
    }

    pub fn with_qbo(mut self, qbo: QboClient) -> Self {
        self.qbo = Some(qbo);
        self
    }

    pub fn with_stripe(mut self, stripe: StripeClient) -> Self {
        self.stripe = Some(stripe);
        self
    }

    /// Runs blocking diesel work on the blocking pool with a pooled connection.
    pub async fn run<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }

    pub fn drive(&self) -> AppResult<&DriveClient> {
        self.drive.as_ref().ok_or(AppError::NotConfigured("File storage"))
    }

    pub fn mailer(&self) -> AppResult<&Mailer> {
        self.mailer.as_ref().ok_or(AppError::NotConfigured("Email"))
    }

    pub fn qbo(&self) -> AppResult<&QboClient> {
        self.qbo.as_ref().ok_or(AppError::NotConfigured("QuickBooks"))
    }

    pub fn stripe(&self) -> AppResult<&StripeClient> {
        self.stripe.as_ref().ok_or(AppError::NotConfigured("Stripe"))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("conn", &"DbPool")
            .field("config", &self.config)
            .field("drive", &self.drive.is_some())
            .field("mailer", &self.mailer.is_some())
            .field("qbo", &self.qbo.is_some())
            .field("stripe", &self.stripe.is_some())
            .finish_non_exhaustive()
    }
}
