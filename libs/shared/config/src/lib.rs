use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub mail_api_url: String,
    pub mail_api_token: String,
    pub mail_from: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            mail_api_url: env::var("MAIL_API_URL")
                .unwrap_or_else(|_| {
                    warn!("MAIL_API_URL not set, using empty value");
                    String::new()
                }),
            mail_api_token: env::var("MAIL_API_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("MAIL_API_TOKEN not set, using empty value");
                    String::new()
                }),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "noreply@medbook.example".to_string()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_mail_configured(&self) -> bool {
        !self.mail_api_url.is_empty() && !self.mail_api_token.is_empty()
    }
}
