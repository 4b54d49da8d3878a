// libs/notification-cell/src/dispatcher.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use shared_config::AppConfig;

use crate::models::{BookingEmail, CancellationEmail};

/// Best-effort email delivery. Callers may await the result only to log it;
/// a failed dispatch never affects the booking or cancellation it follows.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_booked(&self, email: &BookingEmail) -> Result<()>;
    async fn notify_cancelled(&self, email: &CancellationEmail) -> Result<()>;
}

/// HTTP client for the transactional mail relay.
pub struct MailerClient {
    client: Client,
    base_url: String,
    api_token: String,
    from: String,
}

impl MailerClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.mail_api_url.clone(),
            api_token: config.mail_api_token.clone(),
            from: config.mail_from.clone(),
        }
    }

    async fn send(&self, to: &str, subject: &str, html: String) -> Result<()> {
        let url = format!("{}/send", self.base_url);
        debug!("Dispatching mail to {} via {}", to, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Mail relay error ({}): {}", status, error_text));
        }

        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for MailerClient {
    async fn notify_booked(&self, email: &BookingEmail) -> Result<()> {
        let subject = format!(
            "Appointment Confirmed - {} with {}",
            email.appointment_type, email.doctor_name
        );
        self.send(&email.to, &subject, booking_html(email)).await
    }

    async fn notify_cancelled(&self, email: &CancellationEmail) -> Result<()> {
        let subject = format!(
            "Appointment Cancelled - {} at {}",
            email.appointment_date, email.appointment_time
        );
        self.send(&email.to, &subject, cancellation_html(email)).await
    }
}

fn booking_html(email: &BookingEmail) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #2563eb;">Appointment Confirmed</h2>
  <p>Dear {patient},</p>
  <p>Your appointment has been successfully booked. Here are the details:</p>
  <table style="border-collapse: collapse; width: 100%; margin: 20px 0;">
    <tr><td style="padding: 8px; border: 1px solid #ddd;"><strong>Doctor</strong></td><td style="padding: 8px; border: 1px solid #ddd;">{doctor}</td></tr>
    <tr><td style="padding: 8px; border: 1px solid #ddd;"><strong>Type</strong></td><td style="padding: 8px; border: 1px solid #ddd;">{kind}</td></tr>
    <tr><td style="padding: 8px; border: 1px solid #ddd;"><strong>Date</strong></td><td style="padding: 8px; border: 1px solid #ddd;">{date}</td></tr>
    <tr><td style="padding: 8px; border: 1px solid #ddd;"><strong>Time</strong></td><td style="padding: 8px; border: 1px solid #ddd;">{time}</td></tr>
    <tr><td style="padding: 8px; border: 1px solid #ddd;"><strong>Duration</strong></td><td style="padding: 8px; border: 1px solid #ddd;">{duration} minutes</td></tr>
  </table>
  <p>Please arrive a few minutes early. If you need to reschedule or cancel, please do so through the app.</p>
  <p>Best regards,<br>Medical Booking System</p>
</div>"#,
        patient = email.patient_name,
        doctor = email.doctor_name,
        kind = email.appointment_type,
        date = email.date,
        time = email.time,
        duration = email.duration_minutes,
    )
}

fn cancellation_html(email: &CancellationEmail) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #dc2626;">Appointment Cancelled</h2>
  <p>Dear {patient},</p>
  <p>{doctor} has cancelled your appointment scheduled for {date} at {time}.</p>
  <p><strong>Reason:</strong> {reason}</p>
  <p>We apologise for the inconvenience. Please book a new appointment through the app at a time that suits you.</p>
  <p>Best regards,<br>Medical Booking System</p>
</div>"#,
        patient = email.patient_name,
        doctor = email.doctor_name,
        date = email.appointment_date,
        time = email.appointment_time,
        reason = email.reason,
    )
}
