//! Outbound booking notifications
//!
//! Messages go out over WhatsApp through Twilio's REST API. Booking
//! confirmations are handed to a [`NotificationDispatcher`], whose worker task
//! delivers them after the booking transaction has committed; a slow or failing
//! provider therefore never affects the booking itself.

use async_trait::async_trait;
use reqwest::Client;
use std::{env, sync::Arc};
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, UnboundedSender},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::slot::Booking;

const TWILIO_API_BASE: &str = "https://api.twilio.com";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivers a text message to a contact number
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError>;
}

/// Twilio credentials
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender, e.g. `whatsapp:+14155238886`
    pub from: String,
    pub api_base: String,
}

impl TwilioConfig {
    /// Read Twilio settings from the environment
    ///
    /// # Environment Variables
    /// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_WHATSAPP_NUMBER`: all required
    /// - `TWILIO_API_BASE`: API host (default: "https://api.twilio.com")
    ///
    /// Returns `None` when any required variable is missing.
    pub fn from_env() -> Option<Self> {
        let account_sid = env::var("TWILIO_ACCOUNT_SID").ok()?;
        let auth_token = env::var("TWILIO_AUTH_TOKEN").ok()?;
        let from = env::var("TWILIO_WHATSAPP_NUMBER").ok()?;
        let api_base = env::var("TWILIO_API_BASE").unwrap_or_else(|_| TWILIO_API_BASE.to_string());

        Some(Self {
            account_sid,
            auth_token,
            from,
            api_base,
        })
    }
}

/// WhatsApp delivery through Twilio
pub struct TwilioWhatsApp {
    client: Client,
    config: TwilioConfig,
}

impl TwilioWhatsApp {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl Notifier for TwilioWhatsApp {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        let to = format!("whatsapp:{to}");
        info!("Sending WhatsApp message to {}", to);

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("From", self.config.from.as_str()),
                ("To", to.as_str()),
                ("Body", body),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Logs messages instead of sending them; used when Twilio is not configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        info!(to, body, "Notification delivery disabled, message logged only");
        Ok(())
    }
}

/// Twilio when configured, otherwise [`LogNotifier`]
pub fn notifier_from_env() -> Arc<dyn Notifier> {
    match TwilioConfig::from_env() {
        Some(config) => Arc::new(TwilioWhatsApp::new(config)),
        None => {
            warn!("Twilio is not configured, WhatsApp notifications will only be logged");
            Arc::new(LogNotifier)
        }
    }
}

/// A queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub body: String,
}

/// Fire-and-forget delivery queue
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: UnboundedSender<Notification>,
}

impl NotificationDispatcher {
    /// Start the delivery worker on the current runtime
    pub fn spawn(notifier: Arc<dyn Notifier>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Notification>();

        let worker = tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                match notifier.send(&notification.to, &notification.body).await {
                    Ok(()) => info!("Notification delivered to {}", notification.to),
                    Err(e) => error!("Failed to deliver notification to {}: {}", notification.to, e),
                }
            }
        });

        (Self { sender }, worker)
    }

    /// Queue a message; never blocks and never fails the caller
    pub fn dispatch(&self, notification: Notification) {
        if let Err(e) = self.sender.send(notification) {
            error!("Notification worker is gone, dropping message to {}", e.0.to);
        }
    }
}

/// Confirmation text for a committed booking
pub fn booking_message(name: &str, day: &str, time: &str) -> String {
    format!(
        "*Washing Machine Booking Confirmed*\n\n\
         Student: {name}\n\
         Day: {day}\n\
         Time slot: {time}\n\
         Location: Hostel Laundry Room\n\n\
         Please arrive on time, bring your own detergent and collect your \
         clothes promptly after the wash.\n\n\
         - Hostel Management"
    )
}

/// Notification for `booking`, if the student has a contact number
pub fn booking_notification(booking: &Booking) -> Option<Notification> {
    let to = booking
        .student
        .contact
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())?;

    let day = format!(
        "{} ({})",
        booking.slot.booking_day,
        booking.slot.booking_date.format("%Y-%m-%d")
    );
    Some(Notification {
        to: to.to_string(),
        body: booking_message(&booking.student.name, &day, &booking.slot.time_slot),
    })
}
