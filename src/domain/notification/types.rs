use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery channel of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Sms,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "email",
            ChannelType::Sms => "sms",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(ChannelType::Email),
            "sms" => Ok(ChannelType::Sms),
            other => Err(format!("unknown channel type: {}", other)),
        }
    }
}

/// Lifecycle status of a notification record.
///
/// ```text
/// Pending -> Sending -> Sent -> Delivered
///    |          |        \-> Bounced
///    |          v
///    \-----> Failed -> Sending (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sending,
    Sent,
    Failed,
    Delivered,
    Bounced,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sending => "sending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Bounced => "bounced",
        }
    }

    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!(
            (self, next),
            (Pending, Sending)
                | (Pending, Failed)
                | (Sending, Sent)
                | (Sending, Failed)
                | (Failed, Sending)
                | (Sent, Delivered)
                | (Sent, Bounced)
        )
    }

    /// No further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NotificationStatus::Delivered | NotificationStatus::Bounced
        )
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sending" => Ok(NotificationStatus::Sending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            "delivered" => Ok(NotificationStatus::Delivered),
            "bounced" => Ok(NotificationStatus::Bounced),
            other => Err(format!("unknown notification status: {}", other)),
        }
    }
}

/// Returned when a status change would violate the lifecycle state machine
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: NotificationStatus,
    pub to: NotificationStatus,
}

/// Persistent delivery record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_key: Option<String>,
    pub channel: ChannelType,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: NotificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    /// Delivery attempts made so far
    pub attempts: u32,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Create a new pending record
    pub fn new(
        tenant_id: impl Into<String>,
        channel: ChannelType,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            template_id: None,
            template_key: None,
            channel,
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            status: NotificationStatus::Pending,
            error: None,
            provider_message_id: None,
            attempts: 0,
            metadata: serde_json::Value::Null,
            sent_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, enforcing the state machine
    pub fn transition(&mut self, next: NotificationStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            NotificationStatus::Sending => self.attempts += 1,
            NotificationStatus::Sent => {
                // First successful hand-off only
                if self.sent_at.is_none() {
                    self.sent_at = Some(now);
                }
                self.error = None;
            }
            NotificationStatus::Delivered => self.delivered_at = Some(now),
            _ => {}
        }

        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Record a failure, keeping the message as the last error
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(NotificationStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

/// Filter for listing notifications
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilter {
    pub status: Option<NotificationStatus>,
    pub channel: Option<ChannelType>,
    pub recipient: Option<String>,
    pub template_key: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

const MAX_PAGE_SIZE: usize = 500;

impl NotificationFilter {
    /// Page size to use; zero means the default
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            default_limit()
        } else {
            self.limit.min(MAX_PAGE_SIZE)
        }
    }

    pub fn matches(&self, n: &Notification) -> bool {
        self.status.map_or(true, |s| n.status == s)
            && self.channel.map_or(true, |c| n.channel == c)
            && self
                .recipient
                .as_deref()
                .map_or(true, |r| n.recipient == r)
            && self
                .template_key
                .as_deref()
                .map_or(true, |k| n.template_key.as_deref() == Some(k))
    }
}

/// One page of list results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Notification {
        Notification::new("acme", ChannelType::Email, "ann@example.com", "Hi", "Body")
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut n = sample();
        assert_eq!(n.status, NotificationStatus::Pending);

        n.transition(NotificationStatus::Sending).unwrap();
        assert_eq!(n.attempts, 1);

        n.transition(NotificationStatus::Sent).unwrap();
        let sent_at = n.sent_at.expect("sent_at set on first hand-off");

        n.transition(NotificationStatus::Delivered).unwrap();
        assert_eq!(n.sent_at, Some(sent_at));
        assert!(n.delivered_at.is_some());
        assert!(n.status.is_terminal());
    }

    #[test]
    fn test_retry_path_counts_attempts() {
        let mut n = sample();
        n.transition(NotificationStatus::Sending).unwrap();
        n.fail("smtp timeout").unwrap();
        assert_eq!(n.error.as_deref(), Some("smtp timeout"));

        n.transition(NotificationStatus::Sending).unwrap();
        n.transition(NotificationStatus::Sent).unwrap();
        assert_eq!(n.attempts, 2);
        assert!(n.error.is_none());
    }

    #[test]
    fn test_rejects_backwards_transitions() {
        let mut n = sample();
        n.transition(NotificationStatus::Sending).unwrap();
        n.transition(NotificationStatus::Sent).unwrap();

        assert!(n.transition(NotificationStatus::Pending).is_err());
        assert!(n.transition(NotificationStatus::Sending).is_err());
        assert!(n.transition(NotificationStatus::Failed).is_err());
        assert_eq!(n.status, NotificationStatus::Sent);
    }

    #[test]
    fn test_channel_parse() {
        assert_eq!("EMAIL".parse::<ChannelType>().unwrap(), ChannelType::Email);
        assert_eq!("sms".parse::<ChannelType>().unwrap(), ChannelType::Sms);
        assert!("fax".parse::<ChannelType>().is_err());
    }

    #[test]
    fn test_filter_matches() {
        let n = sample();
        let filter = NotificationFilter {
            channel: Some(ChannelType::Email),
            recipient: Some("ann@example.com".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&n));

        let filter = NotificationFilter {
            status: Some(NotificationStatus::Sent),
            ..Default::default()
        };
        assert!(!filter.matches(&n));
    }
}
