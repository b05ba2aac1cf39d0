//! Outgoing email: a delivery abstraction plus the message builders the
//! auth flows use. The default [`LogMailer`] logs and returns `Ok`, so a
//! local instance works without an SMTP relay.

use anyhow::Result;
use chrono::Duration;
use tracing::info;

use crate::config::Settings;

#[derive(Clone, Debug)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery abstraction used by the auth flows.
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error to let the caller log it.
    fn send(&self, email: &Email) -> Result<()>;
}

/// Local dev mailer that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &Email) -> Result<()> {
        info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "email send stub"
        );
        Ok(())
    }
}

fn link(settings: &Settings, path_and_query: &str) -> String {
    format!(
        "{}{path_and_query}",
        settings.base_url().trim_end_matches('/')
    )
}

/// Account confirmation link. `name` is only used for the greeting.
#[must_use]
pub fn confirm_email(
    settings: &Settings,
    to: &str,
    name: &str,
    raw_token: &str,
    ttl: Duration,
) -> Email {
    let app = settings.app_name();
    let url = link(settings, &format!("/confirm?ctoken={raw_token}"));
    Email {
        from: settings.smtp().user().to_string(),
        to: to.to_string(),
        subject: format!("Confirm your {app} account"),
        body: format!(
            "Hello {name},\n\n\
             Confirm your {app} account by visiting the link below:\n\n\
             {url}\n\n\
             The link expires in {}.\n\n\
             If you did not register, ignore this message.\n",
            human_duration(ttl)
        ),
    }
}

/// Password reset link. `name` is only used for the greeting.
#[must_use]
pub fn reset_email(
    settings: &Settings,
    to: &str,
    name: &str,
    raw_token: &str,
    ttl: Duration,
) -> Email {
    let app = settings.app_name();
    let url = link(settings, &format!("/reset?rtoken={raw_token}"));
    Email {
        from: settings.smtp().user().to_string(),
        to: to.to_string(),
        subject: format!("Reset your {app} password"),
        body: format!(
            "Hello {name},\n\n\
             Reset your {app} password by visiting the link below:\n\n\
             {url}\n\n\
             The link expires in {}.\n\n\
             If you did not request a reset, ignore this message.\n",
            human_duration(ttl)
        ),
    }
}

/// Username recovery.
#[must_use]
pub fn username_email(settings: &Settings, to: &str, username: &str) -> Email {
    let app = settings.app_name();
    Email {
        from: settings.smtp().user().to_string(),
        to: to.to_string(),
        subject: format!("Your {app} username"),
        body: format!(
            "Hello,\n\n\
             The username for this address is {username}.\n\n\
             If you did not request it, ignore this message.\n"
        ),
    }
}

/// Sent when a confirmation is requested for an address nobody registered.
/// Keeps the response identical for known and unknown addresses.
#[must_use]
pub fn not_registered_email(settings: &Settings, to: &str) -> Email {
    let app = settings.app_name();
    Email {
        from: settings.smtp().user().to_string(),
        to: to.to_string(),
        subject: format!("{app} account request"),
        body: format!(
            "Hello,\n\n\
             This address is not registered with {app}.\n\n\
             If you did not request anything, ignore this message.\n"
        ),
    }
}

fn human_duration(ttl: Duration) -> String {
    let secs = ttl.num_seconds();
    if secs >= 3600 && secs % 3600 == 0 {
        let hours = secs / 3600;
        if hours == 1 {
            "1 hour".to_string()
        } else {
            format!("{hours} hours")
        }
    } else if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{minutes} minutes")
        }
    } else if secs == 1 {
        "1 second".to_string()
    } else {
        format!("{secs} seconds")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn settings(base_url: &str) -> Settings {
        let raw = format!(
            r#"{{
                "App": {{ "Name": "entrata" }},
                "Auth": {{ "BaseURL": "{base_url}", "LoginExpires": "24h" }},
                "SQL": {{ "DriverName": "postgres", "DataSourceName": "postgres://localhost/entrata" }},
                "SMTP": {{ "Host": "smtp.example.com", "Port": 587, "User": "no-reply@example.com", "Password": "secret" }}
            }}"#
        );
        serde_json::from_str::<Config>(&raw)
            .expect("valid config JSON")
            .validate()
            .expect("valid settings")
    }

    #[test]
    fn confirm_email_carries_link_and_expiry() {
        let settings = settings("https://accounts.example.com");
        let email = confirm_email(&settings, "j@example.com", "jdoe", "RAWTOKEN", Duration::seconds(300));
        assert_eq!(email.from, "no-reply@example.com");
        assert_eq!(email.to, "j@example.com");
        assert!(email.body.contains("https://accounts.example.com/confirm?ctoken=RAWTOKEN"));
        assert!(email.body.contains("expires in 5 minutes"));
    }

    #[test]
    fn reset_email_carries_link() {
        let settings = settings("https://accounts.example.com");
        let email = reset_email(&settings, "j@example.com", "jdoe", "RAWTOKEN", Duration::hours(1));
        assert!(email.body.contains("https://accounts.example.com/reset?rtoken=RAWTOKEN"));
        assert!(email.body.contains("expires in 1 hour"));
    }

    #[test]
    fn trailing_slash_in_base_url_is_trimmed() {
        let settings = settings("https://accounts.example.com/");
        let email = confirm_email(&settings, "j@example.com", "jdoe", "T", Duration::seconds(300));
        assert!(email.body.contains("https://accounts.example.com/confirm?ctoken=T"));
        assert!(!email.body.contains(".com//confirm"));
    }

    #[test]
    fn username_email_names_the_username() {
        let settings = settings("https://accounts.example.com");
        let email = username_email(&settings, "j@example.com", "jdoe");
        assert!(email.body.contains("jdoe"));
    }

    #[test]
    fn not_registered_email_has_no_link() {
        let settings = settings("https://accounts.example.com");
        let email = not_registered_email(&settings, "j@example.com");
        assert!(!email.body.contains("ctoken"));
        assert!(!email.body.contains("rtoken"));
    }

    #[test]
    fn human_durations_read_naturally() {
        assert_eq!(human_duration(Duration::seconds(300)), "5 minutes");
        assert_eq!(human_duration(Duration::minutes(1)), "1 minute");
        assert_eq!(human_duration(Duration::hours(24)), "24 hours");
        assert_eq!(human_duration(Duration::seconds(90)), "90 seconds");
        assert_eq!(human_duration(Duration::seconds(1)), "1 second");
    }

    #[test]
    fn log_mailer_always_succeeds() {
        let settings = settings("https://accounts.example.com");
        let email = username_email(&settings, "j@example.com", "jdoe");
        assert!(LogMailer.send(&email).is_ok());
    }
}
