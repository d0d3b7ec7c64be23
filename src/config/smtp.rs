use serde::Deserialize;

fn default_smtp_port() -> u16 {
    587
}

/// SMTP relay settings for the email channel.
#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    /// SMTP relay host.
    pub host: String,

    /// SMTP relay port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Relay username, when the relay requires authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Relay password, when the relay requires authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// Sender address for outgoing alert mail.
    pub from: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let json = r#"{"host": "smtp.example.com", "from": "alerts@example.com"}"#;
        let config: SmtpConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 587);
        assert!(config.username.is_none());
        assert_eq!(config.from, "alerts@example.com");
    }
}
