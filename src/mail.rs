use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use tracing::{debug, info, warn};

use crate::config::MailConfig;

/// Outbound mail capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// SMTP relay with STARTTLS. Sends on the blocking pool.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let transport = SmtpTransport::starttls_relay(&cfg.host)
            .context("smtp relay")?
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .port(cfg.port)
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build();
        Ok(Self {
            transport,
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.parse().context("invalid from address")?)
            .to(to.parse().context("invalid to address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("build email")?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .context("smtp task")?
            .context("smtp send")?;
        Ok(())
    }
}

/// Stand-in used when SMTP is not configured: the message goes to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(%to, %subject, "mail not configured; message not sent");
        debug!(%to, %body, "unsent message body");
        Ok(())
    }
}

/// Sends in the background. Delivery failures are logged and dropped.
pub fn dispatch(mailer: Arc<dyn Mailer>, to: String, subject: String, body: String) {
    tokio::spawn(async move {
        match mailer.send(&to, &subject, &body).await {
            Ok(()) => info!(%to, "mail sent"),
            Err(e) => warn!(error = %e, %to, "mail delivery failed"),
        }
    });
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub struct Sent {
        pub to: String,
        pub subject: String,
        pub body: String,
    }

    /// Records messages; optionally fails every send.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<Sent>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub fn failing() -> Self {
            Self {
                sent: Mutex::default(),
                fail: true,
            }
        }

        pub fn messages(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("smtp unreachable");
            }
            self.sent.lock().unwrap().push(Sent {
                to: to.into(),
                subject: subject.into(),
                body: body.into(),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::RecordingMailer;
    use super::*;

    #[tokio::test]
    async fn dispatch_delivers_in_background() {
        let mailer = Arc::new(RecordingMailer::default());
        dispatch(mailer.clone(), "a@x.com".into(), "hi".into(), "body".into());
        for _ in 0..50 {
            if !mailer.messages().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let sent = mailer.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        let mailer = Arc::new(RecordingMailer::failing());
        dispatch(mailer.clone(), "a@x.com".into(), "hi".into(), "body".into());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(mailer.messages().is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn log_mailer_keeps_body_out_of_info_logs() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        let sent = LogMailer
            .send("a@x.com", "Verify", "http://localhost/verify/s3cr3t-token")
            .await;
        drop(guard);

        assert!(sent.is_ok());
        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("mail not configured"));
        assert!(!out.contains("s3cr3t-token"));
    }
}
