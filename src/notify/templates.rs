// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Email content for unlocked capsules.

use chrono::{DateTime, Utc};

/// Rendered subject and bodies for one unlock notification.
pub struct UnlockEmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl UnlockEmailContent {
    /// Render the unlock email.
    ///
    /// `sender_name` falls back to "A Friend" when the owner has no known
    /// address to show.
    pub fn new(
        sender_name: Option<&str>,
        sealed_on: DateTime<Utc>,
        title: &str,
        message: &str,
        has_attachment: bool,
    ) -> Self {
        let sender = sender_name.unwrap_or("A Friend");
        let sealed_date = sealed_on.format("%B %-d, %Y").to_string();

        Self {
            subject: format!("Start Your Legacy: A Message from {sender}"),
            text: Self::text_template(sender, &sealed_date, title, message, has_attachment),
            html: Self::html_template(sender, &sealed_date, title, message, has_attachment),
        }
    }

    fn text_template(
        sender: &str,
        sealed_date: &str,
        title: &str,
        message: &str,
        has_attachment: bool,
    ) -> String {
        let attachment_note = if has_attachment {
            "\n\nAn attached memory is included with this message.\n"
        } else {
            "\n"
        };
        format!(
            r#"Time Capsule Unlocked

Hello,

{sender} sealed a message for you on {sealed_date}. The time has finally come to open it.

"{title}"

{message}{attachment_note}
--
Powered by GhostPost - Digital Legacy Vault"#
        )
    }

    fn html_template(
        sender: &str,
        sealed_date: &str,
        title: &str,
        message: &str,
        has_attachment: bool,
    ) -> String {
        let sender = escape_html(sender);
        let title = escape_html(title);
        let message = escape_html(message);
        let attachment_block = if has_attachment {
            r#"<div style="margin-top: 30px; text-align: center;">
                <p style="font-weight: bold; color: #555; margin-bottom: 10px;">Attached Memory:</p>
                <img src="cid:memory" alt="Attached Memory" style="max-width: 100%; border-radius: 8px;" />
              </div>"#
        } else {
            ""
        };

        format!(
            r#"<div style="font-family: sans-serif; padding: 20px; background: #f5f5f5;">
  <div style="background: white; padding: 30px; border-radius: 10px; max-width: 600px; margin: auto;">
    <h1 style="color: #6b21a8; text-align: center; margin-bottom: 30px;">Time Capsule Unlocked</h1>
    <p style="font-size: 16px; color: #555;">Hello,</p>
    <p style="font-size: 16px; color: #555; line-height: 1.6;">
      <strong>{sender}</strong> sealed a message for you on <strong>{sealed_date}</strong>. The time has finally come to open it.
    </p>
    <hr style="border: 0; border-top: 1px solid #eee; margin: 30px 0;" />
    <h2 style="color: #333; margin-bottom: 15px;">"{title}"</h2>
    <div style="background: #fafafa; padding: 20px; border-radius: 8px; border-left: 4px solid #6b21a8;">
      <p style="font-size: 16px; line-height: 1.8; color: #333; margin: 0; white-space: pre-wrap;">{message}</p>
    </div>
    {attachment_block}
    <hr style="border: 0; border-top: 1px solid #eee; margin: 30px 0;" />
    <p style="font-size: 12px; color: #888; text-align: center;">
      Powered by GhostPost - Digital Legacy Vault
    </p>
  </div>
</div>"#
        )
    }
}

/// Minimal HTML escaping for user content interpolated into the template.
fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_sender_and_title() {
        let content = UnlockEmailContent::new(
            Some("alice@example.com"),
            "2026-01-15T12:00:00Z".parse().unwrap(),
            "Our wedding day",
            "It was beautiful.",
            false,
        );

        assert_eq!(
            content.subject,
            "Start Your Legacy: A Message from alice@example.com"
        );
        assert!(content.text.contains("Our wedding day"));
        assert!(content.text.contains("January 15, 2026"));
        assert!(content.html.contains("It was beautiful."));
        assert!(!content.html.contains("cid:memory"));
    }

    #[test]
    fn anonymous_sender_falls_back() {
        let content = UnlockEmailContent::new(
            None,
            "2026-01-15T12:00:00Z".parse().unwrap(),
            "t",
            "m",
            true,
        );
        assert!(content.subject.contains("A Friend"));
        assert!(content.html.contains("cid:memory"));
        assert!(content.text.contains("attached memory"));
    }

    #[test]
    fn html_content_is_escaped() {
        let content = UnlockEmailContent::new(
            Some("eve"),
            Utc::now(),
            "<script>alert(1)</script>",
            "a & b",
            false,
        );
        assert!(!content.html.contains("<script>"));
        assert!(content.html.contains("&lt;script&gt;"));
        assert!(content.html.contains("a &amp; b"));
    }
}
