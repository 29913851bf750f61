//! MIME message extraction: headers, plain-text body, stable identifiers.

use chrono::{DateTime, Utc};
use mailparse::{MailAddr, ParsedMail, addrparse, dateparse, parse_mail};
use parcelwatch_model::MailboxId;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;

/// The pieces of a fetched message the pipeline cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEmail {
    pub subject: String,
    pub sender: String,
    pub body: String,
    /// `Message-ID` header, trimmed; `None` when absent or blank.
    pub message_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Parse a raw RFC 822 message into the fields the queue captures.
pub fn parse_email(raw: &[u8]) -> Result<ParsedEmail> {
    let mail = parse_mail(raw)?;

    let subject = mail.headers_value("Subject");
    let sender = mail.headers_value("From");
    let message_id = {
        let value = mail.headers_value("Message-ID");
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    };
    let date = {
        let value = mail.headers_value("Date");
        if value.is_empty() {
            None
        } else {
            dateparse(&value)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
        }
    };
    let body = extract_body(&mail);

    Ok(ParsedEmail {
        subject,
        sender,
        body,
        message_id,
        date,
    })
}

trait HeadersValue {
    fn headers_value(&self, key: &str) -> String;
}

impl HeadersValue for ParsedMail<'_> {
    fn headers_value(&self, key: &str) -> String {
        use mailparse::MailHeaderMap;
        self.headers.get_first_value(key).unwrap_or_default()
    }
}

/// Extract a plain-text body, preferring `text/plain` parts and converting
/// `text/html` when that is all the message carries.
fn extract_body(mail: &ParsedMail<'_>) -> String {
    if mail.subparts.is_empty() {
        let body = mail.get_body().unwrap_or_default();
        if mail.ctype.mimetype.eq_ignore_ascii_case("text/html") {
            return html_to_text(&body);
        }
        return body;
    }

    if let Some(plain) = find_part(mail, "text/plain") {
        return plain.get_body().unwrap_or_default();
    }
    if let Some(html) = find_part(mail, "text/html") {
        return html_to_text(&html.get_body().unwrap_or_default());
    }
    String::new()
}

fn find_part<'a, 'b>(mail: &'a ParsedMail<'b>, mimetype: &str) -> Option<&'a ParsedMail<'b>> {
    for part in &mail.subparts {
        if part.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
            return Some(part);
        }
        if let Some(nested) = find_part(part, mimetype) {
            return Some(nested);
        }
    }
    None
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 80).unwrap_or_else(|_| html.to_string())
}

/// Lowercased bare address from a `From:` header value.
///
/// `"Jordan Doe <Orders@Shop.example>"` becomes `orders@shop.example`.
/// Falls back to angle-bracket slicing when the header does not parse.
pub fn extract_bare_address(header: &str) -> String {
    if let Ok(addrs) = addrparse(header) {
        for addr in addrs.iter() {
            match addr {
                MailAddr::Single(info) => return info.addr.to_lowercase(),
                MailAddr::Group(group) => {
                    if let Some(info) = group.addrs.first() {
                        return info.addr.to_lowercase();
                    }
                }
            }
        }
    }

    let inner = match (header.find('<'), header.rfind('>')) {
        (Some(start), Some(end)) if start < end => &header[start + 1..end],
        _ => header,
    };
    inner.trim().to_lowercase()
}

/// Deterministic identifier for messages that carry no usable `Message-ID`.
///
/// Format: `fallback:<mailbox_id>:<sha256(folder)[0..16]>:<uid_validity|"no-uidvalidity">:<uid>`.
/// The global mailbox uses the nil UUID as its identifier.
pub fn fallback_message_id(
    mailbox_id: Option<MailboxId>,
    folder_path: &str,
    uid_validity: Option<u32>,
    uid: u32,
) -> String {
    let mailbox = mailbox_id.map(|id| id.to_uuid()).unwrap_or(Uuid::nil());
    let folder_hash = {
        let digest = Sha256::digest(folder_path.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..16].to_string()
    };
    let validity = uid_validity
        .map(|v| v.to_string())
        .unwrap_or_else(|| "no-uidvalidity".to_string());
    format!("fallback:{mailbox}:{folder_hash}:{validity}:{uid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_message() {
        let raw = concat!(
            "From: Orders <orders@amazon.com>\r\n",
            "To: jordan@example.com\r\n",
            "Subject: Order Confirmation\r\n",
            "Message-ID: <abc123@amazon.com>\r\n",
            "Date: Tue, 1 Jul 2026 10:00:00 +0000\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Your order ORD-500 has shipped.\r\n",
        );
        let parsed = parse_email(raw.as_bytes()).unwrap();
        assert_eq!(parsed.subject, "Order Confirmation");
        assert_eq!(parsed.message_id.as_deref(), Some("<abc123@amazon.com>"));
        assert!(parsed.body.contains("ORD-500"));
        assert!(parsed.date.is_some());
    }

    #[test]
    fn prefers_plain_over_html_in_multipart() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Subject: multi\r\n",
            "Content-Type: multipart/alternative; boundary=\"xyz\"\r\n",
            "\r\n",
            "--xyz\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html body</p>\r\n",
            "--xyz\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain body\r\n",
            "--xyz--\r\n",
        );
        let parsed = parse_email(raw.as_bytes()).unwrap();
        assert!(parsed.body.contains("plain body"));
        assert!(!parsed.body.contains("<p>"));
    }

    #[test]
    fn converts_html_only_messages() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Subject: html\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<html><body><p>Tracking: 1Z999</p></body></html>\r\n",
        );
        let parsed = parse_email(raw.as_bytes()).unwrap();
        assert!(parsed.body.contains("Tracking: 1Z999"));
        assert!(!parsed.body.contains("<p>"));
    }

    #[test]
    fn blank_message_id_is_none() {
        let raw = "From: a@b.c\r\nSubject: s\r\nMessage-ID:   \r\n\r\nbody\r\n";
        let parsed = parse_email(raw.as_bytes()).unwrap();
        assert_eq!(parsed.message_id, None);
    }

    #[test]
    fn bare_address_extraction_lowercases() {
        assert_eq!(
            extract_bare_address("Jordan Doe <Orders@Shop.Example>"),
            "orders@shop.example"
        );
        assert_eq!(extract_bare_address("plain@example.com"), "plain@example.com");
        assert_eq!(extract_bare_address("<A@B.Co>"), "a@b.co");
    }

    #[test]
    fn fallback_id_matches_the_documented_format() {
        let mailbox = MailboxId::new();
        let id = fallback_message_id(Some(mailbox), "INBOX", Some(42), 7);
        let parts: Vec<&str> = id.split(':').collect();
        assert_eq!(parts[0], "fallback");
        assert_eq!(parts[1], mailbox.to_string());
        assert_eq!(parts[2].len(), 16);
        assert_eq!(parts[3], "42");
        assert_eq!(parts[4], "7");
    }

    #[test]
    fn fallback_id_without_validity_uses_sentinel() {
        let id = fallback_message_id(None, "INBOX/Shipping", None, 12);
        assert!(id.contains(":no-uidvalidity:12"));
        assert!(id.starts_with(&format!("fallback:{}:", Uuid::nil())));
    }

    #[test]
    fn fallback_id_is_deterministic() {
        let mailbox = MailboxId::new();
        let a = fallback_message_id(Some(mailbox), "INBOX", Some(1), 5);
        let b = fallback_message_id(Some(mailbox), "INBOX", Some(1), 5);
        assert_eq!(a, b);
    }
}
