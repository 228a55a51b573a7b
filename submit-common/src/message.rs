//! Outbound messages.
//!
//! A [`Message`] is what travels from the frontend to a deliverer: the
//! envelope sender, the set of recipients and the raw message text. It is
//! built once, either directly with [`Message::new`] or from sendmail-style
//! input with [`Message::compose`], and never changes afterwards.

use std::collections::BTreeSet;

use chrono::Local;
use mailparse::{MailAddr, MailHeaderMap};
use serde::{Deserialize, Serialize};

use crate::{Config, error::MessageError, host};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    envelope_from: String,
    recipients: BTreeSet<String>,
    body: Vec<u8>,
}

impl Message {
    pub fn new<I, S>(envelope_from: impl Into<String>, recipients: I, body: impl Into<Vec<u8>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            envelope_from: envelope_from.into(),
            recipients: recipients.into_iter().map(Into::into).collect(),
            body: body.into(),
        }
    }

    /// Build a message from text handed to a sendmail-compatible program.
    ///
    /// Recipient arguments are parsed as addresses. Without an explicit
    /// `envelope_from`, the sender is taken from the `From:` header (adding
    /// `general.default_from` first if there is none), or else made up from
    /// the login name and the mail name of this host. When
    /// `parse_recipients` is set, the addresses in `To:`, `Cc:` and `Bcc:`
    /// are added to the recipients.
    ///
    /// The text gains a `Received:` header, loses its `Bcc:` headers and
    /// receives `From:`, `Message-ID:` and `Date:` headers when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the header section cannot be parsed.
    pub fn compose(
        config: &Config,
        text: &[u8],
        recipients: &[String],
        parse_recipients: bool,
        envelope_from: Option<String>,
    ) -> Result<Self, MessageError> {
        let (mut fields, body_offset) = HeaderFields::split(text);
        let parsed = if fields.is_empty() {
            Vec::new()
        } else {
            mailparse::parse_headers(&text[..body_offset])?.0
        };

        let mut rcpts: BTreeSet<String> = recipients
            .iter()
            .flat_map(|arg| parse_addresses(arg))
            .collect();

        let default_from = config
            .general
            .default_from
            .as_deref()
            .filter(|_| envelope_from.is_none() && parsed.get_first_value("From").is_none());
        if let Some(default_from) = default_from {
            fields.push("From", default_from);
        }

        let envelope_from = envelope_from.unwrap_or_else(|| {
            fields
                .value("From")
                .and_then(|from| parse_addresses(&from).into_iter().next())
                .unwrap_or_else(|| format!("{}@{}", host::username(), host::mailname()))
        });

        if fields.value("From").is_none() {
            fields.push("From", &envelope_from);
        }

        if parse_recipients {
            for header in ["To", "Cc", "Bcc"] {
                for value in parsed.get_all_values(header) {
                    rcpts.extend(parse_addresses(&value));
                }
            }
        }

        fields.remove("Bcc");
        if fields.value("Message-ID").is_none() {
            fields.push(
                "Message-ID",
                &format!("<{}@{}>", ulid::Ulid::new(), host::hostname()),
            );
        }
        if fields.value("Date").is_none() {
            fields.push("Date", &Local::now().to_rfc2822());
        }

        let mut body = format!(
            "Received: by {} (submit); {}\n",
            host::hostname(),
            Local::now().to_rfc2822()
        )
        .into_bytes();
        fields.write_to(&mut body);
        body.push(b'\n');
        body.extend_from_slice(&text[body_offset..]);

        Ok(Self {
            envelope_from,
            recipients: rcpts,
            body,
        })
    }

    pub fn envelope_from(&self) -> &str {
        &self.envelope_from
    }

    pub const fn recipients(&self) -> &BTreeSet<String> {
        &self.recipients
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Addresses contained in `input`, or `input` itself when it does not parse
/// as an address list (bare local parts like `bob`, for example).
fn parse_addresses(input: &str) -> Vec<String> {
    let addresses: Vec<String> = mailparse::addrparse(input)
        .map(|list| {
            list.iter()
                .flat_map(|addr| match addr {
                    MailAddr::Single(single) => vec![single.addr.clone()],
                    MailAddr::Group(group) => {
                        group.addrs.iter().map(|single| single.addr.clone()).collect()
                    }
                })
                .filter(|addr| !addr.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if addresses.is_empty() {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        }
    } else {
        addresses
    }
}

/// The header section of a message as raw fields, folded lines included,
/// so that untouched headers are passed on byte for byte.
struct HeaderFields {
    fields: Vec<Vec<u8>>,
}

impl HeaderFields {
    /// The header fields at the start of `text` and the offset of the body.
    ///
    /// The header section ends at the first empty line, which is consumed,
    /// or at the first line that is neither a field nor a continuation,
    /// which then starts the body.
    fn split(text: &[u8]) -> (Self, usize) {
        let mut fields: Vec<Vec<u8>> = Vec::new();
        let mut offset = 0;

        for line in text.split_inclusive(|&b| b == b'\n') {
            if line.trim_ascii_end().is_empty() {
                offset += line.len();
                break;
            }
            match fields.last_mut() {
                Some(field) if line.starts_with(b" ") || line.starts_with(b"\t") => {
                    field.extend_from_slice(line);
                }
                _ if is_field(line) => fields.push(line.to_vec()),
                _ => break,
            }
            offset += line.len();
        }

        (Self { fields }, offset)
    }

    fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn name_of(field: &[u8]) -> &[u8] {
        field
            .iter()
            .position(|&b| b == b':')
            .map_or(&[][..], |colon| field[..colon].trim_ascii())
    }

    fn find(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|field| Self::name_of(field).eq_ignore_ascii_case(name.as_bytes()))
            .map(Vec::as_slice)
    }

    fn value(&self, name: &str) -> Option<String> {
        let field = self.find(name)?;
        let colon = field.iter().position(|&b| b == b':')?;
        let value = String::from_utf8_lossy(&field[colon + 1..]);
        Some(value.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    fn push(&mut self, name: &str, value: &str) {
        self.fields.push(format!("{name}: {value}\n").into_bytes());
    }

    fn remove(&mut self, name: &str) {
        self.fields
            .retain(|field| !Self::name_of(field).eq_ignore_ascii_case(name.as_bytes()));
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for field in &self.fields {
            out.extend_from_slice(field);
            if !field.ends_with(b"\n") {
                out.push(b'\n');
            }
        }
    }
}

/// Whether `line` starts with a field name followed by a colon
fn is_field(line: &[u8]) -> bool {
    line.iter()
        .position(|&b| b == b':')
        .is_some_and(|colon| colon > 0 && line[..colon].iter().all(u8::is_ascii_graphic))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn compose(text: &str, rcpts: &[&str], parse: bool, from: Option<&str>) -> Message {
        let rcpts: Vec<String> = rcpts.iter().map(ToString::to_string).collect();
        Message::compose(
            &Config::default(),
            text.as_bytes(),
            &rcpts,
            parse,
            from.map(ToString::to_string),
        )
        .unwrap()
    }

    fn body(message: &Message) -> String {
        String::from_utf8(message.body().to_vec()).unwrap()
    }

    #[test]
    fn test_recipients_are_a_set() {
        let message = Message::new("me@example.com", ["bob", "alice@example.com", "bob"], "hi");
        assert_eq!(message.recipients().len(), 2);
    }

    #[test]
    fn test_envelope_from_from_header() {
        let message = compose(
            "From: Alice <alice@example.com>\nSubject: hi\n\nbody\n",
            &["bob@example.org"],
            false,
            None,
        );
        assert_eq!(message.envelope_from(), "alice@example.com");
        assert!(message.recipients().contains("bob@example.org"));
    }

    #[test]
    fn test_explicit_envelope_from_and_missing_from_header() {
        let message = compose("Subject: hi\n\nbody\n", &["bob"], false, Some("me@home.org"));
        assert_eq!(message.envelope_from(), "me@home.org");
        assert!(body(&message).contains("From: me@home.org\n"));
    }

    #[test]
    fn test_headers_are_fixed_up() {
        let message = compose(
            "From: a@example.com\nBcc: secret@example.com,\n  other@example.com\nSubject: hi\n\nbody\n",
            &[],
            true,
            None,
        );
        let text = body(&message);

        assert!(text.starts_with("Received: by "));
        assert!(!text.contains("Bcc:"));
        assert!(!text.contains("other@example.com"));
        assert!(text.contains("Message-ID: <"));
        assert!(text.contains("Date: "));
        assert!(text.ends_with("\n\nbody\n"));
        assert!(message.recipients().contains("secret@example.com"));
        assert!(message.recipients().contains("other@example.com"));
    }

    #[test]
    fn test_recipient_headers_ignored_without_flag() {
        let message = compose(
            "From: a@example.com\nTo: b@example.com\n\nbody\n",
            &["c@example.com"],
            false,
            None,
        );
        assert_eq!(
            message.recipients().iter().collect::<Vec<_>>(),
            vec!["c@example.com"]
        );
    }

    #[test]
    fn test_default_from_is_added() {
        let config = Config {
            general: crate::General {
                default_from: Some("Me <me@home.org>".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let message = Message::compose(&config, b"Subject: x\n\nbody\n", &[], false, None).unwrap();
        assert_eq!(message.envelope_from(), "me@home.org");
        assert!(body(&message).contains("From: Me <me@home.org>\n"));
    }

    #[test]
    fn test_eight_bit_headers_pass_unchanged() {
        let message = Message::compose(
            &Config::default(),
            b"From: a@example.com\nSubject: caf\xe9\n\nbody\n",
            &[],
            false,
            None,
        )
        .unwrap();

        let body = message.body();
        assert!(body.windows(14).any(|w| w == b"Subject: caf\xe9\n"));
        assert!(body.ends_with(b"\n\nbody\n"));
    }

    #[test]
    fn test_text_without_headers_stays_body() {
        let message = compose("hello world\nsecond line\n", &["bob"], false, Some("me@x.org"));
        let text = body(&message);

        assert!(text.ends_with("\n\nhello world\nsecond line\n"));
        let (headers, _) = text.split_once("\n\n").unwrap();
        assert!(headers.contains("From: me@x.org"));
        assert!(!headers.contains("hello world"));
    }

    #[test]
    fn test_headers_end_at_first_line_without_colon() {
        let message = compose("Subject: hi\nnot a header\nmore\n", &["bob"], false, Some("me@x.org"));
        let text = body(&message);

        assert!(text.contains("Subject: hi\n"));
        assert!(text.ends_with("\n\nnot a header\nmore\n"));
    }
}
