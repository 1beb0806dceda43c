//! The config portal: a single HTTP route that either serves the form or accepts one field
//! update per request.
//!
//! The network side stays with the application. It passes the query string of every request on
//! the portal route to [`ProvisioningManager::handle_request`](crate::ProvisioningManager) and
//! writes the returned [`PortalResponse`] back.

mod html;
mod query;
mod session;

pub use html::{escape_html, render_page};
pub use query::{percent_decode, query_param};
pub use session::{FieldKey, PortalSession, UpdateOutcome};

use crate::config::PortalOptions;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use strum::{EnumCount, EnumIter, EnumString, IntoStaticStr};

pub const CONTENT_TYPE_HTML: &str = "text/html";
/// Body of the response to a field update.
pub const ACK_BODY: &str = "OK";

/// The fields of the fixed record, serialized as the keys the form sends them with.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    IntoStaticStr,
    EnumIter,
    EnumCount,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FixedField {
    #[strum(serialize = "id")]
    WifiSsid0,
    #[strum(serialize = "pw")]
    WifiPassword0,
    #[strum(serialize = "id1")]
    WifiSsid1,
    #[strum(serialize = "pw1")]
    WifiPassword1,
    #[strum(serialize = "sv")]
    Server0,
    #[strum(serialize = "tk")]
    Token0,
    #[strum(serialize = "sv1")]
    Server1,
    #[strum(serialize = "tk1")]
    Token1,
    #[strum(serialize = "pt")]
    Port,
    #[strum(serialize = "nm")]
    BoardName,
}

impl FixedField {
    pub fn key(self) -> &'static str {
        self.into()
    }

    pub fn label(self) -> &'static str {
        match self {
            FixedField::WifiSsid0 => "WiFi SSID",
            FixedField::WifiPassword0 => "PWD",
            FixedField::WifiSsid1 => "WiFi SSID1",
            FixedField::WifiPassword1 => "PWD1",
            FixedField::Server0 => "Server",
            FixedField::Token0 => "Token",
            FixedField::Server1 => "Server1",
            FixedField::Token1 => "Token1",
            FixedField::Port => "Port",
            FixedField::BoardName => "Board Name",
        }
    }

    /// Fieldset the field is rendered in.
    pub(crate) fn group(self) -> u8 {
        match self {
            FixedField::WifiSsid0
            | FixedField::WifiPassword0
            | FixedField::WifiSsid1
            | FixedField::WifiPassword1 => 0,
            FixedField::BoardName => 2,
            _ => 1,
        }
    }
}

/// Number of fixed fields a portal session has to receive.
pub const FIXED_FIELD_COUNT: usize = FixedField::COUNT;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortalRequest {
    /// Neither `key` nor `value` given: serve the form.
    Form,
    Update { key: String, value: String },
}

impl PortalRequest {
    /// Parses the query string (or the whole request target) of a portal request.
    pub fn from_query(query: &str) -> Self {
        let key = query_param(query, "key").unwrap_or_default();
        let value = query_param(query, "value").unwrap_or_default();
        if key.is_empty() && value.is_empty() {
            PortalRequest::Form
        } else {
            PortalRequest::Update { key, value }
        }
    }
}

/// What to answer a portal request with. The status is always `200`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl PortalResponse {
    /// The rendered form, with caching disabled.
    pub fn page(body: String, options: &PortalOptions) -> Self {
        let mut headers = vec![
            ("Cache-Control", String::from("no-cache, no-store, must-revalidate")),
            ("Pragma", String::from("no-cache")),
            ("Expires", String::from("-1")),
        ];
        if let Some(origin) = &options.cors_origin {
            headers.push(("Access-Control-Allow-Origin", origin.clone()));
        }

        Self {
            status: 200,
            content_type: CONTENT_TYPE_HTML,
            headers,
            body,
        }
    }

    pub fn ack() -> Self {
        Self {
            status: 200,
            content_type: CONTENT_TYPE_HTML,
            headers: Vec::new(),
            body: String::from(ACK_BODY),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_keys() {
        assert_eq!(FIXED_FIELD_COUNT, 10);
        assert_eq!("sv1".parse::<FixedField>(), Ok(FixedField::Server1));
        assert_eq!(FixedField::BoardName.key(), "nm");
        assert!("mq".parse::<FixedField>().is_err());
    }

    #[test]
    fn request_kinds() {
        assert_eq!(PortalRequest::from_query("/"), PortalRequest::Form);
        assert_eq!(PortalRequest::from_query("key=&value="), PortalRequest::Form);
        assert_eq!(
            PortalRequest::from_query("/?key=pw&value=a%26b"),
            PortalRequest::Update {
                key: String::from("pw"),
                value: String::from("a&b"),
            }
        );
    }

    #[test]
    fn page_headers() {
        let response = PortalResponse::page(String::new(), &PortalOptions::default());
        assert_eq!(response.status, 200);
        assert_eq!(
            response.header("cache-control"),
            Some("no-cache, no-store, must-revalidate")
        );
        assert_eq!(response.header("Expires"), Some("-1"));
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));

        let no_cors = PortalOptions {
            cors_origin: None,
            ..Default::default()
        };
        assert_eq!(
            PortalResponse::page(String::new(), &no_cors).header("Access-Control-Allow-Origin"),
            None
        );
        assert_eq!(PortalResponse::ack().body, "OK");
    }
}
