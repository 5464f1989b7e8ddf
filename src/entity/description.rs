use std::path::Path;
use std::time::Duration;

use bytes::Bytes;

use crate::utils::error::{BusError, Result};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const SCHEMA_INSTANCE_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const CONNECT_NS: &str = "http://schemas.microsoft.com/netservices/2010/10/servicebus/connect";

/// Body of an entity creation request.
///
/// The client passes it through untouched; the builders below only exist to
/// produce the common Atom documents without hand-written XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescription(Bytes);

impl EntityDescription {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self(body.into())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read(path).map_err(|e| {
            BusError::InvalidArgument(format!(
                "cannot read entity description {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self(Bytes::from(body)))
    }

    /// Topic with a default message time-to-live and a size cap.
    pub fn topic(default_ttl: Duration, max_size_mb: u64) -> Self {
        let inner = format!(
            "<DefaultMessageTimeToLive>PT{}S</DefaultMessageTimeToLive>\
             <MaxSizeInMegabytes>{}</MaxSizeInMegabytes>",
            default_ttl.as_secs(),
            max_size_mb
        );
        Self::atom_entry("TopicDescription", &inner)
    }

    pub fn queue(default_ttl: Duration, max_size_mb: u64) -> Self {
        let inner = format!(
            "<DefaultMessageTimeToLive>PT{}S</DefaultMessageTimeToLive>\
             <MaxSizeInMegabytes>{}</MaxSizeInMegabytes>",
            default_ttl.as_secs(),
            max_size_mb
        );
        Self::atom_entry("QueueDescription", &inner)
    }

    /// Subscription with broker defaults.
    pub fn subscription() -> Self {
        Self::atom_entry("SubscriptionDescription", "")
    }

    /// Rule filtering on a SQL expression over message properties.
    pub fn sql_rule(expression: &str) -> Self {
        let inner = format!(
            "<Filter i:type=\"SqlFilter\"><SqlExpression>{}</SqlExpression></Filter>\
             <Action i:type=\"EmptyRuleAction\"/>",
            escape_xml(expression)
        );
        Self::atom_entry("RuleDescription", &inner)
    }

    pub fn body(&self) -> &Bytes {
        &self.0
    }

    fn atom_entry(element: &str, inner: &str) -> Self {
        let xml = format!(
            "<entry xmlns=\"{ATOM_NS}\"><content type=\"application/xml\">\
             <{element} xmlns:i=\"{SCHEMA_INSTANCE_NS}\" xmlns=\"{CONNECT_NS}\">{inner}</{element}>\
             </content></entry>"
        );
        Self(Bytes::from(xml))
    }
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
