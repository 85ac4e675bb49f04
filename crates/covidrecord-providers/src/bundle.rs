//! FHIR `Bundle` search-set envelope and the datatypes shared by the
//! resources the providers read.
//!
//! Only the fields the provider layer reads are modelled; everything else
//! in the payload is ignored by serde.

use serde::{Deserialize, Serialize};

/// A search-set bundle whose entries hold resources of type `R`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub struct Bundle<R> {
    #[serde(default)]
    pub meta: Meta,

    #[serde(default)]
    pub link: Vec<BundleLink>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    #[serde(default = "Vec::new")]
    pub entry: Vec<BundleEntry<R>>,
}

impl<R> Bundle<R> {
    /// Returns the URL of the first link with relation `next`.
    #[must_use]
    pub fn next_link(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|link| link.relation == "next")
            .map(|link| link.url.as_str())
            .filter(|url| !url.is_empty())
    }

    /// Iterates over the resources of every entry, in order.
    pub fn resources(&self) -> impl Iterator<Item = &R> {
        self.entry.iter().map(|entry| &entry.resource)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// A navigation link (`self`, `first`, `next`, `last`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry<R> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    pub resource: R,
}

/// A code drawn from a terminology system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// A concept expressed as one or more codings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default)]
    pub coding: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A reference to another resource, with an optional display label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// A person's name as recorded on a `Patient`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanName {
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub name_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default)]
    pub given: Vec<String>,
}

impl HumanName {
    /// Joins the given names and the family name with single spaces.
    #[must_use]
    pub fn joined(&self) -> String {
        self.given
            .iter()
            .map(String::as_str)
            .chain(self.family.as_deref())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_link() {
        let bundle: Bundle<serde_json::Value> = serde_json::from_value(json!({
            "resourceType": "Bundle",
            "link": [
                {"relation": "self", "url": "https://example.com/page1"},
                {"relation": "next", "url": "https://example.com/page2"},
                {"relation": "next", "url": "https://example.com/ignored"}
            ],
            "entry": []
        }))
        .unwrap();
        assert_eq!(bundle.next_link(), Some("https://example.com/page2"));
    }

    #[test]
    fn test_missing_links_and_entries() {
        let bundle: Bundle<serde_json::Value> =
            serde_json::from_value(json!({"resourceType": "Bundle", "total": 0})).unwrap();
        assert!(bundle.next_link().is_none());
        assert!(bundle.entry.is_empty());
        assert_eq!(bundle.total, Some(0));
    }

    #[test]
    fn test_empty_next_url_is_ignored() {
        let bundle: Bundle<serde_json::Value> = serde_json::from_value(json!({
            "link": [{"relation": "next", "url": ""}]
        }))
        .unwrap();
        assert!(bundle.next_link().is_none());
    }

    #[test]
    fn test_human_name_joined() {
        let name: HumanName = serde_json::from_value(json!({
            "use": "usual",
            "family": "Doe",
            "given": ["Jane", "X"]
        }))
        .unwrap();
        assert_eq!(name.joined(), "Jane X Doe");
        assert_eq!(name.name_use.as_deref(), Some("usual"));
        assert_eq!(HumanName::default().joined(), "");
    }

    #[test]
    fn test_meta_and_full_url() {
        let bundle: Bundle<serde_json::Value> = serde_json::from_value(json!({
            "meta": {"lastUpdated": "2020-11-09T22:49:27.580+00:00"},
            "entry": [{"fullUrl": "https://example.com/Immunization/1", "resource": {"id": "1"}}]
        }))
        .unwrap();
        assert_eq!(
            bundle.meta.last_updated.as_deref(),
            Some("2020-11-09T22:49:27.580+00:00")
        );
        assert_eq!(
            bundle.entry[0].full_url.as_deref(),
            Some("https://example.com/Immunization/1")
        );
        assert_eq!(bundle.resources().count(), 1);
    }
}
