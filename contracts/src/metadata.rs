//! Property metadata as published alongside each registry token.
//!
//! The JSON shape matches the marketplace's token metadata documents: a name,
//! a street address, a description, an image URL, and a list of
//! `trait_type`/`value` attributes (purchase price, type of residence,
//! bedrooms, bathrooms, square feet, year built).

use serde::{Deserialize, Serialize};

/// A single `trait_type`/`value` attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: serde_json::Value,
}

/// Descriptive metadata for one property token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMetadata {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl PropertyMetadata {
    /// Looks up an attribute by its `trait_type`, case-insensitively.
    pub fn attribute(&self, trait_type: &str) -> Option<&serde_json::Value> {
        self.attributes
            .iter()
            .find(|a| a.trait_type.eq_ignore_ascii_case(trait_type))
            .map(|a| &a.value)
    }

    /// Advertised purchase price as written in the metadata (ether string).
    pub fn purchase_price(&self) -> Option<String> {
        self.attribute("Purchase Price").map(value_to_string)
    }

    pub fn bedrooms(&self) -> Option<u64> {
        self.attribute("Bed Rooms").and_then(value_to_u64)
    }

    pub fn bathrooms(&self) -> Option<u64> {
        self.attribute("Bathrooms").and_then(value_to_u64)
    }

    pub fn square_feet(&self) -> Option<u64> {
        self.attribute("Square Feet").and_then(value_to_u64)
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Metadata documents are hand-written, so numbers show up both as JSON
// numbers and as strings.
fn value_to_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "Luxury NYC Penthouse",
        "address": "157 W 57th St APT 49B, New York, NY 10019",
        "description": "Luxury Penthouse located in the heart of NYC",
        "image": "https://ipfs.io/ipfs/QmQUozrHLAusXDxrvsESJ3PYB3rUeUuBAvVWw6nop2uu7c/1.png",
        "id": "1",
        "attributes": [
            { "trait_type": "Purchase Price", "value": 20 },
            { "trait_type": "Type of Residence", "value": "Condo" },
            { "trait_type": "Bed Rooms", "value": 2 },
            { "trait_type": "Bathrooms", "value": "3" },
            { "trait_type": "Square Feet", "value": 2200 },
            { "trait_type": "Year Built", "value": 2013 }
        ]
    }"#;

    #[test]
    fn parses_marketplace_document() {
        let meta: PropertyMetadata = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(meta.name, "Luxury NYC Penthouse");
        assert_eq!(meta.purchase_price().as_deref(), Some("20"));
        assert_eq!(meta.bedrooms(), Some(2));
        assert_eq!(meta.bathrooms(), Some(3));
        assert_eq!(meta.square_feet(), Some(2200));
    }

    #[test]
    fn missing_attributes_are_none() {
        let meta: PropertyMetadata = serde_json::from_str(r#"{ "name": "Shed" }"#).unwrap();
        assert!(meta.attributes.is_empty());
        assert_eq!(meta.bedrooms(), None);
        assert_eq!(meta.purchase_price(), None);
    }
}
