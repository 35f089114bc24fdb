//! Static description of the queryable record store.
//!
//! A [`SchemaDescription`] is only ever used as prompt context for query
//! synthesis. It is built once at startup and shared behind an `Arc`.

use serde::{Deserialize, Serialize};

/// One column of the described entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    pub name: String,
    /// What the column means, in plain language.
    pub meaning: String,
    /// A representative value, shown to the generator as an example.
    #[serde(default)]
    pub example: Option<String>,
}

impl FieldDescription {
    pub fn new(name: &str, meaning: &str, example: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            meaning: meaning.to_string(),
            example: example.map(str::to_string),
        }
    }
}

/// Entity name plus its ordered field list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub entity: String,
    pub fields: Vec<FieldDescription>,
}

impl SchemaDescription {
    /// The outlet table shipped with the default store layout.
    pub fn outlets() -> Self {
        Self {
            entity: "subway".to_string(),
            fields: vec![
                FieldDescription::new(
                    "outlet_name",
                    "the Subway outlet name",
                    Some("Subway Menara UOA Bangsar"),
                ),
                FieldDescription::new(
                    "address",
                    "the address of a Subway outlet",
                    Some("Jalan Bangsar Utama 1, Unit 1-2-G, Menara UOA Bangsar, Kuala Lumpur, 59000"),
                ),
                FieldDescription::new(
                    "opening_hours",
                    "the time of a Subway outlet operating",
                    Some("Monday - Sunday, 8:00 AM - 8:00 PM"),
                ),
                FieldDescription::new(
                    "waze_link",
                    "a link to the Waze platform for navigation to the Subway outlet",
                    None,
                ),
                FieldDescription::new(
                    "gmaps_link",
                    "a link to Google Maps for navigation to the Subway outlet",
                    None,
                ),
                FieldDescription::new(
                    "latitude",
                    "latitude of the outlet in decimal degrees",
                    Some("3.1390"),
                ),
                FieldDescription::new(
                    "longitude",
                    "longitude of the outlet in decimal degrees",
                    Some("101.6869"),
                ),
            ],
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Render the field list as prompt lines: `name: meaning. For example, …`.
    pub fn render_fields(&self) -> String {
        self.fields
            .iter()
            .map(|f| match &f.example {
                Some(ex) => format!("{}: {}. For example, {ex}.", f.name, f.meaning),
                None => format!("{}: {}.", f.name, f.meaning),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for SchemaDescription {
    fn default() -> Self {
        Self::outlets()
    }
}
