//! Summary struct - the composite record assembled from every topic.
//!
//! All fields are strings on the wire. A field the model had nothing for is
//! `""`, and that includes list-valued fields: an empty list serializes as
//! `""` so existing consumers keep working.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Composite record for one subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(default, deserialize_with = "lenient_text")]
    pub common_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub legal_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(default)]
    pub cases: Listing<Case>,
    #[serde(default)]
    pub dynasty: Listing<DynastyMember>,
    #[serde(default)]
    pub careers: Listing<Career>,
    #[serde(default)]
    pub projects: Listing<Project>,
    #[serde(default)]
    pub legislations: Listing<Legislation>,
    #[serde(default)]
    pub education: Listing<Education>,
}

impl Summary {
    /// Check if the summary has any content
    pub fn is_empty(&self) -> bool {
        self.common_name.is_empty()
            && self.legal_name.is_empty()
            && self.description.is_empty()
            && self.cases.is_empty()
            && self.dynasty.is_empty()
            && self.careers.is_empty()
            && self.projects.is_empty()
            && self.legislations.is_empty()
            && self.education.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date_filed: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub link: String,
}

/// A relative holding or having held public office.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynastyMember {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub relationship: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub position: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Career {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub start_date: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub end_date: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub link: String,
}

/// A bill or resolution authored or sponsored by the subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Legislation {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date_filed: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    #[serde(default, deserialize_with = "lenient_text")]
    pub school: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub degree: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub year: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub link: String,
}

/// Names currently trending in Philippine politics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trending {
    #[serde(default)]
    pub trending: Vec<String>,
}

/// A list field that is `""` on the wire when empty.
///
/// Accepts an array, a single object, `""`, any other string, or `null` on
/// input. Strings and `null` read as empty. Array elements that are not
/// objects are dropped. Numbers and booleans are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T>(pub Vec<T>);

impl<T> Listing<T> {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(items: Vec<T>) -> Self {
        Self(items)
    }
}

impl<T: Serialize> Serialize for Listing<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            serializer.serialize_str("")
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Listing<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = match Value::deserialize(deserializer)? {
            // null and scalar elements carry no entry; skip them rather than guess
            Value::Array(items) => items
                .into_iter()
                .filter(Value::is_object)
                .map(serde_json::from_value)
                .collect::<Result<Vec<T>, _>>()
                .map_err(<D::Error as de::Error>::custom)?,
            Value::Object(map) => {
                vec![serde_json::from_value(Value::Object(map)).map_err(<D::Error as de::Error>::custom)?]
            }
            Value::Null | Value::String(_) => Vec::new(),
            other => {
                return Err(de::Error::custom(format!(
                    "expected a list of entries, found {}",
                    other
                )))
            }
        };
        Ok(Listing(items))
    }
}

/// Read any JSON scalar as text; `null` and absent become `""`.
pub(crate) fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}
