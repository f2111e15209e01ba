//! Topic queries: one prompt per category of information about a subject.
//!
//! Every topic has a fixed JSON shape. The model is told to restrict itself
//! to trusted domains, never invent entries, and emit nothing but that
//! object, with `""` for anything it could not find.

use crate::agent::{AgentError, ChatModel};
use crate::extract::extract;
use crate::subject::Subject;
use crate::summary::{
    lenient_text, Career, Case, DynastyMember, Education, Legislation, Listing, Project, Trending,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Cases,
    Dynasty,
    Career,
    Projects,
    Bills,
    Education,
    /// Common and legal name, plus a short description
    Names,
    #[serde(rename = "desc")]
    Description,
}

impl Topic {
    /// The seven shapes merged into a `Summary`.
    pub const SUMMARY: [Topic; 7] = [
        Topic::Cases,
        Topic::Dynasty,
        Topic::Career,
        Topic::Projects,
        Topic::Bills,
        Topic::Education,
        Topic::Names,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Cases => "cases",
            Topic::Dynasty => "dynasty",
            Topic::Career => "career",
            Topic::Projects => "projects",
            Topic::Bills => "bills",
            Topic::Education => "education",
            Topic::Names => "names",
            Topic::Description => "desc",
        }
    }

    fn subject_matter(self) -> &'static str {
        match self {
            Topic::Cases => "the criminal, civil and administrative cases filed against",
            Topic::Dynasty => "the relatives who hold or have held public office, by blood or marriage, of",
            Topic::Career => "the public and private career history of",
            Topic::Projects => "the government projects and programs led or funded by",
            Topic::Bills => "the bills and resolutions authored or sponsored by",
            Topic::Education => "the educational background of",
            Topic::Names => "the commonly used name, the full legal name and a two-sentence description of",
            Topic::Description => "a two-sentence neutral description of",
        }
    }

    fn schema(self) -> &'static str {
        match self {
            Topic::Cases => {
                r#"{"cases": [{"title": "", "description": "", "dateFiled": "", "status": "", "link": ""}]}"#
            }
            Topic::Dynasty => {
                r#"{"dynasty": [{"name": "", "relationship": "", "position": "", "link": ""}]}"#
            }
            Topic::Career => {
                r#"{"careers": [{"title": "", "description": "", "startDate": "", "endDate": "", "link": ""}]}"#
            }
            Topic::Projects => {
                r#"{"projects": [{"title": "", "description": "", "date": "", "link": ""}]}"#
            }
            Topic::Bills => {
                r#"{"legislations": [{"title": "", "description": "", "dateFiled": "", "status": "", "link": ""}]}"#
            }
            Topic::Education => {
                r#"{"education": [{"school": "", "degree": "", "year": "", "link": ""}]}"#
            }
            Topic::Names => r#"{"commonName": "", "legalName": "", "description": ""}"#,
            Topic::Description => r#"{"description": ""}"#,
        }
    }

    /// Render the prompt for `subject`.
    pub fn prompt(self, subject: &Subject, domains: &[String]) -> String {
        let who = match subject.locality() {
            Some(locality) => format!("{} {}", subject.name, locality),
            None => subject.name.clone(),
        };
        render_prompt(
            &format!("Find {} {}, a Filipino public figure.", self.subject_matter(), who),
            self.schema(),
            domains,
        )
    }

    /// Decode the extracted object into this topic's record.
    pub fn parse_record(self, mut object: Map<String, Value>) -> Result<TopicRecord, serde_json::Error> {
        let record = match self {
            Topic::Cases => TopicRecord::Cases {
                cases: field(&mut object, "cases")?,
            },
            Topic::Dynasty => TopicRecord::Dynasty {
                dynasty: field(&mut object, "dynasty")?,
            },
            Topic::Career => TopicRecord::Careers {
                careers: field(&mut object, "careers")?,
            },
            Topic::Projects => TopicRecord::Projects {
                projects: field(&mut object, "projects")?,
            },
            Topic::Bills => TopicRecord::Legislations {
                legislations: field(&mut object, "legislations")?,
            },
            Topic::Education => TopicRecord::Education {
                education: field(&mut object, "education")?,
            },
            Topic::Names => TopicRecord::Names {
                common_name: text(&mut object, "commonName")?,
                legal_name: text(&mut object, "legalName")?,
                description: text(&mut object, "description")?,
            },
            Topic::Description => TopicRecord::Description {
                description: text(&mut object, "description")?,
            },
        };
        Ok(record)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cases" => Ok(Topic::Cases),
            "dynasty" => Ok(Topic::Dynasty),
            "career" | "careers" => Ok(Topic::Career),
            "projects" => Ok(Topic::Projects),
            "bills" | "legislations" => Ok(Topic::Bills),
            "education" => Ok(Topic::Education),
            "names" => Ok(Topic::Names),
            "desc" | "description" => Ok(Topic::Description),
            other => Err(UnknownTopic(other.to_string())),
        }
    }
}

/// One topic's payload, serialized exactly as the model was asked to shape it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TopicRecord {
    Cases {
        cases: Listing<Case>,
    },
    Dynasty {
        dynasty: Listing<DynastyMember>,
    },
    Careers {
        careers: Listing<Career>,
    },
    Projects {
        projects: Listing<Project>,
    },
    Legislations {
        legislations: Listing<Legislation>,
    },
    Education {
        education: Listing<Education>,
    },
    Names {
        #[serde(rename = "commonName")]
        common_name: String,
        #[serde(rename = "legalName")]
        legal_name: String,
        description: String,
    },
    Description {
        description: String,
    },
}

/// Anything that can answer topic queries for a subject.
#[async_trait]
pub trait TopicSource: Send + Sync {
    async fn fetch(&self, topic: Topic, subject: &Subject) -> Result<TopicRecord, AgentError>;

    async fn trending(&self) -> Result<Trending, AgentError>;
}

/// Topic queries answered by a chat model.
pub struct TopicClient {
    model: Arc<dyn ChatModel>,
    domains: Vec<String>,
}

impl TopicClient {
    pub fn new(model: Arc<dyn ChatModel>, domains: Vec<String>) -> Self {
        Self { model, domains }
    }

    async fn ask(&self, label: &'static str, prompt: &str) -> Result<Map<String, Value>, AgentError> {
        let text = self.model.complete(prompt).await?;
        extract(&text).map_err(|e| {
            tracing::warn!(topic = label, error = %e, "unusable model reply");
            AgentError::from(e)
        })
    }
}

#[async_trait]
impl TopicSource for TopicClient {
    async fn fetch(&self, topic: Topic, subject: &Subject) -> Result<TopicRecord, AgentError> {
        tracing::info!(topic = topic.as_str(), subject = %subject.name, "querying model");
        let prompt = topic.prompt(subject, &self.domains);
        let object = self.ask(topic.as_str(), &prompt).await?;
        topic
            .parse_record(object)
            .map_err(|source| AgentError::Schema {
                topic: topic.as_str(),
                source,
            })
    }

    async fn trending(&self) -> Result<Trending, AgentError> {
        tracing::info!("querying model for trending figures");
        let prompt = render_prompt(
            "List up to ten Filipino public figures who are most talked about in Philippine news right now.",
            r#"{"trending": ["full name"]}"#,
            &self.domains,
        );
        let mut object = self.ask("trending", &prompt).await?;
        let names = match object.remove("trending") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(lenient_text)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| AgentError::Schema {
                    topic: "trending",
                    source,
                })?,
            _ => Vec::new(),
        };
        Ok(Trending {
            trending: names.into_iter().filter(|n| !n.trim().is_empty()).collect(),
        })
    }
}

fn render_prompt(task: &str, schema: &str, domains: &[String]) -> String {
    format!(
        r#"{task}

Use only information published on these trusted sources: {sources}.
Never invent or guess entries. If no credible information exists, keep every field as an empty string "".

You MUST respond with exactly one JSON object matching this schema:
{schema}

Do not include any explanation, citations or text outside the JSON object."#,
        task = task,
        sources = domains.join(", "),
        schema = schema,
    )
}

fn field<T: DeserializeOwned + Default>(
    object: &mut Map<String, Value>,
    key: &str,
) -> Result<T, serde_json::Error> {
    match object.remove(key) {
        Some(value) => serde_json::from_value(value),
        None => Ok(T::default()),
    }
}

fn text(object: &mut Map<String, Value>, key: &str) -> Result<String, serde_json::Error> {
    lenient_text(object.remove(key).unwrap_or(Value::Null))
}
