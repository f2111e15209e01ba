//! Summary aggregation: every summary topic is queried at once and the
//! replies are merged into one record.

use crate::agent::AgentError;
use crate::subject::Subject;
use crate::summary::Summary;
use crate::topic::{Topic, TopicRecord, TopicSource};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;

pub struct Aggregator {
    source: Arc<dyn TopicSource>,
}

impl Aggregator {
    pub fn new(source: Arc<dyn TopicSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn TopicSource> {
        &self.source
    }

    /// Query all summary topics concurrently and merge them.
    ///
    /// Waits for every call to settle. If any topic failed, the first failure
    /// (in topic order) is returned and nothing is merged.
    pub async fn aggregate(&self, subject: &Subject) -> Result<Summary, AgentError> {
        let started = Instant::now();

        let calls = Topic::SUMMARY
            .iter()
            .map(|&topic| self.source.fetch(topic, subject));

        let records = join_all(calls)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                tracing::error!(subject = %subject.name, error = %e, "summary aborted");
                e
            })?;

        let summary = merge(records);
        tracing::info!(
            subject = %subject.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "summary assembled"
        );
        Ok(summary)
    }
}

/// Fold topic records into a summary. Later records win on overlap, except
/// that a blank description never overwrites a filled one.
pub fn merge(records: impl IntoIterator<Item = TopicRecord>) -> Summary {
    let mut summary = Summary::default();
    for record in records {
        match record {
            TopicRecord::Cases { cases } => summary.cases = cases,
            TopicRecord::Dynasty { dynasty } => summary.dynasty = dynasty,
            TopicRecord::Careers { careers } => summary.careers = careers,
            TopicRecord::Projects { projects } => summary.projects = projects,
            TopicRecord::Legislations { legislations } => summary.legislations = legislations,
            TopicRecord::Education { education } => summary.education = education,
            TopicRecord::Names {
                common_name,
                legal_name,
                description,
            } => {
                summary.common_name = common_name;
                summary.legal_name = legal_name;
                if !description.is_empty() {
                    summary.description = description;
                }
            }
            TopicRecord::Description { description } => {
                if !description.is_empty() {
                    summary.description = description;
                }
            }
        }
    }
    summary
}
