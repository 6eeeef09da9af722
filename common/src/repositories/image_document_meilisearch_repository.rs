use std::time::Duration;

use async_trait::async_trait;
use meilisearch_sdk::{task_info::TaskInfo, Client};
use tracing::{info, warn};

use crate::{
    domain::entities::image_record::ImageDocument,
    helper::error_chain_fmt,
    ports::keyword_index::{KeywordIndex, KeywordIndexError, MAX_OVERLAP_QUERY_KEYWORDS},
};

const PRIMARY_KEY: &str = "id";
const KEYWORDS_ATTRIBUTE: &str = "keywords";
const UPLOADED_AT_ATTRIBUTE: &str = "uploaded_at";
const MOST_RECENT_FIRST: [&str; 1] = ["uploaded_at:desc"];

/// Repository for `ImageDocument` persisted in Meilisearch
pub struct ImageDocumentMeilisearchRepository {
    client: Client,
    index: String,
    /// Longest wait for a task to be processed before it is reported as failed
    task_timeout: Duration,
}

impl ImageDocumentMeilisearchRepository {
    /// Prepares the index so documents can be filtered by keyword and sorted by upload time
    ///
    /// Setting the same attributes again leaves the index unchanged.
    #[tracing::instrument(
        name = "Initializing Meilisearch and the associated index",
        skip(client)
    )]
    pub async fn try_new(
        client: Client,
        index: &str,
        task_timeout: Duration,
    ) -> Result<Self, ImageDocumentMeilisearchRepositoryError> {
        let images = client.index(index);

        let filterable_task = images
            .set_filterable_attributes(&[KEYWORDS_ATTRIBUTE])
            .await?;
        let sortable_task = images
            .set_sortable_attributes(&[UPLOADED_AT_ATTRIBUTE])
            .await?;

        for task in [filterable_task, sortable_task] {
            let task = task
                .wait_for_completion(&client, None, Some(task_timeout))
                .await?;
            if task.is_failure() {
                return Err(ImageDocumentMeilisearchRepositoryError::IndexSettingsError(
                    format!("{:?}", task),
                ));
            }
        }

        info!(index, "Meilisearch index is ready");

        Ok(Self {
            client,
            index: index.to_string(),
            task_timeout,
        })
    }

    #[tracing::instrument(name = "Saving image document to Meilisearch", skip(self, document), fields(id = %document.id))]
    pub async fn save(
        &self,
        document: &ImageDocument,
    ) -> Result<(), ImageDocumentMeilisearchRepositoryError> {
        let task: TaskInfo = self
            .client
            .index(&self.index)
            .add_or_replace(&[document], Some(PRIMARY_KEY))
            .await?;

        // Indexing is asynchronous on Meilisearch side: the document is searchable once the task succeeded
        let task = task
            .wait_for_completion(&self.client, None, Some(self.task_timeout))
            .await?;
        if task.is_failure() {
            return Err(ImageDocumentMeilisearchRepositoryError::IndexingError(
                format!("{:?}", task),
            ));
        }

        info!("Saved image document");
        Ok(())
    }

    #[tracing::instrument(name = "Searching image documents by keywords in Meilisearch", skip(self))]
    pub async fn search_by_keywords(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<ImageDocument>, ImageDocumentMeilisearchRepositoryError> {
        let filter = keywords_filter(keywords);

        let result = self
            .client
            .index(&self.index)
            .search()
            .with_filter(&filter)
            .with_sort(&MOST_RECENT_FIRST)
            .with_limit(limit)
            .execute::<ImageDocument>()
            .await?;

        info!(hits = result.hits.len(), "Found image documents");

        Ok(result.hits.into_iter().map(|hit| hit.result).collect())
    }

    #[tracing::instrument(name = "Listing recent image documents from Meilisearch", skip(self))]
    pub async fn search_recent(
        &self,
        limit: usize,
    ) -> Result<Vec<ImageDocument>, ImageDocumentMeilisearchRepositoryError> {
        let result = self
            .client
            .index(&self.index)
            .search()
            .with_sort(&MOST_RECENT_FIRST)
            .with_limit(limit)
            .execute::<ImageDocument>()
            .await?;

        Ok(result.hits.into_iter().map(|hit| hit.result).collect())
    }
}

/// Meilisearch filter matching documents holding at least one of `keywords`
fn keywords_filter(keywords: &[String]) -> String {
    let values: Vec<String> = keywords
        .iter()
        .map(|keyword| format!("\"{}\"", keyword.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();

    format!("{} IN [{}]", KEYWORDS_ATTRIBUTE, values.join(", "))
}

#[async_trait]
impl KeywordIndex for ImageDocumentMeilisearchRepository {
    async fn upsert(&self, document: &ImageDocument) -> Result<(), KeywordIndexError> {
        Ok(self.save(document).await?)
    }

    async fn query_by_keyword_overlap(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<ImageDocument>, KeywordIndexError> {
        if keywords.len() > MAX_OVERLAP_QUERY_KEYWORDS {
            return Err(KeywordIndexError::TooManyKeywords {
                count: keywords.len(),
                max: MAX_OVERLAP_QUERY_KEYWORDS,
            });
        }

        if keywords.is_empty() {
            warn!("Keyword overlap query without keywords, nothing can match");
            return Ok(vec![]);
        }

        Ok(self.search_by_keywords(keywords, limit).await?)
    }

    async fn query_recent(&self, limit: usize) -> Result<Vec<ImageDocument>, KeywordIndexError> {
        Ok(self.search_recent(limit).await?)
    }
}

#[derive(thiserror::Error)]
pub enum ImageDocumentMeilisearchRepositoryError {
    #[error(transparent)]
    MeilisearchError(#[from] meilisearch_sdk::errors::Error),

    #[error("Failed to update the index settings: {0}")]
    IndexSettingsError(String),

    #[error("Failed to index the document: {0}")]
    IndexingError(String),
}

impl std::fmt::Debug for ImageDocumentMeilisearchRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl From<ImageDocumentMeilisearchRepositoryError> for KeywordIndexError {
    fn from(error: ImageDocumentMeilisearchRepositoryError) -> Self {
        KeywordIndexError::Backend(error.to_string())
    }
}
