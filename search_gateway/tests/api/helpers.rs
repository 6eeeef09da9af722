use std::{
    net::TcpListener,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    domain::entities::{
        embedding::{Embedding, EMBEDDING_DIMENSION},
        image_point::{ImagePoint, ImagePointMetadata, ScoredImagePoint},
        image_record::ImageDocument,
    },
    ports::{
        embedder::{Embedder, EmbeddingClientError, EmbeddingInput},
        keyword_index::{KeywordIndex, KeywordIndexError},
        vector_index::{VectorIndex, VectorIndexError},
    },
    telemetry::{get_tracing_subscriber, init_tracing_subscriber},
};
use once_cell::sync::Lazy;
use search_gateway::{
    domain::services::{
        keyword_search_ranker::KeywordSearchRanker, semantic_search_ranker::SemanticSearchRanker,
    },
    startup::run,
};
use serde_json::Value as JsonValue;

// Ensures that the `tracing` stack is only initialized once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber);
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber);
    };
});

/// Keyword index behaving like the Meilisearch one: overlap filter, most recent first
#[derive(Default)]
pub struct InMemoryKeywordIndex {
    pub documents: Mutex<Vec<ImageDocument>>,
    pub overlap_queries: Mutex<Vec<(Vec<String>, usize)>>,
    pub failing: bool,
}

impl InMemoryKeywordIndex {
    fn sorted_documents(&self) -> Vec<ImageDocument> {
        let mut documents = self.documents.lock().unwrap().clone();
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        documents
    }

    fn check_failing(&self) -> Result<(), KeywordIndexError> {
        if self.failing {
            return Err(KeywordIndexError::Backend(
                "connection refused to keyword index".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KeywordIndex for InMemoryKeywordIndex {
    async fn upsert(&self, document: &ImageDocument) -> Result<(), KeywordIndexError> {
        self.check_failing()?;
        let mut documents = self.documents.lock().unwrap();
        documents.retain(|stored| stored.id != document.id);
        documents.push(document.clone());
        Ok(())
    }

    async fn query_by_keyword_overlap(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<ImageDocument>, KeywordIndexError> {
        self.check_failing()?;
        self.overlap_queries
            .lock()
            .unwrap()
            .push((keywords.to_vec(), limit));

        Ok(self
            .sorted_documents()
            .into_iter()
            .filter(|document| document.keywords.iter().any(|k| keywords.contains(k)))
            .take(limit)
            .collect())
    }

    async fn query_recent(&self, limit: usize) -> Result<Vec<ImageDocument>, KeywordIndexError> {
        self.check_failing()?;
        Ok(self.sorted_documents().into_iter().take(limit).collect())
    }
}

/// Vector index answering with scripted neighbours, most similar first
#[derive(Default)]
pub struct ScriptedVectorIndex {
    pub neighbours: Vec<ScoredImagePoint>,
}

#[async_trait]
impl VectorIndex for ScriptedVectorIndex {
    async fn upsert(&self, _point: &ImagePoint) -> Result<(), VectorIndexError> {
        Ok(())
    }

    async fn query_nearest(
        &self,
        _vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredImagePoint>, VectorIndexError> {
        Ok(self.neighbours.iter().take(top_k).cloned().collect())
    }
}

#[derive(Default)]
pub struct FakeEmbedder {
    pub failing: bool,
    pub inputs: Mutex<Vec<EmbeddingInput>>,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, input: &EmbeddingInput) -> Result<Embedding, EmbeddingClientError> {
        self.inputs.lock().unwrap().push(input.clone());
        if self.failing {
            return Err(EmbeddingClientError::EmptyPrediction);
        }
        Ok(Embedding::Text(vec![0.01; EMBEDDING_DIMENSION]))
    }
}

pub struct TestApp {
    pub address: String,
    pub keyword_index: Arc<InMemoryKeywordIndex>,
    pub embedder: Arc<FakeEmbedder>,
}

/// A test API client
impl TestApp {
    pub async fn post_search(&self, body: &JsonValue) -> reqwest::Response {
        self.post("search", body).await
    }

    pub async fn post_semantic_search(&self, body: &JsonValue) -> reqwest::Response {
        self.post("semantic_search", body).await
    }

    async fn post(&self, path: &str, body: &JsonValue) -> reqwest::Response {
        reqwest::Client::new()
            .post(&format!("{}/{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

pub struct TestAppBuilder {
    keyword_index: InMemoryKeywordIndex,
    vector_index: ScriptedVectorIndex,
    embedder: FakeEmbedder,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            keyword_index: InMemoryKeywordIndex::default(),
            vector_index: ScriptedVectorIndex::default(),
            embedder: FakeEmbedder::default(),
        }
    }

    pub fn with_documents(mut self, documents: Vec<ImageDocument>) -> Self {
        self.keyword_index.documents = Mutex::new(documents);
        self
    }

    pub fn with_failing_keyword_index(mut self) -> Self {
        self.keyword_index.failing = true;
        self
    }

    pub fn with_neighbours(mut self, neighbours: Vec<ScoredImagePoint>) -> Self {
        self.vector_index.neighbours = neighbours;
        self
    }

    pub fn with_failing_embedder(mut self) -> Self {
        self.embedder.failing = true;
        self
    }

    /// Launches the server as a background task on a random port
    pub async fn spawn(self) -> TestApp {
        Lazy::force(&TRACING);

        let keyword_index = Arc::new(self.keyword_index);
        let embedder = Arc::new(self.embedder);

        // Port 0 makes the OS pick an available port
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();

        let server = run(
            listener,
            KeywordSearchRanker::new(keyword_index.clone()),
            SemanticSearchRanker::new(embedder.clone(), Arc::new(self.vector_index)),
            Some(1),
        )
        .expect("Failed to run server");

        let _ = tokio::spawn(server);

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            keyword_index,
            embedder,
        }
    }
}

pub async fn spawn_app() -> TestApp {
    TestAppBuilder::new().spawn().await
}

pub fn uploaded_at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
}

pub fn document(id: &str, description: &str, uploaded_at: DateTime<Utc>) -> ImageDocument {
    ImageDocument {
        id: id.to_string(),
        source_uri: format!("gs://images/{}.png", id),
        public_url: format!("https://storage.example.com/images/{}.png", id),
        title: format!("Title of {}", id),
        description: description.to_string(),
        keywords: common::core::keyword_extractor::extract_keywords(description),
        uploaded_at,
    }
}

pub fn neighbour(id: &str, score: f32) -> ScoredImagePoint {
    ScoredImagePoint {
        id: id.to_string(),
        score,
        metadata: ImagePointMetadata {
            title: format!("Title of {}", id),
            description: format!("Description of {}", id),
            public_url: format!("https://storage.example.com/images/{}.png", id),
            uploaded_at: uploaded_at(0),
        },
    }
}

/// Ids of the `results` of a search response body
pub fn result_ids(body: &JsonValue) -> Vec<String> {
    body["results"]
        .as_array()
        .expect("No results in response body")
        .iter()
        .map(|result| result["id"].as_str().unwrap().to_string())
        .collect()
}
