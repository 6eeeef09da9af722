use claims::{assert_matches, assert_ok};
use common::{
    domain::entities::embedding::{Embedding, EMBEDDING_DIMENSION},
    ports::embedder::{Embedder, EmbeddingClientError, EmbeddingInput},
    services::{embedding_client::VertexEmbeddingClient, vertex_ai::RemoteCallError},
};
use ingestion_worker::{
    domain::services::description_client::VertexDescriptionClient,
    ports::image_describer::{DescriptionClientError, ImageDescriber},
};
use serde_json::json;

use crate::helpers::{
    gemini_answer, image_embedding_answer, spawn_fake_vertex_ai, text_embedding_answer,
    vertex_error, FakeVertexAi,
};

fn description_client(vertex_ai: &FakeVertexAi) -> VertexDescriptionClient {
    VertexDescriptionClient::new(vertex_ai.client(), vertex_ai.retry_policy())
}

fn embedding_client(vertex_ai: &FakeVertexAi) -> VertexEmbeddingClient {
    VertexEmbeddingClient::new(vertex_ai.client(), vertex_ai.retry_policy())
}

#[tokio::test(flavor = "multi_thread")]
async fn fenced_json_answer_is_read_as_title_and_description() {
    let vertex_ai = spawn_fake_vertex_ai(vec![gemini_answer(
        "```json\n{\"title\": \"Dog on a beach\", \"description\": \"A golden retriever on a beach\"}\n```",
    )])
    .await;

    let description = assert_ok!(
        description_client(&vertex_ai)
            .describe("gs://images/dog.png", "image/png")
            .await
    );

    assert_eq!(description.title, "Dog on a beach");
    assert_eq!(description.description, "A golden retriever on a beach");

    let requests = vertex_ai.received_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0]["contents"][0]["parts"][1]["fileData"],
        json!({ "mimeType": "image/png", "fileUri": "gs://images/dog.png" })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn non_json_answer_is_kept_as_an_untitled_description() {
    let answer = "A busy street at night with neon signs reading OPEN.";
    let vertex_ai = spawn_fake_vertex_ai(vec![gemini_answer(answer)]).await;

    let description = assert_ok!(
        description_client(&vertex_ai)
            .describe("gs://images/street.png", "image/png")
            .await
    );

    assert_eq!(description.title, "Untitled Image");
    assert_eq!(description.description, answer);
}

#[tokio::test(flavor = "multi_thread")]
async fn answer_without_text_is_an_error() {
    let vertex_ai = spawn_fake_vertex_ai(vec![(200, json!({ "candidates": [] }))]).await;

    let result = description_client(&vertex_ai)
        .describe("gs://images/empty.png", "image/png")
        .await;

    assert_matches!(result, Err(DescriptionClientError::NoContent));
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limited_description_is_retried_until_it_succeeds() {
    let vertex_ai = spawn_fake_vertex_ai(vec![
        vertex_error(429, "RESOURCE_EXHAUSTED"),
        vertex_error(429, "RESOURCE_EXHAUSTED"),
        gemini_answer(r#"{"title": "Mountain lake", "description": "A lake below snowy peaks"}"#),
    ])
    .await;

    let description = assert_ok!(
        description_client(&vertex_ai)
            .describe("gs://images/lake.png", "image/png")
            .await
    );

    assert_eq!(description.title, "Mountain lake");
    assert_eq!(vertex_ai.received_requests().len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn always_rate_limited_description_gives_up_after_max_attempts() {
    let vertex_ai = spawn_fake_vertex_ai(vec![vertex_error(429, "RESOURCE_EXHAUSTED")]).await;

    let result = description_client(&vertex_ai)
        .describe("gs://images/lake.png", "image/png")
        .await;

    assert_matches!(
        result,
        Err(DescriptionClientError::RemoteCall(RemoteCallError::RateLimited { status: 429, .. }))
    );
    assert_eq!(vertex_ai.received_requests().len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_description_error_is_not_retried() {
    let vertex_ai = spawn_fake_vertex_ai(vec![vertex_error(400, "INVALID_ARGUMENT")]).await;

    let result = description_client(&vertex_ai)
        .describe("gs://images/missing.png", "image/png")
        .await;

    assert_matches!(
        result,
        Err(DescriptionClientError::RemoteCall(RemoteCallError::Status { status: 400, .. }))
    );
    assert_eq!(vertex_ai.received_requests().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn image_embedding_is_requested_with_its_storage_reference() {
    let vertex_ai = spawn_fake_vertex_ai(vec![image_embedding_answer(EMBEDDING_DIMENSION)]).await;

    let embedding = assert_ok!(
        embedding_client(&vertex_ai)
            .embed(&EmbeddingInput::image("gs://images/dog.png"))
            .await
    );

    assert_matches!(embedding, Embedding::Image(ref vector) if vector.len() == EMBEDDING_DIMENSION);
    assert_eq!(
        vertex_ai.received_requests(),
        vec![json!({
            "instances": [{ "image": { "gcsUri": "gs://images/dog.png" } }],
            "parameters": { "dimension": 1408 }
        })]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn text_embedding_is_tagged_as_text() {
    let vertex_ai = spawn_fake_vertex_ai(vec![text_embedding_answer(EMBEDDING_DIMENSION)]).await;

    let embedding = assert_ok!(
        embedding_client(&vertex_ai)
            .embed(&EmbeddingInput::text("golden retriever"))
            .await
    );

    assert_matches!(embedding, Embedding::Text(_));
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_of_another_dimension_is_rejected() {
    let vertex_ai = spawn_fake_vertex_ai(vec![image_embedding_answer(512)]).await;

    let result = embedding_client(&vertex_ai)
        .embed(&EmbeddingInput::image("gs://images/dog.png"))
        .await;

    assert_matches!(
        result,
        Err(EmbeddingClientError::UnexpectedDimension {
            expected: 1408,
            actual: 512
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limited_embedding_is_retried() {
    let vertex_ai = spawn_fake_vertex_ai(vec![
        vertex_error(429, "RESOURCE_EXHAUSTED"),
        image_embedding_answer(EMBEDDING_DIMENSION),
    ])
    .await;

    assert_ok!(
        embedding_client(&vertex_ai)
            .embed(&EmbeddingInput::image("gs://images/dog.png"))
            .await
    );
    assert_eq!(vertex_ai.received_requests().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_without_input_makes_no_request() {
    let vertex_ai = spawn_fake_vertex_ai(vec![image_embedding_answer(EMBEDDING_DIMENSION)]).await;

    let result = embedding_client(&vertex_ai)
        .embed(&EmbeddingInput::default())
        .await;

    assert_matches!(result, Err(EmbeddingClientError::InvalidInput));
    assert!(vertex_ai.received_requests().is_empty());
}
