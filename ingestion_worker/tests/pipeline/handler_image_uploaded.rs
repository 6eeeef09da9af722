use std::time::Duration;

use claims::assert_matches;
use common::domain::entities::embedding::EMBEDDING_DIMENSION;
use ingestion_worker::{
    domain::services::ingestion_pipeline::IngestionOutcome,
    handlers::handler_image_uploaded::execute_handler,
};

use crate::helpers::{
    build_pipeline, description, image_upload, working_pipeline, FakeEmbedder,
    FakeImageDescriber,
};

#[tokio::test]
async fn ingestion_within_its_budget_is_indexed() {
    let app = working_pipeline(vec![Some(description("Red car", "A red car parked on a street"))]);

    let outcome = execute_handler(
        &app.pipeline,
        Duration::from_secs(5),
        &image_upload("cars/red-car.png"),
    )
    .await;

    assert_matches!(outcome, IngestionOutcome::Indexed(_));
}

#[tokio::test(start_paused = true)]
async fn ingestion_exceeding_its_budget_fails_without_writing() {
    let describer = FakeImageDescriber {
        delay: Duration::from_secs(60),
        ..FakeImageDescriber::answering(vec![Some(description("Slow", "A slow description"))])
    };
    let app = build_pipeline(describer, FakeEmbedder::returning(EMBEDDING_DIMENSION), false);

    let outcome = execute_handler(
        &app.pipeline,
        Duration::from_secs(1),
        &image_upload("slow/image.png"),
    )
    .await;

    assert_matches!(outcome, IngestionOutcome::Failed);
    assert_eq!(app.embedder.calls(), 0);
    assert!(app.written_indexes().is_empty());
}
