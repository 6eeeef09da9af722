use fake::{faker::lorem::en::Words, Fake};
use serde_json::{json, Value as JsonValue};

use crate::helpers::{document, result_ids, spawn_app, uploaded_at, TestAppBuilder};

fn gallery() -> TestAppBuilder {
    TestAppBuilder::new().with_documents(vec![
        document("dog_beach", "A golden dog running on a sunny beach", uploaded_at(10)),
        document("cat_sofa", "A grey cat sleeping on a sofa", uploaded_at(20)),
        document("dog_park", "A small dog playing in a park", uploaded_at(30)),
        document("beach_sunset", "Sunset over a quiet beach", uploaded_at(40)),
    ])
}

#[tokio::test]
async fn search_ranks_images_by_shared_keywords() {
    let app = gallery().spawn().await;

    let response = app.post_search(&json!({ "query": "dog on the beach" })).await;

    assert_eq!(response.status().as_u16(), 200);
    let body: JsonValue = response.json().await.unwrap();
    // dog_beach shares 2 keywords, the others 1 and keep the most recent first
    assert_eq!(
        result_ids(&body),
        vec!["dog_beach", "beach_sunset", "dog_park"]
    );
}

#[tokio::test]
async fn search_results_have_id_image_url_and_title_only() {
    let app = gallery().spawn().await;

    let response = app.post_search(&json!({ "query": "cat", "limit": 1 })).await;

    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "results": [{
                "id": "cat_sofa",
                "imageUrl": "https://storage.example.com/images/cat_sofa.png",
                "title": "Title of cat_sofa"
            }]
        })
    );
}

#[tokio::test]
async fn search_without_query_returns_most_recent_images() {
    let app = gallery().spawn().await;

    for body in [
        json!({ "limit": 2 }),
        json!({ "query": "", "limit": 2 }),
        json!({ "query": "   ", "limit": 2 }),
    ] {
        let response = app.post_search(&body).await;

        assert_eq!(response.status().as_u16(), 200);
        let body: JsonValue = response.json().await.unwrap();
        assert_eq!(result_ids(&body), vec!["beach_sunset", "dog_park"]);
    }
}

#[tokio::test]
async fn search_without_body_returns_most_recent_images() {
    let app = gallery().spawn().await;
    let client = reqwest::Client::new();

    let without_body = client
        .post(&format!("{}/search", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    let without_json_content_type = client
        .post(&format!("{}/search", &app.address))
        .body(r#"{"limit": 1}"#)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(without_body.status().as_u16(), 200);
    let body: JsonValue = without_body.json().await.unwrap();
    assert_eq!(
        result_ids(&body),
        vec!["beach_sunset", "dog_park", "cat_sofa", "dog_beach"]
    );

    assert_eq!(without_json_content_type.status().as_u16(), 200);
    let body: JsonValue = without_json_content_type.json().await.unwrap();
    assert_eq!(result_ids(&body), vec!["beach_sunset"]);
}

#[tokio::test]
async fn search_defaults_to_five_results() {
    let documents = (0..8)
        .map(|i| document(&format!("dog_{}", i), "A dog", uploaded_at(i)))
        .collect();
    let app = TestAppBuilder::new().with_documents(documents).spawn().await;

    let response = app.post_search(&json!({ "query": "dog" })).await;

    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(
        result_ids(&body),
        vec!["dog_7", "dog_6", "dog_5", "dog_4", "dog_3"]
    );
    // Candidates are over-fetched before ranking
    assert_eq!(
        *app.keyword_index.overlap_queries.lock().unwrap(),
        vec![(vec!["dog".to_string()], 25)]
    );
}

#[tokio::test]
async fn search_with_unknown_keywords_returns_no_result() {
    let app = gallery().spawn().await;
    let words: Vec<String> = Words(3..6).fake();
    let query = format!("{} zzzunknown", words.join(" "));

    let response = app.post_search(&json!({ "query": query })).await;

    assert_eq!(response.status().as_u16(), 200);
    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body, json!({ "results": [] }));
}

#[tokio::test]
async fn search_with_too_many_keywords_uses_the_first_ten() {
    let app = spawn_app().await;
    let query = "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima";

    let response = app.post_search(&json!({ "query": query })).await;

    assert_eq!(response.status().as_u16(), 200);
    let queries = app.keyword_index.overlap_queries.lock().unwrap();
    assert_eq!(queries[0].0.len(), 10);
    assert_eq!(queries[0].0.last().unwrap(), "juliet");
}

#[tokio::test]
async fn search_returns_400_for_invalid_limits() {
    let app = gallery().spawn().await;
    let test_cases = vec![
        (json!({ "query": "dog", "limit": 0 }), "a zero limit"),
        (json!({ "query": "dog", "limit": -4 }), "a negative limit"),
        (json!({ "query": "dog", "limit": "ten" }), "a non numeric limit"),
        (json!("dog"), "a body that is not an object"),
    ];

    for (body, case) in test_cases {
        let response = app.post_search(&body).await;

        assert_eq!(
            response.status().as_u16(),
            400,
            "The API did not fail with 400 Bad Request for {}",
            case
        );
        let body: JsonValue = response.json().await.unwrap();
        assert!(body["error"].is_string(), "No error message for {}", case);
    }
}

#[tokio::test]
async fn search_clamps_large_limits() {
    let app = gallery().spawn().await;

    let response = app.post_search(&json!({ "query": "dog", "limit": 1000 })).await;

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        app.keyword_index.overlap_queries.lock().unwrap()[0].1,
        500
    );
}

#[tokio::test]
async fn search_returns_500_without_detail_when_the_index_fails() {
    let app = TestAppBuilder::new()
        .with_failing_keyword_index()
        .spawn()
        .await;

    let response = app.post_search(&json!({ "query": "dog" })).await;

    assert_eq!(response.status().as_u16(), 500);
    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Internal server error" }));
}
