use ::common::storage::{BlobStore, ContentHash};
use reqwest::Method;
use serde_json::json;

use crate::common::{TestApp, routes};

/// App with an admin-run challenge that alice and bob have joined.
async fn setup() -> (TestApp, String, i32, String, String) {
    let app = TestApp::spawn().await;
    let admin = app.create_user_with_role("root", "admin").await;
    let category = app.create_category(&admin, "Running").await;
    let challenge = app.create_challenge(&admin, category, None, "5K").await;
    let alice = app.create_authenticated_user("alice").await;
    let bob = app.create_authenticated_user("bob").await;
    app.join(challenge, &alice).await;
    app.join(challenge, &bob).await;
    (app, admin, challenge, alice, bob)
}

mod submit {
    use super::*;

    #[tokio::test]
    async fn resubmitting_replaces_the_previous_result() {
        let (app, _, challenge, alice, _) = setup().await;

        let res = app
            .post_with_token(
                &routes::results(challenge),
                &json!({"kind": "url", "url": "https://example.com/first"}),
                &alice,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        let first_id = res.id();

        let res = app
            .post_with_token(
                &routes::results(challenge),
                &json!({"kind": "text", "text": "22:31 on the track"}),
                &alice,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.id(), first_id);
        assert_eq!(res.body["kind"], "text");
        assert!(res.body["url"].is_null());

        let list = app.get_without_token(&routes::results(challenge)).await;
        assert_eq!(list.body.as_array().unwrap().len(), 1);
        assert_eq!(list.body[0]["text"], "22:31 on the track");
        assert_eq!(list.body[0]["username"], "alice");
    }

    #[tokio::test]
    async fn invalid_content_is_rejected() {
        let (app, _, challenge, alice, _) = setup().await;

        for body in [
            json!({"kind": "url", "url": "ftp://example.com/x"}),
            json!({"kind": "url"}),
            json!({"kind": "text", "text": "   "}),
            json!({"kind": "file"}),
            json!({"kind": "video"}),
        ] {
            let res = app
                .post_with_token(&routes::results(challenge), &body, &alice)
                .await;
            assert_eq!(res.status, 400, "accepted {body}");
        }
    }

    #[tokio::test]
    async fn only_participants_may_submit() {
        let (app, _, challenge, _, _) = setup().await;
        let carol = app.create_authenticated_user("carol").await;

        let res = app
            .post_with_token(
                &routes::results(challenge),
                &json!({"kind": "url", "url": "https://example.com"}),
                &carol,
            )
            .await;

        assert_eq!(res.status, 403);
    }

    #[tokio::test]
    async fn uploads_close_at_the_end_date() {
        let (app, _, challenge, alice, _) = setup().await;
        app.move_to_voting(challenge).await;

        let res = app
            .post_with_token(
                &routes::results(challenge),
                &json!({"kind": "url", "url": "https://example.com"}),
                &alice,
            )
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "PHASE_CLOSED");
    }
}

mod files {
    use super::*;

    #[tokio::test]
    async fn upload_then_download_with_disposition_and_etag() {
        let (app, _, challenge, alice, _) = setup().await;
        let content = b"lap,time\n1,4:21\n2,4:19\n".to_vec();

        let res = app
            .upload_with_token(
                Method::POST,
                &routes::results_upload(challenge),
                "laps.csv",
                "text/csv",
                content.clone(),
                &alice,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["kind"], "file");
        assert_eq!(res.body["filename"], "laps.csv");
        assert_eq!(res.body["size"], content.len());
        let id = res.id();

        let res = app.get_without_token(&routes::result_file(challenge, id)).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.bytes, content);
        assert_eq!(res.header("content-type"), Some("text/csv"));
        assert!(
            res.header("content-disposition")
                .is_some_and(|v| v.contains("filename=\"laps.csv\""))
        );
        let etag = res.header("etag").expect("etag header").to_string();

        let res = app
            .get_with_headers(&routes::result_file(challenge, id), &[("If-None-Match", &etag)])
            .await;
        assert_eq!(res.status, 304);
    }

    #[tokio::test]
    async fn replacing_a_file_result_releases_the_blob() {
        let (app, _, challenge, alice, _) = setup().await;

        let res = app
            .upload_with_token(
                Method::POST,
                &routes::results_upload(challenge),
                "run.txt",
                "text/plain",
                b"first attempt".to_vec(),
                &alice,
            )
            .await;
        let id = res.id();
        app.submit_url(challenge, &alice, "https://example.com/second").await;

        let res = app.get_without_token(&routes::result_file(challenge, id)).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn shared_blob_outlives_one_owner_releasing_it() {
        let (app, _, challenge, alice, bob) = setup().await;
        let content = b"identical split times".to_vec();

        let mut ids = Vec::new();
        for token in [&alice, &bob] {
            let res = app
                .upload_with_token(
                    Method::POST,
                    &routes::results_upload(challenge),
                    "splits.txt",
                    "text/plain",
                    content.clone(),
                    token,
                )
                .await;
            assert_eq!(res.status, 201, "{}", res.text);
            ids.push(res.id());
        }
        app.submit_url(challenge, &alice, "https://example.com/splits").await;

        let res = app.get_without_token(&routes::result_file(challenge, ids[1])).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.bytes, content);

        app.submit_url(challenge, &bob, "https://example.com/splits").await;
        let hash = ContentHash::compute(&content);
        assert!(!BlobStore::exists(&*app.state.blob_store, &hash).await.unwrap());
    }

    #[tokio::test]
    async fn oversized_and_empty_files_are_rejected() {
        let (app, _, challenge, alice, _) = setup().await;

        let res = app
            .upload_with_token(
                Method::POST,
                &routes::results_upload(challenge),
                "big.bin",
                "application/octet-stream",
                vec![0u8; 1024 * 1024 + 1],
                &alice,
            )
            .await;
        assert_eq!(res.status, 400, "{}", res.text);

        let res = app
            .upload_with_token(
                Method::POST,
                &routes::results_upload(challenge),
                "empty.txt",
                "text/plain",
                Vec::new(),
                &alice,
            )
            .await;
        assert_eq!(res.status, 400);
    }
}

mod visibility_and_deletion {
    use super::*;

    #[tokio::test]
    async fn vote_counts_stay_hidden_until_finished() {
        let (app, _, challenge, alice, bob) = setup().await;
        let alice_result = app.submit_url(challenge, &alice, "https://example.com/a").await;
        app.submit_url(challenge, &bob, "https://example.com/b").await;
        app.move_to_voting(challenge).await;

        let res = app
            .post_with_token(
                &routes::votes(challenge),
                &json!({"uploaded_result_id": alice_result}),
                &bob,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);

        let res = app
            .get_without_token(&routes::result(challenge, alice_result))
            .await;
        assert!(res.body["votes"].is_null());

        app.move_to_finished(challenge).await;
        let res = app
            .get_without_token(&routes::result(challenge, alice_result))
            .await;
        assert_eq!(res.body["votes"], 1);
        let list = app.get_without_token(&routes::results(challenge)).await;
        let bob_row = list
            .body
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["username"] == "bob")
            .unwrap()
            .clone();
        assert_eq!(bob_row["votes"], 0);
    }

    #[tokio::test]
    async fn owner_deletes_during_joining_only() {
        let (app, _, challenge, alice, bob) = setup().await;
        let id = app.submit_url(challenge, &alice, "https://example.com/a").await;

        let res = app.delete_with_token(&routes::result(challenge, id), &bob).await;
        assert_eq!(res.status, 403);

        app.move_to_voting(challenge).await;
        let res = app.delete_with_token(&routes::result(challenge, id), &alice).await;
        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "PHASE_CLOSED");
    }

    #[tokio::test]
    async fn manager_removes_a_result_and_its_votes() {
        let (app, admin, challenge, alice, bob) = setup().await;
        let id = app.submit_url(challenge, &alice, "https://example.com/a").await;
        app.move_to_voting(challenge).await;
        let res = app
            .post_with_token(&routes::votes(challenge), &json!({"uploaded_result_id": id}), &bob)
            .await;
        assert_eq!(res.status, 201);

        let res = app.delete_with_token(&routes::result(challenge, id), &admin).await;
        assert_eq!(res.status, 204, "{}", res.text);

        let res = app.get_with_token(&routes::my_vote(challenge), &bob).await;
        assert!(res.body["uploaded_result_id"].is_null());
        assert_eq!(
            app.get_without_token(&routes::result(challenge, id)).await.status,
            404
        );
    }
}
