use chrono::Utc;
use reqwest::Method;
use serde_json::json;

use challenge_server::jobs::results;

use crate::common::{TestApp, routes};

/// Runs a full challenge created by root, who joins automatically. Alice and
/// bob submit while carol joins without a result. Two anonymous clients vote
/// for alice and one for bob, then voting closes.
async fn finished_challenge(app: &TestApp, sub_category: bool) -> (i32, i32, Option<i32>) {
    let admin = app.create_user_with_role("root", "admin").await;
    let category = app.create_category(&admin, "Photography").await;
    let sub = if sub_category {
        Some(app.create_sub_category(&admin, category, "Portraits").await)
    } else {
        None
    };
    let challenge = app.create_challenge(&admin, category, sub, "Golden hour").await;

    let alice = app.create_authenticated_user("alice").await;
    let bob = app.create_authenticated_user("bob").await;
    let carol = app.create_authenticated_user("carol").await;
    for token in [&alice, &bob, &carol] {
        app.join(challenge, token).await;
    }
    let alice_result = app.submit_url(challenge, &alice, "https://example.com/a.jpg").await;
    let bob_result = app.submit_url(challenge, &bob, "https://example.com/b.jpg").await;

    app.move_to_voting(challenge).await;
    for (client, result) in [("c1", alice_result), ("c2", alice_result), ("c3", bob_result)] {
        let res = app
            .send_as_client(
                Method::POST,
                &routes::votes(challenge),
                client,
                Some(&json!({"uploaded_result_id": result})),
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
    }
    app.move_to_finished(challenge).await;

    (challenge, category, sub)
}

async fn only_archived_id(app: &TestApp) -> i32 {
    let res = app.get_without_token(routes::ARCHIVE).await;
    assert_eq!(res.status, 200);
    let data = res.body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    data[0]["id"].as_i64().unwrap() as i32
}

mod resolution {
    use super::*;

    #[tokio::test]
    async fn archives_placements_votes_and_ratings() {
        let app = TestApp::spawn().await;
        let (challenge, _, _) = finished_challenge(&app, false).await;

        let resolved = results::run_once(&app.state, Utc::now()).await.unwrap();
        assert_eq!(resolved, 1);

        let archived = only_archived_id(&app).await;
        let res = app.get_without_token(&routes::archived(archived)).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["original_challenge_id"], challenge);
        assert_eq!(res.body["title"], "Golden hour");
        assert_eq!(res.body["category_name"], "Photography");
        assert_eq!(res.body["creator_username"], "root");
        assert_eq!(res.body["participant_count"], 4);
        assert_eq!(res.body["rated"], true);

        let participants = res.body["participants"].as_array().unwrap();
        assert_eq!(participants.len(), 4);

        assert_eq!(participants[0]["username"], "alice");
        assert_eq!(participants[0]["placement"], 1);
        assert_eq!(participants[0]["votes"], 2);
        assert_eq!(participants[0]["category_rating_before"], 1200);
        assert_eq!(participants[0]["category_rating_after"], 1216);
        assert_eq!(participants[0]["category_rating_delta"], 16);

        assert_eq!(participants[1]["username"], "bob");
        assert_eq!(participants[1]["placement"], 2);
        assert_eq!(participants[1]["votes"], 1);
        assert_eq!(participants[1]["category_rating_delta"], -16);

        for (row, name) in participants[2..].iter().zip(["carol", "root"]) {
            assert_eq!(row["username"], name);
            assert!(row["placement"].is_null());
            assert_eq!(row["votes"], 0);
            assert!(row["category_rating_delta"].is_null());
        }
    }

    #[tokio::test]
    async fn live_challenge_is_gone_after_resolution() {
        let app = TestApp::spawn().await;
        let (challenge, _, _) = finished_challenge(&app, false).await;

        results::run_once(&app.state, Utc::now()).await.unwrap();

        let res = app.get_without_token(&routes::challenge(challenge)).await;
        assert_eq!(res.status, 404);
        let res = app.get_without_token(&routes::results(challenge)).await;
        assert_eq!(res.status, 404);

        let again = results::run_once(&app.state, Utc::now()).await.unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn open_challenges_are_left_alone() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Photography").await;
        let challenge = app.create_challenge(&admin, category, None, "Later").await;

        let resolved = results::run_once(&app.state, Utc::now()).await.unwrap();
        assert_eq!(resolved, 0);
        let res = app.get_without_token(&routes::challenge(challenge)).await;
        assert_eq!(res.status, 200);
    }

    #[tokio::test]
    async fn single_entrant_is_not_rated() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Photography").await;
        let challenge = app.create_challenge(&admin, category, None, "Solo").await;
        let alice = app.create_authenticated_user("alice").await;
        app.join(challenge, &alice).await;
        app.submit_url(challenge, &alice, "https://example.com/a.jpg").await;
        app.move_to_finished(challenge).await;

        results::run_once(&app.state, Utc::now()).await.unwrap();

        let archived = only_archived_id(&app).await;
        let res = app.get_without_token(&routes::archived(archived)).await;
        assert_eq!(res.body["rated"], false);
        assert_eq!(res.body["participants"][0]["placement"], 1);
        assert!(res.body["participants"][0]["category_rating_delta"].is_null());

        let res = app.get_without_token(&routes::leaderboard(category)).await;
        assert_eq!(res.body["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn updates_leaderboards_and_history() {
        let app = TestApp::spawn().await;
        let (_, category, sub) = finished_challenge(&app, true).await;
        let sub = sub.unwrap();

        results::run_once(&app.state, Utc::now()).await.unwrap();

        let res = app.get_without_token(&routes::leaderboard(category)).await;
        assert_eq!(res.status, 200);
        let board = res.body["data"].as_array().unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0]["rank"], 1);
        assert_eq!(board[0]["username"], "alice");
        assert_eq!(board[0]["rating"], 1216);
        assert_eq!(board[0]["challenges_played"], 1);
        assert_eq!(board[1]["username"], "bob");
        assert_eq!(board[1]["rating"], 1184);

        let res = app
            .get_without_token(&routes::sub_leaderboard(category, sub))
            .await;
        assert_eq!(res.body["data"][0]["username"], "alice");
        assert_eq!(res.body["data"][0]["rating"], 1216);

        let alice = app.user_id("alice").await;
        let res = app.get_without_token(&routes::user_history(alice)).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["data"][0]["title"], "Golden hour");
        assert_eq!(res.body["data"][0]["sub_category_name"], "Portraits");
        assert_eq!(res.body["data"][0]["placement"], 1);
        assert_eq!(res.body["data"][0]["category_rating_delta"], 16);
        assert_eq!(res.body["data"][0]["sub_category_rating_delta"], 16);

        let res = app.get_without_token(&routes::user(alice)).await;
        assert_eq!(res.body["category_ratings"][0]["rating"], 1216);
        assert_eq!(res.body["sub_category_ratings"][0]["rating"], 1216);
    }

    #[tokio::test]
    async fn participants_are_emailed_their_results() {
        let app = TestApp::spawn().await;
        finished_challenge(&app, false).await;
        app.mailer.take();

        results::run_once(&app.state, Utc::now()).await.unwrap();

        let mut recipients: Vec<String> = app.mailer.take().into_iter().map(|m| m.to).collect();
        recipients.sort();
        assert_eq!(
            recipients,
            vec![
                "alice@example.com",
                "bob@example.com",
                "carol@example.com",
                "root@example.com"
            ]
        );
    }
}

mod browsing {
    use super::*;

    #[tokio::test]
    async fn filters_by_category() {
        let app = TestApp::spawn().await;
        let (_, category, _) = finished_challenge(&app, false).await;
        results::run_once(&app.state, Utc::now()).await.unwrap();

        let res = app
            .get_without_token(&format!("{}?category_id={category}", routes::ARCHIVE))
            .await;
        assert_eq!(res.body["data"].as_array().unwrap().len(), 1);
        assert_eq!(res.body["pagination"]["total"], 1);

        let res = app
            .get_without_token(&format!("{}?category_id={}", routes::ARCHIVE, category + 1))
            .await;
        assert_eq!(res.body["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn missing_archive_entry_is_404() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(&routes::archived(42)).await;

        assert_eq!(res.status, 404);
    }
}
