use reqwest::Method;
use serde_json::json;

use crate::common::{TestApp, routes};

struct Fixture {
    app: TestApp,
    challenge: i32,
    alice: String,
    bob: String,
    alice_result: i32,
    bob_result: i32,
}

/// Challenge in its voting phase with results from alice and bob.
async fn voting_fixture(app: TestApp) -> Fixture {
    let admin = app.create_user_with_role("root", "admin").await;
    let category = app.create_category(&admin, "Photography").await;
    let challenge = app.create_challenge(&admin, category, None, "Sunsets").await;
    let alice = app.create_authenticated_user("alice").await;
    let bob = app.create_authenticated_user("bob").await;
    app.join(challenge, &alice).await;
    app.join(challenge, &bob).await;
    let alice_result = app.submit_url(challenge, &alice, "https://example.com/a.jpg").await;
    let bob_result = app.submit_url(challenge, &bob, "https://example.com/b.jpg").await;
    app.move_to_voting(challenge).await;
    Fixture {
        app,
        challenge,
        alice,
        bob,
        alice_result,
        bob_result,
    }
}

mod authenticated {
    use super::*;

    #[tokio::test]
    async fn one_vote_per_user() {
        let f = voting_fixture(TestApp::spawn().await).await;

        let res = f
            .app
            .post_with_token(
                &routes::votes(f.challenge),
                &json!({"uploaded_result_id": f.bob_result}),
                &f.alice,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["uploaded_result_id"], f.bob_result);

        let res = f
            .app
            .post_with_token(
                &routes::votes(f.challenge),
                &json!({"uploaded_result_id": f.bob_result}),
                &f.alice,
            )
            .await;
        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "ALREADY_VOTED");

        let res = f.app.get_with_token(&routes::my_vote(f.challenge), &f.alice).await;
        assert_eq!(res.body["uploaded_result_id"], f.bob_result);
    }

    #[tokio::test]
    async fn cannot_vote_for_own_result() {
        let f = voting_fixture(TestApp::spawn().await).await;

        let res = f
            .app
            .post_with_token(
                &routes::votes(f.challenge),
                &json!({"uploaded_result_id": f.alice_result}),
                &f.alice,
            )
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn result_must_belong_to_the_challenge() {
        let f = voting_fixture(TestApp::spawn().await).await;

        let res = f
            .app
            .post_with_token(
                &routes::votes(f.challenge),
                &json!({"uploaded_result_id": 9999}),
                &f.alice,
            )
            .await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn retract_then_vote_again() {
        let f = voting_fixture(TestApp::spawn().await).await;
        let vote = json!({"uploaded_result_id": f.alice_result});

        let res = f.app.delete_with_token(&routes::votes(f.challenge), &f.bob).await;
        assert_eq!(res.status, 404);

        let res = f
            .app
            .post_with_token(&routes::votes(f.challenge), &vote, &f.bob)
            .await;
        assert_eq!(res.status, 201);
        let res = f.app.delete_with_token(&routes::votes(f.challenge), &f.bob).await;
        assert_eq!(res.status, 204);
        let res = f.app.get_with_token(&routes::my_vote(f.challenge), &f.bob).await;
        assert!(res.body["uploaded_result_id"].is_null());

        let res = f
            .app
            .post_with_token(&routes::votes(f.challenge), &vote, &f.bob)
            .await;
        assert_eq!(res.status, 201);
    }
}

mod anonymous {
    use super::*;

    #[tokio::test]
    async fn client_id_identifies_the_voter() {
        let f = voting_fixture(TestApp::spawn().await).await;
        let body = json!({"uploaded_result_id": f.alice_result});

        let res = f
            .app
            .send_as_client(Method::POST, &routes::votes(f.challenge), "browser-1", Some(&body))
            .await;
        assert_eq!(res.status, 201, "{}", res.text);

        let res = f
            .app
            .send_as_client(Method::POST, &routes::votes(f.challenge), "browser-1", Some(&body))
            .await;
        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "ALREADY_VOTED");

        let res = f
            .app
            .send_as_client(Method::POST, &routes::votes(f.challenge), "browser-2", Some(&body))
            .await;
        assert_eq!(res.status, 201);

        let res = f
            .app
            .send_as_client(Method::GET, &routes::my_vote(f.challenge), "browser-1", None)
            .await;
        assert_eq!(res.body["uploaded_result_id"], f.alice_result);
    }

    #[tokio::test]
    async fn client_id_is_required_and_validated() {
        let f = voting_fixture(TestApp::spawn().await).await;
        let body = json!({"uploaded_result_id": f.alice_result});

        let res = f
            .app
            .post_without_token(&routes::votes(f.challenge), &body)
            .await;
        assert_eq!(res.status, 400);

        let res = f
            .app
            .send_as_client(
                Method::POST,
                &routes::votes(f.challenge),
                &"x".repeat(129),
                Some(&body),
            )
            .await;
        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn disabled_anonymous_voting_requires_a_token() {
        let app = TestApp::spawn_with(|c| c.voting.allow_anonymous = false).await;
        let f = voting_fixture(app).await;

        let res = f
            .app
            .send_as_client(
                Method::POST,
                &routes::votes(f.challenge),
                "browser-1",
                Some(&json!({"uploaded_result_id": f.alice_result})),
            )
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }
}

mod phases {
    use super::*;

    #[tokio::test]
    async fn voting_is_only_open_in_the_voting_window() {
        let f = voting_fixture(TestApp::spawn().await).await;
        let body = json!({"uploaded_result_id": f.bob_result});

        f.app.move_to_finished(f.challenge).await;
        let res = f
            .app
            .post_with_token(&routes::votes(f.challenge), &body, &f.alice)
            .await;
        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "PHASE_CLOSED");
    }

    #[tokio::test]
    async fn voting_has_not_started_while_joining() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Photography").await;
        let challenge = app.create_challenge(&admin, category, None, "Early").await;
        let alice = app.create_authenticated_user("alice").await;
        app.join(challenge, &alice).await;
        let result = app.submit_url(challenge, &alice, "https://example.com/a.jpg").await;

        let res = app
            .send_as_client(
                Method::POST,
                &routes::votes(challenge),
                "browser-1",
                Some(&json!({"uploaded_result_id": result})),
            )
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "PHASE_CLOSED");
    }
}
