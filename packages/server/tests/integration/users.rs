use reqwest::Method;
use serde_json::json;

use crate::common::{PASSWORD, TestApp, routes};

/// A 1x1 transparent PNG.
const PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

mod listing {
    use super::*;

    #[tokio::test]
    async fn requires_user_manage() {
        let app = TestApp::spawn().await;
        let member = app.create_authenticated_user("alice").await;

        let res = app.get_with_token(routes::USERS, &member).await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn admin_can_search_by_username() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        app.create_authenticated_user("alice").await;
        app.create_authenticated_user("alicia").await;
        app.create_authenticated_user("bob").await;

        let res = app
            .get_with_token(&format!("{}?search=ALI", routes::USERS), &admin)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["pagination"]["total"], 2);
        let names: Vec<&str> = res.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["username"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"alice") && names.contains(&"alicia"));
    }
}

mod profile {
    use super::*;

    #[tokio::test]
    async fn is_public() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("alice").await;
        let id = app.user_id("alice").await;

        let res = app.get_without_token(&routes::user(id)).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["username"], "alice");
        assert!(res.body.get("email").is_none());
        assert_eq!(res.body["category_ratings"], json!([]));
    }

    #[tokio::test]
    async fn missing_user_is_404() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(&routes::user(999)).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod update_me {
    use super::*;

    #[tokio::test]
    async fn password_change_needs_the_current_password() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice").await;

        let res = app
            .patch_with_token(
                routes::USERS_ME,
                &json!({"password": "brandnewpass", "current_password": "wrongpassword"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "INVALID_CREDENTIALS");

        let res = app
            .patch_with_token(
                routes::USERS_ME,
                &json!({"password": "brandnewpass", "current_password": PASSWORD}),
                &token,
            )
            .await;
        assert_eq!(res.status, 204, "{}", res.text);

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({"username": "alice", "password": "brandnewpass"}),
            )
            .await;
        assert_eq!(res.status, 200);
    }

    #[tokio::test]
    async fn email_must_stay_unique() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("alice").await;
        let bob = app.create_authenticated_user("bob").await;

        let res = app
            .patch_with_token(routes::USERS_ME, &json!({"email": "alice@example.com"}), &bob)
            .await;
        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "EMAIL_TAKEN");

        let res = app
            .patch_with_token(routes::USERS_ME, &json!({"email": "bobby@example.com"}), &bob)
            .await;
        assert_eq!(res.status, 204);
        let me = app.get_with_token(routes::ME, &bob).await;
        assert_eq!(me.body["email"], "bobby@example.com");
    }
}

mod roles {
    use super::*;

    #[tokio::test]
    async fn admin_can_promote_and_new_permissions_apply_on_next_login() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        app.create_authenticated_user("alice").await;
        let id = app.user_id("alice").await;

        let res = app
            .put_with_token(&routes::user_role(id), &json!({"role": "moderator"}), &admin)
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["role"], "moderator");

        let token = app.login("alice").await;
        let res = app
            .post_with_token(routes::CATEGORIES, &json!({"name": "Chess"}), &token)
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        app.create_authenticated_user("alice").await;
        let id = app.user_id("alice").await;

        let res = app
            .put_with_token(&routes::user_role(id), &json!({"role": "emperor"}), &admin)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn members_cannot_change_roles() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice").await;
        let id = app.user_id("alice").await;

        let res = app
            .put_with_token(&routes::user_role(id), &json!({"role": "admin"}), &token)
            .await;

        assert_eq!(res.status, 403);
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn user_can_delete_themselves_and_keeps_created_challenges_alive() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Running").await;
        let alice = app.create_authenticated_user("alice").await;
        let challenge = app.create_challenge(&alice, category, None, "5K").await;
        let id = app.user_id("alice").await;

        let res = app.delete_with_token(&routes::user(id), &alice).await;
        assert_eq!(res.status, 204, "{}", res.text);

        assert_eq!(app.get_without_token(&routes::user(id)).await.status, 404);
        let res = app.get_without_token(&routes::challenge(challenge)).await;
        assert_eq!(res.status, 200);
        assert!(res.body["creator_id"].is_null());
        assert_eq!(res.body["participant_count"], 0);
    }

    #[tokio::test]
    async fn token_of_deleted_user_is_rejected() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Running").await;
        let challenge = app.create_challenge(&admin, category, None, "5K").await;
        let bob = app.create_authenticated_user("bob").await;
        let id = app.user_id("bob").await;

        let res = app.delete_with_token(&routes::user(id), &bob).await;
        assert_eq!(res.status, 204);

        let res = app
            .post_with_token(&routes::join(challenge), &json!({}), &bob)
            .await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");

        let res = app.get_with_token(routes::ME, &bob).await;
        assert_eq!(res.status, 401);

        let res = app.get_with_token(&routes::challenge(challenge), &bob).await;
        assert_eq!(res.status, 401);
    }

    #[tokio::test]
    async fn cannot_delete_someone_else_without_user_manage() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("alice").await;
        let bob = app.create_authenticated_user("bob").await;
        let id = app.user_id("alice").await;

        let res = app.delete_with_token(&routes::user(id), &bob).await;

        assert_eq!(res.status, 403);
    }
}

mod avatar {
    use super::*;

    #[tokio::test]
    async fn upload_and_download_with_etag() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice").await;
        let id = app.user_id("alice").await;

        let res = app
            .upload_with_token(
                Method::PUT,
                routes::AVATAR_ME,
                "me.png",
                "image/png",
                PNG.to_vec(),
                &token,
            )
            .await;
        assert_eq!(res.status, 204, "{}", res.text);

        let res = app.get_without_token(&routes::user_avatar(id)).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.header("content-type"), Some("image/png"));
        assert_eq!(res.bytes, PNG);
        let etag = res.header("etag").expect("etag header").to_string();

        let res = app
            .get_with_headers(&routes::user_avatar(id), &[("If-None-Match", &etag)])
            .await;
        assert_eq!(res.status, 304);

        let me = app.get_with_token(routes::ME, &token).await;
        assert_eq!(me.body["has_avatar"], true);
    }

    #[tokio::test]
    async fn non_images_are_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice").await;

        let res = app
            .upload_with_token(
                Method::PUT,
                routes::AVATAR_ME,
                "notes.txt",
                "text/plain",
                b"hello".to_vec(),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn missing_avatar_is_404() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("alice").await;
        let id = app.user_id("alice").await;

        let res = app.get_without_token(&routes::user_avatar(id)).await;

        assert_eq!(res.status, 404);
    }
}
