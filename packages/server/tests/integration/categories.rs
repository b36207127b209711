use serde_json::json;

use crate::common::{TestApp, routes};

mod crud {
    use super::*;

    #[tokio::test]
    async fn listing_includes_subcategories() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let running = app.create_category(&admin, "Running").await;
        app.create_sub_category(&admin, running, "5K").await;
        app.create_sub_category(&admin, running, "Marathon").await;
        app.create_category(&admin, "Chess").await;

        let res = app.get_without_token(routes::CATEGORIES).await;

        assert_eq!(res.status, 200);
        let list = res.body.as_array().unwrap();
        assert_eq!(list.len(), 2);
        let running = list.iter().find(|c| c["name"] == "Running").unwrap();
        assert_eq!(running["sub_categories"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn members_cannot_manage_categories() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice").await;

        let res = app
            .post_with_token(routes::CATEGORIES, &json!({"name": "Chess"}), &token)
            .await;

        assert_eq!(res.status, 403);
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let running = app.create_category(&admin, "Running").await;
        app.create_sub_category(&admin, running, "5K").await;

        let res = app
            .post_with_token(routes::CATEGORIES, &json!({"name": "Running"}), &admin)
            .await;
        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "CONFLICT");

        let res = app
            .post_with_token(&routes::sub_categories(running), &json!({"name": "5K"}), &admin)
            .await;
        assert_eq!(res.status, 409);

        // Same subcategory name under another category is fine.
        let swimming = app.create_category(&admin, "Swimming").await;
        app.create_sub_category(&admin, swimming, "5K").await;
    }

    #[tokio::test]
    async fn update_renames() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let id = app.create_category(&admin, "Runing").await;

        let res = app
            .patch_with_token(&routes::category(id), &json!({"name": "Running"}), &admin)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["name"], "Running");
        let res = app.get_without_token(&routes::category(id)).await;
        assert_eq!(res.body["name"], "Running");
    }

    #[tokio::test]
    async fn cannot_delete_while_challenges_are_live() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let id = app.create_category(&admin, "Running").await;
        let challenge = app.create_challenge(&admin, id, None, "5K").await;

        let res = app.delete_with_token(&routes::category(id), &admin).await;
        assert_eq!(res.status, 409);

        let res = app.delete_with_token(&routes::challenge(challenge), &admin).await;
        assert_eq!(res.status, 204);
        let res = app.delete_with_token(&routes::category(id), &admin).await;
        assert_eq!(res.status, 204, "{}", res.text);
        assert_eq!(app.get_without_token(&routes::category(id)).await.status, 404);
    }

    #[tokio::test]
    async fn deleting_a_subcategory_detaches_live_challenges() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let id = app.create_category(&admin, "Running").await;
        let sub = app.create_sub_category(&admin, id, "5K").await;
        let challenge = app.create_challenge(&admin, id, Some(sub), "Fast 5K").await;

        let res = app
            .delete_with_token(&routes::sub_category(id, sub), &admin)
            .await;
        assert_eq!(res.status, 204, "{}", res.text);

        let res = app.get_without_token(&routes::challenge(challenge)).await;
        assert_eq!(res.status, 200);
        assert!(res.body["sub_category_id"].is_null());
    }
}

mod leaderboard {
    use super::*;

    #[tokio::test]
    async fn empty_category_has_an_empty_board() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let id = app.create_category(&admin, "Running").await;

        let res = app.get_without_token(&routes::leaderboard(id)).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["data"], json!([]));
        assert_eq!(res.body["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn unknown_category_is_404() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(&routes::leaderboard(42)).await;

        assert_eq!(res.status, 404);
    }
}
