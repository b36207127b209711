use chrono::{Duration, Utc};
use serde_json::json;

use crate::common::{TestApp, rfc3339, routes};

/// App with an admin, a "Running" category and a member named alice.
async fn setup() -> (TestApp, String, i32, String) {
    let app = TestApp::spawn().await;
    let admin = app.create_user_with_role("root", "admin").await;
    let category = app.create_category(&admin, "Running").await;
    let alice = app.create_authenticated_user("alice").await;
    (app, admin, category, alice)
}

mod create {
    use super::*;

    #[tokio::test]
    async fn creator_joins_automatically() {
        let (app, _, category, alice) = setup().await;

        let id = app.create_challenge(&alice, category, None, "Fastest 5K").await;

        let res = app.get_with_token(&routes::challenge(id), &alice).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["title"], "Fastest 5K");
        assert_eq!(res.body["phase"], "joining");
        assert_eq!(res.body["participant_count"], 1);
        assert_eq!(res.body["result_count"], 0);
        assert_eq!(res.body["joined"], true);
        assert_eq!(res.body["creator_username"], "alice");
    }

    #[tokio::test]
    async fn schedule_is_validated() {
        let (app, _, category, alice) = setup().await;
        let now = Utc::now();

        for (end, vote_end) in [
            (now - Duration::hours(1), now + Duration::days(1)),
            (now + Duration::days(2), now + Duration::days(1)),
            (now + Duration::days(400), now + Duration::days(401)),
        ] {
            let res = app
                .post_with_token(
                    routes::CHALLENGES,
                    &json!({
                        "title": "Bad dates",
                        "description": "",
                        "category_id": category,
                        "end_date": rfc3339(end),
                        "vote_period_end": rfc3339(vote_end),
                    }),
                    &alice,
                )
                .await;
            assert_eq!(res.status, 400, "accepted {end} / {vote_end}");
            assert_eq!(res.body["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn subcategory_must_belong_to_the_category() {
        let (app, admin, category, alice) = setup().await;
        let chess = app.create_category(&admin, "Chess").await;
        let blitz = app.create_sub_category(&admin, chess, "Blitz").await;
        let now = Utc::now();

        let res = app
            .post_with_token(
                routes::CHALLENGES,
                &json!({
                    "title": "Mixed up",
                    "description": "",
                    "category_id": category,
                    "sub_category_id": blitz,
                    "end_date": rfc3339(now + Duration::days(1)),
                    "vote_period_end": rfc3339(now + Duration::days(2)),
                }),
                &alice,
            )
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn unknown_category_is_404() {
        let (app, _, _, alice) = setup().await;
        let now = Utc::now();

        let res = app
            .post_with_token(
                routes::CHALLENGES,
                &json!({
                    "title": "Nowhere",
                    "description": "",
                    "category_id": 999,
                    "end_date": rfc3339(now + Duration::days(1)),
                    "vote_period_end": rfc3339(now + Duration::days(2)),
                }),
                &alice,
            )
            .await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn requires_a_token() {
        let (app, _, category, _) = setup().await;

        let res = app
            .post_without_token(routes::CHALLENGES, &json!({"category_id": category}))
            .await;

        assert_eq!(res.status, 401);
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn filters_by_phase_search_and_joined() {
        let (app, admin, category, alice) = setup().await;
        let first = app.create_challenge(&admin, category, None, "Morning run").await;
        let second = app.create_challenge(&admin, category, None, "Evening run").await;
        app.create_challenge(&admin, category, None, "Sprint").await;
        app.join(first, &alice).await;
        app.move_to_voting(second).await;

        let res = app
            .get_without_token(&format!("{}?search=RUN", routes::CHALLENGES))
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 2);

        let res = app
            .get_without_token(&format!("{}?phase=voting", routes::CHALLENGES))
            .await;
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["id"], second);
        assert_eq!(res.body["data"][0]["phase"], "voting");

        let res = app
            .get_with_token(&format!("{}?joined=true", routes::CHALLENGES), &alice)
            .await;
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["id"], first);
    }

    #[tokio::test]
    async fn joined_filter_needs_a_token() {
        let (app, _, _, _) = setup().await;

        let res = app
            .get_without_token(&format!("{}?joined=true", routes::CHALLENGES))
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn sorts_by_title() {
        let (app, admin, category, _) = setup().await;
        app.create_challenge(&admin, category, None, "Bravo").await;
        app.create_challenge(&admin, category, None, "Alpha").await;

        let res = app
            .get_without_token(&format!("{}?sort_by=title&sort_order=asc", routes::CHALLENGES))
            .await;
        assert_eq!(res.body["data"][0]["title"], "Alpha");

        let res = app
            .get_without_token(&format!("{}?sort_by=password", routes::CHALLENGES))
            .await;
        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let (app, admin, category, _) = setup().await;
        app.create_challenge(&admin, category, None, "Only").await;

        let res = app
            .get_without_token(&format!("{}?page={}", routes::CHALLENGES, u64::MAX))
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["data"].as_array().unwrap().len(), 0);
        assert_eq!(res.body["pagination"]["total"], 1);

        let res = app
            .get_without_token(&format!("{}?page={}", routes::ARCHIVE, u64::MAX))
            .await;
        assert_eq!(res.status, 200);
    }
}

mod update {
    use super::*;

    #[tokio::test]
    async fn creator_can_edit_while_joining() {
        let (app, _, category, alice) = setup().await;
        let id = app.create_challenge(&alice, category, None, "Typo").await;

        let res = app
            .patch_with_token(&routes::challenge(id), &json!({"title": "Fixed"}), &alice)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["title"], "Fixed");
    }

    #[tokio::test]
    async fn other_members_cannot_edit() {
        let (app, _, category, alice) = setup().await;
        let id = app.create_challenge(&alice, category, None, "Mine").await;
        let bob = app.create_authenticated_user("bob").await;

        let res = app
            .patch_with_token(&routes::challenge(id), &json!({"title": "Ours"}), &bob)
            .await;

        assert_eq!(res.status, 403);
    }

    #[tokio::test]
    async fn editing_is_closed_once_voting_starts() {
        let (app, _, category, alice) = setup().await;
        let id = app.create_challenge(&alice, category, None, "Locked").await;
        app.move_to_voting(id).await;

        let res = app
            .patch_with_token(&routes::challenge(id), &json!({"title": "Changed"}), &alice)
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "PHASE_CLOSED");
    }

    #[tokio::test]
    async fn moved_deadlines_are_cross_checked() {
        let (app, _, category, alice) = setup().await;
        let id = app.create_challenge(&alice, category, None, "Dates").await;

        let res = app
            .patch_with_token(
                &routes::challenge(id),
                &json!({"end_date": rfc3339(Utc::now() + Duration::days(10))}),
                &alice,
            )
            .await;

        assert_eq!(res.status, 400);
    }
}

mod participation {
    use super::*;

    #[tokio::test]
    async fn join_leave_and_list_participants() {
        let (app, admin, category, alice) = setup().await;
        let id = app.create_challenge(&admin, category, None, "Group run").await;

        app.join(id, &alice).await;
        let res = app
            .post_with_token(&routes::join(id), &json!({}), &alice)
            .await;
        assert_eq!(res.status, 409);

        app.submit_url(id, &alice, "https://example.com/run").await;
        let res = app.get_without_token(&routes::participants(id)).await;
        assert_eq!(res.status, 200);
        let list = res.body.as_array().unwrap();
        assert_eq!(list.len(), 2);
        let alice_row = list.iter().find(|p| p["username"] == "alice").unwrap();
        assert_eq!(alice_row["has_result"], true);

        let res = app.delete_with_token(&routes::join(id), &alice).await;
        assert_eq!(res.status, 204, "{}", res.text);
        let res = app.get_without_token(&routes::challenge(id)).await;
        assert_eq!(res.body["participant_count"], 1);
        assert_eq!(res.body["result_count"], 0);

        let res = app.delete_with_token(&routes::join(id), &alice).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn cannot_join_after_uploads_close() {
        let (app, admin, category, alice) = setup().await;
        let id = app.create_challenge(&admin, category, None, "Closed").await;
        app.move_to_voting(id).await;

        let res = app
            .post_with_token(&routes::join(id), &json!({}), &alice)
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "PHASE_CLOSED");
    }

    #[tokio::test]
    async fn delete_needs_creator_or_permission() {
        let (app, admin, category, alice) = setup().await;
        let id = app.create_challenge(&admin, category, None, "Admin's").await;

        let res = app.delete_with_token(&routes::challenge(id), &alice).await;
        assert_eq!(res.status, 403);

        let res = app.delete_with_token(&routes::challenge(id), &admin).await;
        assert_eq!(res.status, 204);
        assert_eq!(app.get_without_token(&routes::challenge(id)).await.status, 404);
    }
}
