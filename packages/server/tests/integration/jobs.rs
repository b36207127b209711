use chrono::{Duration, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use challenge_server::entity::archived_challenge;
use challenge_server::jobs::{cleanup, notifications, results};

use crate::common::{TestApp, routes};

mod cleanup_job {
    use super::*;

    #[tokio::test]
    async fn cancels_challenges_closed_without_results() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Running").await;
        let empty = app.create_challenge(&admin, category, None, "Nobody came").await;
        let busy = app.create_challenge(&admin, category, None, "Crowded").await;
        let alice = app.create_authenticated_user("alice").await;
        app.join(empty, &alice).await;
        app.join(busy, &alice).await;
        app.submit_url(busy, &alice, "https://example.com/run").await;
        app.move_to_voting(empty).await;
        app.move_to_voting(busy).await;
        app.mailer.take();

        let report = cleanup::run_once(&app.state, Utc::now()).await.unwrap();

        assert_eq!(report.cancelled, 1);
        assert_eq!(report.pruned, 0);
        let res = app.get_without_token(&routes::challenge(empty)).await;
        assert_eq!(res.status, 404);
        let res = app.get_without_token(&routes::challenge(busy)).await;
        assert_eq!(res.status, 200);

        let sent = app.mailer.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "root@example.com");
        assert!(sent[0].subject.contains("Nobody came"));
    }

    #[tokio::test]
    async fn resolution_leaves_empty_challenges_to_cleanup() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Running").await;
        let challenge = app.create_challenge(&admin, category, None, "Ghost town").await;
        app.move_to_finished(challenge).await;
        app.mailer.take();

        let resolved = results::run_once(&app.state, Utc::now()).await.unwrap();
        assert_eq!(resolved, 0);
        let res = app.get_without_token(routes::ARCHIVE).await;
        assert_eq!(res.body["pagination"]["total"], 0);
        assert!(app.mailer.take().is_empty());

        let report = cleanup::run_once(&app.state, Utc::now()).await.unwrap();
        assert_eq!(report.cancelled, 1);
        let sent = app.mailer.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "root@example.com");
        assert!(sent[0].subject.contains("Ghost town"));
    }

    #[tokio::test]
    async fn leaves_challenges_still_accepting_uploads() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Running").await;
        let challenge = app.create_challenge(&admin, category, None, "Fresh").await;

        let report = cleanup::run_once(&app.state, Utc::now()).await.unwrap();

        assert_eq!(report, cleanup::CleanupReport::default());
        let res = app.get_without_token(&routes::challenge(challenge)).await;
        assert_eq!(res.status, 200);
    }

    #[tokio::test]
    async fn prunes_archive_past_retention() {
        let app = TestApp::spawn_with(|c| c.jobs.archive_retention_days = 30).await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Running").await;
        let alice = app.create_authenticated_user("alice").await;
        for title in ["Old", "Recent"] {
            let challenge = app.create_challenge(&admin, category, None, title).await;
            app.join(challenge, &alice).await;
            app.submit_url(challenge, &alice, "https://example.com/run").await;
            app.move_to_finished(challenge).await;
        }
        assert_eq!(results::run_once(&app.state, Utc::now()).await.unwrap(), 2);

        archived_challenge::Entity::update_many()
            .col_expr(
                archived_challenge::Column::ArchivedAt,
                Expr::value(Utc::now() - Duration::days(31)),
            )
            .filter(archived_challenge::Column::Title.eq("Old"))
            .exec(&app.db)
            .await
            .unwrap();

        let report = cleanup::run_once(&app.state, Utc::now()).await.unwrap();

        assert_eq!(report.pruned, 1);
        let res = app.get_without_token(routes::ARCHIVE).await;
        let data = res.body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["title"], "Recent");

        let alice_id = app.user_id("alice").await;
        let res = app.get_without_token(&routes::user_history(alice_id)).await;
        assert_eq!(res.body["pagination"]["total"], 1);
    }
}

mod notification_job {
    use super::*;

    #[tokio::test]
    async fn reminds_participants_without_a_result_once() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Running").await;
        let challenge = app.create_challenge(&admin, category, None, "Closing soon").await;
        let alice = app.create_authenticated_user("alice").await;
        let bob = app.create_authenticated_user("bob").await;
        app.join(challenge, &alice).await;
        app.join(challenge, &bob).await;
        app.submit_url(challenge, &alice, "https://example.com/run").await;

        let now = Utc::now();
        app.set_schedule(challenge, now + Duration::hours(1), now + Duration::days(2))
            .await;
        app.mailer.take();

        let report = notifications::run_once(&app.state, Utc::now()).await.unwrap();
        assert_eq!(report.reminders, 1);
        assert_eq!(report.voting_notices, 0);
        assert_eq!(report.emails_sent, 2);

        let sent = app.mailer.take();
        assert!(sent.iter().all(|m| m.subject.contains("Closing soon")));
        let mut recipients: Vec<String> = sent.into_iter().map(|m| m.to).collect();
        recipients.sort();
        // The creator joined automatically and has not uploaded either.
        assert_eq!(recipients, vec!["bob@example.com", "root@example.com"]);

        let report = notifications::run_once(&app.state, Utc::now()).await.unwrap();
        assert_eq!(report, notifications::NotificationReport::default());
        assert!(app.mailer.take().is_empty());
    }

    #[tokio::test]
    async fn no_reminder_outside_the_lead_window() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Running").await;
        let challenge = app.create_challenge(&admin, category, None, "Far away").await;
        let alice = app.create_authenticated_user("alice").await;
        app.join(challenge, &alice).await;
        app.mailer.take();

        let report = notifications::run_once(&app.state, Utc::now()).await.unwrap();

        assert_eq!(report.reminders, 0);
        assert!(app.mailer.take().is_empty());
    }

    #[tokio::test]
    async fn announces_voting_to_every_participant_once() {
        let app = TestApp::spawn().await;
        let admin = app.create_user_with_role("root", "admin").await;
        let category = app.create_category(&admin, "Running").await;
        let challenge = app.create_challenge(&admin, category, None, "Vote now").await;
        let alice = app.create_authenticated_user("alice").await;
        let bob = app.create_authenticated_user("bob").await;
        app.join(challenge, &alice).await;
        app.join(challenge, &bob).await;
        app.submit_url(challenge, &alice, "https://example.com/run").await;
        app.move_to_voting(challenge).await;
        app.mailer.take();

        let report = notifications::run_once(&app.state, Utc::now()).await.unwrap();
        assert_eq!(report.voting_notices, 1);
        assert_eq!(report.emails_sent, 3);

        let mut recipients: Vec<String> = app.mailer.take().into_iter().map(|m| m.to).collect();
        recipients.sort();
        assert_eq!(
            recipients,
            vec!["alice@example.com", "bob@example.com", "root@example.com"]
        );

        let report = notifications::run_once(&app.state, Utc::now()).await.unwrap();
        assert_eq!(report.voting_notices, 0);
    }
}
