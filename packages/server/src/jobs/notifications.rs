use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use sea_orm::prelude::Expr;
use sea_orm::*;
use tracing::info;

use crate::entity::{challenge, challenge_user, uploaded_result, user};
use crate::mail::{Composer, OutgoingEmail, send_all};
use crate::state::AppState;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct NotificationReport {
    /// Challenges whose upload reminder went out on this pass.
    pub reminders: usize,
    /// Challenges whose "voting is open" notice went out on this pass.
    pub voting_notices: usize,
    pub emails_sent: usize,
}

/// Which flag a notice claims on the challenge row.
#[derive(Clone, Copy)]
enum Notice {
    Reminder,
    VotingOpen,
}

impl Notice {
    fn flag(self) -> challenge::Column {
        match self {
            Notice::Reminder => challenge::Column::ReminderSent,
            Notice::VotingOpen => challenge::Column::VotingNoticeSent,
        }
    }
}

pub async fn run_once(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<NotificationReport> {
    let mut report = NotificationReport::default();
    let composer = Composer::new(&state.config.email);
    let lead = Duration::hours(state.config.jobs.reminder_lead_hours);

    let closing_soon = challenge::Entity::find()
        .filter(challenge::Column::ReminderSent.eq(false))
        .filter(challenge::Column::EndDate.gt(now))
        .filter(challenge::Column::EndDate.lte(now + lead))
        .all(&state.db)
        .await?;

    for model in closing_soon {
        if !claim(&state.db, model.id, Notice::Reminder).await? {
            continue;
        }
        let with_result: HashSet<i32> = uploaded_result::Entity::find()
            .select_only()
            .column(uploaded_result::Column::UserId)
            .filter(uploaded_result::Column::ChallengeId.eq(model.id))
            .into_tuple::<i32>()
            .all(&state.db)
            .await?
            .into_iter()
            .collect();

        let emails: Vec<OutgoingEmail> = participants(&state.db, model.id)
            .await?
            .into_iter()
            .filter(|u| !with_result.contains(&u.id))
            .map(|u| composer.reminder(&u.email, &u.username, model.id, &model.title, model.end_date))
            .collect();
        report.reminders += 1;
        report.emails_sent += send_all(&*state.mailer, emails).await;
    }

    let voting_open = challenge::Entity::find()
        .filter(challenge::Column::VotingNoticeSent.eq(false))
        .filter(challenge::Column::EndDate.lte(now))
        .filter(challenge::Column::VotePeriodEnd.gt(now))
        .all(&state.db)
        .await?;

    for model in voting_open {
        if !claim(&state.db, model.id, Notice::VotingOpen).await? {
            continue;
        }
        let emails: Vec<OutgoingEmail> = participants(&state.db, model.id)
            .await?
            .into_iter()
            .map(|u| {
                composer.voting_open(&u.email, &u.username, model.id, &model.title, model.vote_period_end)
            })
            .collect();
        report.voting_notices += 1;
        report.emails_sent += send_all(&*state.mailer, emails).await;
    }

    if report.reminders + report.voting_notices > 0 {
        info!(
            reminders = report.reminders,
            voting_notices = report.voting_notices,
            emails_sent = report.emails_sent,
            "Sent challenge notifications"
        );
    }
    Ok(report)
}

/// Flip the notice flag from false to true. Only the caller that flips it sends.
async fn claim(db: &DatabaseConnection, challenge_id: i32, notice: Notice) -> Result<bool, DbErr> {
    let res = challenge::Entity::update_many()
        .col_expr(notice.flag(), Expr::value(true))
        .filter(challenge::Column::Id.eq(challenge_id))
        .filter(notice.flag().eq(false))
        .exec(db)
        .await?;
    Ok(res.rows_affected == 1)
}

async fn participants(db: &DatabaseConnection, challenge_id: i32) -> Result<Vec<user::Model>, DbErr> {
    Ok(challenge_user::Entity::find()
        .filter(challenge_user::Column::ChallengeId.eq(challenge_id))
        .find_also_related(user::Entity)
        .order_by_asc(challenge_user::Column::UserId)
        .all(db)
        .await?
        .into_iter()
        .filter_map(|(_, u)| u)
        .collect())
}
