use chrono::{DateTime, Utc};

use super::OutgoingEmail;
use crate::config::EmailConfig;

/// Renders the notification emails sent by the background jobs.
#[derive(Debug, Clone)]
pub struct Composer {
    from: String,
    public_url: String,
}

/// One participant's outcome, as reported in the results email.
#[derive(Debug, Clone)]
pub struct ResultSummary {
    pub placement: Option<i32>,
    pub votes: i32,
    pub entrants: usize,
    pub rating_after: Option<i32>,
    pub rating_delta: Option<i32>,
}

impl Composer {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            from: config.from.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

    fn challenge_link(&self, challenge_id: i32) -> String {
        format!("{}/challenges/{challenge_id}", self.public_url)
    }

    fn email(&self, to: &str, subject: String, body: String) -> OutgoingEmail {
        OutgoingEmail {
            from: self.from.clone(),
            to: to.to_string(),
            subject,
            body,
        }
    }

    pub fn reminder(
        &self,
        to: &str,
        username: &str,
        challenge_id: i32,
        title: &str,
        end_date: DateTime<Utc>,
    ) -> OutgoingEmail {
        self.email(
            to,
            format!("Reminder: upload your result for \"{title}\""),
            format!(
                "Hi {username},\n\n\
                 you joined \"{title}\" but have not uploaded a result yet. \
                 Uploads close at {}.\n\n{}\n",
                end_date.format("%Y-%m-%d %H:%M UTC"),
                self.challenge_link(challenge_id),
            ),
        )
    }

    pub fn voting_open(
        &self,
        to: &str,
        username: &str,
        challenge_id: i32,
        title: &str,
        vote_period_end: DateTime<Utc>,
    ) -> OutgoingEmail {
        self.email(
            to,
            format!("Voting is open for \"{title}\""),
            format!(
                "Hi {username},\n\n\
                 submissions for \"{title}\" are closed and voting has started. \
                 Voting ends at {}.\n\n{}\n",
                vote_period_end.format("%Y-%m-%d %H:%M UTC"),
                self.challenge_link(challenge_id),
            ),
        )
    }

    pub fn results(
        &self,
        to: &str,
        username: &str,
        archived_id: i32,
        title: &str,
        summary: &ResultSummary,
    ) -> OutgoingEmail {
        let standing = match summary.placement {
            Some(place) => format!(
                "You placed #{place} of {} with {} vote(s).",
                summary.entrants, summary.votes
            ),
            None => "You did not upload a result, so you were not ranked.".to_string(),
        };
        let rating = match (summary.rating_after, summary.rating_delta) {
            (Some(after), Some(delta)) => format!("\nYour category rating is now {after} ({delta:+})."),
            _ => String::new(),
        };
        self.email(
            to,
            format!("Results for \"{title}\""),
            format!(
                "Hi {username},\n\n\"{title}\" has finished. {standing}{rating}\n\n{}/archive/{archived_id}\n",
                self.public_url,
            ),
        )
    }

    pub fn challenge_cancelled(&self, to: &str, username: &str, title: &str) -> OutgoingEmail {
        self.email(
            to,
            format!("\"{title}\" was cancelled"),
            format!(
                "Hi {username},\n\n\
                 your challenge \"{title}\" closed without any uploaded results \
                 and has been removed.\n"
            ),
        )
    }
}
