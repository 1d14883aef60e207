//! Job state transitions that produce notifications.
//!
//! Each transition commits on its own; the notification is dispatched only
//! after the commit and can never undo it.

use serde::Serialize;

use crate::{
    error::{Error, Result},
    notifications::{Dispatch, Notifier},
    store::{NewNotification, NotificationKind, Store},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub job_id: String,
    pub status: &'static str,
    pub msg: &'static str,
}

pub async fn accept_proposal(
    store: &Store,
    notifier: &Notifier,
    client_id: &str,
    proposal_id: &str,
) -> Result<(Transition, Dispatch)> {
    let mut tx = store.pool().begin().await?;

    let claimed: Option<(String, String)> = sqlx::query_as(
        r#"UPDATE jobs SET status = 'in_progress'
           WHERE job_id = (SELECT job_id FROM proposals WHERE proposal_id = ?)
             AND client_id = ? AND status = 'open'
           RETURNING job_id, (SELECT provider_id FROM proposals WHERE proposal_id = ?)"#,
    )
    .bind(proposal_id)
    .bind(client_id)
    .bind(proposal_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((job_id, provider_id)) = claimed else {
        tx.rollback().await?;
        return Err(why_not_acceptable(store, client_id, proposal_id).await?);
    };

    sqlx::query("UPDATE proposals SET status = 'accepted' WHERE proposal_id = ?")
        .bind(proposal_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE proposals SET status = 'rejected' WHERE job_id = ? AND proposal_id != ?")
        .bind(&job_id)
        .bind(proposal_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    tracing::info!(job_id, proposal_id, provider_id, "proposal accepted");

    let dispatch = notifier.notify(NewNotification {
        recipient_id: provider_id,
        kind: NotificationKind::ProposalAccepted,
        message: "Your proposal has been accepted! You can now start the job.".to_owned(),
        link: Some("/my-proposals".to_owned()),
    });

    Ok((
        Transition {
            job_id,
            status: "in_progress",
            msg: "Proposal accepted successfully. The job is now in progress.",
        },
        dispatch,
    ))
}

async fn why_not_acceptable(store: &Store, client_id: &str, proposal_id: &str) -> Result<Error> {
    let found: Option<(String, String)> = sqlx::query_as(
        "SELECT j.client_id, j.status FROM proposals p JOIN jobs j ON j.job_id = p.job_id WHERE p.proposal_id = ?",
    )
    .bind(proposal_id)
    .fetch_optional(store.pool())
    .await?;

    Ok(match found {
        None => Error::not_found("proposal not found"),
        Some((owner, _)) if owner != client_id => Error::forbidden("you are not the owner of this job"),
        Some(_) => Error::Conflict("job is no longer open".to_owned()),
    })
}

pub async fn submit_work(
    store: &Store,
    notifier: &Notifier,
    provider_id: &str,
    job_id: &str,
) -> Result<(Transition, Dispatch)> {
    let submitted: Option<(String, String)> = sqlx::query_as(
        r#"UPDATE jobs SET status = 'submitted'
           WHERE job_id = ? AND status = 'in_progress'
             AND EXISTS (SELECT 1 FROM proposals p
                         WHERE p.job_id = jobs.job_id AND p.provider_id = ? AND p.status = 'accepted')
           RETURNING client_id, title"#,
    )
    .bind(job_id)
    .bind(provider_id)
    .fetch_optional(store.pool())
    .await?;

    let Some((client_id, title)) = submitted else {
        let assigned: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM proposals WHERE job_id = ? AND provider_id = ? AND status = 'accepted'",
        )
        .bind(job_id)
        .bind(provider_id)
        .fetch_optional(store.pool())
        .await?;

        return Err(match assigned {
            None => Error::forbidden("you are not the assigned provider for this job"),
            Some(_) => Error::Conflict("job is not currently in progress".to_owned()),
        });
    };
    tracing::info!(job_id, provider_id, "work submitted");

    let dispatch = notifier.notify(NewNotification {
        recipient_id: client_id,
        kind: NotificationKind::WorkSubmitted,
        message: format!("Work submitted for \"{title}\". Please review and complete."),
        link: Some("/dashboard".to_owned()),
    });

    Ok((
        Transition {
            job_id: job_id.to_owned(),
            status: "submitted",
            msg: "Work submitted successfully.",
        },
        dispatch,
    ))
}

pub async fn complete_job(
    store: &Store,
    notifier: &Notifier,
    client_id: &str,
    job_id: &str,
) -> Result<(Transition, Dispatch)> {
    let completed: Option<(Option<String>,)> = sqlx::query_as(
        r#"UPDATE jobs SET status = 'completed'
           WHERE job_id = ? AND client_id = ? AND status = 'submitted'
           RETURNING (SELECT provider_id FROM proposals
                      WHERE proposals.job_id = jobs.job_id AND proposals.status = 'accepted' LIMIT 1)"#,
    )
    .bind(job_id)
    .bind(client_id)
    .fetch_optional(store.pool())
    .await?;

    let Some((provider_id,)) = completed else {
        return Err(Error::forbidden(
            "cannot complete job or you are not the owner; ensure work was submitted",
        ));
    };
    let provider_id = provider_id.ok_or_else(|| Error::not_found("no accepted provider for this job"))?;
    tracing::info!(job_id, client_id, provider_id, "job completed");

    let dispatch = notifier.notify(NewNotification {
        recipient_id: provider_id,
        kind: NotificationKind::JobCompleted,
        message: "Payment released! The job is marked as complete.".to_owned(),
        link: Some("/my-proposals".to_owned()),
    });

    Ok((
        Transition {
            job_id: job_id.to_owned(),
            status: "completed",
            msg: "Job marked as complete.",
        },
        dispatch,
    ))
}

pub async fn submit_rating(
    store: &Store,
    notifier: &Notifier,
    client_id: &str,
    job_id: &str,
    score: i64,
    comment: Option<String>,
) -> Result<(Transition, Dispatch)> {
    if !(1..=5).contains(&score) {
        return Err(Error::invalid("rating score must be between 1 and 5"));
    }

    let job: Option<(String, String)> = sqlx::query_as("SELECT client_id, status FROM jobs WHERE job_id = ?")
        .bind(job_id)
        .fetch_optional(store.pool())
        .await?;
    match job {
        Some((owner, _)) if owner != client_id => return Err(Error::forbidden("you cannot rate this job")),
        None => return Err(Error::forbidden("you cannot rate this job")),
        Some((_, status)) if status != "completed" => {
            return Err(Error::invalid("job must be completed before it can be rated"));
        }
        Some(_) => {}
    }

    let provider: Option<(String,)> =
        sqlx::query_as("SELECT provider_id FROM proposals WHERE job_id = ? AND status = 'accepted' LIMIT 1")
            .bind(job_id)
            .fetch_optional(store.pool())
            .await?;
    let Some((provider_id,)) = provider else {
        return Err(Error::not_found("no accepted provider for this job"));
    };

    let inserted = sqlx::query(
        "INSERT INTO ratings (job_id,client_id,provider_id,score,comment) VALUES (?,?,?,?,?) \
         ON CONFLICT (job_id) DO NOTHING",
    )
    .bind(job_id)
    .bind(client_id)
    .bind(&provider_id)
    .bind(score)
    .bind(comment.as_deref().map(str::trim).filter(|c| !c.is_empty()))
    .execute(store.pool())
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(Error::Conflict("this job has already been rated".to_owned()));
    }
    tracing::info!(job_id, provider_id, score, "rating submitted");

    let dispatch = notifier.notify(NewNotification {
        recipient_id: provider_id,
        kind: NotificationKind::NewRating,
        message: format!("You received a new {score}-star rating!"),
        link: Some("/profile".to_owned()),
    });

    Ok((
        Transition {
            job_id: job_id.to_owned(),
            status: "completed",
            msg: "Rating submitted successfully.",
        },
        dispatch,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::{self, CLIENT, OUTSIDER, PROVIDER};

    async fn job_status(store: &Store, job_id: &str) -> String {
        let (status,): (String,) = sqlx::query_as("SELECT status FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        status
    }

    /// `job-7` is open with two pending proposals.
    async fn open_job() -> (Store, Notifier) {
        let store = fixtures::seeded().await;
        fixtures::job(store.pool(), "job-7", CLIENT, "Build deck", "open").await;
        fixtures::proposal(store.pool(), "prop-a", "job-7", PROVIDER, "pending").await;
        fixtures::proposal(store.pool(), "prop-b", "job-7", OUTSIDER, "pending").await;
        let notifier = Notifier::new(store.clone(), None);
        (store, notifier)
    }

    #[tokio::test]
    async fn accepting_makes_a_project_and_notifies_provider() {
        let (store, notifier) = open_job().await;

        let (transition, dispatch) = accept_proposal(&store, &notifier, CLIENT, "prop-a").await.unwrap();
        assert_eq!(transition.status, "in_progress");

        let notification = dispatch.settled().await.unwrap();
        assert_eq!(notification.user_id, PROVIDER);
        assert_eq!(notification.kind, NotificationKind::ProposalAccepted);
        assert_eq!(notification.link.as_deref(), Some("/my-proposals"));
        assert!(!notification.is_read);

        let project = store.authorize_participant(PROVIDER, "job-7").await.unwrap();
        assert_eq!(project.client_id, CLIENT);
        assert!(matches!(store.authorize_participant(OUTSIDER, "job-7").await, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn accept_commits_even_when_notification_write_fails() {
        let (store, notifier) = open_job().await;
        sqlx::query("DROP TABLE notifications").execute(store.pool()).await.unwrap();

        let (_, dispatch) = accept_proposal(&store, &notifier, CLIENT, "prop-a").await.unwrap();
        assert!(dispatch.settled().await.is_err());
        assert_eq!(job_status(&store, "job-7").await, "in_progress");
    }

    #[tokio::test]
    async fn accept_distinguishes_missing_foreign_and_closed() {
        let (store, notifier) = open_job().await;

        let missing = accept_proposal(&store, &notifier, CLIENT, "prop-zzz").await.unwrap_err();
        assert!(matches!(missing, Error::NotFound(_)));

        let foreign = accept_proposal(&store, &notifier, OUTSIDER, "prop-a").await.unwrap_err();
        assert!(matches!(foreign, Error::Forbidden(_)));

        let _ = accept_proposal(&store, &notifier, CLIENT, "prop-a").await.unwrap();
        let again = accept_proposal(&store, &notifier, CLIENT, "prop-b").await.unwrap_err();
        assert!(matches!(again, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn full_lifecycle_notifies_each_party() {
        let (store, notifier) = open_job().await;

        let (_, d) = accept_proposal(&store, &notifier, CLIENT, "prop-a").await.unwrap();
        d.settled().await.unwrap();

        assert!(matches!(
            submit_work(&store, &notifier, OUTSIDER, "job-7").await,
            Err(Error::Forbidden(_))
        ));
        let (_, d) = submit_work(&store, &notifier, PROVIDER, "job-7").await.unwrap();
        let to_client = d.settled().await.unwrap();
        assert_eq!(to_client.user_id, CLIENT);
        assert_eq!(to_client.message, "Work submitted for \"Build deck\". Please review and complete.");

        assert!(matches!(
            complete_job(&store, &notifier, PROVIDER, "job-7").await,
            Err(Error::Forbidden(_))
        ));
        let (_, d) = complete_job(&store, &notifier, CLIENT, "job-7").await.unwrap();
        assert_eq!(d.settled().await.unwrap().kind, NotificationKind::JobCompleted);

        assert!(matches!(
            submit_rating(&store, &notifier, CLIENT, "job-7", 9, None).await,
            Err(Error::InvalidInput(_))
        ));
        let (_, d) = submit_rating(&store, &notifier, CLIENT, "job-7", 5, Some("great".to_owned())).await.unwrap();
        let rating = d.settled().await.unwrap();
        assert_eq!(rating.message, "You received a new 5-star rating!");
        assert!(matches!(
            submit_rating(&store, &notifier, CLIENT, "job-7", 4, None).await,
            Err(Error::Conflict(_))
        ));

        let kinds: Vec<_> = store
            .notifications_for(PROVIDER)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect();
        assert_eq!(
            kinds,
            [NotificationKind::NewRating, NotificationKind::JobCompleted, NotificationKind::ProposalAccepted]
        );
    }

    #[tokio::test]
    async fn rating_requires_completed_job() {
        let (store, notifier) = open_job().await;
        let err = submit_rating(&store, &notifier, CLIENT, fixtures::PROJECT, 4, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
