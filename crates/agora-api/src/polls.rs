use std::collections::HashSet;
use std::sync::Arc;

use agora_db::Database;
use agora_db::models::{Guarded, PollRow, PollSnapshot, now, parse_id, parse_timestamp, timestamp};
use agora_gateway::dispatcher::Dispatcher;
use agora_types::events::GatewayEvent;
use agora_types::models::{NotificationKind, Poll, PollOption, UserId};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blocking;
use crate::error::InteractionError;
use crate::notifications::{NewNotification, NotificationFanout};

const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 10;
const MAX_TEXT_CHARS: usize = 300;

/// Single-choice polls. Each user holds at most one vote per poll; voting
/// again moves it.
#[derive(Clone)]
pub struct PollEngine {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    notifier: NotificationFanout,
}

impl PollEngine {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, notifier: NotificationFanout) -> Self {
        Self { db, dispatcher, notifier }
    }

    pub async fn create(&self, creator: UserId, question: &str, options: &[String]) -> Result<Poll, InteractionError> {
        let question = validate_text("question", question)?;
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len()) {
            return Err(InteractionError::validation(format!(
                "a poll needs between {} and {} options",
                MIN_OPTIONS, MAX_OPTIONS
            )));
        }
        let options = options
            .iter()
            .map(|o| validate_text("option", o))
            .collect::<Result<Vec<_>, _>>()?;

        let row = PollRow {
            id: Uuid::new_v4().to_string(),
            creator_id: creator.to_string(),
            question,
            created_at: timestamp(now()),
        };
        let id = row.id.clone();
        blocking::run(&self.db, move |db| db.insert_poll(&row, &options)).await?;

        info!("Poll {} created by {}", id, creator);
        self.get(parse_id("poll id", &id)?).await
    }

    pub async fn get(&self, poll_id: Uuid) -> Result<Poll, InteractionError> {
        let key = poll_id.to_string();
        let snapshot = blocking::run(&self.db, move |db| db.get_poll(&key))
            .await?
            .ok_or(InteractionError::NotFound("poll"))?;
        tally(snapshot)
    }

    /// Cast or move the user's vote. Voting for the current choice is a no-op.
    pub async fn vote(&self, poll_id: Uuid, user: UserId, option_index: usize) -> Result<Poll, InteractionError> {
        let idx = i64::try_from(option_index).map_err(|_| InteractionError::validation("option index out of range"))?;
        let (key, user_key, at) = (poll_id.to_string(), user.to_string(), timestamp(now()));

        let change = match blocking::run(&self.db, move |db| db.cast_vote(&key, &user_key, idx, &at)).await? {
            Guarded::Missing => return Err(InteractionError::NotFound("poll")),
            Guarded::Denied => return Err(InteractionError::validation("option index out of range")),
            Guarded::Done(change) => change,
        };

        let poll = self.get(poll_id).await?;
        if change.previous == Some(idx) {
            return Ok(poll);
        }
        debug!(
            "Vote on poll {} by {}: {:?} -> {}",
            poll_id, user, change.previous, option_index
        );

        self.broadcast(&poll, user).await;

        if change.previous.is_none() {
            let new = NewNotification {
                kind: NotificationKind::PollVote,
                recipient_id: poll.creator_id,
                from_user_id: user,
                message: format!("voted on your poll \"{}\"", poll.question),
                action_url: Some(format!("/polls/{}", poll.id)),
            };
            if let Err(e) = self.notifier.notify_others(new).await {
                warn!("Failed to record poll vote notification for {}: {}", poll.creator_id, e);
            }
        }

        Ok(poll)
    }

    /// Withdraw the user's vote, if any.
    pub async fn retract(&self, poll_id: Uuid, user: UserId) -> Result<Poll, InteractionError> {
        let (key, user_key) = (poll_id.to_string(), user.to_string());
        let previous = match blocking::run(&self.db, move |db| db.retract_vote(&key, &user_key)).await? {
            Guarded::Missing => return Err(InteractionError::NotFound("poll")),
            Guarded::Denied => return Err(InteractionError::Forbidden),
            Guarded::Done(previous) => previous,
        };

        let poll = self.get(poll_id).await?;
        if previous.is_some() {
            self.broadcast(&poll, user).await;
        }
        Ok(poll)
    }

    /// Creator, current voters and the actor (who may just have left the voters).
    async fn broadcast(&self, poll: &Poll, actor: UserId) {
        let mut audience: Vec<UserId> = vec![poll.creator_id, actor];
        audience.extend(poll.options.iter().flat_map(|o| o.voter_ids.iter().copied()));
        self.dispatcher
            .emit_to_users(&audience, &GatewayEvent::PollUpdated { poll: poll.clone() })
            .await;
    }
}

/// Turn a storage snapshot into counts, voters and percentages.
///
/// A voter listed under two options means storage broke the one-vote rule;
/// that is reported as a conflict rather than silently tallied.
pub fn tally(snapshot: PollSnapshot) -> Result<Poll, InteractionError> {
    let PollSnapshot { poll, options, votes } = snapshot;

    let mut voter_ids: Vec<Vec<UserId>> = vec![Vec::new(); options.len()];
    let mut seen = HashSet::new();
    for vote in &votes {
        let user = parse_id("voter id", &vote.user_id)?;
        if !seen.insert(user) {
            return Err(InteractionError::Conflict(format!(
                "user {} holds more than one vote in poll {}",
                user, poll.id
            )));
        }
        let slot = usize::try_from(vote.option_idx)
            .ok()
            .and_then(|i| voter_ids.get_mut(i))
            .ok_or_else(|| InteractionError::Conflict(format!("vote for unknown option {}", vote.option_idx)))?;
        slot.push(user);
    }

    let counts: Vec<usize> = voter_ids.iter().map(Vec::len).collect();
    let shares = percentages(&counts);
    let total_votes = counts.iter().sum();

    let options = options
        .into_iter()
        .zip(voter_ids)
        .zip(shares)
        .enumerate()
        .map(|(index, ((option, voter_ids), percentage))| PollOption {
            index,
            text: option.text,
            votes: voter_ids.len(),
            percentage,
            voter_ids,
        })
        .collect();

    Ok(Poll {
        id: parse_id("poll id", &poll.id)?,
        creator_id: parse_id("creator id", &poll.creator_id)?,
        question: poll.question,
        options,
        total_votes,
        created_at: parse_timestamp(&poll.created_at)?,
    })
}

/// Whole-number share of each count, rounded half up. All zero for no votes.
pub fn percentages(counts: &[usize]) -> Vec<u32> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return vec![0; counts.len()];
    }
    counts
        .iter()
        .map(|&votes| ((200 * votes + total) / (2 * total)) as u32)
        .collect()
}

fn validate_text(field: &str, text: &str) -> Result<String, InteractionError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(InteractionError::validation(format!("{} must not be empty", field)));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(InteractionError::validation(format!(
            "{} must be at most {} characters",
            field, MAX_TEXT_CHARS
        )));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Harness, drain_names};
    use agora_db::models::{PollOptionRow, PollVoteRow};

    fn options(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn percentages_round_half_up() {
        assert_eq!(percentages(&[3, 1, 0]), vec![75, 25, 0]);
        assert_eq!(percentages(&[1, 1, 1]), vec![33, 33, 33]);
        assert_eq!(percentages(&[1, 2]), vec![33, 67]);
        assert_eq!(percentages(&[1, 7]), vec![13, 88]);
    }

    #[test]
    fn percentages_without_votes_are_zero() {
        assert_eq!(percentages(&[0, 0, 0]), vec![0, 0, 0]);
        assert!(percentages(&[]).is_empty());
    }

    #[test]
    fn tally_rejects_double_votes() {
        let voter = Uuid::new_v4().to_string();
        let snapshot = PollSnapshot {
            poll: PollRow {
                id: Uuid::new_v4().to_string(),
                creator_id: Uuid::new_v4().to_string(),
                question: "q".into(),
                created_at: timestamp(now()),
            },
            options: vec![
                PollOptionRow { idx: 0, text: "a".into() },
                PollOptionRow { idx: 1, text: "b".into() },
            ],
            votes: vec![
                PollVoteRow { user_id: voter.clone(), option_idx: 0 },
                PollVoteRow { user_id: voter, option_idx: 1 },
            ],
        };
        assert!(matches!(tally(snapshot), Err(InteractionError::Conflict(_))));
    }

    #[tokio::test]
    async fn create_validates_shape() {
        let h = Harness::new();
        let polls = h.polls();
        let creator = Uuid::new_v4();

        assert!(matches!(
            polls.create(creator, "Lunch?", &options(&["pizza"])).await,
            Err(InteractionError::Validation(_))
        ));
        assert!(matches!(
            polls.create(creator, " ", &options(&["a", "b"])).await,
            Err(InteractionError::Validation(_))
        ));
        assert!(matches!(
            polls.create(creator, "Lunch?", &options(&["a", ""])).await,
            Err(InteractionError::Validation(_))
        ));

        let poll = polls.create(creator, "Lunch?", &options(&["pizza", "sushi"])).await.unwrap();
        assert_eq!(poll.options.len(), 2);
        assert_eq!(poll.total_votes, 0);
        assert!(poll.options.iter().all(|o| o.percentage == 0));
    }

    #[tokio::test]
    async fn voting_again_moves_the_vote() {
        let h = Harness::new();
        let polls = h.polls();
        let (creator, voter) = (Uuid::new_v4(), Uuid::new_v4());
        let poll = polls.create(creator, "Lunch?", &options(&["pizza", "sushi", "salad"])).await.unwrap();

        polls.vote(poll.id, voter, 0).await.unwrap();
        let poll = polls.vote(poll.id, voter, 2).await.unwrap();

        assert_eq!(poll.total_votes, 1);
        assert_eq!(poll.options[0].votes, 0);
        assert_eq!(poll.options[2].voter_ids, vec![voter]);
        assert_eq!(poll.options[2].percentage, 100);
    }

    #[tokio::test]
    async fn revoting_the_same_option_changes_nothing() {
        let h = Harness::new();
        let polls = h.polls();
        let (creator, voter) = (Uuid::new_v4(), Uuid::new_v4());
        let poll = polls.create(creator, "Lunch?", &options(&["pizza", "sushi"])).await.unwrap();
        let mut creator_rx = h.listen(creator).await;

        let first = polls.vote(poll.id, voter, 1).await.unwrap();
        let second = polls.vote(poll.id, voter, 1).await.unwrap();
        assert_eq!(first, second);

        // One update and one notification, both from the first vote.
        assert_eq!(drain_names(&mut creator_rx), vec!["poll:updated", "notification"]);
        assert_eq!(h.notifications().unread_count(creator).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn vote_rejects_bad_targets() {
        let h = Harness::new();
        let polls = h.polls();
        let (creator, voter) = (Uuid::new_v4(), Uuid::new_v4());
        let poll = polls.create(creator, "Lunch?", &options(&["pizza", "sushi"])).await.unwrap();

        assert!(matches!(polls.vote(poll.id, voter, 5).await, Err(InteractionError::Validation(_))));
        assert!(matches!(
            polls.vote(Uuid::new_v4(), voter, 0).await,
            Err(InteractionError::NotFound("poll"))
        ));
    }

    #[tokio::test]
    async fn retract_removes_the_vote() {
        let h = Harness::new();
        let polls = h.polls();
        let (creator, voter) = (Uuid::new_v4(), Uuid::new_v4());
        let poll = polls.create(creator, "Lunch?", &options(&["pizza", "sushi"])).await.unwrap();
        polls.vote(poll.id, voter, 0).await.unwrap();

        let mut voter_rx = h.listen(voter).await;
        let poll = polls.retract(poll.id, voter).await.unwrap();
        assert_eq!(poll.total_votes, 0);
        assert!(poll.options.iter().all(|o| o.voter_ids.is_empty()));
        assert_eq!(drain_names(&mut voter_rx), vec!["poll:updated"]);

        polls.retract(poll.id, voter).await.unwrap();
        assert!(drain_names(&mut voter_rx).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_votes_keep_one_per_user() {
        let h = Harness::new();
        let polls = h.polls();
        let (creator, voter) = (Uuid::new_v4(), Uuid::new_v4());
        let poll = polls.create(creator, "Lunch?", &options(&["a", "b", "c"])).await.unwrap();

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                let polls = polls.clone();
                tokio::spawn(async move { polls.vote(poll.id, voter, i % 3).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let poll = polls.get(poll.id).await.unwrap();
        assert_eq!(poll.total_votes, 1);
        assert_eq!(poll.options.iter().map(|o| o.percentage).sum::<u32>(), 100);
    }
}
