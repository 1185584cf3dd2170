//! Pure game rules: recording guesses, picking the winner, scoring and
//! elimination.
//!
//! Nothing here touches timers or channels, so every rule can be tested
//! with plain values. [`Room`](crate::Room) strings these together.

use fourfifths_protocol::{Player, PlayerId, SubmittedNumber};

/// One player's guess for the current round, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub player_id: PlayerId,
    pub number: i64,
}

/// Result of resolving a round with at least one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub average: f64,
    pub target: f64,
    pub winner: PlayerId,
    pub winning_number: i64,
}

/// Records a guess. A player who already guessed this round has their
/// number replaced in place and keeps their original position, which is
/// what ties are broken on.
pub fn record_submission(submissions: &mut Vec<Submission>, player_id: &PlayerId, number: i64) {
    match submissions.iter_mut().find(|s| s.player_id == *player_id) {
        Some(existing) => existing.number = number,
        None => submissions.push(Submission {
            player_id: player_id.clone(),
            number,
        }),
    }
}

/// Picks the winner of a round.
///
/// The target is `average * ratio`; the submission closest to it wins.
/// On equal distance the earliest submission wins. Returns `None` when
/// nobody submitted.
pub fn resolve(submissions: &[Submission], ratio: f64) -> Option<RoundOutcome> {
    let first = submissions.first()?;

    let sum: f64 = submissions.iter().map(|s| s.number as f64).sum();
    let average = sum / submissions.len() as f64;
    let target = average * ratio;

    let mut best = first;
    let mut best_distance = (first.number as f64 - target).abs();
    for candidate in &submissions[1..] {
        let distance = (candidate.number as f64 - target).abs();
        if distance < best_distance {
            best = candidate;
            best_distance = distance;
        }
    }

    Some(RoundOutcome {
        average,
        target,
        winner: best.player_id.clone(),
        winning_number: best.number,
    })
}

/// Every player except the winner loses one point. Returns how many
/// players lost a point.
pub fn apply_scores(players: &mut [Player], winner: &PlayerId) -> usize {
    let mut losers = 0;
    for player in players.iter_mut().filter(|p| p.id != *winner) {
        player.score -= 1;
        losers += 1;
    }
    losers
}

/// Removes every player at or below `threshold` and returns them in
/// roster order.
pub fn eliminate(players: &mut Vec<Player>, threshold: i32) -> Vec<Player> {
    let (out, kept): (Vec<Player>, Vec<Player>) = players
        .drain(..)
        .partition(|p| p.score <= threshold);
    *players = kept;
    out
}

/// The seat number for a new player: the lowest of `1..=max_players`
/// nobody holds. With no departures this is the join rank.
pub fn next_player_number(players: &[Player], max_players: usize) -> Option<u8> {
    (1..=max_players)
        .filter_map(|n| u8::try_from(n).ok())
        .find(|n| players.iter().all(|p| p.player_number != *n))
}

/// Builds the `submittedNumbers` report. Scores are the ones the players
/// held when the round closed, before this round's penalties.
pub fn submission_report(submissions: &[Submission], players: &[Player]) -> Vec<SubmittedNumber> {
    submissions
        .iter()
        .filter_map(|s| {
            let player = players.iter().find(|p| p.id == s.player_id)?;
            Some(SubmittedNumber {
                id: player.id.clone(),
                player_number: player.player_number,
                is_bot: player.is_bot,
                submitted_number: s.number,
                score: player.score,
            })
        })
        .collect()
}
