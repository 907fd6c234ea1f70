//! Database queries for step and episode records

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::types::*;

/// Parse a step from a database row
pub fn step_from_row(row: &Row) -> rusqlite::Result<StepRecord> {
    Ok(StepRecord {
        step: row.get("step")?,
        reward: row.get("reward")?,
        reward_components: json_column(row, "reward_components")?,
        episode: row.get("episode")?,
    })
}

/// Parse an episode from a database row
pub fn episode_from_row(row: &Row) -> rusqlite::Result<EpisodeRecord> {
    Ok(EpisodeRecord {
        episode: row.get("episode")?,
        total_reward: row.get("total_reward")?,
        length: row.get("length")?,
        hacking_score: row.get("hacking_score")?,
        hacking_flags: json_column(row, "hacking_flags")?,
    })
}

/// Decode a JSON text column; malformed JSON fails the whole read
fn json_column<T: DeserializeOwned>(row: &Row, column: &str) -> rusqlite::Result<T> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text).map_err(|e| {
        let idx = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

/// The `n` most recent steps, oldest first
pub fn recent_steps(conn: &Connection, n: usize) -> Result<Vec<StepRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT step, episode, reward, reward_components
         FROM steps ORDER BY step DESC LIMIT ?",
    )?;

    let mut steps = stmt
        .query_map([limit(n)], step_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    steps.reverse();

    Ok(steps)
}

/// The `n` most recent episodes, oldest first
pub fn recent_episodes(conn: &Connection, n: usize) -> Result<Vec<EpisodeRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT episode, total_reward, length, hacking_score, hacking_flags
         FROM episodes ORDER BY episode DESC LIMIT ?",
    )?;

    let mut episodes = stmt
        .query_map([limit(n)], episode_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    episodes.reverse();

    Ok(episodes)
}

/// Append a step (collector side)
pub fn insert_step(conn: &Connection, step: &StepRecord) -> Result<()> {
    let components = serde_json::to_string(&step.reward_components)?;
    conn.execute(
        "INSERT INTO steps (step, episode, reward, reward_components) VALUES (?, ?, ?, ?)",
        params![step.step, step.episode, step.reward, components],
    )?;
    Ok(())
}

/// Record a finalized episode (collector side)
pub fn insert_episode(conn: &Connection, episode: &EpisodeRecord) -> Result<()> {
    let flags = serde_json::to_string(&episode.hacking_flags)?;
    conn.execute(
        "INSERT INTO episodes (episode, total_reward, length, hacking_score, hacking_flags)
         VALUES (?, ?, ?, ?, ?)",
        params![
            episode.episode,
            episode.total_reward,
            episode.length,
            episode.hacking_score,
            flags
        ],
    )?;
    Ok(())
}

/// SQLite wants a signed LIMIT; clamp absurd windows instead of wrapping
fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
