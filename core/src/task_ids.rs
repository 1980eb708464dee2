//! Task-id expressions from the command line: `1,3-5` → `[1, 3, 4, 5]`.
//!
//! Tokens expand left to right. Overlaps are kept, since the ids describe
//! "apply this action to these tasks in this order".

use crate::error::TaskIdError;

/// Upper bound on the number of ids one call may expand to.
pub const MAX_TASK_IDS: usize = 10_000;

fn push_range(ids: &mut Vec<u32>, low: u32, high: u32) -> Result<(), TaskIdError> {
    let width = (high - low) as usize + 1;
    if ids.len() + width > MAX_TASK_IDS {
        return Err(TaskIdError::TooMany { limit: MAX_TASK_IDS });
    }
    ids.extend(low..=high);
    Ok(())
}

fn parse_id(token: &str, whole: &str) -> Result<u32, TaskIdError> {
    match token.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err(TaskIdError::Format(whole.to_string())),
        Ok(id) => Ok(id),
    }
}

/// Parse one comma-separated expression. Empty input yields no ids.
pub fn parse_task_ids(input: &str) -> Result<Vec<u32>, TaskIdError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        match token.split_once('-') {
            Some((low, high)) => {
                let low = parse_id(low, token)?;
                let high = parse_id(high, token)?;
                if low > high {
                    return Err(TaskIdError::Range { low, high });
                }
                push_range(&mut ids, low, high)?;
            }
            None => {
                let id = parse_id(token, token)?;
                push_range(&mut ids, id, id)?;
            }
        }
    }
    Ok(ids)
}

/// Parse several expressions (one per CLI argument) and concatenate them.
pub fn parse_many<I, S>(inputs: I) -> Result<Vec<u32>, TaskIdError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut ids = Vec::new();
    for input in inputs {
        let more = parse_task_ids(input.as_ref())?;
        if ids.len() + more.len() > MAX_TASK_IDS {
            return Err(TaskIdError::TooMany { limit: MAX_TASK_IDS });
        }
        ids.extend(more);
    }
    Ok(ids)
}
