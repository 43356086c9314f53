use crate::error::Result;
use std::collections::BTreeSet;

/// Upper bound of the serialized `remote_uids.extra_flags` column
pub const EXTRA_FLAGS_MAX_BYTES: usize = 254;

/// Serialize flags as a sorted JSON array that fits the column
///
/// Flags are dropped from the end of the sorted list until the value fits.
/// Returns the serialized value and how many flags were dropped.
pub fn bounded_extra_flags(flags: &BTreeSet<String>) -> Result<(String, usize)> {
    let mut kept: Vec<&String> = flags.iter().collect();
    let mut serialized = serde_json::to_string(&kept)?;
    let mut dropped = 0;

    while serialized.len() > EXTRA_FLAGS_MAX_BYTES {
        kept.pop();
        dropped += 1;
        serialized = serde_json::to_string(&kept)?;
    }

    Ok((serialized, dropped))
}
