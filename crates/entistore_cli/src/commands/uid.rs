//! Identifier generation and decoding.

use super::CliResult;
use entistore_core::{Identifier, IdentifierGenerator};
use serde::Serialize;
use tracing::{debug, info};

/// A decoded identifier.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DecodedUid {
    /// Lowercase hex form.
    pub identifier: String,
    /// Milliseconds since the Unix epoch.
    pub instant_millis: i64,
    /// Sequence within the instant.
    pub sequence: i32,
}

/// Generates `count` identifiers, at a fixed instant or at the current time.
pub fn generate(count: usize, at: Option<i64>) -> CliResult<Vec<Identifier>> {
    let generator = IdentifierGenerator::new();
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let id = match at {
            Some(instant) => generator.next_identity_at(instant)?,
            None => generator.next_identity_now()?,
        };
        out.push(id);
    }
    debug!(count, state = ?generator.state(), "identifiers generated");
    Ok(out)
}

/// Runs `uid next`.
pub fn run_next(count: usize, at: Option<i64>, upper: bool) -> CliResult<()> {
    info!("Generating {} identifier(s)", count);
    for id in generate(count, at)? {
        if upper {
            println!("{}", id.to_upper_hex());
        } else {
            println!("{id}");
        }
    }
    Ok(())
}

/// Parses and decodes hex identifiers.
pub fn decode(inputs: &[String]) -> CliResult<Vec<DecodedUid>> {
    inputs
        .iter()
        .map(|input| {
            let id = Identifier::parse_hex(input.trim())?;
            let decoded = id.decode();
            Ok(DecodedUid {
                identifier: id.to_string(),
                instant_millis: decoded.instant_millis,
                sequence: decoded.sequence,
            })
        })
        .collect()
}

/// Runs `uid decode`.
pub fn run_decode(inputs: &[String], format: &str) -> CliResult<()> {
    let decoded = decode(inputs)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&decoded)?);
        }
        _ => {
            for uid in &decoded {
                println!(
                    "{}  instant={}  sequence={}",
                    uid.identifier, uid.instant_millis, uid.sequence
                );
            }
        }
    }
    Ok(())
}
