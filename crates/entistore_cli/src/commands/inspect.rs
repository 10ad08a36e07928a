//! Inspect command implementation.
//!
//! Reads a binary snapshot without knowing the identity type or the entity
//! codec: identities are decoded as generic CBOR values and payloads are
//! only measured.

use super::{CliError, CliResult};
use ciborium::Value as Cbor;
use entistore_core::{Identifier, StoreSnapshot};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Last instant issued by the identifier generator.
    pub generator_instant: i64,
    /// Last sequence issued by the identifier generator.
    pub generator_sequence: i32,
    /// Runtime-registered entity types.
    pub entity_types: Vec<String>,
    /// Per-view statistics.
    pub views: Vec<ViewStats>,
    /// Entity counts per concrete type.
    pub entities_by_type: BTreeMap<String, usize>,
    /// Total payload bytes.
    pub payload_bytes: usize,
    /// Secondary index records.
    pub secondary_indices: Vec<IndexStats>,
}

/// Statistics for one primary index view.
#[derive(Debug, Serialize)]
pub struct ViewStats {
    /// View type.
    pub entity_type: String,
    /// Number of identities.
    pub count: usize,
    /// Rendered identities, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identities: Option<Vec<String>>,
}

/// Statistics for one secondary index.
#[derive(Debug, Serialize)]
pub struct IndexStats {
    /// Index name.
    pub name: String,
    /// View the index follows.
    pub entity_type: String,
    /// Distinct keys.
    pub keys: usize,
    /// Indexed entities.
    pub entries: usize,
}

/// Summarizes a decoded snapshot.
pub fn summarize(
    path: &Path,
    file_size: u64,
    snapshot: &StoreSnapshot<Cbor>,
    show_identities: bool,
) -> InspectResult {
    let mut entities_by_type = BTreeMap::new();
    for record in &snapshot.entities {
        *entities_by_type
            .entry(record.type_name.to_string())
            .or_insert(0) += 1;
    }

    InspectResult {
        path: path.display().to_string(),
        file_size,
        generator_instant: snapshot.generator.previous_instant,
        generator_sequence: snapshot.generator.previous_sequence,
        entity_types: snapshot.entity_types.iter().map(|t| t.to_string()).collect(),
        views: snapshot
            .views
            .iter()
            .map(|view| ViewStats {
                entity_type: view.entity_type.to_string(),
                count: view.identities.len(),
                identities: show_identities
                    .then(|| view.identities.iter().map(render_identity).collect()),
            })
            .collect(),
        entities_by_type,
        payload_bytes: snapshot.entities.iter().map(|e| e.payload.len()).sum(),
        secondary_indices: snapshot
            .secondary_indices
            .iter()
            .map(|index| IndexStats {
                name: index.name.clone(),
                entity_type: index.entity_type.to_string(),
                keys: index.keys,
                entries: index.entries,
            })
            .collect(),
    }
}

/// Renders an identity of unknown type.
///
/// Integers and text print as-is; a 12-byte value (as bytes or as an array
/// of small integers) prints as an identifier.
pub fn render_identity(value: &Cbor) -> String {
    match value {
        Cbor::Integer(i) => i128::from(*i).to_string(),
        Cbor::Text(s) => s.clone(),
        Cbor::Bytes(bytes) => match Identifier::from_slice(bytes) {
            Some(id) => id.to_string(),
            None => format!("{bytes:02x?}"),
        },
        Cbor::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|item| match item {
                    Cbor::Integer(i) => u8::try_from(i128::from(*i)).ok(),
                    _ => None,
                })
                .collect();
            match bytes.as_deref().and_then(Identifier::from_slice) {
                Some(id) => id.to_string(),
                None => {
                    let parts: Vec<String> = items.iter().map(render_identity).collect();
                    format!("[{}]", parts.join(", "))
                }
            }
        }
        other => format!("{other:?}"),
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, show_identities: bool, format: &str) -> CliResult<()> {
    info!("Inspecting snapshot {:?}", path);
    let io_error = |source| CliError::Io {
        path: path.display().to_string(),
        source,
    };
    let file = File::open(path).map_err(io_error)?;
    let file_size = file.metadata().map_err(io_error)?.len();
    let snapshot = StoreSnapshot::<Cbor>::read_from(BufReader::new(file))?;
    let result = summarize(path, file_size, &snapshot, show_identities);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Entistore Snapshot Inspection");
    println!("=============================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.file_size));
    println!();
    println!("Generator:");
    println!("  Previous instant:  {}", result.generator_instant);
    println!("  Previous sequence: {}", result.generator_sequence);
    if !result.entity_types.is_empty() {
        println!();
        println!("Registered types: {}", result.entity_types.join(", "));
    }
    println!();
    println!("Views:");
    for view in &result.views {
        println!("  {:<24} {} entities", view.entity_type, view.count);
        if let Some(identities) = &view.identities {
            for identity in identities {
                println!("    {identity}");
            }
        }
    }
    println!();
    println!("Entities:");
    for (type_name, count) in &result.entities_by_type {
        println!("  {type_name:<24} {count}");
    }
    println!("  Payload:  {}", format_size(result.payload_bytes as u64));

    if !result.secondary_indices.is_empty() {
        println!();
        println!("Secondary indices:");
        for index in &result.secondary_indices {
            println!(
                "  {} on {}: {} keys, {} entries",
                index.name, index.entity_type, index.keys, index.entries
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entistore_core::{
        EntityRecord, GeneratorState, SecondaryIndexRecord, TypeName, ViewSnapshot,
    };

    fn snapshot() -> StoreSnapshot<Identifier> {
        let a = Identifier::encode(1_000, 1);
        let b = Identifier::encode(1_000, 2);
        StoreSnapshot {
            generator: GeneratorState {
                previous_instant: 1_000,
                previous_sequence: 2,
            },
            entity_types: vec![TypeName::new("Human")],
            views: vec![ViewSnapshot {
                entity_type: TypeName::new("Human"),
                identities: vec![a, b],
            }],
            entities: vec![
                EntityRecord {
                    identity: a,
                    type_name: TypeName::new("Human"),
                    payload: vec![0; 10],
                },
                EntityRecord {
                    identity: b,
                    type_name: TypeName::new("Human"),
                    payload: vec![0; 5],
                },
            ],
            secondary_indices: vec![SecondaryIndexRecord {
                name: "humansByLastName".into(),
                entity_type: TypeName::new("Human"),
                keys: 1,
                entries: 2,
            }],
        }
    }

    #[test]
    fn summarizes_identifier_keyed_snapshot() {
        let bytes = snapshot().to_bytes().unwrap();
        let generic = StoreSnapshot::<Cbor>::from_bytes(&bytes).unwrap();
        let result = summarize(Path::new("s.snap"), bytes.len() as u64, &generic, true);

        assert_eq!(result.entities_by_type["Human"], 2);
        assert_eq!(result.payload_bytes, 15);
        assert_eq!(result.views[0].count, 2);
        let rendered = result.views[0].identities.as_ref().unwrap();
        assert_eq!(rendered[0], Identifier::encode(1_000, 1).to_string());
        assert_eq!(result.secondary_indices[0].entries, 2);
    }

    #[test]
    fn renders_integer_and_text_identities() {
        assert_eq!(render_identity(&Cbor::Integer(42.into())), "42");
        assert_eq!(render_identity(&Cbor::Text("k".into())), "k");
        assert_eq!(
            render_identity(&Cbor::Array(vec![Cbor::Integer(1.into()), Cbor::Text("x".into())])),
            "[1, x]"
        );
    }
}
