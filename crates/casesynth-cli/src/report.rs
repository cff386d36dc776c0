//! Human and JSON renderings of command results.

use casesynth_core::{CaseReceipt, Created, StoredRecord};
use colored::Colorize;
use serde_json::{json, Value as JsonValue};
use std::path::Path;

pub fn created_json(created: &Created) -> JsonValue {
    let receipts: Vec<JsonValue> = created.receipts().iter().map(receipt_json).collect();
    match created {
        Created::Single(receipt) => json!({
            "case_type": receipt.case_type,
            "ids": [receipt.record_id.as_str()],
            "records": receipts,
        }),
        Created::Batch(batch) => json!({
            "case_type": batch.case_type,
            "requested": batch.requested,
            "ids": batch.ids().iter().map(|id| id.as_str()).collect::<Vec<_>>(),
            "records": receipts,
            "failures": batch
                .failures
                .iter()
                .map(|f| json!({ "unit": f.unit, "phase": f.phase.to_string(), "error": f.error.to_string() }))
                .collect::<Vec<_>>(),
        }),
    }
}

fn receipt_json(receipt: &CaseReceipt) -> JsonValue {
    json!({
        "id": receipt.record_id.as_str(),
        "collection": receipt.collection,
        "notes": receipt.notes_appended,
        "attached": receipt.attached,
        "warnings": receipt.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}

pub fn print_created(created: &Created, store: &Path) {
    let receipts = created.receipts();
    let case_type = match created {
        Created::Single(r) => r.case_type.as_str(),
        Created::Batch(b) => b.case_type.as_str(),
    };
    println!(
        "{} {} {} in {}",
        "Created".green().bold(),
        receipts.len(),
        case_type.bold(),
        store.display()
    );
    for receipt in receipts {
        println!("  {} {}/{}", "→".cyan(), receipt.collection, receipt.record_id);
        for warning in &receipt.warnings {
            println!("    {} {}", "warning:".yellow().bold(), warning);
        }
    }
    if let Created::Batch(batch) = created {
        for failure in &batch.failures {
            println!(
                "  {} unit {} failed while {}: {}",
                "✗".red(),
                failure.unit,
                failure.phase,
                failure.error
            );
        }
        if !batch.is_complete() {
            println!(
                "{} {} of {} units produced records",
                "info:".yellow().bold(),
                batch.created.len(),
                batch.requested
            );
        }
    }
}

/// A stored record; attachment blobs are summarized by size.
pub fn record_json(record: &StoredRecord) -> JsonValue {
    json!({
        "id": record.id.as_str(),
        "fields": record.fields,
        "journal": record.journal,
        "attachments": record
            .attachments
            .iter()
            .map(|a| json!({
                "file_name": a.file_name,
                "mime_type": a.mime_type,
                "bytes": a.content.len(),
                "created_at": a.created_at,
            }))
            .collect::<Vec<_>>(),
    })
}
