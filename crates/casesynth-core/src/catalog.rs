//! Built-in case types.
//!
//! Identifiers are never literal here; they come from the configured
//! identity table via `FieldSpec::Identity`.

use crate::schema::{
    AttachmentSpec, AuthorRef, CaseTypeSchema, FieldSpec, LookupFallback, LookupFilter, NoteKind, NumericBound,
};
use crate::value::{Fields, Value};

pub const PATIENT_COLLECTION: &str = "sn_hcls_patient";
pub const PRE_AUTH_COLLECTION: &str = "sn_hcls_pre_auth_header";

const DESCRIPTION_PROMPT: &str = "Detailed description for: {short_description}";
const REQUESTER_PROMPT: &str = "Comment about {short_description}";
const AGENT_PROMPT: &str = "Work note for {short_description}";

/// Every built-in schema, in registration order.
pub fn builtin() -> Vec<CaseTypeSchema> {
    vec![
        incident(),
        csm_case(),
        hr_case(),
        healthcare_claim(),
        pre_authorization(),
        claim_dispute(),
        change_request(),
    ]
}

/// Requester comment followed by an agent work note.
fn with_conversation(schema: CaseTypeSchema, requester: AuthorRef) -> CaseTypeSchema {
    schema
        .note(NoteKind::NoteFromRequester, requester, REQUESTER_PROMPT)
        .note(NoteKind::NoteFromAgent, AuthorRef::identity("agent_user"), AGENT_PROMPT)
}

pub fn incident() -> CaseTypeSchema {
    let schema = CaseTypeSchema::new("incident", "incident")
        .requiring_short_description()
        .field("short_description", FieldSpec::template("{short_description}"))
        .field("description", FieldSpec::generated(DESCRIPTION_PROMPT))
        .field("caller_id", FieldSpec::identity("incident_caller"))
        .field("cmdb_ci", FieldSpec::identity("configuration_item"))
        .field("business_service", FieldSpec::identity("business_service"))
        .field("impact", FieldSpec::constant(1i64))
        .field("urgency", FieldSpec::constant(1i64))
        .field("priority", FieldSpec::constant(1i64))
        .field("category", FieldSpec::constant("Network"))
        .field("subcategory", FieldSpec::constant("Email"))
        .field("assignment_group", FieldSpec::identity("incident_assignment_group"))
        .field("state", FieldSpec::constant(1i64))
        .field("opened_by", FieldSpec::identity("incident_caller"))
        .field("location", FieldSpec::identity("incident_location"));
    with_conversation(schema, AuthorRef::field("caller_id"))
}

pub fn csm_case() -> CaseTypeSchema {
    let schema = CaseTypeSchema::new("csm_case", "sn_customerservice_case")
        .requiring_short_description()
        .field("short_description", FieldSpec::template("{short_description}"))
        .field("description", FieldSpec::generated(DESCRIPTION_PROMPT))
        .field("contact", FieldSpec::identity("csm_contact"))
        .field("account", FieldSpec::identity("csm_account"))
        .field("product", FieldSpec::identity("csm_product"))
        .field("priority", FieldSpec::constant(2i64))
        .field("severity", FieldSpec::constant(2i64))
        .field("assigned_to", FieldSpec::identity("csm_agent"))
        .field("opened_by", FieldSpec::identity("csm_contact"));
    with_conversation(schema, AuthorRef::field("contact"))
}

pub fn hr_case() -> CaseTypeSchema {
    let schema = CaseTypeSchema::new("hr_case", "sn_hr_core_case")
        .requiring_short_description()
        .field("short_description", FieldSpec::template("{short_description}"))
        .field("description", FieldSpec::generated(DESCRIPTION_PROMPT))
        .field("opened_for", FieldSpec::identity("hr_opened_for"))
        .field("hr_service", FieldSpec::identity("hr_service"))
        .field("subject_person", FieldSpec::identity("hr_subject_person"))
        .field("assignment_group", FieldSpec::identity("hr_assignment_group"))
        .field("hr_service_type", FieldSpec::constant("employee_relations"))
        .field("due_date", FieldSpec::date(5))
        .field("opened_by", FieldSpec::identity("hr_opened_for"));
    with_conversation(schema, AuthorRef::field("opened_for"))
}

/// Used when the patient table is empty.
fn placeholder_patient() -> LookupFallback {
    let fields: Fields = [
        ("name", "John Doe"),
        ("date_of_birth", "1980-01-01"),
        ("gender", "male"),
        ("address", "123 Main St, Anytown, USA"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), Value::text(v)))
    .collect();
    LookupFallback::Placeholder { fields }
}

fn procedures() -> FieldSpec {
    FieldSpec::choice([
        "Atypical Nevus Removal",
        "Congenital Nevus Removal",
        "Knee Arthroscopy",
        "Spinal Fusion Surgery",
        "Cardiac Catheterization",
    ])
}

fn physicians() -> FieldSpec {
    FieldSpec::choice(["Dr. John Smith", "Dr. Emily Brown", "Dr. James Dean", "Dr. Lisa White"])
}

fn patient_lookup() -> FieldSpec {
    FieldSpec::lookup(PATIENT_COLLECTION, None, placeholder_patient())
}

fn patient_name(reference: &str) -> FieldSpec {
    FieldSpec::related_field(reference, PATIENT_COLLECTION, "name", "Unknown Patient")
}

pub fn healthcare_claim() -> CaseTypeSchema {
    let schema = CaseTypeSchema::new("healthcare_claim", "sn_hcls_claim_header")
        .batchable()
        .field("patient", patient_lookup())
        .field("u_patient_name", patient_name("patient"))
        .field("u_mrn", FieldSpec::pattern("MRN", 6))
        .field("procedure", procedures())
        .field("physician", physicians())
        .field("claim_type", FieldSpec::choice(["Professional", "Institutional", "Dental", "Pharmacy"]))
        .field("service_date", FieldSpec::date(-14))
        .field("total_billed_amount", FieldSpec::range(100.0, 10_000.0, 2))
        .field("allowed_amount", FieldSpec::range(0.0, NumericBound::field("total_billed_amount"), 2))
        .field("paid_amount", FieldSpec::range(0.0, NumericBound::field("allowed_amount"), 2))
        .field("state", FieldSpec::choice(["submitted", "in_review", "adjudicated"]))
        .field("short_description", FieldSpec::template("Claim for {procedure} ({u_patient_name})"))
        .field(
            "description",
            FieldSpec::generated("Summarize a healthcare claim for {procedure} performed by {physician}."),
        )
        .field("opened_by", FieldSpec::identity("agent_user"));
    with_conversation(schema, AuthorRef::identity("agent_user")).with_attachment(AttachmentSpec {
        file_name: "claim_summary.txt".to_string(),
        mime_type: "text/plain".to_string(),
        prompt: "Generate a claim processing log for: \"{short_description}\".".to_string(),
    })
}

pub fn pre_authorization() -> CaseTypeSchema {
    let schema = CaseTypeSchema::new("pre_authorization", PRE_AUTH_COLLECTION)
        .batchable()
        .field("patient", patient_lookup())
        .field("u_patient_name", patient_name("patient"))
        .field("u_mrn", FieldSpec::pattern("MRN", 6))
        .field("requested_procedure", procedures())
        .field("physician", physicians())
        .field("requested_date", FieldSpec::date(0))
        .field("service_date", FieldSpec::date(14))
        .field("estimated_cost", FieldSpec::range(500.0, 50_000.0, 2))
        .field("priority", FieldSpec::choice([1i64, 2, 3]))
        .field("state", FieldSpec::constant(1i64))
        .field(
            "short_description",
            FieldSpec::template("Pre-authorization for {requested_procedure} ({u_patient_name})"),
        )
        .field(
            "description",
            FieldSpec::generated("Explain the medical necessity of {requested_procedure} for a patient."),
        )
        .field("opened_by", FieldSpec::identity("agent_user"));
    with_conversation(schema, AuthorRef::identity("agent_user"))
}

pub fn claim_dispute() -> CaseTypeSchema {
    let schema = CaseTypeSchema::new("claim_dispute", "u_claimdispute")
        .batchable()
        .field("number", FieldSpec::sequence("CD", 7))
        .field("u_member", patient_lookup())
        .field("u_patient_name", patient_name("u_member"))
        .field("u_denial_code", FieldSpec::choice(["CO 16", "PR 204", "OA 18", "CO 50"]))
        .field(
            "u_reason_for_denial",
            FieldSpec::constant("Services not covered under the patient's benefit plan."),
        )
        .field("u_requested_procedure", procedures())
        .field("u_physician_name", physicians())
        .field("u_initial_determination", FieldSpec::choice(["Adverse", "Favorable"]))
        .field("u_initial_determination_date", FieldSpec::date(-10))
        .field(
            "u_pre_auth_request",
            FieldSpec::lookup(
                PRE_AUTH_COLLECTION,
                Some(LookupFilter::field_equals_field("patient", "u_member")),
                LookupFallback::Constant { value: Value::text("") },
            ),
        )
        .field("u_mrn", FieldSpec::pattern("MRN", 6))
        .field("u_source", FieldSpec::constant("Provider"))
        .field("u_secondary_diagnosis_of_concern", FieldSpec::constant("Hypertension"))
        .field("state", FieldSpec::constant(1i64))
        .field("priority", FieldSpec::constant(3i64))
        .field("short_description", FieldSpec::template("Claim dispute for {u_patient_name}"))
        .field(
            "description",
            FieldSpec::template("Patient {u_patient_name} is disputing the claim denial for {u_requested_procedure}."),
        )
        .field("assigned_to", FieldSpec::identity("agent_user"))
        .field("opened_by", FieldSpec::identity("agent_user"))
        .field("opened_at", FieldSpec::date(0));
    with_conversation(schema, AuthorRef::field("opened_by"))
}

pub fn change_request() -> CaseTypeSchema {
    let schema = CaseTypeSchema::new("change_request", "change_request")
        .batchable()
        .field("number", FieldSpec::sequence("CHG", 7))
        .field("type", FieldSpec::choice(["normal", "standard", "emergency"]))
        .field("risk", FieldSpec::choice([2i64, 3, 4]))
        .field("impact", FieldSpec::choice([1i64, 2, 3]))
        .field(
            "category",
            FieldSpec::choice(["Hardware", "Software", "Network", "Service", "Documentation"]),
        )
        .field(
            "cmdb_ci",
            FieldSpec::lookup(
                "cmdb_ci",
                None,
                LookupFallback::Identity {
                    name: "configuration_item".to_string(),
                },
            ),
        )
        .field("assignment_group", FieldSpec::identity("change_assignment_group"))
        .field("start_date", FieldSpec::date(3))
        .field("end_date", FieldSpec::date(4))
        .field("state", FieldSpec::constant(-5i64))
        .field("short_description", FieldSpec::template("{type} change for {category}"))
        .field(
            "description",
            FieldSpec::generated("Describe a {type} change request in the {category} category."),
        )
        .field("requested_by", FieldSpec::identity("agent_user"));
    with_conversation(schema, AuthorRef::field("requested_by")).with_attachment(AttachmentSpec {
        file_name: "implementation_plan.txt".to_string(),
        mime_type: "text/plain".to_string(),
        prompt: "Generate an implementation plan for: \"{short_description}\".".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::template;

    #[test]
    fn test_every_identity_used_by_the_catalog_is_configured() {
        let config = EngineConfig::default();
        for schema in builtin() {
            for planned in &schema.field_plan {
                let name = match &planned.spec {
                    FieldSpec::Identity { name } => name,
                    FieldSpec::RelatedRecordLookup {
                        fallback: LookupFallback::Identity { name },
                        ..
                    } => name,
                    _ => continue,
                };
                assert!(config.identity(name).is_some(), "{}.{} uses unknown identity {name}", schema.id, planned.name);
            }
            for note in &schema.annotation_plan {
                if let AuthorRef::Identity { name } = &note.author {
                    assert!(config.identity(name).is_some());
                }
            }
        }
    }

    #[test]
    fn test_references_point_backwards() {
        for schema in builtin() {
            let mut seen: Vec<&str> = vec!["short_description", "case_type"];
            for planned in &schema.field_plan {
                let refs: Vec<String> = match &planned.spec {
                    FieldSpec::Template { text } | FieldSpec::GeneratedText { prompt: text } => {
                        template::placeholders(text)
                    }
                    FieldSpec::RelatedField { reference, .. } => vec![reference.clone()],
                    FieldSpec::RandomNumericRange {
                        max: NumericBound::Field { field },
                        ..
                    } => vec![field.clone()],
                    _ => Vec::new(),
                };
                for r in refs {
                    assert!(seen.contains(&r.as_str()), "{}.{} references later field {r}", schema.id, planned.name);
                }
                seen.push(planned.name.as_str());
            }
            for note in &schema.annotation_plan {
                if let AuthorRef::Field { field } = &note.author {
                    assert!(seen.contains(&field.as_str()), "{} note author {field} unresolved", schema.id);
                }
            }
        }
    }

    #[test]
    fn test_flag_defaults() {
        for schema in builtin() {
            let interactive = matches!(schema.id.as_str(), "incident" | "csm_case" | "hr_case");
            assert_eq!(schema.requires_short_description, interactive, "{}", schema.id);
            assert_eq!(schema.allows_batch, !interactive, "{}", schema.id);
            assert_eq!(schema.annotation_plan.len(), 2);
            assert_eq!(schema.annotation_plan[0].kind, NoteKind::NoteFromRequester);
            assert_eq!(schema.annotation_plan[1].kind, NoteKind::NoteFromAgent);
        }
    }
}
