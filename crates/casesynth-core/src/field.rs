//! Field value resolution.
//!
//! Every [`FieldSpec`] variant resolves here. The random and computed
//! variants are pure functions of the RNG and the context; only lookups
//! (`RelatedRecordLookup`, `RelatedField`, `NextSequence`) talk to the
//! store, and only `GeneratedText` talks to the content generator.

use crate::config::EngineConfig;
use crate::content::ContentGenerator;
use crate::error::{Result, SynthesisError};
use crate::schema::{FieldSpec, FilterOperand, LookupFallback, LookupFilter, NumericBound, RecordFilter};
use crate::store::{RecordStore, StoreError};
use crate::template;
use crate::value::{Fields, Value};
use chrono::{DateTime, Duration, FixedOffset};
use rand::Rng;
use tracing::{debug, warn};

/// Caller-supplied inputs of one synthesis call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseInputs {
    pub short_description: Option<String>,
}

impl CaseInputs {
    pub fn new(short_description: Option<&str>) -> Self {
        Self {
            short_description: short_description.map(str::to_string),
        }
    }

    /// The short description, if present and not blank.
    pub fn short_description(&self) -> Option<&str> {
        self.short_description
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Per-record resolution state: inputs, fields resolved so far, clock.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub case_type: String,
    pub collection: String,
    pub now: DateTime<FixedOffset>,
    vars: Fields,
    resolved: Fields,
    warnings: Vec<SynthesisError>,
}

impl ResolutionContext {
    pub fn new(case_type: &str, collection: &str, inputs: &CaseInputs, now: DateTime<FixedOffset>) -> Self {
        let mut vars = Fields::new();
        vars.insert("case_type".to_string(), Value::text(case_type));
        vars.insert(
            "short_description".to_string(),
            inputs.short_description().map_or(Value::Null, Value::text),
        );
        Self {
            case_type: case_type.to_string(),
            collection: collection.to_string(),
            now,
            vars,
            resolved: Fields::new(),
            warnings: Vec::new(),
        }
    }

    /// Placeholder lookup: resolved fields shadow caller inputs.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.resolved.get(name).or_else(|| self.vars.get(name))
    }

    pub fn render(&self, text: &str) -> String {
        template::render(text, |name| self.lookup(name))
    }

    pub fn resolved(&self) -> &Fields {
        &self.resolved
    }

    pub fn record(&mut self, field: &str, value: Value) {
        self.resolved.insert(field.to_string(), value);
    }

    pub fn warn(&mut self, warning: SynthesisError) {
        self.warnings.push(warning);
    }

    /// Caller inputs, resolved fields and recovered warnings.
    pub fn into_parts(self) -> (Fields, Fields, Vec<SynthesisError>) {
        (self.vars, self.resolved, self.warnings)
    }

    fn reference(&self, field: &str, reference: &str) -> Result<&Value> {
        self.resolved
            .get(reference)
            .ok_or_else(|| SynthesisError::UnresolvedReference {
                field: field.to_string(),
                reference: reference.to_string(),
                reason: "not resolved earlier in the field plan".to_string(),
            })
    }
}

/// Resolves field specs against the store, generator and configuration.
pub struct FieldValueGenerator<'a> {
    store: &'a dyn RecordStore,
    content: &'a ContentGenerator,
    config: &'a EngineConfig,
}

impl<'a> FieldValueGenerator<'a> {
    pub fn new(store: &'a dyn RecordStore, content: &'a ContentGenerator, config: &'a EngineConfig) -> Self {
        Self {
            store,
            content,
            config,
        }
    }

    pub fn resolve<R: Rng>(
        &self,
        field: &str,
        spec: &FieldSpec,
        ctx: &mut ResolutionContext,
        rng: &mut R,
    ) -> Result<Value> {
        match spec {
            FieldSpec::Constant { value } => Ok(value.clone()),
            FieldSpec::RandomChoice { choices } => random_choice(field, choices, rng).cloned(),
            FieldSpec::RandomNumericRange { min, max, precision } => {
                let min = numeric_bound(field, min, ctx)?;
                let max = numeric_bound(field, max, ctx)?;
                random_in_range(field, min, max, *precision, rng)
            }
            FieldSpec::RandomPatternString { prefix, digits } => {
                Ok(Value::Text(random_pattern(prefix, *digits, rng)))
            }
            FieldSpec::GeneratedText { prompt } => {
                let prompt = ctx.render(prompt);
                let generated = self.content.generate(&prompt);
                if let Some(err) = generated.degraded {
                    ctx.warn(SynthesisError::ContentGenerationDegraded(format!("field `{field}`: {err}")));
                }
                Ok(Value::Text(generated.text))
            }
            FieldSpec::RelatedRecordLookup {
                collection,
                filter,
                fallback,
            } => self.lookup_record(field, collection, filter.as_ref(), fallback, ctx, rng),
            FieldSpec::ComputedDate { offset_days } => Ok(Value::Timestamp(offset_date(ctx.now, *offset_days))),
            FieldSpec::Identity { name } => self.identity(field, name),
            FieldSpec::Template { text } => Ok(Value::Text(ctx.render(text))),
            FieldSpec::RelatedField {
                reference,
                collection,
                field: source,
                default,
            } => self.related_field(field, reference, collection, source, default, ctx),
            FieldSpec::NextSequence { prefix, width } => self.next_sequence(field, prefix, *width, ctx),
        }
    }

    fn identity(&self, field: &str, name: &str) -> Result<Value> {
        self.config
            .identity(name)
            .map(Value::text)
            .ok_or_else(|| SynthesisError::UnknownIdentity {
                field: field.to_string(),
                name: name.to_string(),
            })
    }

    fn lookup_record<R: Rng>(
        &self,
        field: &str,
        collection: &str,
        filter: Option<&LookupFilter>,
        fallback: &LookupFallback,
        ctx: &ResolutionContext,
        rng: &mut R,
    ) -> Result<Value> {
        let filter = match filter {
            None => None,
            Some(f) => match resolve_filter(field, f, ctx)? {
                Some(resolved) => Some(resolved),
                // Filtering on a missing reference can never match.
                None => return self.lookup_fallback(field, collection, fallback),
            },
        };

        let ids = self
            .store
            .query(collection, filter.as_ref())
            .map_err(|e| SynthesisError::persistence(collection, &e))?;

        if ids.is_empty() {
            debug!(field, collection, "lookup found no match, applying fallback");
            return self.lookup_fallback(field, collection, fallback);
        }
        let chosen = &ids[rng.random_range(0..ids.len())];
        Ok(Value::from(chosen.clone()))
    }

    fn lookup_fallback(&self, field: &str, collection: &str, fallback: &LookupFallback) -> Result<Value> {
        match fallback {
            LookupFallback::Absent => Ok(Value::Null),
            LookupFallback::Constant { value } => Ok(value.clone()),
            LookupFallback::Identity { name } => self.identity(field, name),
            LookupFallback::Placeholder { fields } => {
                warn!(field, collection, "no records to reference, inserting placeholder");
                let id = self
                    .store
                    .insert(collection, fields)
                    .map_err(|e| SynthesisError::persistence(collection, &e))?;
                if id.is_empty() {
                    return Err(SynthesisError::PersistenceFailure {
                        collection: collection.to_string(),
                        message: "placeholder insert returned no identifier".to_string(),
                    });
                }
                Ok(Value::from(id))
            }
        }
    }

    fn related_field(
        &self,
        field: &str,
        reference: &str,
        collection: &str,
        source: &str,
        default: &Value,
        ctx: &ResolutionContext,
    ) -> Result<Value> {
        let Some(id) = ctx.reference(field, reference)?.as_record_id() else {
            return Ok(default.clone());
        };
        let fields = self
            .store
            .get(collection, &id)
            .map_err(|e| SynthesisError::persistence(collection, &e))?;
        Ok(fields
            .and_then(|mut f| f.remove(source))
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| default.clone()))
    }

    fn next_sequence(&self, field: &str, prefix: &str, width: usize, ctx: &ResolutionContext) -> Result<Value> {
        let collection = ctx.collection.as_str();
        let persistence = |e: StoreError| SynthesisError::persistence(collection, &e);
        let mut existing = Vec::new();
        for id in self.store.query(collection, None).map_err(persistence)? {
            if let Some(fields) = self.store.get(collection, &id).map_err(persistence)? {
                if let Some(Value::Text(number)) = fields.get(field) {
                    existing.push(number.clone());
                }
            }
        }
        next_sequence(field, prefix, width, existing.iter().map(String::as_str)).map(Value::Text)
    }
}

fn numeric_bound(field: &str, bound: &NumericBound, ctx: &ResolutionContext) -> Result<f64> {
    match bound {
        NumericBound::Literal(v) => Ok(*v),
        NumericBound::Field { field: reference } => {
            ctx.reference(field, reference)?
                .as_f64()
                .ok_or_else(|| SynthesisError::UnresolvedReference {
                    field: field.to_string(),
                    reference: reference.clone(),
                    reason: "not a number".to_string(),
                })
        }
    }
}

fn resolve_filter(field: &str, filter: &LookupFilter, ctx: &ResolutionContext) -> Result<Option<RecordFilter>> {
    let equals = match &filter.equals {
        FilterOperand::Value { value } => value.clone(),
        FilterOperand::Field { field: reference } => ctx.reference(field, reference)?.clone(),
    };
    if equals.is_null() {
        return Ok(None);
    }
    Ok(Some(RecordFilter {
        field: filter.field.clone(),
        equals,
    }))
}

// ============================================================================
// Pure generators
// ============================================================================

/// Uniform choice over `choices`.
pub fn random_choice<'c, R: Rng>(field: &str, choices: &'c [Value], rng: &mut R) -> Result<&'c Value> {
    if choices.is_empty() {
        return Err(SynthesisError::EmptyChoiceSet {
            field: field.to_string(),
        });
    }
    Ok(&choices[rng.random_range(0..choices.len())])
}

/// Largest grid index that f64 still represents exactly.
const MAX_GRID_STEPS: f64 = 9_007_199_254_740_992.0;

/// Uniform value on the `10^-precision` grid inside `[min, max)`.
///
/// `min == max` yields `min` rounded to `precision`. Precision 0 yields an
/// integer. Precision is at most 9, and both bounds scaled by
/// `10^precision` must stay within ±2^53; anything else is `InvalidRange`
/// rather than a clamped draw.
pub fn random_in_range<R: Rng>(field: &str, min: f64, max: f64, precision: u32, rng: &mut R) -> Result<Value> {
    let invalid = || SynthesisError::InvalidRange {
        field: field.to_string(),
        min,
        max,
    };
    if !min.is_finite() || !max.is_finite() || max < min || precision > 9 {
        return Err(invalid());
    }

    let scale = 10f64.powi(precision as i32);
    // Bounds already on the grid must not drift a step through float error.
    let snap = |x: f64| {
        let r = x.round();
        if (x - r).abs() < 1e-9 { r } else { x }
    };
    let to_step = |x: f64| {
        if x.abs() <= MAX_GRID_STEPS {
            Ok(x as i64)
        } else {
            Err(invalid())
        }
    };
    let steps = if min == max {
        to_step((min * scale).round())?
    } else {
        let lo = to_step(snap(min * scale).ceil())?;
        let hi = to_step(snap(max * scale).ceil())?;
        if hi <= lo {
            return Err(invalid());
        }
        rng.random_range(lo..hi)
    };

    if precision == 0 {
        Ok(Value::Integer(steps))
    } else {
        Ok(Value::Number(steps as f64 / scale))
    }
}

/// `prefix` followed by exactly `digits` independent uniform decimal digits.
pub fn random_pattern<R: Rng>(prefix: &str, digits: usize, rng: &mut R) -> String {
    let mut out = String::with_capacity(prefix.len() + digits);
    out.push_str(prefix);
    for _ in 0..digits {
        out.push(char::from(b'0' + rng.random_range(0..10u8)));
    }
    out
}

pub fn offset_date(now: DateTime<FixedOffset>, offset_days: i64) -> DateTime<FixedOffset> {
    now + Duration::days(offset_days)
}

/// The number after the highest `prefix`-numbered entry of `existing`.
pub fn next_sequence<'s>(
    field: &str,
    prefix: &str,
    width: usize,
    existing: impl IntoIterator<Item = &'s str>,
) -> Result<String> {
    let highest = existing
        .into_iter()
        .filter_map(|n| n.strip_prefix(prefix))
        .filter_map(|digits| digits.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    let next = highest.checked_add(1).ok_or_else(|| SynthesisError::SequenceExhausted {
        field: field.to_string(),
        prefix: prefix.to_string(),
        highest,
    })?;
    Ok(format!("{prefix}{next:0width$}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{DisabledGenerator, EchoGenerator};
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 10, 8, 0, 0)
            .unwrap()
    }

    fn ctx() -> ResolutionContext {
        ResolutionContext::new("claim_dispute", "u_claimdispute", &CaseInputs::new(Some("Denied MRI")), now())
    }

    fn text_fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::text(*v)))
            .collect()
    }

    #[test]
    fn test_empty_choice_set_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = random_choice("category", &[], &mut rng).unwrap_err();
        assert_eq!(
            err,
            SynthesisError::EmptyChoiceSet {
                field: "category".to_string()
            }
        );
    }

    #[test]
    fn test_choice_covers_all_members() {
        let mut rng = StdRng::seed_from_u64(7);
        let choices: Vec<Value> = ["a", "b", "c"].into_iter().map(Value::from).collect();
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            seen.insert(random_choice("f", &choices, &mut rng).unwrap().render());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_numeric_range_samples_stay_in_half_open_interval() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10_000 {
            let v = random_in_range("amount", 0.0, 100.0, 2, &mut rng).unwrap().as_f64().unwrap();
            assert!((0.0..100.0).contains(&v), "{v} out of range");
            let cents = v * 100.0;
            assert!((cents - cents.round()).abs() < 1e-6, "{v} has more than 2 decimals");
        }
    }

    #[test]
    fn test_numeric_range_edges() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            random_in_range("x", 5.0, 1.0, 2, &mut rng),
            Err(SynthesisError::InvalidRange { .. })
        ));
        assert_eq!(random_in_range("x", 2.5, 2.5, 1, &mut rng).unwrap(), Value::Number(2.5));
        assert!(matches!(
            random_in_range("x", 1.0, 6.0, 0, &mut rng).unwrap(),
            Value::Integer(1..=5)
        ));
        // No grid point in [0.001, 0.002) at two decimals.
        assert!(random_in_range("x", 0.001, 0.002, 2, &mut rng).is_err());
    }

    #[test]
    fn test_numeric_range_beyond_exact_grid_is_rejected() {
        let mut rng = StdRng::seed_from_u64(5);
        assert!(matches!(
            random_in_range("x", 0.0, 1e11, 9, &mut rng),
            Err(SynthesisError::InvalidRange { .. })
        ));
        assert!(matches!(
            random_in_range("x", 0.0, 1.0, 10, &mut rng),
            Err(SynthesisError::InvalidRange { .. })
        ));
        // Wide but representable: draws reach the upper half of the range.
        let high = (0..2000)
            .map(|_| random_in_range("x", 0.0, 1e11, 4, &mut rng).unwrap().as_f64().unwrap())
            .fold(0.0f64, f64::max);
        assert!(high > 5e10 && high < 1e11, "max sample {high}");
    }

    #[test]
    fn test_pattern_string_has_exact_digit_count() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            let s = random_pattern("MRN", 6, &mut rng);
            assert_eq!(s.len(), 9);
            assert!(s.starts_with("MRN"));
            assert!(s[3..].chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(random_pattern("X", 0, &mut rng), "X");
    }

    #[test]
    fn test_next_sequence_increments_highest() {
        assert_eq!(
            next_sequence("number", "CD", 7, ["CD0000041", "CD0000007", "other"]).unwrap(),
            "CD0000042"
        );
        assert_eq!(next_sequence("number", "CD", 7, std::iter::empty()).unwrap(), "CD0000001");
    }

    #[test]
    fn test_next_sequence_at_u64_max_is_an_error() {
        let err = next_sequence("number", "CD", 7, ["CD0000003", "CD18446744073709551615"]).unwrap_err();
        assert_eq!(
            err,
            SynthesisError::SequenceExhausted {
                field: "number".to_string(),
                prefix: "CD".to_string(),
                highest: u64::MAX,
            }
        );
    }

    #[test]
    fn test_computed_date_keeps_reference_offset() {
        let date = offset_date(now(), -10);
        assert_eq!(date.offset().local_minus_utc(), 3600);
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2024-04-30");
    }

    #[test]
    fn test_chained_range_reads_earlier_field() {
        let store = MemoryStore::new();
        let content = ContentGenerator::new(Box::new(EchoGenerator));
        let config = EngineConfig::default();
        let generator = FieldValueGenerator::new(&store, &content, &config);
        let mut rng = StdRng::seed_from_u64(11);
        let mut ctx = ctx();

        for _ in 0..100 {
            let total = generator
                .resolve("total", &FieldSpec::range(10.0, 500.0, 2), &mut ctx, &mut rng)
                .unwrap();
            ctx.record("total", total.clone());
            let paid = generator
                .resolve("paid", &FieldSpec::range(0.0, NumericBound::field("total"), 2), &mut ctx, &mut rng)
                .unwrap();
            assert!(paid.as_f64().unwrap() < total.as_f64().unwrap());
        }
    }

    #[test]
    fn test_reference_to_unresolved_field_fails() {
        let store = MemoryStore::new();
        let content = ContentGenerator::new(Box::new(EchoGenerator));
        let config = EngineConfig::default();
        let generator = FieldValueGenerator::new(&store, &content, &config);
        let mut rng = StdRng::seed_from_u64(1);

        let err = generator
            .resolve("paid", &FieldSpec::range(0.0, NumericBound::field("total"), 2), &mut ctx(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, SynthesisError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_lookup_picks_existing_match_or_falls_back() {
        let store = MemoryStore::new();
        store.seed("sn_hcls_pre_auth_header", "pa1", text_fields(&[("patient", "p1")]));
        let content = ContentGenerator::new(Box::new(EchoGenerator));
        let config = EngineConfig::default();
        let generator = FieldValueGenerator::new(&store, &content, &config);
        let mut rng = StdRng::seed_from_u64(5);
        let spec = FieldSpec::lookup(
            "sn_hcls_pre_auth_header",
            Some(LookupFilter::field_equals_field("patient", "u_member")),
            LookupFallback::Absent,
        );

        let mut matching = ctx();
        matching.record("u_member", Value::text("p1"));
        assert_eq!(
            generator.resolve("pre_auth", &spec, &mut matching, &mut rng).unwrap(),
            Value::text("pa1")
        );

        let mut other = ctx();
        other.record("u_member", Value::text("p2"));
        assert_eq!(generator.resolve("pre_auth", &spec, &mut other, &mut rng).unwrap(), Value::Null);

        let mut missing = ctx();
        missing.record("u_member", Value::Null);
        assert_eq!(generator.resolve("pre_auth", &spec, &mut missing, &mut rng).unwrap(), Value::Null);
    }

    #[test]
    fn test_placeholder_fallback_inserts_record() {
        let store = MemoryStore::new();
        let content = ContentGenerator::new(Box::new(EchoGenerator));
        let config = EngineConfig::default();
        let generator = FieldValueGenerator::new(&store, &content, &config);
        let mut rng = StdRng::seed_from_u64(5);
        let spec = FieldSpec::lookup(
            "sn_hcls_patient",
            None,
            LookupFallback::Placeholder {
                fields: text_fields(&[("name", "John Doe")]),
            },
        );

        let mut ctx = ctx();
        let id = generator.resolve("u_member", &spec, &mut ctx, &mut rng).unwrap();
        ctx.record("u_member", id.clone());
        assert_eq!(store.len("sn_hcls_patient"), 1);

        let name = generator
            .resolve(
                "u_patient_name",
                &FieldSpec::related_field("u_member", "sn_hcls_patient", "name", "Unknown Patient"),
                &mut ctx,
                &mut rng,
            )
            .unwrap();
        assert_eq!(name, Value::text("John Doe"));
    }

    #[test]
    fn test_related_field_defaults_when_reference_absent() {
        let store = MemoryStore::new();
        let content = ContentGenerator::new(Box::new(EchoGenerator));
        let config = EngineConfig::default();
        let generator = FieldValueGenerator::new(&store, &content, &config);
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = ctx();
        ctx.record("u_member", Value::Null);

        let spec = FieldSpec::related_field("u_member", "sn_hcls_patient", "name", "Unknown Patient");
        assert_eq!(
            generator.resolve("u_patient_name", &spec, &mut ctx, &mut rng).unwrap(),
            Value::text("Unknown Patient")
        );
    }

    #[test]
    fn test_identity_and_template() {
        let store = MemoryStore::new();
        let content = ContentGenerator::new(Box::new(EchoGenerator));
        let config = EngineConfig::default();
        let generator = FieldValueGenerator::new(&store, &content, &config);
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = ctx();

        let agent = generator
            .resolve("assigned_to", &FieldSpec::identity("agent_user"), &mut ctx, &mut rng)
            .unwrap();
        assert_eq!(agent, Value::text("a8f98bb0eb32010045e1a5115206fe3a"));

        let err = generator
            .resolve("assigned_to", &FieldSpec::identity("nobody"), &mut ctx, &mut rng)
            .unwrap_err();
        assert!(matches!(err, SynthesisError::UnknownIdentity { .. }));

        ctx.record("u_patient_name", Value::text("Ana"));
        let text = generator
            .resolve("short_description", &FieldSpec::template("Dispute for {u_patient_name}: {short_description}"), &mut ctx, &mut rng)
            .unwrap();
        assert_eq!(text, Value::text("Dispute for Ana: Denied MRI"));
    }

    #[test]
    fn test_generated_text_degrades_with_warning() {
        let store = MemoryStore::new();
        let content = ContentGenerator::new(Box::new(DisabledGenerator)).with_fallback("fallback");
        let config = EngineConfig::default();
        let generator = FieldValueGenerator::new(&store, &content, &config);
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = ctx();

        let value = generator
            .resolve("description", &FieldSpec::generated("Describe {short_description}"), &mut ctx, &mut rng)
            .unwrap();
        assert_eq!(value, Value::text("fallback"));
        let (_, _, warnings) = ctx.into_parts();
        assert!(matches!(warnings[0], SynthesisError::ContentGenerationDegraded(_)));
    }

    #[test]
    fn test_next_sequence_reads_target_collection() {
        let store = MemoryStore::new();
        store.seed("u_claimdispute", "a", text_fields(&[("number", "CD0000005")]));
        store.seed("u_claimdispute", "b", text_fields(&[("number", "CD0000012")]));
        let content = ContentGenerator::new(Box::new(EchoGenerator));
        let config = EngineConfig::default();
        let generator = FieldValueGenerator::new(&store, &content, &config);
        let mut rng = StdRng::seed_from_u64(5);

        let number = generator
            .resolve("number", &FieldSpec::sequence("CD", 7), &mut ctx(), &mut rng)
            .unwrap();
        assert_eq!(number, Value::text("CD0000013"));
    }
}
