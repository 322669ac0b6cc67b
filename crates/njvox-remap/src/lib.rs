//! Rewrites user-friendly identifiers and value literals to canonical
//! warehouse columns/values, context-sensitively. This is an ergonomic
//! layer, not a real SQL parser: it does not understand scope or aliases.
//! A query that fails at the warehouse after remapping surfaces the
//! warehouse error verbatim along with both SQL forms — that's the
//! executor's job, not this crate's.
//!
//! Identifier substitution only touches whole-word tokens outside of
//! single-quoted string literals; literal substitution only touches full
//! single-quoted literal spans. SQL is first split into alternating
//! code/literal segments so the two substitution passes can never cross
//! into each other's territory — that's what makes remap-safety hold
//! even though the underlying matching is regex, not a real tokenizer.

use regex::Regex;
use std::sync::OnceLock;

/// One identifier rewrite rule: a whole-word, case-insensitive token in
/// user SQL mapped to its canonical warehouse column (or geography
/// function) name.
#[derive(Debug, Clone)]
pub struct IdentifierRule {
    pub from: String,
    pub to: String,
}

/// One literal rewrite rule: a single-quoted value as the user might type
/// it, mapped to the canonical single-quoted warehouse value.
#[derive(Debug, Clone)]
pub struct LiteralRule {
    /// Unquoted user-facing spelling, compared case-insensitively.
    pub from_unquoted: String,
    /// Canonical quoted replacement, e.g. `'REPUBLICAN'`.
    pub to_quoted: String,
}

#[derive(Debug, Clone)]
pub struct FieldRemapper {
    identifier_rules: Vec<IdentifierRule>,
    literal_rules: Vec<LiteralRule>,
    /// Table/view names that, when referenced, suppress a subset of
    /// identifier rules (by `from` key) because that context already
    /// uses canonical names for those fields.
    protected_tables: Vec<String>,
    protected_exclusions: Vec<String>,
}

impl Default for FieldRemapper {
    fn default() -> Self {
        Self::nj_voter_defaults()
    }
}

impl FieldRemapper {
    pub fn new(
        identifier_rules: Vec<IdentifierRule>,
        literal_rules: Vec<LiteralRule>,
        protected_tables: Vec<String>,
        protected_exclusions: Vec<String>,
    ) -> Self {
        Self {
            identifier_rules,
            literal_rules,
            protected_tables,
            protected_exclusions,
        }
    }

    /// The curated NJ voter/donor/enrichment vocabulary. Order matters for
    /// determinism but not for correctness since rules operate on disjoint
    /// whole-word tokens.
    pub fn nj_voter_defaults() -> Self {
        let id = |from: &str, to: &str| IdentifierRule {
            from: from.to_string(),
            to: to.to_string(),
        };
        let lit = |from: &str, to: &str| LiteralRule {
            from_unquoted: from.to_string(),
            to_quoted: to.to_string(),
        };

        Self {
            identifier_rules: vec![
                id("voter_id", "id"),
                id("party", "demo_party"),
                id("age", "demo_age"),
                id("race", "demo_race"),
                id("gender", "demo_gender"),
                id("address", "addr_residential_line1"),
                id("street", "addr_residential_street_name"),
                id("street_name", "addr_residential_street_name"),
                id("street_number", "addr_residential_street_number"),
                id("state", "addr_residential_state"),
                id("zip", "addr_residential_zip_code"),
                id("zip_code", "addr_residential_zip_code"),
                id("county", "county_name"),
                id("lat", "latitude"),
                id("lng", "longitude"),
                id("lon", "longitude"),
                id("first_name", "name_first"),
                id("last_name", "name_last"),
                id("middle_name", "name_middle"),
                id("person_id", "master_id"),
                id("individual_id", "master_id"),
                id("location_id", "address_id"),
                id("vendor_id", "vendor_voter_id"),
                id("amount", "contribution_amount"),
                id("donor", "master_id"),
                id("donation", "contribution_amount"),
                id("distance", "ST_DISTANCE"),
                id("point", "ST_GEOGPOINT"),
                id("within", "ST_DWITHIN"),
                id("buffer", "ST_BUFFER"),
                id("contains", "ST_CONTAINS"),
                id("area", "ST_AREA"),
                id("length", "ST_LENGTH"),
            ],
            literal_rules: vec![
                lit("Democratic", "'DEMOCRAT'"),
                lit("Democrats", "'DEMOCRAT'"),
                lit("democrat", "'DEMOCRAT'"),
                lit("democratic", "'DEMOCRAT'"),
                lit("Republican", "'REPUBLICAN'"),
                lit("Republicans", "'REPUBLICAN'"),
                lit("republican", "'REPUBLICAN'"),
                lit("Unaffiliated", "'UNAFFILIATED'"),
                lit("unaffiliated", "'UNAFFILIATED'"),
                lit("Independent", "'UNAFFILIATED'"),
                lit("independent", "'UNAFFILIATED'"),
                lit("NJ-07", "'NJ CONGRESSIONAL DISTRICT 07'"),
                lit("NJ-7", "'NJ CONGRESSIONAL DISTRICT 07'"),
                lit("NJ07", "'NJ CONGRESSIONAL DISTRICT 07'"),
                lit("District 7", "'NJ CONGRESSIONAL DISTRICT 07'"),
                lit("7th District", "'NJ CONGRESSIONAL DISTRICT 07'"),
                lit("7th Congressional District", "'NJ CONGRESSIONAL DISTRICT 07'"),
            ],
            protected_tables: vec![
                "pdl_enrichment".to_string(),
                "pdl_enrichment_view".to_string(),
            ],
            protected_exclusions: vec![
                "first_name".to_string(),
                "last_name".to_string(),
                "middle_name".to_string(),
                "city".to_string(),
            ],
        }
    }

    /// Apply identifier and literal remapping. Pure and deterministic:
    /// same input always yields the same output, and applying the result
    /// through `apply` again is a no-op (remap idempotence).
    pub fn apply(&self, sql: &str) -> String {
        let active_exclusions = if self.references_protected_table(sql) {
            self.protected_exclusions.as_slice()
        } else {
            &[]
        };

        let segments = split_literals(sql);
        let mut out = String::with_capacity(sql.len());
        for seg in segments {
            match seg {
                Segment::Code(code) => out.push_str(&self.remap_identifiers(&code, active_exclusions)),
                Segment::Literal(lit) => out.push_str(&self.remap_literal(&lit)),
            }
        }
        out
    }

    fn references_protected_table(&self, sql: &str) -> bool {
        self.protected_tables.iter().any(|t| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(t)))
                .map(|re| re.is_match(sql))
                .unwrap_or(false)
        })
    }

    fn remap_identifiers(&self, code: &str, exclusions: &[String]) -> String {
        let mut out = code.to_string();
        for rule in &self.identifier_rules {
            if exclusions.iter().any(|e| e.eq_ignore_ascii_case(&rule.from)) {
                continue;
            }
            let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&rule.from)))
                .expect("valid identifier regex");
            out = re.replace_all(&out, rule.to.as_str()).into_owned();
        }
        out
    }

    /// `lit` includes its surrounding single quotes, e.g. `'Republican'`.
    fn remap_literal(&self, lit: &str) -> String {
        let inner = lit.trim_matches('\'');
        for rule in &self.literal_rules {
            if inner.eq_ignore_ascii_case(&rule.from_unquoted) {
                return rule.to_quoted.clone();
            }
        }
        lit.to_string()
    }
}

enum Segment {
    Code(String),
    Literal(String),
}

fn literal_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'(?:[^']|'')*'").expect("valid regex"))
}

/// Split `sql` into alternating code/literal segments. Literal spans
/// include their quotes; `''` (escaped quote) inside a literal does not
/// terminate it.
fn split_literals(sql: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for m in literal_span_re().find_iter(sql) {
        if m.start() > last {
            segments.push(Segment::Code(sql[last..m.start()].to_string()));
        }
        segments.push(Segment::Literal(m.as_str().to_string()));
        last = m.end();
    }
    if last < sql.len() {
        segments.push(Segment::Code(sql[last..].to_string()));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaps_identifier_whole_word() {
        let r = FieldRemapper::nj_voter_defaults();
        let out = r.apply("SELECT party FROM voters.voters");
        assert_eq!(out, "SELECT demo_party FROM voters.voters");
    }

    #[test]
    fn remaps_literal_inside_single_quotes() {
        let r = FieldRemapper::nj_voter_defaults();
        let out = r.apply("SELECT * FROM allow.voters WHERE party = 'Republican'");
        assert_eq!(
            out,
            "SELECT * FROM allow.voters WHERE demo_party = 'REPUBLICAN'"
        );
    }

    #[test]
    fn does_not_remap_identifier_inside_string_literal() {
        let r = FieldRemapper::nj_voter_defaults();
        let out = r.apply("SELECT * FROM t WHERE note = 'party favors are nice'");
        assert_eq!(out, "SELECT * FROM t WHERE note = 'party favors are nice'");
    }

    #[test]
    fn does_not_remap_literal_outside_quotes() {
        let r = FieldRemapper::nj_voter_defaults();
        // bare token Republican with no quotes is just an identifier-shaped
        // token; it isn't in the identifier map so it passes through.
        let out = r.apply("SELECT Republican FROM t");
        assert_eq!(out, "SELECT Republican FROM t");
    }

    #[test]
    fn suppresses_excluded_identifiers_for_protected_tables() {
        let r = FieldRemapper::nj_voter_defaults();
        let out = r.apply("SELECT first_name FROM project.ds.pdl_enrichment_view");
        assert_eq!(out, "SELECT first_name FROM project.ds.pdl_enrichment_view");
    }

    #[test]
    fn applies_exclusions_only_when_protected_table_referenced() {
        let r = FieldRemapper::nj_voter_defaults();
        let out = r.apply("SELECT first_name FROM project.ds.voters");
        assert_eq!(out, "SELECT name_first FROM project.ds.voters");
    }

    #[test]
    fn idempotent() {
        let r = FieldRemapper::nj_voter_defaults();
        let sql = "SELECT party, first_name FROM allow.voters WHERE party = 'Democrat'";
        let once = r.apply(sql);
        let twice = r.apply(&once);
        assert_eq!(once, twice);
    }
}
