use async_trait::async_trait;
use njvox_core::error::Result;

/// Column value as the warehouse reports it, before JSON coercion. Kept
/// distinct from `serde_json::Value` so the executor's coercion step
/// (arbitrary-precision numerics → floats, dates → ISO-8601,
/// geography left opaque) has something typed to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum WarehouseValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision decimal, carried as text until coerced.
    Numeric(String),
    /// Already ISO-8601; the warehouse driver is expected to format these,
    /// not this crate.
    Date(String),
    Timestamp(String),
    /// Opaque WKT/GeoJSON — never coerced, passed through verbatim.
    Geography(String),
    Text(String),
}

impl WarehouseValue {
    /// Coerce to a JSON-safe value
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            WarehouseValue::Null => Value::Null,
            WarehouseValue::Bool(b) => Value::Bool(*b),
            WarehouseValue::Int(i) => Value::Number((*i).into()),
            WarehouseValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            WarehouseValue::Numeric(s) => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(s.clone())),
            WarehouseValue::Date(s) | WarehouseValue::Timestamp(s) => Value::String(s.clone()),
            WarehouseValue::Geography(s) => Value::String(s.clone()),
            WarehouseValue::Text(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub row_cap: u64,
    pub timeout_secs: u64,
    pub query_cache: bool,
    /// Identifies the caller for warehouse-side job labeling/auditing.
    pub label: String,
}

pub struct WarehouseRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<WarehouseValue>>,
    /// Total rows the warehouse reports matching the query, which may
    /// exceed `rows.len()` when the row cap truncated the stream.
    pub total_rows: Option<u64>,
}

/// The warehouse itself is out of core scope; this trait is the
/// named interface the executor consumes, so a real BigQuery-style
/// client, a test fixture, or any other columnar warehouse driver can
/// stand behind it.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    async fn submit(&self, sql: &str, opts: SubmitOptions) -> Result<WarehouseRows>;
}
