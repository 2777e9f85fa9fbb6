use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Region value that disables the region predicate.
pub const ALL_REGIONS: &str = "todos";

/// Dashboard query parameters. Empty fields disable their predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, rename = "placa")]
    pub plate: Option<String>,
    #[serde(default, rename = "regiao")]
    pub region: Option<String>,
    #[serde(default, rename = "data")]
    pub date: Option<String>,
}

struct Predicates {
    plate: String,
    region: String,
    date: String,
}

impl Query {
    fn predicates(&self) -> Predicates {
        let trimmed = |value: &Option<String>| value.as_deref().unwrap_or("").trim().to_string();
        let mut region = trimmed(&self.region).to_lowercase();
        if region == ALL_REGIONS {
            region.clear();
        }
        Predicates {
            plate: trimmed(&self.plate).to_lowercase(),
            region,
            date: trimmed(&self.date),
        }
    }

    pub fn is_empty(&self) -> bool {
        let p = self.predicates();
        p.plate.is_empty() && p.region.is_empty() && p.date.is_empty()
    }
}

impl Predicates {
    fn matches(&self, record: &Record) -> bool {
        if !self.plate.is_empty() && !record.plate.to_lowercase().contains(&self.plate) {
            return false;
        }
        if !self.region.is_empty() && record.region.to_lowercase() != self.region {
            return false;
        }
        if !self.date.is_empty() && !record.datetime.starts_with(&self.date) {
            return false;
        }
        true
    }
}

/// Returns the records matching every active predicate, in snapshot order.
pub fn apply<'a>(records: &'a [Record], query: &Query) -> Vec<&'a Record> {
    let predicates = query.predicates();
    records.iter().filter(|r| predicates.matches(r)).collect()
}
