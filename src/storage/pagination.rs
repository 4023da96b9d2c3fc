//! Generic pagination, filter and search over store documents.
//!
//! Documents are projected to JSON first, so every operation works on the
//! camelCase wire field names (`createdAt`, `phoneNumber`, ...). Filters are
//! applied before search; both narrow the set that `counts` reports.

use std::cmp::Ordering;

use anyhow::Result;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Largest page size a caller can ask for.
pub const MAX_PAGE_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone)]
pub struct PageQuery {
    pub page: u64,
    pub limit: u64,
    /// Zero means "derive from page".
    pub offset: u64,
    pub sort_by: String,
    pub order_by: SortOrder,
    /// Field equality; null and empty-string values are ignored.
    pub filter: Map<String, Value>,
    pub search: Option<String>,
    pub search_keys: Vec<String>,
    /// Takes precedence over `include_keys` when both are set.
    pub exclude_keys: Vec<String>,
    pub include_keys: Vec<String>,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            offset: 0,
            sort_by: "createdAt".to_string(),
            order_by: SortOrder::Desc,
            filter: Map::new(),
            search: None,
            search_keys: Vec::new(),
            exclude_keys: Vec::new(),
            include_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u64,
    pub limit: u64,
    pub offset: u64,
    pub sort_by: String,
    pub order_by: SortOrder,
    pub counts: u64,
    pub pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub data: Vec<Value>,
    pub pagination: PageInfo,
}

fn total_pages(counts: u64, limit: u64) -> u64 { counts.max(1).div_ceil(limit) }

fn sanitized_filter(filter: &Map<String, Value>) -> Vec<(&String, &Value)> {
    filter
        .iter()
        .filter(|(_, v)| !v.is_null() && v.as_str() != Some(""))
        .collect()
}

fn searchable_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Nulls and missing fields sort last regardless of direction.
fn cmp_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().unwrap_or(0.0).partial_cmp(&y.as_f64().unwrap_or(0.0)).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => {
            let xs = searchable_text(x).unwrap_or_default();
            let ys = searchable_text(y).unwrap_or_default();
            xs.cmp(&ys)
        }
    }
}

fn project(mut doc: Value, exclude: &[String], include: &[String]) -> Value {
    let Some(obj) = doc.as_object_mut() else { return doc; };
    if !exclude.is_empty() {
        for k in exclude { obj.remove(k); }
    } else if !include.is_empty() {
        obj.retain(|k, _| include.iter().any(|i| i == k));
    }
    doc
}

pub fn paginate<T, I>(items: I, query: &PageQuery) -> Result<Page>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, MAX_PAGE_LIMIT);
    let filter = sanitized_filter(&query.filter);
    let search = match query.search.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() && !query.search_keys.is_empty() => Some(
            RegexBuilder::new(&regex::escape(s)).case_insensitive(true).build()?,
        ),
        _ => None,
    };

    let mut docs: Vec<Value> = Vec::new();
    for item in items {
        let doc = serde_json::to_value(item)?;
        if !filter.iter().all(|(k, v)| doc.get(k.as_str()) == Some(*v)) { continue; }
        if let Some(re) = &search {
            let hit = query.search_keys.iter().any(|k| {
                doc.get(k).and_then(searchable_text).is_some_and(|t| re.is_match(&t))
            });
            if !hit { continue; }
        }
        docs.push(doc);
    }

    docs.sort_by(|a, b| {
        let ord = cmp_json(a.get(&query.sort_by), b.get(&query.sort_by));
        let missing = |d: &Value| d.get(&query.sort_by).is_none_or(Value::is_null);
        match query.order_by {
            SortOrder::Desc if !missing(a) && !missing(b) => ord.reverse(),
            _ => ord,
        }
    });

    let counts = docs.len() as u64;
    let offset = if query.offset != 0 { query.offset } else { (page - 1).saturating_mul(limit) };
    let data = docs
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(limit as usize)
        .map(|d| project(d, &query.exclude_keys, &query.include_keys))
        .collect();
    let pages = total_pages(counts, limit);

    Ok(Page {
        data,
        pagination: PageInfo {
            page,
            limit,
            offset,
            sort_by: query.sort_by.clone(),
            order_by: query.order_by,
            counts,
            pages,
            has_next_page: page < pages,
            has_prev_page: page > 1,
        },
    })
}
