use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use core::fmt;

use crate::model::XPathNavigator;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self { ns_uri, local: local.into() }
    }

    /// Name without a namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self { ns_uri: None, local: local.into() }
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Atomic values the engine computes with.
///
/// Durations are stored in their canonical unit: months for
/// `xs:yearMonthDuration`, seconds for `xs:dayTimeDuration`.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    Boolean(bool),
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    QName {
        ns_uri: Option<String>,
        prefix: Option<String>,
        local: String,
    },
    Integer(i64),
    Decimal(f64),
    Double(f64),
    DateTime(DateTime<FixedOffset>),
    Date {
        date: NaiveDate,
        tz: Option<FixedOffset>,
    },
    Time {
        time: NaiveTime,
        tz: Option<FixedOffset>,
    },
    YearMonthDuration(i32),
    DayTimeDuration(i64),
}

impl AtomicValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_))
    }

    pub fn is_duration(&self) -> bool {
        matches!(self, AtomicValue::YearMonthDuration(_) | AtomicValue::DayTimeDuration(_))
    }

    /// Static result category of this value.
    pub fn result_type(&self) -> XPathResultType {
        match self {
            AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_) => XPathResultType::Number,
            AtomicValue::Boolean(_) => XPathResultType::Boolean,
            AtomicValue::DateTime(_) => XPathResultType::DateTime,
            AtomicValue::Date { .. } => XPathResultType::Date,
            AtomicValue::Time { .. } => XPathResultType::Time,
            AtomicValue::YearMonthDuration(_) | AtomicValue::DayTimeDuration(_) => XPathResultType::Duration,
            _ => XPathResultType::Atomic,
        }
    }

    /// `xs:` type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AtomicValue::Boolean(_) => "xs:boolean",
            AtomicValue::String(_) => "xs:string",
            AtomicValue::UntypedAtomic(_) => "xs:untypedAtomic",
            AtomicValue::AnyUri(_) => "xs:anyURI",
            AtomicValue::QName { .. } => "xs:QName",
            AtomicValue::Integer(_) => "xs:integer",
            AtomicValue::Decimal(_) => "xs:decimal",
            AtomicValue::Double(_) => "xs:double",
            AtomicValue::DateTime(_) => "xs:dateTime",
            AtomicValue::Date { .. } => "xs:date",
            AtomicValue::Time { .. } => "xs:time",
            AtomicValue::YearMonthDuration(_) => "xs:yearMonthDuration",
            AtomicValue::DayTimeDuration(_) => "xs:dayTimeDuration",
        }
    }

    /// Canonical lexical form (`fn:string` of the value).
    pub fn lexical(&self) -> String {
        match self {
            AtomicValue::Boolean(b) => b.to_string(),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => s.clone(),
            AtomicValue::QName { prefix, local, .. } => match prefix {
                Some(p) if !p.is_empty() => format!("{p}:{local}"),
                _ => local.clone(),
            },
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Decimal(d) => format_decimal(*d),
            AtomicValue::Double(d) => format_double(*d),
            AtomicValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            AtomicValue::Date { date, tz } => format!("{}{}", date.format("%Y-%m-%d"), format_tz(*tz)),
            AtomicValue::Time { time, tz } => format!("{}{}", time.format("%H:%M:%S"), format_tz(*tz)),
            AtomicValue::YearMonthDuration(months) => format_year_month(*months),
            AtomicValue::DayTimeDuration(secs) => format_day_time(*secs),
        }
    }
}

fn format_decimal(d: f64) -> String {
    if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{d:.0}")
    } else {
        d.to_string()
    }
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF".to_string() } else { "-INF".to_string() }
    } else if d == 0.0 {
        if d.is_sign_negative() { "-0".to_string() } else { "0".to_string() }
    } else {
        format_decimal(d)
    }
}

fn format_tz(tz: Option<FixedOffset>) -> String {
    match tz {
        None => String::new(),
        Some(off) if off.local_minus_utc() == 0 => "Z".to_string(),
        Some(off) => {
            let secs = off.local_minus_utc();
            let sign = if secs < 0 { '-' } else { '+' };
            let abs = secs.abs();
            format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
        }
    }
}

fn format_year_month(months: i32) -> String {
    if months == 0 {
        return "P0M".to_string();
    }
    let sign = if months < 0 { "-" } else { "" };
    let abs = months.unsigned_abs();
    let (y, m) = (abs / 12, abs % 12);
    let mut out = format!("{sign}P");
    if y > 0 {
        out.push_str(&format!("{y}Y"));
    }
    if m > 0 {
        out.push_str(&format!("{m}M"));
    }
    out
}

fn format_day_time(secs: i64) -> String {
    if secs == 0 {
        return "PT0S".to_string();
    }
    let sign = if secs < 0 { "-" } else { "" };
    let abs = secs.unsigned_abs();
    let (d, rem) = (abs / 86_400, abs % 86_400);
    let (h, rem) = (rem / 3600, rem % 3600);
    let (m, s) = (rem / 60, rem % 60);
    let mut out = format!("{sign}P");
    if d > 0 {
        out.push_str(&format!("{d}D"));
    }
    if h > 0 || m > 0 || s > 0 {
        out.push('T');
        if h > 0 {
            out.push_str(&format!("{h}H"));
        }
        if m > 0 {
            out.push_str(&format!("{m}M"));
        }
        if s > 0 {
            out.push_str(&format!("{s}S"));
        }
    }
    out
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lexical())
    }
}

/// Closed set of static result categories reported by return-type inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XPathResultType {
    Number,
    Boolean,
    Atomic,
    NodeSet,
    DateTime,
    Date,
    Time,
    Duration,
    Any,
}

pub type Sequence<N> = Vec<Item<N>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Item<N> {
    Node(N),
    Atomic(AtomicValue),
}

impl<N> Item<N> {
    #[inline]
    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn as_node(&self) -> Option<&N> {
        match self {
            Item::Node(n) => Some(n),
            Item::Atomic(_) => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            Item::Node(_) => None,
        }
    }
}

impl<N: XPathNavigator> Item<N> {
    /// String value: the node's string value or the atomic lexical form.
    pub fn value(&self) -> String {
        match self {
            Item::Node(n) => n.value(),
            Item::Atomic(a) => a.lexical(),
        }
    }

    /// Atomized value of the item.
    pub fn typed_value(&self) -> AtomicValue {
        match self {
            Item::Node(n) => n.typed_value(),
            Item::Atomic(a) => a.clone(),
        }
    }
}

// Convenience conversion: allow passing an atomic value where an Item<N> is expected.
impl<N> From<AtomicValue> for Item<N> {
    fn from(a: AtomicValue) -> Self {
        Item::Atomic(a)
    }
}

impl<N> fmt::Display for Item<N>
where
    N: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Node(_) => write!(f, "<node>"),
            Item::Atomic(a) => write!(f, "{a}"),
        }
    }
}
