use crate::models::{Article, PriceBar, RawArticleRow, RawPriceRow, Sentiment};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::warn;

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Parse price: strip everything except digits, dot, minus.
/// "USD 1,234.56" → 1234.56 | "610.00" → 610.0
pub fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" || s == "—" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// Parse dates: "Feb 20, 2024" (investing.com) or ISO
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    for fmt in ["%b %d, %Y", "%Y-%m-%d", "%m/%d/%Y", "%d %b %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    None
}

/// Parse article timestamps. Date-only values are taken as midnight.
/// "2024-03-08 09:15:00" | "2024-03-08T09:15:00Z" | "Mar-08-24 09:15AM" (finviz)
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%b-%d-%y %I:%M%p",
        "%m/%d/%Y %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Classifier output is free text; only the label word matters.
pub fn parse_sentiment(s: &str) -> Option<Sentiment> {
    let label = s.trim().trim_matches(|c: char| !c.is_ascii_alphabetic()).to_uppercase();
    match label.as_str() {
        "POSITIVE" => Some(Sentiment::Positive),
        "NEGATIVE" => Some(Sentiment::Negative),
        "NEUTRAL" => Some(Sentiment::Neutral),
        _ => None,
    }
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

// ── News CSV → Article ────────────────────────────────────────────────────────

pub fn csv_row_to_article(row: &RawArticleRow) -> Option<Article> {
    let timestamp = parse_timestamp(row.date.as_deref()?)?;

    let Some(sentiment) = row.sentiment.as_deref().and_then(parse_sentiment) else {
        warn!("Unrecognised sentiment {:?} on {}", row.sentiment, timestamp);
        return None;
    };

    Some(Article {
        title: row.title.clone().unwrap_or_default().trim().to_lowercase(),
        timestamp,
        sentiment,
    })
}

// ── Price CSV → PriceBar ──────────────────────────────────────────────────────

pub fn csv_row_to_bar(symbol: &str, row: &RawPriceRow) -> Option<PriceBar> {
    let date = parse_date(row.date.as_deref()?)?;
    let close = parse_price(row.close.as_deref()?)?;

    if close <= 0.0 {
        warn!("Invalid close {} for {} on {}", close, symbol, date);
        return None;
    }

    Some(PriceBar { date, close })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
