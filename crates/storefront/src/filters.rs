//! Custom Askama template filters.

use std::fmt::Display;

use atelier_core::{CurrencyCode, Price};
use rust_decimal::Decimal;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Returns the content hash for main.css.
///
/// The hash is computed at build time from the CSS file content.
///
/// Usage in templates: `{{ ""|css_hash }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn css_hash(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<&'static str> {
    Ok(env!("CSS_HASH"))
}

/// Formats a bare backend amount in the store currency. Anything that is
/// not a decimal renders unchanged.
///
/// Usage in templates: `{{ order.total_amount|rupees }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn rupees(amount: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let text = amount.to_string();
    Ok(text.parse::<Decimal>().map_or(text, |amount| {
        Price::new(amount, CurrencyCode::default()).display()
    }))
}
