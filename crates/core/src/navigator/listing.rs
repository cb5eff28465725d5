//! Listing page parsing.
//!
//! The listing is a table whose rows carry a serial number, the publication
//! identifier, the publication and availability dates (`DD/MM/YYYY`), and in
//! the last cell one form per PDF partition.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::{DownloadTarget, FormMethod, Listing, NavigatorError};

const FILE_NAME_FIELD: &str = "FileName";

fn selector(css: &str) -> Result<Selector, NavigatorError> {
    Selector::parse(css)
        .map_err(|e| NavigatorError::Structure(format!("bad selector '{}': {}", css, e)))
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn parse_portal_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y").ok()
}

/// Parse the listing page into at most `max_count` listings, newest first.
///
/// Rows that do not look like listings are skipped. A page without listing
/// rows at all is a structure error.
pub fn parse_listing(
    html: &str,
    base_url: &Url,
    max_count: usize,
) -> Result<Vec<Listing>, NavigatorError> {
    let document = Html::parse_document(html);
    let row_selector = selector("table tbody tr")?;
    let cell_selector = selector("td")?;
    let form_selector = selector("form")?;

    let rows: Vec<ElementRef> = document.select(&row_selector).collect();
    if rows.is_empty() {
        return Err(NavigatorError::Structure(
            "no rows found in listing table".to_string(),
        ));
    }

    let mut listings = Vec::new();
    for row in &rows {
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
        if cells.len() < 4 {
            continue;
        }

        let publication_id = cell_text(&cells[1]);
        if publication_id.is_empty() {
            continue;
        }

        let Some(publication_date) = parse_portal_date(&cell_text(&cells[2])) else {
            warn!(
                publication_id = %publication_id,
                raw = %cell_text(&cells[2]),
                "Skipping listing row with unparseable publication date"
            );
            continue;
        };
        let availability_date = parse_portal_date(&cell_text(&cells[3]));

        let download_cell = &cells[cells.len() - 1];
        let targets: Vec<DownloadTarget> = download_cell
            .select(&form_selector)
            .enumerate()
            .filter_map(|(idx, form)| parse_form(&form, idx, &publication_id, base_url))
            .collect();

        debug!(
            publication_id = %publication_id,
            targets = targets.len(),
            "Parsed listing row"
        );

        listings.push(Listing {
            publication_id,
            publication_date,
            availability_date,
            targets,
        });
    }

    if listings.is_empty() {
        return Err(NavigatorError::Structure(format!(
            "{} table rows found but none matched the listing layout",
            rows.len()
        )));
    }

    listings.sort_by(|a, b| b.publication_date.cmp(&a.publication_date));
    listings.truncate(max_count);
    Ok(listings)
}

fn parse_form(
    form: &ElementRef,
    idx: usize,
    publication_id: &str,
    base_url: &Url,
) -> Option<DownloadTarget> {
    let hidden = Selector::parse("input[type=hidden]").ok()?;
    let buttons = Selector::parse("button, input[type=submit]").ok()?;

    let fields: Vec<(String, String)> = form
        .select(&hidden)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    let remote_name = fields
        .iter()
        .find(|(name, _)| name == FILE_NAME_FIELD)
        .map(|(_, value)| value.as_str())?;
    let file_name = local_file_name(remote_name)?;

    let button_text = form
        .select(&buttons)
        .next()
        .map(|button| {
            button
                .value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| cell_text(&button))
        })
        .unwrap_or_default();

    let class_range = fields
        .iter()
        .find(|(name, value)| name.to_lowercase().contains("class") && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
        .or_else(|| class_range_from_text(&button_text))
        .unwrap_or_else(|| format!("Part-{}", idx + 1));

    let action_url = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => base_url.join(action).ok()?,
        _ => base_url.clone(),
    };

    let method = match form.value().attr("method") {
        Some(m) if m.eq_ignore_ascii_case("get") => FormMethod::Get,
        _ => FormMethod::Post,
    };

    Some(DownloadTarget {
        publication_id: publication_id.to_string(),
        class_range,
        file_name,
        action_url: action_url.to_string(),
        method,
        fields,
    })
}

/// Last path segment of the remote file name with spaces replaced.
pub fn local_file_name(remote: &str) -> Option<String> {
    let last = remote
        .rsplit(['\\', '/'])
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    Some(last.replace(' ', "_"))
}

static CLASS_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*-\s*(\d+)").expect("class range pattern"));

/// Extract an "N-M" class range from button text such as "Download (Class 1-34)".
pub fn class_range_from_text(text: &str) -> Option<String> {
    let caps = CLASS_RANGE_RE.captures(text)?;
    Some(format!("{}-{}", &caps[1], &caps[2]))
}
