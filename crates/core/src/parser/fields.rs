//! Field extractors.
//!
//! Each extractor is a pure function of a block and fills exactly one field.
//! Within a block the first match wins.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::Block;
use crate::publication::RecordFields;

pub type FieldExtractor = fn(&Block, &mut RecordFields);

/// Extractors in application order.
pub const FIELD_EXTRACTORS: &[(&str, FieldExtractor)] = &[
    ("filing_date", |b: &Block, r: &mut RecordFields| r.filing_date = b.filing_date),
    ("class_number", |b: &Block, r: &mut RecordFields| r.class_number = class_number(b)),
    ("name", |b: &Block, r: &mut RecordFields| r.name = mark_name(b)),
    ("applicant_name", |b: &Block, r: &mut RecordFields| r.applicant_name = applicant_name(b)),
    ("applicant_address", |b: &Block, r: &mut RecordFields| {
        r.applicant_address = applicant_address(b)
    }),
    ("applicant_type", |b: &Block, r: &mut RecordFields| r.applicant_type = applicant_type(b)),
    ("representative_name", |b: &Block, r: &mut RecordFields| {
        r.representative_name = representative_name(b)
    }),
    ("representative_address", |b: &Block, r: &mut RecordFields| {
        r.representative_address = representative_address(b)
    }),
    ("usage_since", |b: &Block, r: &mut RecordFields| r.usage_since = usage_since(b)),
    ("office_location", |b: &Block, r: &mut RecordFields| r.office_location = office_location(b)),
    ("description", |b: &Block, r: &mut RecordFields| r.description = description(b)),
    ("association", |b: &Block, r: &mut RecordFields| r.association = association(b)),
];

const OFFICES: &[&str] = &["MUMBAI", "DELHI", "KOLKATA", "CHENNAI", "AHMEDABAD"];

const APPLICANT_TYPES: &[&str] = &[
    "INDIVIDUAL",
    "SOLE PROPRIETOR",
    "SOLE PROPRIETORSHIP",
    "PROPRIETOR",
    "PROPRIETORSHIP",
    "PARTNERSHIP",
    "PRIVATE LIMITED",
    "PUBLIC LIMITED",
    "LIMITED LIABILITY",
    "LLP",
    "BODY CORPORATE",
    "BODY INCORPORATE",
    "A COMPANY",
    "HUF",
    "HINDU UNDIVIDED",
    "GOVERNMENT",
];

const MAX_ADDRESS_LINES: usize = 3;
const MAX_DESCRIPTION_LINES: usize = 10;

static CLASS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^class\s+\d+").expect("class line pattern"));
static CLASS_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bclass\s+(\d{1,2})\b").expect("class number pattern"));
static REPRESENTATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(address for service|attorney address|agents?\s+address)")
        .expect("representative pattern")
});
static USAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(used since|proposed to be used)").expect("usage pattern"));
static USED_SINCE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)used since\s*:?\s*(\d{2}/\d{2}/\d{4})").expect("used since pattern")
});
static ASSOCIATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)to be associated with\s*:?\s*(\d[\d,\s]*)").expect("association pattern")
});
static STOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(priority claimed|this is condition|advertised before|to be associated with|subject to|registration of this trade mark)",
    )
    .expect("stop pattern")
});

fn starts_with_word(haystack: &str, word: &str) -> bool {
    haystack.starts_with(word)
        && haystack[word.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric())
}

fn is_type_line(line: &str) -> bool {
    let upper = line.to_uppercase();
    APPLICANT_TYPES.iter().any(|kw| starts_with_word(&upper, kw))
}

fn is_office_line(line: &str) -> bool {
    let upper = line.trim().to_uppercase();
    OFFICES.iter().any(|office| upper == *office)
}

fn is_usage_line(line: &str) -> bool {
    USAGE.is_match(line)
}

/// Lines that mark a labelled section rather than free text.
fn is_section_line(line: &str) -> bool {
    CLASS_LINE.is_match(line)
        || REPRESENTATIVE.is_match(line)
        || STOP.is_match(line)
        || is_usage_line(line)
        || is_office_line(line)
        || is_type_line(line)
}

fn starts_with_digit(line: &str) -> bool {
    line.chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn is_address_like(line: &str) -> bool {
    starts_with_digit(line) || (line.contains(',') && line.chars().any(|c| c.is_ascii_digit()))
}

fn is_name_candidate(line: &str) -> bool {
    !is_section_line(line)
        && !starts_with_digit(line)
        && !is_address_like(line)
        && line.chars().count() > 1
}

/// Index into `block.lines` of the mark name.
fn mark_name_index(block: &Block) -> Option<usize> {
    block
        .lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| is_name_candidate(line))
        .map(|(idx, _)| idx)
}

fn applicant_name_index(block: &Block) -> Option<usize> {
    let idx = mark_name_index(block)? + 1;
    let line = block.lines.get(idx)?;
    (!is_section_line(line) && !starts_with_digit(line)).then_some(idx)
}

/// Up to `max` consecutive free-text lines starting at `start`.
fn collect_plain(block: &Block, start: usize, max: usize) -> Option<String> {
    let lines: Vec<&str> = block
        .lines
        .iter()
        .skip(start)
        .take_while(|line| !is_section_line(line))
        .take(max)
        .map(String::as_str)
        .collect();
    (!lines.is_empty()).then(|| lines.join(", "))
}

fn class_number(block: &Block) -> Option<u32> {
    block.lines.iter().find_map(|line| {
        CLASS_NUMBER
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

fn mark_name(block: &Block) -> Option<String> {
    mark_name_index(block).map(|idx| block.lines[idx].clone())
}

fn applicant_name(block: &Block) -> Option<String> {
    applicant_name_index(block).map(|idx| block.lines[idx].clone())
}

fn applicant_address(block: &Block) -> Option<String> {
    let start = applicant_name_index(block)? + 1;
    collect_plain(block, start, MAX_ADDRESS_LINES)
}

fn applicant_type(block: &Block) -> Option<String> {
    block
        .body()
        .iter()
        .find(|line| is_type_line(line))
        .cloned()
}

/// Representative name and the index where their address begins.
fn representative(block: &Block) -> Option<(String, usize)> {
    let marker = block
        .lines
        .iter()
        .position(|line| REPRESENTATIVE.is_match(line))?;

    let inline = block.lines[marker]
        .rsplit(':')
        .next()
        .map(str::trim)
        .filter(|rest| !rest.is_empty() && *rest != block.lines[marker].trim());
    if let Some(name) = inline {
        return Some((name.to_string(), marker + 1));
    }

    let line = block.lines.get(marker + 1)?;
    (!is_section_line(line)).then(|| (line.clone(), marker + 2))
}

fn representative_name(block: &Block) -> Option<String> {
    representative(block).map(|(name, _)| name)
}

fn representative_address(block: &Block) -> Option<String> {
    let (_, start) = representative(block)?;
    collect_plain(block, start, MAX_ADDRESS_LINES)
}

fn usage_since(block: &Block) -> Option<String> {
    block.lines.iter().find_map(|line| {
        if let Some(m) = USED_SINCE_DATE.captures(line).and_then(|c| c.get(1)) {
            return Some(m.as_str().to_string());
        }
        line.to_lowercase()
            .contains("proposed to be used")
            .then(|| "Proposed to be Used".to_string())
    })
}

fn office_location(block: &Block) -> Option<String> {
    block
        .body()
        .iter()
        .find(|line| is_office_line(line))
        .map(|line| line.trim().to_uppercase())
}

/// Goods and services text following the usage and office lines.
fn description(block: &Block) -> Option<String> {
    let marker = block
        .lines
        .iter()
        .position(|line| is_usage_line(line) || is_office_line(line))?;

    let lines: Vec<&str> = block.lines[marker..]
        .iter()
        .skip_while(|line| is_usage_line(line) || is_office_line(line))
        .take_while(|line| !is_section_line(line))
        .take(MAX_DESCRIPTION_LINES)
        .map(String::as_str)
        .collect();
    (!lines.is_empty()).then(|| lines.join(" "))
}

fn association(block: &Block) -> Option<String> {
    block.lines.iter().find_map(|line| {
        ASSOCIATION
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().trim_end_matches(',').trim().to_string())
            .filter(|s| !s.is_empty())
    })
}
