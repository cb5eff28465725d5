//! Heuristic record parser for journal text.
//!
//! Text is segmented into per-application blocks: a line that starts with an
//! application number opens a new block. Each block then goes through an
//! ordered list of independent field extractors. A field that cannot be found
//! is left empty; only a block that is unusable as a whole is skipped.

mod fields;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extractor::PageText;
use crate::publication::RecordFields;

pub use fields::FIELD_EXTRACTORS;

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{7,10})(?:\s+(\d{2}/\d{2}/\d{4})\b.*|\s*)$").expect("header pattern")
});

static BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^trade\s*marks?\s+journal\b").expect("banner pattern"));

/// One application's worth of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub application_number: String,
    pub filing_date: Option<NaiveDate>,
    /// Page the header line was found on.
    pub page: u32,
    /// All lines of the block; index 0 is the header.
    pub lines: Vec<String>,
}

impl Block {
    /// Lines after the header.
    pub fn body(&self) -> &[String] {
        &self.lines[1..]
    }
}

/// Counters for one parse pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub blocks_seen: u32,
    pub records: u32,
    pub skipped_blocks: u32,
}

/// Records parsed from one file.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub records: Vec<RecordFields>,
    pub stats: ParseStats,
}

fn parse_header(line: &str) -> Option<(String, Option<NaiveDate>)> {
    let caps = HEADER.captures(line)?;
    let number = caps.get(1)?.as_str().to_string();
    let date = caps
        .get(2)
        .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%d/%m/%Y").ok());
    Some((number, date))
}

/// Split pages into blocks. Text before the first header is discarded.
pub fn segment<'a, I>(pages: I) -> Vec<Block>
where
    I: IntoIterator<Item = &'a PageText>,
{
    let mut blocks: Vec<Block> = Vec::new();
    let mut current: Option<Block> = None;

    for page in pages {
        for raw in page.text.lines() {
            let line = raw.trim();
            if line.is_empty() || BANNER.is_match(line) {
                continue;
            }

            if let Some((number, date)) = parse_header(line) {
                if let Some(done) = current.take() {
                    blocks.push(done);
                }
                current = Some(Block {
                    application_number: number,
                    filing_date: date,
                    page: page.number,
                    lines: vec![line.to_string()],
                });
            } else if let Some(block) = current.as_mut() {
                block.lines.push(line.to_string());
            }
        }
    }

    if let Some(done) = current {
        blocks.push(done);
    }
    blocks
}

/// A block is unusable when most of its text is replacement or control
/// characters, or when it carries nothing beyond a bare number.
fn is_corrupt(block: &Block) -> bool {
    if block.body().is_empty() && block.filing_date.is_none() {
        return true;
    }

    let (total, bad) = block
        .lines
        .iter()
        .flat_map(|l| l.chars())
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(total, bad), c| {
            let is_bad = c == '\u{FFFD}' || c.is_control();
            (total + 1, bad + usize::from(is_bad))
        });

    total > 0 && bad * 2 > total
}

/// Apply every field extractor to a block.
pub fn parse_block(block: &Block) -> RecordFields {
    let mut record = RecordFields {
        application_number: block.application_number.clone(),
        page_number: block.page,
        raw_text: block.lines.join("\n"),
        ..Default::default()
    };
    for (_, extract) in FIELD_EXTRACTORS {
        extract(block, &mut record);
    }
    record
}

/// Parse the ordered pages of one file.
pub fn parse_pages(pages: &[PageText]) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    for block in segment(pages) {
        outcome.stats.blocks_seen += 1;
        if is_corrupt(&block) {
            debug!(
                application_number = %block.application_number,
                page = block.page,
                "Skipping unparseable block"
            );
            outcome.stats.skipped_blocks += 1;
            continue;
        }
        outcome.records.push(parse_block(&block));
    }

    outcome.stats.records = outcome.records.len() as u32;
    outcome
}

/// Parse text whose pages are separated by form feeds.
pub fn parse_text(text: &str) -> ParseOutcome {
    let pages: Vec<PageText> = text
        .split('\u{000C}')
        .enumerate()
        .map(|(idx, text)| PageText {
            number: idx as u32 + 1,
            text: text.to_string(),
        })
        .collect();
    parse_pages(&pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Trade Marks Journal No: 2237 , 06/01/2025 Class 30
6123456 01/05/2024
Class 30
SUNRISE GOLD
SUNRISE AGRO FOODS
12, MG ROAD, SHIVAJINAGAR
PUNE - 411005, MAHARASHTRA
Private Limited Company
Address for service in India/Attorney address:
LEGAL ASSOCIATES
45, CHURCH STREET, BENGALURU
Used Since :01/01/2020
MUMBAI
Rice, flour and preparations made from cereals;
bread, pastry and confectionery.
6123457 02/05/2024
Class 25
RIVERLINE
ANITA SHARMA
7, LAKE VIEW APARTMENTS, KOLKATA
Individual
Proposed to be Used
KOLKATA
Clothing, footwear, headgear.
To be associated with: 5998877
";

    #[test]
    fn test_segment_blocks() {
        let blocks = segment(&[PageText {
            number: 4,
            text: SAMPLE.to_string(),
        }]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].application_number, "6123456");
        assert_eq!(
            blocks[0].filing_date,
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
        assert_eq!(blocks[0].page, 4);
        assert_eq!(blocks[1].lines[0], "6123457 02/05/2024");
    }

    #[test]
    fn test_parse_full_record() {
        let outcome = parse_text(SAMPLE);
        assert_eq!(outcome.stats.blocks_seen, 2);
        assert_eq!(outcome.stats.records, 2);
        assert_eq!(outcome.stats.skipped_blocks, 0);

        let first = &outcome.records[0];
        assert_eq!(first.application_number, "6123456");
        assert_eq!(first.filing_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(first.class_number, Some(30));
        assert_eq!(first.name.as_deref(), Some("SUNRISE GOLD"));
        assert_eq!(first.applicant_name.as_deref(), Some("SUNRISE AGRO FOODS"));
        assert_eq!(
            first.applicant_address.as_deref(),
            Some("12, MG ROAD, SHIVAJINAGAR, PUNE - 411005, MAHARASHTRA")
        );
        assert_eq!(
            first.applicant_type.as_deref(),
            Some("Private Limited Company")
        );
        assert_eq!(first.representative_name.as_deref(), Some("LEGAL ASSOCIATES"));
        assert_eq!(
            first.representative_address.as_deref(),
            Some("45, CHURCH STREET, BENGALURU")
        );
        assert_eq!(first.usage_since.as_deref(), Some("01/01/2020"));
        assert_eq!(first.office_location.as_deref(), Some("MUMBAI"));
        assert_eq!(
            first.description.as_deref(),
            Some("Rice, flour and preparations made from cereals; bread, pastry and confectionery.")
        );
        assert_eq!(first.association, None);
        assert_eq!(first.page_number, 1);
        assert!(first.raw_text.starts_with("6123456 01/05/2024\nClass 30"));

        let second = &outcome.records[1];
        assert_eq!(second.name.as_deref(), Some("RIVERLINE"));
        assert_eq!(second.applicant_name.as_deref(), Some("ANITA SHARMA"));
        assert_eq!(second.applicant_type.as_deref(), Some("Individual"));
        assert_eq!(second.usage_since.as_deref(), Some("Proposed to be Used"));
        assert_eq!(second.office_location.as_deref(), Some("KOLKATA"));
        assert_eq!(
            second.description.as_deref(),
            Some("Clothing, footwear, headgear.")
        );
        assert_eq!(second.association.as_deref(), Some("5998877"));
        assert_eq!(second.representative_name, None);
    }

    #[test]
    fn test_missing_filing_date_yields_null_only_for_that_field() {
        let text = "\
6200001
Class 9
BRIGHTWAVE
BRIGHTWAVE LABS LLP
3, TECH PARK, CHENNAI
LLP
Used Since :15/08/2019
CHENNAI
Computer software.
";
        let outcome = parse_text(text);
        assert_eq!(outcome.records.len(), 1);

        let record = &outcome.records[0];
        assert_eq!(record.application_number, "6200001");
        assert_eq!(record.filing_date, None);
        assert_eq!(record.class_number, Some(9));
        assert_eq!(record.name.as_deref(), Some("BRIGHTWAVE"));
        assert_eq!(record.applicant_name.as_deref(), Some("BRIGHTWAVE LABS LLP"));
        assert_eq!(record.applicant_address.as_deref(), Some("3, TECH PARK, CHENNAI"));
        assert_eq!(record.applicant_type.as_deref(), Some("LLP"));
        assert_eq!(record.usage_since.as_deref(), Some("15/08/2019"));
        assert_eq!(record.office_location.as_deref(), Some("CHENNAI"));
        assert_eq!(record.description.as_deref(), Some("Computer software."));
    }

    #[test]
    fn test_first_match_wins() {
        let text = "\
6300001 10/10/2023
Class 5
Class 35
MEDIQ
Used Since :01/02/2003
Used Since :05/06/2010
DELHI
Medicines.
";
        let record = &parse_text(text).records[0];
        assert_eq!(record.class_number, Some(5));
        assert_eq!(record.usage_since.as_deref(), Some("01/02/2003"));
    }

    #[test]
    fn test_layout_drift_degrades_to_partial_fields() {
        let text = "6400001 01/01/2024\nsomething entirely unexpected here\n";
        let outcome = parse_text(text);
        assert_eq!(outcome.records.len(), 1);

        let record = &outcome.records[0];
        assert_eq!(record.filing_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(record.class_number, None);
        assert_eq!(record.office_location, None);
        assert_eq!(record.usage_since, None);
    }

    #[test]
    fn test_corrupt_block_skipped_and_counted() {
        let text = "\
6500001 01/01/2024
\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}
6500002 02/01/2024
Class 3
GLOWUP
";
        let outcome = parse_text(text);
        assert_eq!(outcome.stats.blocks_seen, 2);
        assert_eq!(outcome.stats.skipped_blocks, 1);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].application_number, "6500002");
    }

    #[test]
    fn test_bare_number_block_is_skipped() {
        let outcome = parse_text("6600001\n6600002 03/03/2024\nZENITH\n");
        assert_eq!(outcome.stats.skipped_blocks, 1);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].application_number, "6600002");
    }

    #[test]
    fn test_records_span_pages() {
        let text = "6700001 01/01/2024\nCOMET\nCOMET TRADERS\u{000C}12, FORT ROAD\nDELHI\nTea.\n6700002 02/01/2024\nNOVA\n";
        let outcome = parse_text(text);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].page_number, 1);
        assert_eq!(outcome.records[0].office_location.as_deref(), Some("DELHI"));
        assert_eq!(outcome.records[1].page_number, 2);
    }

    #[test]
    fn test_preamble_ignored() {
        let outcome = parse_text("Index of applications\nPage 1 of 400\n");
        assert_eq!(outcome.stats.blocks_seen, 0);
        assert!(outcome.records.is_empty());
    }

    #[test]
    fn test_header_pattern() {
        assert!(parse_header("6123456 01/05/2024").is_some());
        assert!(parse_header("6123456 01/05/2024 Class 30").is_some());
        assert!(parse_header("6123456").is_some());
        assert!(parse_header("123456 01/05/2024").is_none());
        assert!(parse_header("12, MG ROAD").is_none());
        assert!(parse_header("6123456 MAIN ROAD").is_none());
    }
}
