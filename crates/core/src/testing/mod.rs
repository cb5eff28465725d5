//! Testing utilities and mock implementations.
//!
//! Mocks for the portal navigator and the text extractor let the whole run
//! pipeline be exercised without network access or poppler.
//!
//! # Example
//!
//! ```rust,ignore
//! use harvester_core::testing::{fixtures, MockExtractor, MockNavigator};
//!
//! let navigator = MockNavigator::new();
//! navigator.set_listings(vec![fixtures::listing("2237", fixtures::date(2025, 1, 6))]).await;
//! let extractor = MockExtractor::new();
//! ```

mod mock_extractor;
mod mock_navigator;

pub use mock_extractor::{MockExtractor, CORRUPT_PAGE_MARKER};
pub use mock_navigator::MockNavigator;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::NaiveDate;

    use crate::navigator::{DownloadTarget, FormMethod, Listing};

    /// Class ranges every fixture listing carries.
    pub const CLASS_RANGES: &[&str] = &["1-34", "35-45"];

    /// Journal text with three applications over two pages.
    pub const JOURNAL_TEXT: &str = "%PDF-1.4 mock journal
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
Rice, flour and preparations made from cereals.
6123457 02/05/2024
Class 25
RIVERLINE
ANITA SHARMA
7, LAKE VIEW APARTMENTS, KOLKATA
Individual
Proposed to be Used
KOLKATA
Clothing, footwear, headgear.
\u{000C}6123458
Class 9
BRIGHTWAVE
BRIGHTWAVE LABS LLP
3, TECH PARK, CHENNAI
LLP
Used Since :15/08/2019
CHENNAI
Computer software.
";

    /// Number of applications in [`JOURNAL_TEXT`].
    pub const JOURNAL_RECORDS: u32 = 3;

    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
    }

    /// Bytes served for a file when no content is configured.
    pub fn journal_pdf() -> Vec<u8> {
        JOURNAL_TEXT.as_bytes().to_vec()
    }

    /// Create a download target for a publication partition.
    pub fn target(publication_id: &str, class_range: &str) -> DownloadTarget {
        let file_name = format!(
            "Journal_{}_Class_{}.pdf",
            publication_id,
            class_range.replace('-', "_")
        );
        DownloadTarget {
            publication_id: publication_id.to_string(),
            class_range: class_range.to_string(),
            fields: vec![
                (
                    "FileName".to_string(),
                    format!(r"D:\Journals\{}\{}", publication_id, file_name),
                ),
                ("Class".to_string(), class_range.to_string()),
            ],
            file_name,
            action_url: "https://portal.example/journal/download".to_string(),
            method: FormMethod::Post,
        }
    }

    /// Create a listing with one target per entry of [`CLASS_RANGES`].
    pub fn listing(publication_id: &str, publication_date: NaiveDate) -> Listing {
        Listing {
            publication_id: publication_id.to_string(),
            publication_date,
            availability_date: Some(publication_date),
            targets: CLASS_RANGES
                .iter()
                .map(|range| target(publication_id, range))
                .collect(),
        }
    }
}
