use std::path::PathBuf;

use grants_adapters::parse_opportunity_file;
use grants_core::OpportunityField;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join("fixtures/sample-extract/GrantsDBExtract20240115v2.xml")
}

#[test]
fn sample_extract_parses_in_document_order() {
    let records = parse_opportunity_file(fixture_path()).expect("parse fixture");

    let ids: Vec<&str> = records.iter().map(|r| r.opportunity_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["350001", "350002", "350003", "350004", "350005", "350006"]
    );

    let first = &records[0];
    assert_eq!(
        first.opportunity_title,
        "Rural Literacy & Library Access Grants"
    );
    assert_eq!(first.value(OpportunityField::CfdaNumbers), "84.215");
    assert_eq!(first.grantor_contact_text, "Jordan Lee, Program Officer");
    assert_eq!(first.category_explanation, "");
    assert_eq!(first.archive_date, "");

    let second = &records[1];
    assert_eq!(second.description, "<p>Trains community health workers.</p>");
    assert_eq!(
        second.additional_information_on_eligibility,
        "Tribal organizations are encouraged to apply."
    );

    let last = &records[5];
    assert_eq!(last.close_date, "");
    assert_eq!(last.agency_code, "USDA-FNS1");
}
